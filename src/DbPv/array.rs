use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use parking_lot::Mutex;

use crate::error::{DeviceError, Error, Result};
use crate::Core::field::{read_strided, write_strided, FieldType, ScalarArray, Transfer};
use crate::Core::record::{EventMask, RecordHandle, ScanLock};

/// Number of elements a strided transfer can move: elements
/// `offset, offset + stride, ...` that lie below `limit`, floored, and at
/// most `count` of them unless `count` is 0.
///
/// `stride` must be non-zero.
pub(crate) fn clip_count(limit: usize, offset: usize, count: usize, stride: usize) -> usize {
    if offset >= limit {
        return 0;
    }
    let fit = (limit - offset) / stride;
    if count == 0 {
        fit
    } else {
        count.min(fit)
    }
}

/// Strided slice access to an array field.
pub struct ChannelArray {
    handle: RecordHandle,
    field_type: FieldType,
    data: Mutex<()>,
    destroyed: AtomicBool,
}

impl ChannelArray {
    pub(crate) fn new(handle: RecordHandle) -> Result<Self> {
        let record = handle.record();
        let field = handle.field();
        if record.element_count(field) <= 1 {
            return Err(Error::NotAnArray(record.name().to_string()));
        }
        let raw = record.field_type(field);
        let field_type = FieldType::from_dbf(raw).ok_or(Error::UnsupportedType(raw))?;
        debug!("array channel on {} ({:?})", record.name(), field_type);
        Ok(Self {
            handle,
            field_type,
            data: Mutex::new(()),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn check_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::destroyed());
        }
        Ok(())
    }

    fn length(&self, lock: &ScanLock<'_>) -> Result<usize> {
        match lock.record().array_info(self.handle.field()) {
            Some(info) if info.offset != 0 => {
                Err(DeviceError::new(-1, "array offset not supported").into())
            }
            Some(info) => Ok(info.length),
            None => Ok(lock.record().element_count(self.handle.field())),
        }
    }

    /// Reads `count` elements starting at `offset`, `stride` apart, clipped
    /// to the field's current length. `count == 0` reads as many as fit.
    pub fn get_array(&self, offset: usize, count: usize, stride: usize) -> Result<ScalarArray> {
        if stride == 0 {
            return Err(Error::InvalidStride);
        }
        let _data = self.data.lock();
        self.check_live()?;
        let lock = self.handle.scan_lock();
        let length = self.length(&lock)?;
        let count = clip_count(length, offset, count, stride);
        let mut out = ScalarArray::empty(self.field_type);
        if count > 0 {
            let xfer = Transfer { offset, count, stride };
            read_strided(&lock, self.handle.field(), self.field_type, xfer, &mut out)?;
        }
        trace!(
            "{}: get_array({}, {}, {}) -> {} elements",
            lock.record().name(),
            offset,
            count,
            stride,
            out.len()
        );
        Ok(out)
    }

    /// Writes elements of `data` to `offset, offset + stride, ...`, clipped
    /// to the field's capacity. `count == 0` writes all of `data`. A
    /// variable-length field grows to cover the last element written.
    ///
    /// Returns the number of elements written.
    pub fn put_array(
        &self,
        data: &ScalarArray,
        offset: usize,
        count: usize,
        stride: usize,
    ) -> Result<usize> {
        if stride == 0 {
            return Err(Error::InvalidStride);
        }
        if data.field_type() != self.field_type {
            return Err(Error::type_mismatch(self.field_type, data.field_type()));
        }
        let requested = if count == 0 {
            data.len()
        } else {
            count.min(data.len())
        };

        let _data = self.data.lock();
        self.check_live()?;
        let lock = self.handle.scan_lock();
        let record = lock.record();
        let field = self.handle.field();
        let count = clip_count(record.element_count(field), offset, requested, stride);
        if count == 0 {
            return Ok(0);
        }
        let xfer = Transfer { offset, count, stride };
        if record.array_info(field).is_some() {
            let length = self.length(&lock)?;
            if xfer.end() > length {
                record.put_array_info(field, xfer.end())?;
            }
        }
        write_strided(&lock, field, self.field_type, xfer, data)?;
        record.post_events(field, EventMask::VALUE | EventMask::LOG);
        trace!(
            "{}: put_array({}, {}, {}) wrote {} elements",
            record.name(),
            offset,
            requested,
            stride,
            count
        );
        Ok(count)
    }

    /// Current number of valid elements.
    pub fn get_length(&self) -> Result<usize> {
        let _data = self.data.lock();
        self.check_live()?;
        let lock = self.handle.scan_lock();
        self.length(&lock)
    }

    /// Sets the number of valid elements, clipped to the field's capacity.
    /// Returns the length applied.
    pub fn set_length(&self, length: usize) -> Result<usize> {
        let _data = self.data.lock();
        self.check_live()?;
        let lock = self.handle.scan_lock();
        let record = lock.record();
        let field = self.handle.field();
        let length = length.min(record.element_count(field));
        record.put_array_info(field, length)?;
        Ok(length)
    }

    /// Idempotent; later calls fail with `InvalidState`.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            debug!("array channel on {} destroyed", self.handle.record().name());
        }
    }
}

impl Drop for ChannelArray {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::clip_count;

    #[test]
    fn count_is_floored_against_the_limit() {
        assert_eq!(clip_count(10, 8, 0, 1), 2);
        assert_eq!(clip_count(10, 8, 5, 1), 2);
        assert_eq!(clip_count(10, 0, 0, 3), 3);
        assert_eq!(clip_count(10, 1, 2, 3), 2);
    }

    #[test]
    fn offset_past_the_end_moves_nothing() {
        assert_eq!(clip_count(10, 10, 0, 1), 0);
        assert_eq!(clip_count(10, usize::MAX, 4, 1), 0);
        assert_eq!(clip_count(0, 0, 0, 1), 0);
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        assert_eq!(clip_count(10, 0, usize::MAX, usize::MAX), 0);
        assert_eq!(clip_count(usize::MAX, 1, usize::MAX, 2), (usize::MAX - 1) / 2);
    }
}
