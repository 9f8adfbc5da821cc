// Typed access to raw record field memory.
//
// Every function here that touches record memory takes a `ScanLock` as proof
// that the record's scan lock is held for the whole copy.

use std::ptr;

use super::record::{FieldId, ScanLock};
use crate::error::{Error, Result};

// Raw field type codes as the record subsystem reports them.
pub const DBF_STRING: u16 = 0;
pub const DBF_CHAR: u16 = 1;
pub const DBF_UCHAR: u16 = 2;
pub const DBF_SHORT: u16 = 3;
pub const DBF_USHORT: u16 = 4;
pub const DBF_LONG: u16 = 5;
pub const DBF_ULONG: u16 = 6;
pub const DBF_FLOAT: u16 = 7;
pub const DBF_DOUBLE: u16 = 8;
pub const DBF_ENUM: u16 = 9;
pub const DBF_MENU: u16 = 10;
pub const DBF_NOACCESS: u16 = 15;

/// Width of one text element unless the record says otherwise.
pub const MAX_STRING_SIZE: usize = 40;

/// Native element kinds a field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Char,
    UChar,
    Short,
    UShort,
    Long,
    ULong,
    Float,
    Double,
}

impl FieldType {
    /// Maps a raw type code to a native kind. Enum, menu, link and
    /// no-access fields have no native array representation.
    pub fn from_dbf(code: u16) -> Option<Self> {
        match code {
            DBF_STRING => Some(FieldType::String),
            DBF_CHAR => Some(FieldType::Char),
            DBF_UCHAR => Some(FieldType::UChar),
            DBF_SHORT => Some(FieldType::Short),
            DBF_USHORT => Some(FieldType::UShort),
            DBF_LONG => Some(FieldType::Long),
            DBF_ULONG => Some(FieldType::ULong),
            DBF_FLOAT => Some(FieldType::Float),
            DBF_DOUBLE => Some(FieldType::Double),
            _ => None,
        }
    }

    pub fn dbf(self) -> u16 {
        match self {
            FieldType::String => DBF_STRING,
            FieldType::Char => DBF_CHAR,
            FieldType::UChar => DBF_UCHAR,
            FieldType::Short => DBF_SHORT,
            FieldType::UShort => DBF_USHORT,
            FieldType::Long => DBF_LONG,
            FieldType::ULong => DBF_ULONG,
            FieldType::Float => DBF_FLOAT,
            FieldType::Double => DBF_DOUBLE,
        }
    }

    /// Bytes per element. Text fields report their own width; this is the default.
    pub fn element_size(self) -> usize {
        match self {
            FieldType::String => MAX_STRING_SIZE,
            FieldType::Char | FieldType::UChar => 1,
            FieldType::Short | FieldType::UShort => 2,
            FieldType::Long | FieldType::ULong | FieldType::Float => 4,
            FieldType::Double => 8,
        }
    }
}

/// A numeric element type that can be copied bit-for-bit out of a field.
pub trait NativeElement: Copy + PartialEq + Default + Send + Sync + 'static {
    const FIELD_TYPE: FieldType;

    fn into_array(values: Vec<Self>) -> ScalarArray;

    /// Unwraps an array of this element type; other types yield `None`.
    fn from_array(array: ScalarArray) -> Option<Vec<Self>>;
}

macro_rules! native_element {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl NativeElement for $t {
                const FIELD_TYPE: FieldType = FieldType::$variant;

                fn into_array(values: Vec<Self>) -> ScalarArray {
                    ScalarArray::$variant(values)
                }

                fn from_array(array: ScalarArray) -> Option<Vec<Self>> {
                    match array {
                        ScalarArray::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }

            impl From<Vec<$t>> for ScalarArray {
                fn from(values: Vec<$t>) -> Self {
                    ScalarArray::$variant(values)
                }
            }
        )*
    };
}

/// Client-visible array tagged with its native element type.
#[derive(Debug, PartialEq)]
pub enum ScalarArray {
    String(Vec<String>),
    Char(Vec<i8>),
    UChar(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Long(Vec<i32>),
    ULong(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

native_element! {
    i8 => Char,
    u8 => UChar,
    i16 => Short,
    u16 => UShort,
    i32 => Long,
    u32 => ULong,
    f32 => Float,
    f64 => Double,
}

impl From<Vec<String>> for ScalarArray {
    fn from(values: Vec<String>) -> Self {
        ScalarArray::String(values)
    }
}

// Expands `$body` once per variant with `$v` bound to the inner Vec.
macro_rules! for_each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ScalarArray::String($v) => $body,
            ScalarArray::Char($v) => $body,
            ScalarArray::UChar($v) => $body,
            ScalarArray::Short($v) => $body,
            ScalarArray::UShort($v) => $body,
            ScalarArray::Long($v) => $body,
            ScalarArray::ULong($v) => $body,
            ScalarArray::Float($v) => $body,
            ScalarArray::Double($v) => $body,
        }
    };
}

impl Clone for ScalarArray {
    fn clone(&self) -> Self {
        for_each_variant!(self, v => v.clone().into())
    }

    /// Reuses `self`'s buffer when both sides hold the same element type.
    fn clone_from(&mut self, source: &Self) {
        match (self, source) {
            (ScalarArray::String(a), ScalarArray::String(b)) => a.clone_from(b),
            (ScalarArray::Char(a), ScalarArray::Char(b)) => a.clone_from(b),
            (ScalarArray::UChar(a), ScalarArray::UChar(b)) => a.clone_from(b),
            (ScalarArray::Short(a), ScalarArray::Short(b)) => a.clone_from(b),
            (ScalarArray::UShort(a), ScalarArray::UShort(b)) => a.clone_from(b),
            (ScalarArray::Long(a), ScalarArray::Long(b)) => a.clone_from(b),
            (ScalarArray::ULong(a), ScalarArray::ULong(b)) => a.clone_from(b),
            (ScalarArray::Float(a), ScalarArray::Float(b)) => a.clone_from(b),
            (ScalarArray::Double(a), ScalarArray::Double(b)) => a.clone_from(b),
            (this, source) => *this = source.clone(),
        }
    }
}

impl ScalarArray {
    pub fn empty(field_type: FieldType) -> Self {
        match field_type {
            FieldType::String => ScalarArray::String(Vec::new()),
            FieldType::Char => ScalarArray::Char(Vec::new()),
            FieldType::UChar => ScalarArray::UChar(Vec::new()),
            FieldType::Short => ScalarArray::Short(Vec::new()),
            FieldType::UShort => ScalarArray::UShort(Vec::new()),
            FieldType::Long => ScalarArray::Long(Vec::new()),
            FieldType::ULong => ScalarArray::ULong(Vec::new()),
            FieldType::Float => ScalarArray::Float(Vec::new()),
            FieldType::Double => ScalarArray::Double(Vec::new()),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            ScalarArray::String(_) => FieldType::String,
            ScalarArray::Char(_) => FieldType::Char,
            ScalarArray::UChar(_) => FieldType::UChar,
            ScalarArray::Short(_) => FieldType::Short,
            ScalarArray::UShort(_) => FieldType::UShort,
            ScalarArray::Long(_) => FieldType::Long,
            ScalarArray::ULong(_) => FieldType::ULong,
            ScalarArray::Float(_) => FieldType::Float,
            ScalarArray::Double(_) => FieldType::Double,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the array but keeps its allocation.
    pub fn clear(&mut self) {
        for_each_variant!(self, v => v.clear())
    }

    /// First element as `f64`, for scalar displays. Text yields `None`.
    pub fn first_as_f64(&self) -> Option<f64> {
        match self {
            ScalarArray::String(_) => None,
            ScalarArray::Char(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::UChar(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::Short(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::UShort(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::Long(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::ULong(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::Float(v) => v.first().map(|x| f64::from(*x)),
            ScalarArray::Double(v) => v.first().copied(),
        }
    }
}

/// One validated strided transfer: elements `offset + i * stride` for
/// `i in 0..count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub offset: usize,
    pub count: usize,
    pub stride: usize,
}

impl Transfer {
    /// Contiguous transfer of the first `count` elements.
    pub fn leading(count: usize) -> Self {
        Self {
            offset: 0,
            count,
            stride: 1,
        }
    }

    /// One past the highest element index touched, or 0 for an empty transfer.
    pub fn end(&self) -> usize {
        if self.count == 0 {
            return 0;
        }
        self.offset + (self.count - 1) * self.stride + 1
    }
}

fn check_bounds(lock: &ScanLock<'_>, field: FieldId, xfer: Transfer) -> Result<()> {
    let capacity = lock.record().element_count(field);
    if xfer.stride == 0 {
        return Err(Error::InvalidStride);
    }
    if xfer.end() > capacity {
        return Err(Error::InvalidArgument(format!(
            "transfer ending at {} exceeds field capacity {}",
            xfer.end(),
            capacity
        )));
    }
    Ok(())
}

unsafe fn read_native<T: NativeElement>(base: *const u8, xfer: Transfer, out: &mut Vec<T>) {
    let from = base as *const T;
    out.clear();
    out.reserve(xfer.count);
    for i in 0..xfer.count {
        out.push(ptr::read_unaligned(from.add(xfer.offset + i * xfer.stride)));
    }
}

unsafe fn write_native<T: NativeElement>(base: *mut u8, xfer: Transfer, data: &[T]) {
    let to = base as *mut T;
    for (i, value) in data.iter().take(xfer.count).enumerate() {
        ptr::write_unaligned(to.add(xfer.offset + i * xfer.stride), *value);
    }
}

unsafe fn read_text(base: *const u8, width: usize, xfer: Transfer, out: &mut Vec<String>) {
    out.truncate(xfer.count);
    for i in 0..xfer.count {
        let element = std::slice::from_raw_parts(base.add((xfer.offset + i * xfer.stride) * width), width);
        let len = element.iter().position(|b| *b == 0).unwrap_or(width);
        let text = String::from_utf8_lossy(&element[..len]);
        match out.get_mut(i) {
            Some(slot) => {
                if slot.as_str() != text {
                    slot.clear();
                    slot.push_str(&text);
                }
            }
            None => out.push(text.into_owned()),
        }
    }
}

unsafe fn write_text(base: *mut u8, width: usize, xfer: Transfer, data: &[String]) {
    if width == 0 {
        return;
    }
    for (i, value) in data.iter().take(xfer.count).enumerate() {
        let to = base.add((xfer.offset + i * xfer.stride) * width);
        let bytes = value.as_bytes();
        let nchar = bytes.len().min(width - 1);
        ptr::copy_nonoverlapping(bytes.as_ptr(), to, nchar);
        ptr::write_bytes(to.add(nchar), 0, width - nchar);
    }
}

/// Copies `xfer` out of `field` into `out`, reusing `out`'s allocation when
/// its element type already matches.
pub fn read_strided(
    lock: &ScanLock<'_>,
    field: FieldId,
    field_type: FieldType,
    xfer: Transfer,
    out: &mut ScalarArray,
) -> Result<()> {
    check_bounds(lock, field, xfer)?;
    if out.field_type() != field_type {
        *out = ScalarArray::empty(field_type);
    }
    let record = lock.record();
    // Safety: bounds were checked against the field's capacity and the scan
    // lock is held for as long as `lock` lives.
    unsafe {
        let base = record.field_ptr(field) as *const u8;
        match out {
            ScalarArray::String(v) => read_text(base, record.field_size(field), xfer, v),
            ScalarArray::Char(v) => read_native(base, xfer, v),
            ScalarArray::UChar(v) => read_native(base, xfer, v),
            ScalarArray::Short(v) => read_native(base, xfer, v),
            ScalarArray::UShort(v) => read_native(base, xfer, v),
            ScalarArray::Long(v) => read_native(base, xfer, v),
            ScalarArray::ULong(v) => read_native(base, xfer, v),
            ScalarArray::Float(v) => read_native(base, xfer, v),
            ScalarArray::Double(v) => read_native(base, xfer, v),
        }
    }
    Ok(())
}

/// Copies the first `xfer.count` elements of `data` into `field`.
///
/// `data` must already be the field's native type; nothing is converted.
pub fn write_strided(
    lock: &ScanLock<'_>,
    field: FieldId,
    field_type: FieldType,
    xfer: Transfer,
    data: &ScalarArray,
) -> Result<()> {
    if data.field_type() != field_type {
        return Err(Error::type_mismatch(field_type, data.field_type()));
    }
    if xfer.count > data.len() {
        return Err(Error::InvalidArgument(format!(
            "count {} exceeds the {} elements supplied",
            xfer.count,
            data.len()
        )));
    }
    check_bounds(lock, field, xfer)?;
    let record = lock.record();
    // Safety: as in `read_strided`.
    unsafe {
        let base = record.field_ptr(field);
        match data {
            ScalarArray::String(v) => write_text(base, record.field_size(field), xfer, v),
            ScalarArray::Char(v) => write_native(base, xfer, v),
            ScalarArray::UChar(v) => write_native(base, xfer, v),
            ScalarArray::Short(v) => write_native(base, xfer, v),
            ScalarArray::UShort(v) => write_native(base, xfer, v),
            ScalarArray::Long(v) => write_native(base, xfer, v),
            ScalarArray::ULong(v) => write_native(base, xfer, v),
            ScalarArray::Float(v) => write_native(base, xfer, v),
            ScalarArray::Double(v) => write_native(base, xfer, v),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbf_codes_map_both_ways() {
        for code in DBF_STRING..=DBF_DOUBLE {
            let ft = FieldType::from_dbf(code).unwrap();
            assert_eq!(ft.dbf(), code);
        }
        assert_eq!(FieldType::from_dbf(DBF_ENUM), None);
        assert_eq!(FieldType::from_dbf(DBF_NOACCESS), None);
    }

    #[test]
    fn transfer_end_is_last_index_plus_one() {
        let xfer = Transfer { offset: 2, count: 3, stride: 4 };
        assert_eq!(xfer.end(), 11);
        assert_eq!(Transfer { offset: 7, count: 0, stride: 1 }.end(), 0);
    }

    #[test]
    fn text_round_trip_through_raw_memory() {
        let mut raw = vec![0xAAu8; 3 * 8];
        let data = vec!["ab".to_string(), "this one is too long".to_string()];
        unsafe {
            write_text(raw.as_mut_ptr(), 8, Transfer { offset: 0, count: 2, stride: 2 }, &data);
            let mut out = Vec::new();
            read_text(raw.as_ptr(), 8, Transfer { offset: 0, count: 2, stride: 2 }, &mut out);
            assert_eq!(out, vec!["ab".to_string(), "this on".to_string()]);
        }
        // the skipped middle element is untouched
        assert!(raw[8..16].iter().all(|b| *b == 0xAA));
    }
}
