use dbpv_bridge::Core::{FieldType, ScalarArray, SoftRecord};
use dbpv_bridge::DbPv::{ChannelArray, ChannelBuilder};
use dbpv_bridge::{Error, ErrorKind};
use std::sync::Arc;

fn fixed(name: &str, field_type: FieldType, capacity: usize) -> Arc<SoftRecord> {
    SoftRecord::builder(name)
        .array("VAL", field_type, capacity)
        .build()
        .unwrap()
}

fn waveform(name: &str, field_type: FieldType, capacity: usize) -> Arc<SoftRecord> {
    SoftRecord::builder(name)
        .waveform("VAL", field_type, capacity)
        .build()
        .unwrap()
}

fn channel(record: &Arc<SoftRecord>) -> ChannelArray {
    ChannelBuilder::new(record.clone()).build_array().unwrap()
}

#[test]
fn put_then_get_same_slice() {
    let record = fixed("arr:roundtrip", FieldType::Short, 10);
    let array = channel(&record);
    let data = ScalarArray::Short(vec![11, -12, 13]);
    assert_eq!(array.put_array(&data, 2, 3, 1).unwrap(), 3);
    assert_eq!(array.get_array(2, 3, 1).unwrap(), data);
    assert_eq!(
        record.read::<i16>("VAL").unwrap(),
        vec![0, 0, 11, -12, 13, 0, 0, 0, 0, 0]
    );
}

#[test]
fn reads_are_clipped_to_length() {
    let record = fixed("arr:clip", FieldType::Long, 10);
    record.write("VAL", &(0..10).collect::<Vec<i32>>()).unwrap();
    let array = channel(&record);

    assert_eq!(array.get_array(8, 0, 1).unwrap(), ScalarArray::Long(vec![8, 9]));
    assert_eq!(array.get_array(8, 5, 1).unwrap(), ScalarArray::Long(vec![8, 9]));
    assert_eq!(array.get_array(0, 0, 3).unwrap(), ScalarArray::Long(vec![0, 3, 6]));
    assert_eq!(array.get_array(1, 2, 4).unwrap(), ScalarArray::Long(vec![1, 5]));
    assert!(array.get_array(10, 0, 1).unwrap().is_empty());
    assert!(array.get_array(usize::MAX, usize::MAX, 1).unwrap().is_empty());
}

#[test]
fn zero_stride_is_invalid() {
    let record = fixed("arr:stride", FieldType::Double, 4);
    let array = channel(&record);
    let err = array.get_array(0, 1, 0).unwrap_err();
    assert_eq!(err, Error::InvalidStride);
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = array
        .put_array(&ScalarArray::Double(vec![1.0]), 0, 1, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn strided_write_leaves_gaps_untouched() {
    let record = fixed("arr:gaps", FieldType::UChar, 8);
    record.write("VAL", &[9u8; 8]).unwrap();
    let array = channel(&record);
    let written = array
        .put_array(&ScalarArray::UChar(vec![1, 2, 3, 4, 5]), 1, 0, 3)
        .unwrap();
    // floor((8 - 1) / 3) == 2 elements
    assert_eq!(written, 2);
    assert_eq!(record.read::<u8>("VAL").unwrap(), vec![9, 1, 9, 9, 2, 9, 9, 9]);
}

#[test]
fn write_past_capacity_is_clipped() {
    let record = fixed("arr:cap", FieldType::Float, 4);
    let array = channel(&record);
    let data = ScalarArray::Float(vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(array.put_array(&data, 2, 0, 1).unwrap(), 2);
    assert_eq!(array.put_array(&data, 4, 0, 1).unwrap(), 0);
    assert_eq!(record.read::<f32>("VAL").unwrap(), vec![0.0, 0.0, 1.0, 2.0]);
}

#[test]
fn count_is_limited_to_supplied_data() {
    let record = fixed("arr:short-data", FieldType::Long, 8);
    let array = channel(&record);
    let written = array
        .put_array(&ScalarArray::Long(vec![5, 6]), 0, 6, 1)
        .unwrap();
    assert_eq!(written, 2);
}

#[test]
fn waveform_grows_but_never_shrinks() {
    let record = waveform("arr:grow", FieldType::Double, 10);
    let array = channel(&record);
    assert_eq!(array.get_length().unwrap(), 0);
    assert!(array.get_array(0, 0, 1).unwrap().is_empty());

    array
        .put_array(&ScalarArray::Double(vec![1.0, 2.0]), 4, 0, 1)
        .unwrap();
    assert_eq!(array.get_length().unwrap(), 6);
    assert_eq!(
        array.get_array(0, 0, 1).unwrap(),
        ScalarArray::Double(vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0])
    );

    array.put_array(&ScalarArray::Double(vec![7.0]), 0, 0, 1).unwrap();
    assert_eq!(array.get_length().unwrap(), 6);
}

#[test]
fn set_length_is_clipped_to_capacity() {
    let record = waveform("arr:length", FieldType::ULong, 10);
    let array = channel(&record);
    assert_eq!(array.set_length(100).unwrap(), 10);
    assert_eq!(array.get_length().unwrap(), 10);
    assert_eq!(array.set_length(3).unwrap(), 3);
    assert_eq!(array.get_array(0, 0, 1).unwrap().len(), 3);
}

#[test]
fn fixed_array_reports_its_capacity_as_length() {
    let record = fixed("arr:fixed-length", FieldType::Char, 5);
    let array = channel(&record);
    assert_eq!(array.get_length().unwrap(), 5);
    array.set_length(2).unwrap();
    assert_eq!(array.get_length().unwrap(), 5);
}

#[test]
fn text_elements_are_truncated_to_field_width() {
    let record = SoftRecord::builder("arr:text")
        .text("VAL", 8, 4)
        .build()
        .unwrap();
    let array = channel(&record);
    let data = ScalarArray::String(vec!["a".into(), "long string here".into()]);
    array.put_array(&data, 0, 0, 2).unwrap();

    let read = array.get_array(0, 0, 1).unwrap();
    assert_eq!(
        read,
        ScalarArray::String(vec![
            "a".into(),
            "".into(),
            "long st".into(),
            "".into()
        ])
    );
}

#[test]
fn element_type_must_match_field() {
    let record = fixed("arr:mismatch", FieldType::Long, 4);
    let array = channel(&record);
    let err = array
        .put_array(&ScalarArray::Double(vec![1.0]), 0, 0, 1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(array.field_type(), FieldType::Long);
}

#[test]
fn scalar_field_is_not_an_array() {
    let record = SoftRecord::builder("arr:scalar")
        .scalar("VAL", FieldType::Double)
        .build()
        .unwrap();
    let err = ChannelBuilder::new(record).build_array().unwrap_err();
    assert!(matches!(err, Error::NotAnArray(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn destroyed_channel_rejects_calls() {
    let record = fixed("arr:destroyed", FieldType::Long, 4);
    let array = channel(&record);
    array.destroy();
    array.destroy();
    assert_eq!(array.get_array(0, 0, 1).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(array.get_length().unwrap_err().kind(), ErrorKind::InvalidState);
}
