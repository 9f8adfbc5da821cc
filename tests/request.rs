use dbpv_bridge::DbPv::Structs::FieldSet;
use dbpv_bridge::DbPv::Request;
use dbpv_bridge::ErrorKind;

#[test]
fn full_request() {
    let request: Request = "record[process=true,queueSize=4]field(value,alarm,timeStamp)"
        .parse()
        .unwrap();
    assert!(request.process);
    assert_eq!(request.queue_size, 4);
    assert_eq!(
        request.fields,
        FieldSet::VALUE | FieldSet::ALARM | FieldSet::TIME_STAMP
    );
}

#[test]
fn record_part_only_keeps_default_fields() {
    let request: Request = "record[process=false]".parse().unwrap();
    assert!(!request.process);
    assert_eq!(request.fields, Request::default().fields);
}

#[test]
fn whitespace_is_ignored() {
    let request: Request = "  record[ queueSize = 8 ] field( value , display )  "
        .parse()
        .unwrap();
    assert_eq!(request.queue_size, 8);
    assert_eq!(request.fields, FieldSet::VALUE | FieldSet::DISPLAY);
}

#[test]
fn bad_requests_are_configuration_errors() {
    for text in [
        "record[queueSize=0]",
        "record[queueSize=many]",
        "record[process=maybe]",
        "record[priority=1]",
        "record[process=true",
        "field(value,units)",
        "field(value) extra",
        "record[process]",
    ] {
        let err = text.parse::<Request>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{text}");
    }
}
