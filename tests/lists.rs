//! Record field access and the structured list types (basicList,
//! subTemplateList, subTemplateMultiList), without a wire in between.

use ipfixcodec::dump::{record_summary_line, record_to_dump};
use ipfixcodec::{
    create_stml_from_list, BasicList, CodecError, FieldKind, InfoElementSpec, InfoModel,
    ListSemantic, Record, Session, SubTemplateList, SubTemplateMultiList, Template, Value, VARLEN,
};
use std::net::Ipv6Addr;

fn registered(model: &InfoModel, session: &mut Session, names: &[&str]) -> Template {
    let mut t = Template::new(model);
    for name in names {
        t.add_element(name).expect("element");
    }
    session.add_template(&mut t, 0).expect("register");
    t
}

// ==================== Record ====================

#[test]
fn test_record_from_template_starts_zeroed() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(
        &model,
        &mut session,
        &["sourceTransportPort", "sourceIPv4Address", "octetTotalCount", "interfaceName"],
    );
    let rec = Record::from_template(&model, &t);
    assert_eq!(rec.len(), 4);
    // 2 + 4 + 8 + varfield slot
    assert_eq!(rec.length(), 30);
    assert_eq!(rec.get("sourceTransportPort").expect("port"), Value::U16(0));
    assert_eq!(rec.get("interfaceName").expect("name"), Value::String(String::new()));
    assert_eq!(rec.template().expect("template").template_id(), 256);
    assert!(rec.matches_template(&t));
    assert!(!rec.is_frozen());
}

#[test]
fn test_record_set_and_get_by_name_and_position() {
    let model = InfoModel::new();
    let mut rec = Record::new(&model);
    rec.add_element_list(&["sourceIPv6Address", "sourceMacAddress", "interfaceName"])
        .expect("fields");
    rec.set("sourceIPv6Address", "2001:db8::1").expect("ipv6");
    rec.set(1usize, "00:1b:21:aa:bb:cc").expect("mac");
    rec.set("interfaceName", "eth0").expect("name");

    assert_eq!(
        rec.get(0usize).expect("ipv6").as_ipv6(),
        Some("2001:db8::1".parse::<Ipv6Addr>().expect("literal"))
    );
    assert_eq!(
        rec.get("sourceMacAddress").expect("mac"),
        Value::Mac([0x00, 0x1b, 0x21, 0xaa, 0xbb, 0xcc])
    );
    assert_eq!(rec.get_bytes("interfaceName").expect("bytes"), b"eth0");
    let keys: Vec<String> = rec.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, vec!["sourceIPv6Address", "sourceMacAddress", "interfaceName"]);
}

#[test]
fn test_record_access_errors() {
    let model = InfoModel::new();
    let mut rec = Record::new(&model);
    rec.add_element_list(&["sourceTransportPort", "sourceIPv4Address"])
        .expect("fields");
    assert!(matches!(rec.get("vlanId"), Err(CodecError::KeyNotFound(_))));
    assert!(matches!(rec.get(2usize), Err(CodecError::KeyNotFound(_))));
    assert!(matches!(rec.get(("sourceTransportPort", 1)), Err(CodecError::KeyNotFound(_))));
    assert!(matches!(
        rec.set("sourceTransportPort", 70_000u32),
        Err(CodecError::TypeMismatch(_))
    ));
    assert!(matches!(
        rec.set("sourceTransportPort", "eighty"),
        Err(CodecError::TypeMismatch(_))
    ));
    assert!(matches!(
        rec.set("sourceIPv4Address", "10.0.0.300"),
        Err(CodecError::TypeMismatch(_))
    ));
    assert!(matches!(
        rec.add_element("noSuchElement", FieldKind::Plain, None, 0),
        Err(CodecError::UnknownElement(_))
    ));
    assert!(matches!(
        rec.add_element("shortAddr", FieldKind::Plain, Some("sourceIPv4Address"), 2),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        rec.basic_list("sourceTransportPort"),
        Err(CodecError::TypeMismatch(_))
    ));
}

#[test]
fn test_record_aliases_and_reduced_length() {
    let model = InfoModel::new();
    let mut rec = Record::new(&model);
    let key = rec
        .add_element("octets", FieldKind::Plain, Some("octetTotalCount"), 4)
        .expect("alias");
    assert_eq!(key.to_string(), "octets");
    assert_eq!(rec.length(), 4);
    rec.set("octets", u64::from(u32::MAX)).expect("fits");
    assert!(rec.set("octets", u64::from(u32::MAX) + 1).is_err());
    assert_eq!(rec.field("octets").expect("field").ie.name, "octetTotalCount");
}

#[test]
fn test_record_rejects_list_length_overrides() {
    let model = InfoModel::new();
    let mut t = Template::new(&model);
    assert!(matches!(
        t.add_spec(InfoElementSpec::with_length("basicList", 4)),
        Err(CodecError::InvalidSpec(_))
    ));

    let mut rec = Record::new(&model);
    assert!(matches!(
        rec.add_element("bl", FieldKind::BasicList, Some("octetTotalCount"), 4),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        rec.add_element("stl", FieldKind::SubTemplateList, None, 8),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        rec.add_element("subTemplateMultiList", FieldKind::Plain, None, 2),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        rec.add_element("name", FieldKind::Plain, Some("interfaceName"), 4),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(rec.is_empty());
    // the variable-length marker is the natural length of a list
    rec.add_element("bl", FieldKind::BasicList, Some("octetTotalCount"), VARLEN)
        .expect("natural length");
    assert_eq!(rec.length(), 24);
}

#[test]
fn test_record_freezes_once_a_list_is_touched() {
    let model = InfoModel::new();
    let mut rec = Record::new(&model);
    rec.add_element("port", FieldKind::Plain, Some("sourceTransportPort"), 0)
        .expect("port");
    rec.add_element("ports", FieldKind::BasicList, Some("sourceTransportPort"), 0)
        .expect("ports");
    assert_eq!(rec.length(), 2 + 24);
    assert!(rec.is_list("ports").expect("ports"));
    assert!(!rec.is_list("port").expect("port"));

    rec.set("ports", vec![Value::U16(22), Value::U16(443)]).expect("items");
    assert!(rec.is_frozen());
    assert!(matches!(
        rec.add_element("vlanId", FieldKind::Plain, None, 0),
        Err(CodecError::AlreadyFrozen)
    ));
    let bl = rec.basic_list("ports").expect("list");
    assert_eq!(bl.items(), &[Value::U16(22), Value::U16(443)]);
}

#[test]
fn test_record_copy_matches_keys() {
    let model = InfoModel::new();
    let mut src = Record::new(&model);
    src.add_element_list(&["sourceTransportPort", "vlanId"]).expect("fields");
    src.set("sourceTransportPort", 80u16).expect("port");
    src.set("vlanId", 12u16).expect("vlan");

    let mut dst = Record::new(&model);
    dst.add_element_list(&["vlanId", "protocolIdentifier"]).expect("fields");
    dst.copy(&src).expect("copy");
    assert_eq!(dst.get("vlanId").expect("vlan"), Value::U16(12));
    assert_eq!(dst.get("protocolIdentifier").expect("proto"), Value::U8(0));
}

#[test]
fn test_record_set_template_checks_field_count() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let pair = registered(&model, &mut session, &["sourceTransportPort", "vlanId"]);
    let single = registered(&model, &mut session, &["sourceTransportPort"]);

    let mut rec = Record::new(&model);
    rec.add_element_list(&["sourceTransportPort", "vlanId"]).expect("fields");
    assert!(matches!(rec.set_template(&single), Err(CodecError::SchemaMismatch(_))));
    rec.set_template(&pair).expect("template");
    assert_eq!(rec.template().expect("template").template_id(), pair.template_id());
}

#[test]
fn test_record_clear_is_idempotent() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(
        &model,
        &mut session,
        &["sourceTransportPort", "interfaceName", "basicList"],
    );
    let mut rec = Record::from_template(&model, &t);
    rec.set("sourceTransportPort", 80u16).expect("port");
    rec.set("interfaceName", "eth0").expect("name");
    rec.init_basic_list("basicList", 2, Some("vlanId")).expect("list");

    rec.clear();
    let cleared = rec.clone();
    rec.clear();
    assert_eq!(rec, cleared);
    assert_eq!(rec.get("sourceTransportPort").expect("port"), Value::U16(0));
    assert_eq!(rec.get("interfaceName").expect("name"), Value::String(String::new()));
    let bl = rec.basic_list("basicList").expect("list");
    assert!(bl.is_empty());
    // the element binding survives for the next init
    assert_eq!(bl.element().expect("element").name, "vlanId");
    assert_eq!(rec.init_basic_list("basicList", 1, None).expect("reinit").len(), 1);
}

// ==================== basicList ====================

#[test]
fn test_basic_list_values() {
    let model = InfoModel::new();
    let mut bl = BasicList::new(&model, "sourceTransportPort", 3, ListSemantic::OneOrMoreOf)
        .expect("list");
    assert!(bl.is_initialized());
    assert_eq!(bl.items(), &[Value::U16(0), Value::U16(0), Value::U16(0)]);

    let copied = bl
        .copy(&[Value::U16(1), Value::U16(2), Value::U16(3), Value::U16(4), Value::U16(5)])
        .expect("copy");
    assert_eq!(copied, 3);
    assert!(bl.contains(&Value::U16(3)));
    assert!(!bl.contains(&Value::U16(4)));
    assert!(matches!(
        bl.set(3, 9u16),
        Err(CodecError::IndexOutOfRange { index: 3, count: 3 })
    ));
    assert!(matches!(bl.set(0, 70_000u32), Err(CodecError::TypeMismatch(_))));
    assert_eq!(bl.get(1).expect("item"), &Value::U16(2));

    bl.clear();
    assert!(bl.is_empty());
    bl.init(2).expect("reinit");
    assert_eq!(bl.len(), 2);
}

#[test]
fn test_basic_list_construction_errors() {
    let model = InfoModel::new();
    assert!(matches!(
        BasicList::new(&model, "noSuchElement", 1, ListSemantic::Undefined),
        Err(CodecError::UnknownElement(_))
    ));
    assert!(matches!(
        BasicList::new(&model, "subTemplateList", 1, ListSemantic::Undefined),
        Err(CodecError::InvalidSpec(_))
    ));
    let mut unbound = BasicList::default();
    assert!(matches!(unbound.init(1), Err(CodecError::NotInitialized(_))));
    assert!(matches!(unbound.set(0, 1u8), Err(CodecError::NotInitialized(_))));

    let mut rec = Record::new(&model);
    rec.add_element("basicList", FieldKind::BasicList, None, 0)
        .expect("field");
    assert!(matches!(
        rec.init_basic_list("basicList", 1, None),
        Err(CodecError::NotInitialized(_))
    ));
    assert!(matches!(
        rec.set("basicList", vec![Value::U8(1)]),
        Err(CodecError::NotInitialized(_))
    ));
}

#[test]
fn test_list_semantic_codes() {
    for code in [0u8, 1, 2, 3, 4, 0xff] {
        let sem = ListSemantic::from_code(code).expect("semantic");
        assert_eq!(sem.code(), code);
    }
    assert_eq!(ListSemantic::from_code(9), None);
    assert_eq!(ListSemantic::default(), ListSemantic::Undefined);
    assert_eq!(ListSemantic::ExactlyOneOf.name(), "exactlyOneOf");
}

// ==================== subTemplateList ====================

#[test]
fn test_sub_template_list_initializes_on_first_set() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(&model, &mut session, &["sourceTransportPort", "octetTotalCount"]);
    let mut entry = Record::from_template(&model, &t);
    entry.set("sourceTransportPort", 179u16).expect("port");

    let mut stl = SubTemplateList::new();
    assert!(!stl.is_initialized());
    stl.set(0, entry).expect("set");
    assert!(stl.is_initialized());
    assert_eq!(stl.len(), 1);
    assert_eq!(stl.template_id(), t.template_id());
    assert!(stl.contains("octetTotalCount"));
    assert!(matches!(
        stl.set(1, Record::from_template(&model, &t)),
        Err(CodecError::IndexOutOfRange { index: 1, count: 1 })
    ));
    assert_eq!(
        stl.get(0).expect("entry").get("sourceTransportPort").expect("port"),
        Value::U16(179)
    );

    stl.clear();
    assert!(stl.is_empty());
    assert!(stl.is_initialized());
}

#[test]
fn test_sub_template_list_schema_errors() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(&model, &mut session, &["sourceTransportPort", "octetTotalCount"]);

    let mut loose = Record::new(&model);
    loose.add_element_list(&["sourceTransportPort"]).expect("field");
    let mut stl = SubTemplateList::new();
    assert!(matches!(stl.set(0, loose.clone()), Err(CodecError::NotInitialized(_))));
    assert!(matches!(
        stl.entry_init(&loose, &t, 2),
        Err(CodecError::SchemaMismatch(_))
    ));

    stl.entry_init(&Record::from_template(&model, &t), &t, 2)
        .expect("init");
    assert_eq!(stl.len(), 2);
    assert!(matches!(stl.set(1, loose), Err(CodecError::SchemaMismatch(_))));
    assert!(matches!(
        stl.get(2),
        Err(CodecError::IndexOutOfRange { index: 2, count: 2 })
    ));
    stl.get_mut(1)
        .expect("entry")
        .set("octetTotalCount", 5u64)
        .expect("octets");
    assert_eq!(
        stl.get(1).expect("entry").get("octetTotalCount").expect("octets"),
        Value::U64(5)
    );
}

// ==================== subTemplateMultiList ====================

#[test]
fn test_sub_template_multi_list_set_errors() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(&model, &mut session, &["vlanId"]);
    let mut stml = SubTemplateMultiList::new(2);
    assert_eq!(stml.len(), 2);
    assert!(matches!(stml.set(0, Vec::new()), Err(CodecError::EmptyList)));

    let mut loose = Record::new(&model);
    loose.add_element_list(&["vlanId"]).expect("field");
    assert!(matches!(stml.set(0, vec![loose]), Err(CodecError::NoTemplate)));
    assert!(matches!(
        stml.set(2, vec![Record::from_template(&model, &t)]),
        Err(CodecError::IndexOutOfRange { index: 2, count: 2 })
    ));

    stml.set(1, vec![Record::from_template(&model, &t); 3]).expect("group");
    assert!(!stml.get(0).expect("group").is_initialized());
    let group = stml.get(1).expect("group");
    assert_eq!(group.len(), 3);
    assert_eq!(group.template_id(), t.template_id());
}

#[test]
fn test_stml_entry_set_template() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(&model, &mut session, &["interfaceName"]);
    let mut stml = SubTemplateMultiList::new(1);
    let entry = stml.get_mut(0).expect("entry");
    entry.set_template(&t).expect("template");
    assert_eq!(entry.len(), 1);
    entry
        .get_mut(0)
        .expect("record")
        .set("interfaceName", "ge-0/0/1")
        .expect("name");
    assert!(stml.contains("interfaceName"));
    assert_eq!(
        stml.get(0).expect("entry").get(0).expect("record").get("interfaceName").expect("name"),
        Value::String("ge-0/0/1".into())
    );
}

#[test]
fn test_create_stml_groups_by_template() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let a = registered(&model, &mut session, &["sourceTransportPort"]);
    let b = registered(&model, &mut session, &["interfaceName"]);
    let mut first = Record::from_template(&model, &a);
    first.set("sourceTransportPort", 1u16).expect("port");
    let mut third = Record::from_template(&model, &a);
    third.set("sourceTransportPort", 3u16).expect("port");
    let records = vec![first, Record::from_template(&model, &b), third];

    let stml = create_stml_from_list(records).expect("stml");
    assert_eq!(stml.len(), 2);
    let group = stml.get(0).expect("group");
    assert_eq!(group.template_id(), a.template_id());
    let ports: Vec<Value> = group
        .iter()
        .map(|r| r.get("sourceTransportPort").expect("port"))
        .collect();
    assert_eq!(ports, vec![Value::U16(1), Value::U16(3)]);
    assert_eq!(stml.get(1).expect("group").template_id(), b.template_id());

    let mut loose = Record::new(&model);
    loose.add_element_list(&["vlanId"]).expect("field");
    assert!(matches!(create_stml_from_list(vec![loose]), Err(CodecError::NoTemplate)));
}

#[test]
fn test_record_owned_multi_list() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let inner = registered(&model, &mut session, &["vlanId"]);
    let outer = registered(&model, &mut session, &["subTemplateMultiList"]);
    let mut rec = Record::from_template(&model, &outer);
    let stml = rec
        .init_sub_template_multi_list("subTemplateMultiList", 1)
        .expect("stml");
    stml.set_semantic(ListSemantic::AllOf);
    stml.set(0, vec![Record::from_template(&model, &inner)]).expect("group");
    assert!(rec.is_frozen());

    let value = rec.get("subTemplateMultiList").expect("value");
    let stml = value.as_sub_template_multi_list().expect("stml");
    assert_eq!(stml.semantic(), ListSemantic::AllOf);
    assert_eq!(stml.get(0).expect("group").len(), 1);

    rec.clear_all_lists();
    assert!(rec.sub_template_multi_list("subTemplateMultiList").expect("stml").is_empty());
}

// ==================== Rendering ====================

#[test]
fn test_dump_renders_units_and_lists() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let t = registered(
        &model,
        &mut session,
        &["sourceTransportPort", "sourceIPv4Address", "octetTotalCount", "basicList"],
    );
    let mut rec = Record::from_template(&model, &t);
    rec.set("sourceTransportPort", 80u16).expect("port");
    rec.set("sourceIPv4Address", "10.0.0.1").expect("address");
    rec.set("octetTotalCount", 1500u64).expect("octets");
    rec.init_basic_list("basicList", 2, Some("vlanId")).expect("list");

    assert_eq!(
        record_summary_line(&rec),
        "sourceTransportPort=80 sourceIPv4Address=10.0.0.1 octetTotalCount=1500 octets basicList=<2 items>"
    );
    let dump = record_to_dump(&rec, 0);
    assert!(dump.contains("octetTotalCount: 1500 octets"));
    assert!(dump.contains("vlanId[2] (undefined) ["));
}
