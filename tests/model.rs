//! Information model, registry parsing, templates and session namespaces.

use ipfixcodec::model::{BASIC_LIST_SLOT, SUB_TEMPLATE_LIST_SLOT, SUB_TEMPLATE_MULTI_LIST_SLOT};
use ipfixcodec::{
    parse_registry, CodecError, DataType, FieldKind, InfoElement, InfoElementSpec, InfoModel,
    Semantic, Session, Template, Units, CERT_PEN, REVERSE_PEN, VARLEN,
};
use std::io::Write;

const VENDOR_REGISTRY: &str = r#"
# vendor elements
myCounter    6871:500  unsigned32  endian reversible semantic(totalCounter) units(packets) range(0, 1000);
payloadHead  6871:501  octetArray  [var] desc("first bytes of the payload");
shortStamp   6871:502  unsigned64  [4]  endian;
plainFlag    503       boolean;
"#;

// ==================== InfoModel ====================

#[test]
fn test_builtin_elements_resolve_by_name_and_id() {
    let model = InfoModel::new();
    let port = model.get_element("sourceTransportPort").expect("port");
    assert_eq!((port.ent, port.id, port.length), (0, 7, 2));
    assert_eq!(port.data_type, DataType::Unsigned16);
    assert_eq!(
        model.element_by_id(85, 0).expect("octets").name,
        "octetTotalCount"
    );
    assert_eq!(
        model.get_element_type("sourceIPv4Address").expect("type"),
        DataType::Ipv4Address
    );
    assert!(model.get_element("noSuchElement").is_none());
    assert!(matches!(model.element("noSuchElement"), Err(CodecError::NotFound(_))));
    assert!(model.element_by_id(7, CERT_PEN).is_none());
}

#[test]
fn test_reversible_elements_get_shadows() {
    let model = InfoModel::new();
    let rev = model.get_element("reverseOctetTotalCount").expect("reverse");
    assert_eq!((rev.ent, rev.id), (REVERSE_PEN, 85));
    assert_eq!(rev.data_type, DataType::Unsigned64);
    assert_eq!(
        model.element_by_id(85, REVERSE_PEN).expect("by id").name,
        "reverseOctetTotalCount"
    );
    // not reversible
    assert!(!model.contains("reverseSourceTransportPort"));
}

#[test]
fn test_element_lengths() {
    let model = InfoModel::new();
    assert_eq!(model.get_element_length("sourceTransportPort", None).expect("len"), 2);
    assert_eq!(model.get_element_length("octetTotalCount", None).expect("len"), 8);
    assert_eq!(model.get_element_length("interfaceName", None).expect("len"), VARLEN);
    assert_eq!(model.get_element_length("basicList", None).expect("len"), VARLEN);
    assert_eq!(
        model
            .get_element_length("sourceTransportPort", Some(FieldKind::Plain))
            .expect("len"),
        2
    );
    assert_eq!(
        model
            .get_element_length("sourceTransportPort", Some(FieldKind::BasicList))
            .expect("len"),
        BASIC_LIST_SLOT
    );
    assert_eq!(
        model
            .get_element_length("subTemplateList", Some(FieldKind::SubTemplateList))
            .expect("len"),
        SUB_TEMPLATE_LIST_SLOT
    );
    assert_eq!(
        model
            .get_element_length("subTemplateMultiList", Some(FieldKind::SubTemplateMultiList))
            .expect("len"),
        SUB_TEMPLATE_MULTI_LIST_SLOT
    );
    assert!(matches!(
        model.get_element_length("noSuchElement", None),
        Err(CodecError::NotFound(_))
    ));
}

#[test]
fn test_later_registration_replaces_id_lookup() {
    let model = InfoModel::new();
    model.add_element(InfoElement::new("portAlias", 0, 7).data_type(DataType::Unsigned16));
    assert_eq!(model.element_by_id(7, 0).expect("by id").name, "portAlias");
    // the earlier name still resolves
    assert!(model.get_element("sourceTransportPort").is_some());
}

#[test]
fn test_add_element_list_skips_missing_entries() {
    let model = InfoModel::empty();
    assert!(model.is_empty());
    model.add_element_list(vec![
        Some(InfoElement::new("first", CERT_PEN, 1).data_type(DataType::Unsigned8)),
        None,
        Some(InfoElement::new("second", CERT_PEN, 2)),
    ]);
    assert_eq!(model.len(), 2);
    let second = model.get_element("second").expect("second");
    assert_eq!(second.data_type, DataType::OctetArray);
    assert!(second.is_varlen());
}

#[test]
fn test_models_are_shared_handles() {
    let model = InfoModel::new();
    let other = model.clone();
    other.add_element(InfoElement::new("sharedThing", CERT_PEN, 900));
    assert!(model.contains("sharedThing"));
    assert!(model.same_as(&other));
    assert!(!model.same_as(&InfoModel::new()));
}

// ==================== Registry files ====================

#[test]
fn test_registry_text_defines_vendor_elements() {
    let model = InfoModel::new();
    let added = model.load_str(VENDOR_REGISTRY).expect("load");
    assert_eq!(added, 4);

    let counter = model.get_element("myCounter").expect("counter");
    assert_eq!((counter.ent, counter.id, counter.length), (CERT_PEN, 500, 4));
    assert_eq!(counter.semantic, Semantic::TotalCounter);
    assert_eq!(counter.units, Units::Packets);
    assert_eq!((counter.min, counter.max), (0, 1000));
    assert!(counter.endian);

    let rev = model.get_element("reverseMyCounter").expect("reverse");
    assert_eq!((rev.ent, rev.id), (CERT_PEN, 500 | 0x4000));

    let payload = model.get_element("payloadHead").expect("payload");
    assert!(payload.is_varlen());
    assert_eq!(payload.description.as_deref(), Some("first bytes of the payload"));

    assert_eq!(model.get_element("shortStamp").expect("stamp").length, 4);
    let flag = model.get_element("plainFlag").expect("flag");
    assert_eq!((flag.ent, flag.length), (0, 1));
}

#[test]
fn test_parse_registry_keeps_file_order() {
    let elements = parse_registry(VENDOR_REGISTRY).expect("parse");
    let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["myCounter", "payloadHead", "shortStamp", "plainFlag"]);
}

#[test]
fn test_registry_errors_leave_model_untouched() {
    let model = InfoModel::new();
    let before = model.len();
    assert!(matches!(
        model.load_str("brokenThing 6871:10 notAType;"),
        Err(CodecError::Parse(_))
    ));
    assert!(matches!(
        model.load_str("missingSemicolon 6871:11 unsigned8"),
        Err(CodecError::Parse(_))
    ));
    assert!(matches!(
        model.load_str("badUnits 6871:12 unsigned8 units(parsecs);"),
        Err(CodecError::Parse(_))
    ));
    assert_eq!(model.len(), before);
    assert!(parse_registry("# only a comment\n").expect("empty").is_empty());
}

#[test]
fn test_registry_file_loads() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(VENDOR_REGISTRY.as_bytes()).expect("write");
    let model = InfoModel::new();
    assert_eq!(model.load_file(file.path()).expect("load"), 4);
    assert!(model.contains("payloadHead"));
    assert!(matches!(
        model.load_file(file.path().with_extension("missing")),
        Err(CodecError::Io(_))
    ));
}

// ==================== Template ====================

#[test]
fn test_template_lookup() {
    let model = InfoModel::new();
    let mut t = Template::new(&model);
    t.add_element("sourceTransportPort").expect("element");
    t.add_element("interfaceName").expect("element");
    t.add_spec(InfoElementSpec::with_length("octetTotalCount", 4))
        .expect("reduced");
    assert_eq!(t.len(), 3);
    assert!(t.contains("interfaceName"));
    assert!(t.contains_element(&model.element("octetTotalCount").expect("ie")));
    assert_eq!(t.get("octetTotalCount").expect("spec").length, 4);
    assert_eq!(t.spec(0).expect("spec").name, "sourceTransportPort");
    assert!(matches!(t.get("vlanId"), Err(CodecError::NotFound(_))));
    assert!(matches!(
        t.spec(3),
        Err(CodecError::IndexOutOfRange { index: 3, count: 3 })
    ));
    assert!(t.field(1).expect("field").is_varlen());
    // one prefix byte for the varfield
    assert_eq!(t.min_record_length(), 2 + 1 + 4);
    assert!(!t.is_options());
    assert_eq!(t.template_id(), 0);
}

#[test]
fn test_template_rejects_bad_specs() {
    let model = InfoModel::new();
    let mut t = Template::new(&model);
    assert!(matches!(
        t.add_element("noSuchElement"),
        Err(CodecError::UnknownElement(_))
    ));
    assert!(matches!(
        t.add_spec(InfoElementSpec::with_length("octetTotalCount", 9)),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        t.add_spec(InfoElementSpec::with_length("sourceIPv4Address", 2)),
        Err(CodecError::InvalidSpec(_))
    ));
    assert!(matches!(
        t.add_spec(InfoElementSpec::with_length("interfaceName", 4)),
        Err(CodecError::InvalidSpec(_))
    ));
    t.add_spec(InfoElementSpec::with_length("sourceIPv4Address", 4))
        .expect("natural length");
    t.add_spec(InfoElementSpec::with_length("packetDeltaCount", 3))
        .expect("reduced");
    assert_eq!(t.len(), 2);
}

#[test]
fn test_template_frozen_after_registration() {
    let model = InfoModel::new();
    let mut t = Template::new(&model);
    t.add_element("sourceTransportPort").expect("element");
    let mut session = Session::new(&model);
    let tid = session.add_template(&mut t, 0).expect("register");
    assert!(t.is_finalized());
    assert_eq!(t.template_id(), tid);
    assert!(matches!(
        t.add_element("octetTotalCount"),
        Err(CodecError::AlreadyFinalized)
    ));
    assert!(matches!(
        t.add_spec_list(vec![InfoElementSpec::new("vlanId")]),
        Err(CodecError::AlreadyFinalized)
    ));
    assert!(matches!(t.set_scope(1), Err(CodecError::AlreadyFinalized)));
    assert_eq!(t.len(), 1);
}

#[test]
fn test_options_template_layout() {
    let model = InfoModel::new();
    let t = Template::new_options(&model).expect("options");
    assert!(t.is_options());
    assert_eq!(t.scope(), 2);
    assert_eq!(t.len(), 10);
    assert_eq!(t.field(0).expect("scope").ie.name, "privateEnterpriseNumber");
    assert_eq!(t.field(5).expect("padding").length, 6);
    assert!(t.field(8).expect("name").is_varlen());

    let mut scoped = Template::new(&model);
    scoped.add_element("ingressInterface").expect("element");
    assert!(matches!(scoped.set_scope(2), Err(CodecError::InvalidSpec(_))));
    scoped.set_scope(1).expect("scope");
    assert!(scoped.is_options());
}

#[test]
fn test_build_spec_list_from_fields() {
    let model = InfoModel::new();
    let mut t = Template::new(&model);
    t.add_spec_list(vec![
        InfoElementSpec::with_length("octetTotalCount", 4),
        InfoElementSpec::new("interfaceName"),
    ])
    .expect("specs");
    let rebuilt = t.build_spec_list().to_vec();
    assert_eq!(
        rebuilt,
        vec![
            InfoElementSpec::with_length("octetTotalCount", 4),
            InfoElementSpec::new("interfaceName"),
        ]
    );
}

// ==================== Session ====================

#[test]
fn test_session_assigns_and_validates_ids() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let make = || {
        let mut t = Template::new(&model);
        t.add_element("sourceTransportPort").expect("element");
        t
    };
    assert_eq!(session.add_template(&mut make(), 0).expect("auto"), 256);
    assert_eq!(session.add_template(&mut make(), 0).expect("auto"), 257);
    assert_eq!(session.add_template(&mut make(), 1000).expect("explicit"), 1000);
    assert!(matches!(
        session.add_template(&mut make(), 255),
        Err(CodecError::InvalidTemplateId(255))
    ));
    assert!(matches!(
        session.add_template(&mut make(), 70_000),
        Err(CodecError::InvalidTemplateId(70_000))
    ));
    assert_eq!(session.external_ids(), vec![256, 257, 1000]);
    assert!(session.get_template(257, true).is_ok());
    assert!(matches!(
        session.get_template(999, false),
        Err(CodecError::NotFound(_))
    ));
}

#[test]
fn test_session_namespaces_are_separate() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    let mut internal = Template::new(&model);
    internal.add_element("sourceTransportPort").expect("element");
    let mut external = Template::new(&model);
    external.add_element("octetTotalCount").expect("element");

    assert_eq!(session.add_internal_template(&mut internal, 0).expect("int"), 256);
    assert_eq!(session.add_external_template(&mut external, 0).expect("ext"), 256);
    assert!(session.get_template(256, true).expect("int").contains("sourceTransportPort"));
    assert!(session.get_template(256, false).expect("ext").contains("octetTotalCount"));

    let mut both = Template::new(&model);
    both.add_element("vlanId").expect("element");
    assert_eq!(session.add_template(&mut both, 0).expect("both"), 257);
    assert!(session.has_internal(257) && session.has_external(257));
}

#[test]
fn test_session_domain_and_pairs() {
    let model = InfoModel::new();
    let mut session = Session::new(&model);
    session.set_domain(77);
    assert_eq!(session.domain(), 77);
    assert_eq!(session.sequence(), 0);
    assert!(matches!(
        session.add_template_pair(300, 400),
        Err(CodecError::NotRegistered(400))
    ));
    session.add_template_pair(300, 0).expect("drop pair");
}
