//! Integrationstests: Umbenennen, Droppen, Attribute (XML → Writer → XML).

use std::sync::Arc;

use xrewrite::{
    Error, EventRecorder, QName, TransformConfig, TransformWriter, XmlEvent, XmlSink,
    XmlStreamSerializer, copy_xml_str, transform_str, transform_writer,
};

// ============================================================================
// Hilfsfunktionen
// ============================================================================

fn run(xml: &str, config: &TransformConfig) -> String {
    transform_str(xml, config).unwrap()
}

fn record(xml: &str, config: &TransformConfig) -> Vec<XmlEvent> {
    let mut writer = TransformWriter::new(EventRecorder::new(), config).unwrap();
    copy_xml_str(xml, &mut writer).unwrap();
    writer.into_inner().into_events()
}

fn se(local: &str) -> XmlEvent {
    XmlEvent::StartElement(QName::local(local))
}

// ============================================================================
// Beispiele
// ============================================================================

#[test]
fn rename_child() {
    let config = TransformConfig::default().with_element_rename("b", "c");
    assert_eq!(run("<a><b/></a>", &config), "<a><c/></a>");
}

#[test]
fn shallow_drop_of_only_child() {
    let config = TransformConfig::default().with_drop_element("b");
    assert_eq!(run("<a><b/></a>", &config), "<a/>");
    assert_eq!(
        record("<a><b/></a>", &config),
        vec![se("a"), XmlEvent::EndElement]
    );
}

#[test]
fn deep_drop_removes_subtree() {
    let config = TransformConfig::default().with_element_rename("b", "");
    assert_eq!(run("<a><b><d/></b></a>", &config), "<a/>");
}

#[test]
fn attributes_become_elements() {
    let config = TransformConfig::default().with_attributes_to_elements(true);
    assert_eq!(run(r#"<a x="1"/>"#, &config), "<a><x>1</x></a>");
}

// ============================================================================
// Identitaet
// ============================================================================

#[test]
fn empty_config_is_identity() {
    let xml = r#"<p:a xmlns:p="urn:p" k="v"><p:b>t &amp; u</p:b><c/></p:a>"#;
    assert_eq!(run(xml, &TransformConfig::default()), xml);
}

#[test]
fn identity_keeps_default_namespace() {
    let xml = r#"<a xmlns="urn:d"><b>1</b></a>"#;
    assert_eq!(run(xml, &TransformConfig::default()), xml);
}

#[test]
fn identity_events_match_input_calls() {
    let events = record(r#"<a k="1">x</a>"#, &TransformConfig::default());
    assert_eq!(
        events,
        vec![
            se("a"),
            XmlEvent::Attribute(QName::local("k"), "1".into()),
            XmlEvent::text("x"),
            XmlEvent::EndElement,
        ]
    );
}

// ============================================================================
// Umbenennen
// ============================================================================

#[test]
fn rename_into_other_namespace_keeps_prefix() {
    let config = TransformConfig::default().with_element_rename("{urn:a}x", "{urn:b}y");
    let out = run(r#"<p:x xmlns:p="urn:a"><p:z/></p:x>"#, &config);
    // p:z ist nicht umbenannt und braucht die alte Bindung zurueck
    assert_eq!(out, r#"<p:y xmlns:p="urn:b"><p:z xmlns:p="urn:a"/></p:y>"#);
}

#[test]
fn wildcard_moves_whole_namespace() {
    let config = TransformConfig::default().with_element_rename("{http://foo}*", "{http://bar}*");
    let out = run(
        r#"<f:test xmlns:f="http://foo"><f:a>1</f:a><f:b/></f:test>"#,
        &config,
    );
    assert_eq!(out, r#"<f:test xmlns:f="http://bar"><f:a>1</f:a><f:b/></f:test>"#);
}

#[test]
fn exact_rename_beats_wildcard() {
    let config = TransformConfig::default()
        .with_element_rename("{urn:a}*", "{urn:b}*")
        .with_element_rename("{urn:a}x", "{urn:b}renamed");
    let out = run(r#"<a:r xmlns:a="urn:a"><a:x/></a:r>"#, &config);
    assert_eq!(out, r#"<a:r xmlns:a="urn:b"><a:renamed/></a:r>"#);
}

#[test]
fn rename_only_once_declares_namespace() {
    let config = TransformConfig::default().with_element_rename("{urn:a}*", "{urn:b}*");
    let out = run(
        r#"<a:r xmlns:a="urn:a"><a:x xmlns:a="urn:a"><a:y/></a:x></a:r>"#,
        &config,
    );
    assert_eq!(out.matches("xmlns:a=").count(), 1);
}

// ============================================================================
// Droppen
// ============================================================================

#[test]
fn shallow_drop_reparents_children() {
    let config = TransformConfig::default().with_drop_element("b");
    assert_eq!(
        run("<a><b><c>1</c>text<d/></b></a>", &config),
        "<a><c>1</c>text<d/></a>"
    );
}

#[test]
fn shallow_drop_of_root_keeps_only_child() {
    let config = TransformConfig::default().with_drop_element("{urn:env}envelope");
    let out = run(
        r#"<e:envelope xmlns:e="urn:env" e:id="1"><body/></e:envelope>"#,
        &config,
    );
    assert_eq!(out, "<body/>");
}

#[test]
fn deep_drop_resumes_with_sibling() {
    let config = TransformConfig::default().with_element_rename("b", "");
    assert_eq!(
        run(r#"<a><b k="v"><c>x</c><b/></b><d>y</d></a>"#, &config),
        "<a><d>y</d></a>"
    );
}

#[test]
fn deep_drop_swallows_namespace_declarations() {
    let config = TransformConfig::default().with_element_rename("{urn:x}gone", "");
    let out = run(
        r#"<a><x:gone xmlns:x="urn:x"><x:inner xmlns:y="urn:y"/></x:gone><b/></a>"#,
        &config,
    );
    assert_eq!(out, "<a><b/></a>");
}

#[test]
fn nested_drops() {
    let config = TransformConfig::default()
        .with_drop_element("wrapper")
        .with_element_rename("secret", "");
    assert_eq!(
        run("<r><wrapper><secret><wrapper/></secret><keep/></wrapper></r>", &config),
        "<r><keep/></r>"
    );
}

// ============================================================================
// Attribute
// ============================================================================

#[test]
fn attribute_rename_and_removal() {
    let config = TransformConfig::default()
        .with_attribute_rename("k", "{urn:n}key")
        .with_attribute_rename("gone", "");
    let out = run(r#"<a k="1" gone="2" keep="3"/>"#, &config);
    assert_eq!(out, r#"<a xmlns:ps1="urn:n" ps1:key="1" keep="3"/>"#);
}

#[test]
fn attribute_keeps_bound_prefix() {
    let config = TransformConfig::default().with_attribute_rename("{urn:n}old", "{urn:n}new");
    let out = run(r#"<a xmlns:n="urn:n" n:old="1"/>"#, &config);
    assert_eq!(out, r#"<a xmlns:n="urn:n" n:new="1"/>"#);
}

#[test]
fn xml_attributes_pass_through() {
    let config = TransformConfig::default().with_element_rename("a", "b");
    let out = run(r#"<a xml:lang="de">x</a>"#, &config);
    assert_eq!(out, r#"<b xml:lang="de">x</b>"#);
}

#[test]
fn attributes_to_elements_uses_renamed_name() {
    let config = TransformConfig::default()
        .with_attributes_to_elements(true)
        .with_attribute_rename("x", "y")
        .with_attribute_rename("z", "");
    assert_eq!(run(r#"<a x="1" z="2"><b/></a>"#, &config), "<a><y>1</y><b/></a>");
}

#[test]
fn attributes_of_dropped_elements_vanish() {
    let config = TransformConfig::default()
        .with_drop_element("b")
        .with_attributes_to_elements(true);
    assert_eq!(run(r#"<a><b k="1">t</b></a>"#, &config), "<a>t</a>");
}

// ============================================================================
// Fehler
// ============================================================================

#[test]
fn unbalanced_end_is_invalid_sequence() {
    let mut writer = TransformWriter::new(EventRecorder::new(), &TransformConfig::default()).unwrap();
    writer.start_element(&QName::local("a")).unwrap();
    writer.end_element().unwrap();
    assert!(matches!(writer.end_element(), Err(Error::InvalidSequence { .. })));
}

#[test]
fn writes_without_open_element_are_invalid_sequence() {
    let mut writer = TransformWriter::new(EventRecorder::new(), &TransformConfig::default()).unwrap();
    assert!(matches!(
        writer.attribute(&QName::local("k"), "v"),
        Err(Error::InvalidSequence { .. })
    ));
    assert!(matches!(
        writer.namespace_decl("p", "urn:p"),
        Err(Error::InvalidSequence { .. })
    ));
    assert!(matches!(
        writer.default_namespace_decl("urn:d"),
        Err(Error::InvalidSequence { .. })
    ));
}

#[test]
fn malformed_configuration_is_rejected() {
    let bad = [
        TransformConfig::default().with_element_rename("{urn:a}*", "{urn:b}x"),
        TransformConfig::default().with_element_rename("{urn:a}*", ""),
        TransformConfig::default().with_element_rename("{urn:a", "b"),
        TransformConfig::default().with_element_rename("p:a", "b"),
        TransformConfig::default().with_drop_element("{urn:a}*"),
        TransformConfig::default().with_append_element("{urn:a}*", "w"),
        TransformConfig::default().with_namespace_substitution("", "urn:x"),
    ];
    for config in &bad {
        let err = TransformWriter::new(EventRecorder::new(), config).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{config:?} -> {err}");
    }
}

#[test]
fn malformed_input_is_a_parse_error() {
    let err = transform_str("<a><b></a>", &TransformConfig::default()).unwrap_err();
    assert!(matches!(err, Error::XmlParse(_)));
}

// ============================================================================
// Streaming und geteilte Regeln
// ============================================================================

#[test]
fn transform_writer_streams_between_io() {
    let config = TransformConfig::default().with_element_rename("b", "c");
    let out = transform_writer("<a><b>1</b></a>".as_bytes(), Vec::new(), &config).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "<a><c>1</c></a>");
}

#[test]
fn writers_stack() {
    let inner = TransformConfig::default().with_element_rename("a", "b");
    let outer = TransformConfig::default().with_element_rename("b", "c");
    let serializer = XmlStreamSerializer::new(Vec::new());
    let mut writer = TransformWriter::new(TransformWriter::new(serializer, &inner).unwrap(), &outer).unwrap();
    copy_xml_str("<b><a/></b>", &mut writer).unwrap();
    let bytes = writer.into_inner().into_inner().finish().unwrap();
    // aeussere Stufe: b→c, innere: a→b
    assert_eq!(String::from_utf8(bytes).unwrap(), "<c><b/></c>");
}

#[test]
fn compiled_rules_are_shared_between_threads() {
    let config = TransformConfig::default()
        .with_element_rename("b", "c")
        .with_append_element("a/", "w=once");
    let rules = config.compile().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let rules = Arc::clone(&rules);
            std::thread::spawn(move || {
                let mut writer = TransformWriter::with_rules(
                    XmlStreamSerializer::new(Vec::new()),
                    rules,
                );
                copy_xml_str("<r><a><b/></a><a/></r>", &mut writer).unwrap();
                String::from_utf8(writer.into_inner().finish().unwrap()).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "<r><a><c/><w>once</w></a><a/></r>");
    }
}

#[test]
fn writer_works_as_dyn_sink() {
    let config = TransformConfig::default().with_element_rename("x", "y");
    let mut writer = TransformWriter::new(EventRecorder::new(), &config).unwrap();
    {
        let sink: &mut dyn XmlSink = &mut writer;
        copy_xml_str("<x/>", sink).unwrap();
    }
    assert_eq!(writer.into_inner().into_events(), vec![se("y"), XmlEvent::EndElement]);
}
