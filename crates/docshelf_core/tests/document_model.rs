use docshelf_core::{Document, Revision};

#[test]
fn document_new_sets_defaults() {
    let doc = Document::new("a1", "DOC", "a1", "2024-01-01T00:00:00Z");

    assert_eq!(doc.id, "a1");
    assert_eq!(doc.doc_type, "DOC");
    assert_eq!(doc.title, "a1");
    assert_eq!(doc.created, "2024-01-01T00:00:00Z");
    assert_eq!(doc.revision, None);
    assert!(doc.is_active());
}

#[test]
fn document_serialization_uses_expected_wire_fields() {
    let mut doc = Document::new("a1", "DOC", "groceries", "2024-01-01T00:00:00Z");
    let rev = Revision::initial().next();
    doc.revision = Some(rev.clone());
    doc.soft_delete();

    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["id"], "a1");
    assert_eq!(json["rev"], rev.to_string());
    assert_eq!(json["type"], "DOC");
    assert_eq!(json["title"], "groceries");
    assert_eq!(json["created"], "2024-01-01T00:00:00Z");
    assert_eq!(json["deleted"], true);

    let decoded: Document = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, doc);
}

#[test]
fn unsaved_document_omits_rev_and_defaults_deleted() {
    let doc = Document::new("a1", "DOC", "a1", "2024-01-01T00:00:00Z");
    let json = serde_json::to_value(&doc).unwrap();
    assert!(json.get("rev").is_none());

    let decoded: Document = serde_json::from_str(
        r#"{"id":"b2","type":"DOC","title":"b2","created":"2024-01-02T00:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(decoded.revision, None);
    assert!(!decoded.deleted);
}

#[test]
fn malformed_rev_fails_deserialization() {
    let result: Result<Document, _> = serde_json::from_str(
        r#"{"id":"a1","rev":"nope","type":"DOC","title":"a1","created":"2024-01-01T00:00:00Z"}"#,
    );
    assert!(result.is_err());
}
