use docshelf_core::{global, open_global, Document, GlobalStoreError, StoreConfig};

// One test per binary: the global handle lives for the whole process.
#[tokio::test]
async fn global_store_opens_once_and_survives_clear() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path());
    assert!(global().is_none());

    let store = open_global(config.clone()).unwrap();
    store
        .insert_if_absent(Document::new("a1", "DOC", "a1", "2024-01-01T00:00:00Z"))
        .await
        .unwrap();

    let again = open_global(config).unwrap();
    assert_eq!(again.find_by_type("DOC").await.unwrap().len(), 1);

    let other = tempfile::tempdir().unwrap();
    let err = open_global(StoreConfig::new(other.path())).unwrap_err();
    assert!(matches!(err, GlobalStoreError::AlreadyOpen { .. }));

    let handle = global().expect("global store should be installed");
    handle.clear_all().await.unwrap();
    assert!(store.find_by_type("DOC").await.unwrap().is_empty());
    assert_eq!(handle.path(), store.path());
}
