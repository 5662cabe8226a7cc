use docshelf_core::{AsyncDocumentStore, Document, StoreConfig, StoreErrorKind};
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::Poll;
use tempfile::TempDir;

fn doc(id: &str) -> Document {
    Document::new(id, "DOC", id, "2024-01-01T00:00:00Z")
}

/// Polls `fut` once. A pending operation has then taken its place on the
/// store gate and keeps it until it is driven to completion.
async fn poll_once<F: Future + Unpin>(fut: &mut F) -> Option<F::Output> {
    poll_fn(|cx| match Pin::new(&mut *fut).poll(cx) {
        Poll::Ready(output) => Poll::Ready(Some(output)),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}

async fn file_store() -> (TempDir, AsyncDocumentStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = AsyncDocumentStore::open(StoreConfig::new(dir.path()))
        .await
        .unwrap();
    (dir, store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_scenario_matches_blocking_store() {
    let (_dir, store) = file_store().await;

    store.insert_if_absent(doc("a1")).await.unwrap();
    assert_eq!(store.find_by_type("DOC").await.unwrap().len(), 1);

    store.soft_delete_by_id("a1").await.unwrap();
    assert!(store.find_by_type("DOC").await.unwrap().is_empty());
    assert!(store.find_by_id("a1").await.unwrap().deleted);

    store.hard_delete_by_id("a1").await.unwrap();
    assert_eq!(
        store.find_by_id("a1").await.unwrap_err().kind(),
        StoreErrorKind::NotFound
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_tap_upserts_from_same_base_let_exactly_one_win() {
    let (_dir, store) = file_store().await;
    let base = store.insert_if_absent(doc("a1")).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let store = store.clone();
            let mut edit = base.clone();
            edit.title = format!("edit {n}");
            tokio::spawn(async move { store.upsert(edit).await })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(err) => {
                assert_eq!(err.kind(), StoreErrorKind::Conflict);
                conflicts += 1;
            }
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);
    let current = store.find_by_id("a1").await.unwrap();
    assert_eq!(current.revision.unwrap().generation(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_on_distinct_ids_all_succeed() {
    let (_dir, store) = file_store().await;

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move { store.insert_if_absent(doc(&format!("d{n}"))).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.count_live_by_type("DOC").await.unwrap(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_all_is_a_barrier() {
    let (_dir, store) = file_store().await;
    for n in 0..4 {
        store.insert_if_absent(doc(&format!("old{n}"))).await.unwrap();
    }

    let mut reads: Vec<_> = (0..4)
        .map(|n| Box::pin(store.find_by_id(format!("old{n}"))))
        .collect();
    let mut write = Box::pin(store.insert_if_absent(doc("queued")));
    let mut early_reads = Vec::new();
    for read in &mut reads {
        early_reads.push(poll_once(read).await);
    }
    let early_write = poll_once(&mut write).await;

    // Every operation above is on the gate before the clear is requested.
    let clear = tokio::spawn({
        let store = store.clone();
        async move { store.clear_all().await }
    });

    for (n, (read, early)) in reads.iter_mut().zip(early_reads).enumerate() {
        let found = match early {
            Some(result) => result,
            None => read.await,
        };
        assert_eq!(found.unwrap().id, format!("old{n}"));
    }
    let written = match early_write {
        Some(result) => result,
        None => write.await,
    };
    assert_eq!(written.unwrap().id, "queued");

    clear.await.unwrap().unwrap();
    assert!(store.all_documents().await.unwrap().is_empty());
    for id in ["old0", "queued"] {
        assert_eq!(
            store.find_by_id(id).await.unwrap_err().kind(),
            StoreErrorKind::NotFound
        );
    }
    assert!(store.find_by_type("DOC").await.unwrap().is_empty());
}

#[tokio::test]
async fn close_then_clear_reopens() {
    let store = AsyncDocumentStore::open(StoreConfig::in_memory())
        .await
        .unwrap();
    store.insert_if_absent(doc("a1")).await.unwrap();

    store.close().await.unwrap();
    assert_eq!(
        store.all_documents().await.unwrap_err().kind(),
        StoreErrorKind::StorageUnavailable
    );

    store.clear_all().await.unwrap();
    assert!(store.all_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn destroy_removes_files_and_closes() {
    let (_dir, store) = file_store().await;
    store.insert_if_absent(doc("a1")).await.unwrap();
    let path = store.path().unwrap();

    store.destroy().await.unwrap();
    assert!(!path.exists());
    assert_eq!(
        store.find_by_type("DOC").await.unwrap_err().kind(),
        StoreErrorKind::StorageUnavailable
    );
}
