// Tests for SyncEngine::pull

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use workspace_sync::storage::MemoryStore;
use workspace_sync::{SyncEngine, SyncPhase};

use crate::common::{key, options, read, seed, write, FlakyStore};

#[tokio::test]
async fn test_pull_downloads_remote_files() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha"), ("docs/deep/b.md", b"# beta")]).await;

    let engine = SyncEngine::new(options(&dir, store)).unwrap();
    let result = engine.pull().await.unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.downloaded_files, Some(2));
    assert_eq!(result.uploaded_files, None);
    assert_eq!(result.deleted_files, None);
    assert_eq!(result.bytes_transferred, 11);
    assert_eq!(read(dir.path(), "a.txt"), b"alpha");
    assert_eq!(read(dir.path(), "docs/deep/b.md"), b"# beta");
}

#[tokio::test]
async fn test_pull_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha"), ("b.txt", b"beta")]).await;

    let engine = SyncEngine::new(options(&dir, store)).unwrap();
    assert_eq!(engine.pull().await.unwrap().downloaded_files, Some(2));

    let second = engine.pull().await.unwrap();
    assert!(second.success);
    assert_eq!(second.downloaded_files, Some(0));
    assert_eq!(second.bytes_transferred, 0);
}

#[tokio::test]
async fn test_pull_overwrites_changed_local_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("notes.md", b"remote version")]).await;
    write(dir.path(), "notes.md", b"local edit");

    let result = SyncEngine::new(options(&dir, store)).unwrap().pull().await.unwrap();

    assert_eq!(result.downloaded_files, Some(1));
    assert_eq!(read(dir.path(), "notes.md"), b"remote version");
}

#[tokio::test]
async fn test_pull_skips_ignored_remote_files() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(
        &store,
        &[
            ("main.py", b"print(1)"),
            ("debug.log", b"noise"),
            ("node_modules/pkg/index.js", b"x"),
        ],
    )
    .await;

    let result = SyncEngine::new(options(&dir, store)).unwrap().pull().await.unwrap();

    assert_eq!(result.downloaded_files, Some(1));
    assert!(dir.path().join("main.py").exists());
    assert!(!dir.path().join("debug.log").exists());
    assert!(!dir.path().join("node_modules").exists());
}

#[tokio::test]
async fn test_pull_partial_failure() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryStore::new());
    seed(
        &memory,
        &[("1.txt", b"1"), ("2.txt", b"2"), ("3.txt", b"3"), ("4.txt", b"4"), ("5.txt", b"5")],
    )
    .await;
    let store = Arc::new(FlakyStore::new(memory).failing("3.txt"));

    let result = SyncEngine::new(options(&dir, store)).unwrap().pull().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.downloaded_files, Some(4));
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("3.txt: "), "{}", result.errors[0]);
    assert!(result.errors[0].contains("injected failure"));
    assert!(!dir.path().join("3.txt").exists());
    assert!(dir.path().join("5.txt").exists());
}

#[tokio::test]
async fn test_pull_keeps_local_only_files_by_default() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha")]).await;
    write(dir.path(), "scratch.txt", b"mine");

    let result = SyncEngine::new(options(&dir, store)).unwrap().pull().await.unwrap();

    assert!(result.success);
    assert_eq!(result.deleted_files, None);
    assert!(dir.path().join("scratch.txt").exists());
}

#[tokio::test]
async fn test_pull_remote_authoritative_deletes_local_extras() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha")]).await;
    write(dir.path(), "stale/old.txt", b"old");
    write(dir.path(), "build.tmp", b"ignored");

    let opts = options(&dir, store).with_delete_local_extras(true);
    let result = SyncEngine::new(opts).unwrap().pull().await.unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.downloaded_files, Some(1));
    assert_eq!(result.deleted_files, Some(1));
    assert!(!dir.path().join("stale/old.txt").exists());
    assert!(dir.path().join("build.tmp").exists());
}

#[tokio::test]
async fn test_pull_reports_progress() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"a"), ("b.txt", b"b"), ("c.txt", b"c")]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = SyncEngine::with_progress(options(&dir, store), tx).unwrap();
    engine.pull().await.unwrap();
    drop(engine);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.phase == SyncPhase::Download && e.total == 3));
    let last = events.last().unwrap();
    assert_eq!(last.current, 3);
    assert_eq!(last.percentage, 100.0);
}

#[tokio::test]
async fn test_pull_listing_failure_is_recorded() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
    store.fail_listing();

    let result = SyncEngine::new(options(&dir, store)).unwrap().pull().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.downloaded_files, Some(0));
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("AccessDenied"));
}

#[tokio::test]
async fn test_pull_rejects_escaping_remote_keys() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    std::fs::create_dir(&workspace).unwrap();

    let store = Arc::new(MemoryStore::new());
    store.put(&key("../escape.txt"), b"x".to_vec(), "text/plain").await;
    store.put(&key("ok.txt"), b"ok".to_vec(), "text/plain").await;

    let opts = workspace_sync::SyncOptions::new(crate::common::BUCKET, crate::common::PREFIX, &workspace)
        .with_storage(store);
    let result = SyncEngine::new(opts).unwrap().pull().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.downloaded_files, Some(1));
    assert_eq!(result.errors.len(), 1);
    assert!(!dir.path().join("escape.txt").exists());
    assert!(workspace.join("ok.txt").exists());
}

#[tokio::test]
async fn test_pull_after_cancel_admits_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"a"), ("b.txt", b"b")]).await;

    let engine = SyncEngine::new(options(&dir, store)).unwrap();
    engine.cancel();
    let result = engine.pull().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.downloaded_files, Some(0));
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.contains("cancelled")));
}

#[tokio::test]
async fn test_pull_cancel_mid_flight_finishes_admitted_downloads() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryStore::new());
    seed(
        &memory,
        &[("1.txt", b"1"), ("2.txt", b"2"), ("3.txt", b"3"), ("4.txt", b"4"), ("5.txt", b"5"), ("6.txt", b"6")],
    )
    .await;
    let store = Arc::new(FlakyStore::new(memory).with_delay(Duration::from_millis(200)));

    let opts = options(&dir, store.clone()).with_download_concurrency(2);
    let engine = SyncEngine::new(opts).unwrap();

    let (result, ()) = tokio::join!(engine.pull(), async {
        while store.in_flight() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        engine.cancel();
    });
    let result = result.unwrap();

    assert!(!result.success);
    assert_eq!(result.downloaded_files, Some(2));
    assert_eq!(result.errors.len(), 4);
    assert!(result.errors.iter().all(|e| e.contains("cancelled")), "{:?}", result.errors);

    let on_disk = (1..=6).filter(|n| dir.path().join(format!("{}.txt", n)).exists()).count();
    assert_eq!(on_disk, 2);
}

#[tokio::test]
async fn test_pull_respects_download_concurrency() {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryStore::new());
    let names: Vec<String> = (0..20).map(|n| format!("file-{:02}.txt", n)).collect();
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), b"data".as_slice())).collect();
    seed(&memory, &files).await;
    let store = Arc::new(FlakyStore::new(memory).with_delay(Duration::from_millis(10)));

    let opts = options(&dir, store.clone()).with_download_concurrency(4);
    let result = SyncEngine::new(opts).unwrap().pull().await.unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.downloaded_files, Some(20));
    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak {}", peak);
    assert!(peak >= 2, "peak {}", peak);
}

#[tokio::test]
async fn test_pull_cancel_skips_local_cleanup() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha")]).await;
    write(dir.path(), "local-only.txt", b"keep me");

    let opts = options(&dir, store).with_delete_local_extras(true);
    let engine = SyncEngine::new(opts).unwrap();
    engine.cancel();
    let result = engine.pull().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.deleted_files, Some(0));
    assert!(dir.path().join("local-only.txt").exists());
    assert!(result
        .errors
        .iter()
        .any(|e| e == "local-only.txt: operation cancelled"), "{:?}", result.errors);
}

#[cfg(unix)]
#[tokio::test]
async fn test_pull_leaves_unreadable_directory_alone() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[("a.txt", b"alpha"), ("locked/new.txt", b"remote")]).await;
    write(dir.path(), "locked/mine.txt", b"local");
    let locked = dir.path().join("locked");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can still list the directory
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let opts = options(&dir, store).with_delete_local_extras(true);
    let result = SyncEngine::new(opts).unwrap().pull().await.unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(result.downloaded_files, Some(1));
    assert_eq!(result.deleted_files, Some(0));
    assert!(!locked.join("new.txt").exists());
    assert_eq!(read(dir.path(), "locked/mine.txt"), b"local");
}
