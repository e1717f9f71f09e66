//! Sink Module Tests
//!
//! ## Test Scopes
//! - **Naming**: Folder, zero-padded random prefix, UTC timestamp, `.json`.
//! - **Stores**: Write-once semantics for the memory and filesystem stores.
//! - **Writer**: Collisions are disambiguated rather than overwritten or fatal.

#[cfg(test)]
mod tests {
    use crate::sink::fs::FsObjectStore;
    use crate::sink::memory::MemoryObjectStore;
    use crate::sink::writer::{object_name, SinkWriter};
    use crate::sink::{validate_key, ObjectStore, PutOutcome, SinkError};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Reports the first `collisions` puts as taken, then delegates.
    struct CollidingStore {
        inner: MemoryObjectStore,
        collisions: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for CollidingStore {
        async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<PutOutcome, SinkError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.collisions {
                return Ok(PutOutcome::AlreadyExists);
            }
            self.inner.put_new(key, body).await
        }
    }

    // ============================================================
    // NAMING
    // ============================================================

    #[test]
    fn test_object_name_layout() {
        let at = Utc.with_ymd_and_hms(2018, 1, 1, 0, 1, 0).unwrap();

        assert_eq!(
            object_name("sentiment", 7, at),
            "sentiment/007-2018-01-01T00:01:00.000000Z.json"
        );
        assert_eq!(
            object_name("/entities/", 1234, at),
            "entities/234-2018-01-01T00:01:00.000000Z.json"
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("sentiment/001-x.json").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs.json").is_err());
        assert!(validate_key("a/../b.json").is_err());
        assert!(validate_key("a//b.json").is_err());
    }

    // ============================================================
    // STORES
    // ============================================================

    #[tokio::test]
    async fn test_memory_store_never_overwrites() {
        let store = MemoryObjectStore::new();

        assert_eq!(store.put_new("f/a.json", b"one".to_vec()).await.unwrap(), PutOutcome::Created);
        assert_eq!(
            store.put_new("f/a.json", b"two".to_vec()).await.unwrap(),
            PutOutcome::AlreadyExists
        );
        assert_eq!(store.get("f/a.json").unwrap(), b"one");
        assert_eq!(store.keys_in("f"), vec!["f/a.json".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_store_writes_once_and_leaves_no_temp_files() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        // ACT
        let first = store.put_new("sentiment/a.json", b"{\"x\":1}\n".to_vec()).await.unwrap();
        let second = store.put_new("sentiment/a.json", b"other".to_vec()).await.unwrap();

        // ASSERT
        assert_eq!(first, PutOutcome::Created);
        assert_eq!(second, PutOutcome::AlreadyExists);

        let content = std::fs::read(dir.path().join("sentiment/a.json")).unwrap();
        assert_eq!(content, b"{\"x\":1}\n");

        let names: Vec<String> = std::fs::read_dir(dir.path().join("sentiment"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_store_cancelled_puts_leave_no_temp_files() {
        // ARRANGE
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let body = vec![b'x'; 4 * 1024 * 1024];

        // ACT: give up on every put almost immediately
        for i in 0..8 {
            let key = format!("sentiment/{}.json", i);
            let _ = tokio::time::timeout(
                Duration::from_micros(10),
                store.put_new(&key, body.clone()),
            )
            .await;
        }

        // ASSERT: once the abandoned writes settle, only complete objects remain
        let folder = dir.path().join("sentiment");
        let mut hidden = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            hidden = match std::fs::read_dir(&folder) {
                Ok(entries) => entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .filter(|name| name.starts_with('.'))
                    .collect(),
                Err(_) => Vec::new(),
            };
            if hidden.is_empty() {
                break;
            }
        }
        assert!(hidden.is_empty(), "temp files left behind: {:?}", hidden);

        if let Ok(entries) = std::fs::read_dir(&folder) {
            for entry in entries {
                let len = entry.unwrap().metadata().unwrap().len();
                assert_eq!(len, body.len() as u64);
            }
        }
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let result = store.put_new("../outside.json", b"x".to_vec()).await;
        assert!(matches!(result, Err(SinkError::InvalidKey(_))));
    }

    // ============================================================
    // WRITER
    // ============================================================

    #[tokio::test]
    async fn test_writer_names_objects_under_folder() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = SinkWriter::new(store.clone());

        let name = writer.write("sentiment", b"{}\n".to_vec()).await.unwrap();

        assert!(name.starts_with("sentiment/"));
        assert!(name.ends_with(".json"));
        let prefix = &name["sentiment/".len().."sentiment/".len() + 4];
        assert!(prefix[..3].chars().all(|c| c.is_ascii_digit()), "prefix {}", prefix);
        assert_eq!(&prefix[3..], "-");
        assert_eq!(store.get(&name).unwrap(), b"{}\n");
    }

    #[tokio::test]
    async fn test_writer_disambiguates_collisions() {
        let store = Arc::new(CollidingStore {
            inner: MemoryObjectStore::new(),
            collisions: 1,
            calls: AtomicUsize::new(0),
        });
        let writer = SinkWriter::new(store.clone());

        let name = writer.write("entities", b"row\n".to_vec()).await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.len(), 1);
        // base name plus an 8-character suffix
        let stem = name.strip_suffix(".json").unwrap();
        assert_eq!(stem.rsplit('-').next().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_writer_reports_persistent_collisions() {
        let store = Arc::new(CollidingStore {
            inner: MemoryObjectStore::new(),
            collisions: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let writer = SinkWriter::new(store);

        let result = writer.write("entities", b"row\n".to_vec()).await;
        assert!(matches!(result, Err(SinkError::Collision { .. })));
    }

    #[tokio::test]
    async fn test_identical_buffers_become_distinct_objects() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = SinkWriter::new(store.clone());

        let a = writer.write("sentiment", b"same\n".to_vec()).await.unwrap();
        let b = writer.write("sentiment", b"same\n".to_vec()).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.keys_in("sentiment").len(), 2);
    }
}
