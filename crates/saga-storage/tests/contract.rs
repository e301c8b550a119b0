//! Both storage backends must satisfy the same log storage contract.

use saga_storage::{FileStorage, LogStorage, MemoryStorage, StorageError};
use tempfile::TempDir;

fn exercise_contract(storage: &dyn LogStorage) -> anyhow::Result<()> {
    assert!(storage.log_ids()?.is_empty());
    assert!(storage.lookup("saga_1")?.is_empty());
    assert!(matches!(
        storage.last_log("saga_1"),
        Err(StorageError::NotFound { .. })
    ));

    for entry in ["start", "action", "end"] {
        storage.append_log("saga_1", entry)?;
    }
    storage.append_log("saga_2", "other")?;

    assert_eq!(storage.lookup("saga_1")?, vec!["start", "action", "end"]);
    assert_eq!(storage.last_log("saga_1")?, "end");
    assert_eq!(storage.log_ids()?, vec!["saga_1", "saga_2"]);

    storage.cleanup("saga_1")?;

    assert_eq!(storage.log_ids()?, vec!["saga_2"]);
    assert_eq!(storage.lookup("saga_2")?, vec!["other"]);

    storage.close()?;
    assert!(matches!(
        storage.append_log("saga_2", "late"),
        Err(StorageError::Closed)
    ));
    Ok(())
}

#[test]
fn memory_storage_satisfies_contract() -> anyhow::Result<()> {
    exercise_contract(&MemoryStorage::new())
}

#[test]
fn file_storage_satisfies_contract() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    exercise_contract(&FileStorage::open(dir.path())?)
}

#[test]
fn shared_storage_is_usable_through_arc() -> anyhow::Result<()> {
    let storage = std::sync::Arc::new(MemoryStorage::new());
    let shared: Box<dyn LogStorage> = Box::new(std::sync::Arc::clone(&storage));

    shared.append_log("saga_1", "start")?;

    assert_eq!(storage.lookup("saga_1")?, vec!["start"]);
    Ok(())
}
