use std::collections::BTreeSet;
use std::path::Path;

use log::{debug, warn};
use serde_json::Value;
use tokio::fs;

use crate::error::SyncError;

/// Filenames this tool fetched and therefore owns.
pub type ManagedState = BTreeSet<String>;

/// Load the managed set, recovering from a missing or corrupt file with an empty set.
pub async fn load(path: &Path) -> ManagedState {
    match try_load(path).await {
        Ok(state) => state,
        Err(err) => {
            warn!("state: {err}; starting from an empty managed set");
            ManagedState::new()
        }
    }
}

pub async fn try_load(path: &Path) -> Result<ManagedState, SyncError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("state: no managed state at {}", path.display());
            return Ok(ManagedState::new());
        }
        Err(err) => {
            return Err(SyncError::StateLoad(format!(
                "unable to read {}: {err}",
                path.display()
            )));
        }
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
        SyncError::StateLoad(format!("{} is not valid JSON: {e}", path.display()))
    })?;
    let Value::Array(items) = value else {
        return Err(SyncError::StateLoad(format!(
            "{} must hold a JSON array",
            path.display()
        )));
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name),
            _ => None,
        })
        .collect())
}

/// Overwrite the state file with `state`, creating parent directories as needed.
pub async fn save(path: &Path, state: &ManagedState) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::StatePersist(format!("unable to create state dir: {e}")))?;
    }
    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|e| SyncError::StatePersist(format!("failed to serialize state: {e}")))?;
    fs::write(path, &bytes)
        .await
        .map_err(|e| SyncError::StatePersist(format!("unable to write {}: {e}", path.display())))?;
    debug!("state: saved {} managed files", state.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_regardless_of_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("managed-mods.json");
        let mut state = ManagedState::new();
        for name in ["z.jar", "a.jar", "m.jar"] {
            state.insert(name.to_owned());
        }

        save(&path, &state).await.unwrap();
        let loaded = load(&path).await;

        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.json")).await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_recovers_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("managed-mods.json");
        std::fs::write(&path, b"{ nope").unwrap();
        assert!(matches!(try_load(&path).await, Err(SyncError::StateLoad(_))));
        assert!(load(&path).await.is_empty());

        std::fs::write(&path, br#"{"a.jar": true}"#).unwrap();
        assert!(load(&path).await.is_empty());
    }

    #[tokio::test]
    async fn ignores_non_string_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("managed-mods.json");
        std::fs::write(&path, br#"["a.jar", 3, null, "b.jar", "a.jar"]"#).unwrap();
        let loaded = load(&path).await;
        assert_eq!(
            loaded.into_iter().collect::<Vec<_>>(),
            vec!["a.jar".to_owned(), "b.jar".to_owned()]
        );
    }

    #[tokio::test]
    async fn save_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("managed-mods.json");
        save(&path, &ManagedState::from(["old.jar".to_owned()]))
            .await
            .unwrap();
        save(&path, &ManagedState::from(["new.jar".to_owned()]))
            .await
            .unwrap();
        assert_eq!(load(&path).await, ManagedState::from(["new.jar".to_owned()]));
    }
}
