use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use dualmode_common::PersistedState;
use tokio::sync::Mutex;

/// Restart-surviving state of each virtual thermostat, one JSON file per
/// thermostat under the data directory.
#[derive(Clone)]
pub struct AppStore {
    data_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Arc::new(data_dir.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_env() -> Self {
        let data_dir = std::env::var("DUALMODE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.dualmode"));
        Self::new(data_dir)
    }

    fn state_path(&self, object_id: &str) -> PathBuf {
        self.data_dir.join(format!("{object_id}.json"))
    }

    pub async fn load_state(&self, object_id: &str) -> anyhow::Result<Option<PersistedState>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.state_path(object_id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<PersistedState>(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_state(&self, object_id: &str, state: &PersistedState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(self.data_dir.as_ref()).await?;
        let payload = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(self.state_path(object_id), payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualmode_common::HvacMode;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dualmode-store-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = AppStore::new(scratch_dir("missing"));
        assert_eq!(store.load_state("living_room").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saved_state_loads_back() {
        let dir = scratch_dir("saved");
        let store = AppStore::new(&dir);
        let state = PersistedState {
            hvac_mode: Some(HvacMode::HeatCool),
            temperature: None,
            target_temp_low: Some(19.5),
            target_temp_high: Some(24.0),
        };

        store.save_state("living_room", &state).await.unwrap();
        assert_eq!(store.load_state("living_room").await.unwrap(), Some(state));
        assert_eq!(store.load_state("bedroom").await.unwrap(), None);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = scratch_dir("corrupt");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("living_room.json"), b"{not json")
            .await
            .unwrap();

        let store = AppStore::new(&dir);
        assert!(store.load_state("living_room").await.is_err());

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
