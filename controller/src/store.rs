use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use growbox_common::{Settings, SettingsUpdate};
use tokio::sync::Mutex;

/// Flat-file settings persistence. Files are merged against defaults on
/// load, so callers always see a full settings object even when the stored
/// copy predates a field.
#[derive(Clone)]
pub struct SettingsStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("GROWBOX_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.growbox"));
        Self::at(data_dir.join("settings.json"))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> anyhow::Result<Settings> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(raw) => {
                let update = serde_json::from_slice::<SettingsUpdate>(&raw)?;
                Ok(Settings::merged(update)?)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use growbox_common::ScheduleTime;

    use super::*;

    fn scratch_store(name: &str) -> SettingsStore {
        let path = std::env::temp_dir()
            .join("growbox-store-tests")
            .join(format!("{}-{name}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        SettingsStore::at(path)
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let store = scratch_store("missing");
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = scratch_store("round-trip");
        let settings = Settings::merged(SettingsUpdate {
            start_time: Some("06:15".to_string()),
            interval_output2_on: Some(5),
            night_cycle_times: Some(vec!["22:30".to_string()]),
            control_enabled: Some(false),
            ..SettingsUpdate::default()
        })
        .unwrap();

        store.save(&settings).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, settings);
        assert_eq!(loaded.night_cycle_times, vec![ScheduleTime::hm(22, 30)]);
    }

    #[tokio::test]
    async fn partial_file_backfills_defaults() {
        let store = scratch_store("partial");
        if let Some(parent) = store.path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(store.path.as_ref(), br#"{"end_time": "20:00"}"#)
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.end_time, ScheduleTime::hm(20, 0));
        assert_eq!(loaded.start_time, Settings::default().start_time);
        assert!(loaded.control_enabled);
    }
}
