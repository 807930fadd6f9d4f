use crate::error::PersistenceError;
use crate::measurement::Measurement;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Runtime")]
    pub runtime: f64,
}

impl PersistedState {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            runtime: 0.0,
        }
    }
}

impl From<&Measurement> for PersistedState {
    fn from(m: &Measurement) -> Self {
        Self {
            timestamp: m.timestamp,
            runtime: m.runtime,
        }
    }
}

/// Handle to the data file. Clones share one write lock, so saves never
/// interleave. Every save reserves a ticket when it is called; a write whose
/// ticket is older than the one already on disk is dropped.
#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
    next_ticket: Arc<AtomicU64>,
    last_written: Arc<Mutex<Option<u64>>>,
}

impl DataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_ticket: Arc::new(AtomicU64::new(0)),
            last_written: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the data file, creating it with zero runtime first if it does
    /// not exist yet.
    pub fn load_or_create(&self) -> Result<PersistedState, PersistenceError> {
        if !self.path.exists() {
            info!("data file {} not found, creating it", self.path.display());
            self.write(self.ticket(), &PersistedState::new(Utc::now()))?;
        }

        let data =
            std::fs::read_to_string(&self.path).map_err(|source| io_error(&self.path, source))?;
        serde_yaml::from_str(&data).map_err(|source| PersistenceError::Yaml {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Writes timestamp and runtime of `measurement` to the data file.
    pub async fn save(&self, measurement: &Measurement) -> Result<(), PersistenceError> {
        debug!("save measurements to file");
        let ticket = self.ticket();
        let data_file = self.clone();
        let state = PersistedState::from(measurement);
        tokio::task::spawn_blocking(move || data_file.write(ticket, &state))
            .await
            .map_err(|e| io_error(&self.path, std::io::Error::other(e)))?
    }

    /// Spawns the periodic backup of `snapshot`.
    pub fn spawn_backup(&self, snapshot: Snapshot, every: Duration) -> JoinHandle<()> {
        let data_file = self.clone();
        tokio::spawn(async move {
            info!(
                "Starting backup of {} every {:?}",
                data_file.path.display(),
                every
            );
            let mut backup_interval = interval(every);
            backup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately, there is nothing new to save yet
            backup_interval.tick().await;

            loop {
                backup_interval.tick().await;
                if let Err(e) = data_file.save(&snapshot.read()).await {
                    error!("backup measurements: {e}");
                }
            }
        })
    }

    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Replaces the file via a temporary sibling while holding the write
    /// lock. A blocking write whose caller was aborted still runs to the end,
    /// and if it only gets the lock after a later save it is skipped.
    fn write(&self, ticket: u64, state: &PersistedState) -> Result<(), PersistenceError> {
        let mut last_written = self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if matches!(*last_written, Some(last) if ticket < last) {
            debug!("skip saving state from {}, file is newer", state.timestamp);
            return Ok(());
        }

        let data = serde_yaml::to_string(state).map_err(|source| PersistenceError::Yaml {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        write_private(&tmp, data.as_bytes()).map_err(|source| io_error(&tmp, source))?;
        std::fs::rename(&tmp, &self.path).map_err(|source| io_error(&self.path, source))?;

        *last_written = Some(ticket);
        Ok(())
    }
}

/// Writes `data` to a file readable by the owner only.
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::State;
    use chrono::TimeZone;

    fn measurement(hour: u32, runtime: f64) -> Measurement {
        Measurement {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            power: 11400.0,
            energy: 0.0,
            state: State::On,
            runtime,
        }
    }

    #[test]
    fn test_missing_file_is_created_with_zero_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));
        let before = Utc::now();

        let state = data_file.load_or_create().unwrap();

        assert!(data_file.path().exists());
        assert_eq!(state.runtime, 0.0);
        assert!(state.timestamp >= before - chrono::Duration::seconds(1));
        assert_eq!(data_file.load_or_create().unwrap(), state);
    }

    #[test]
    fn test_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallbox.yaml");
        std::fs::write(&path, "Timestamp: 2024-03-01T12:00:00Z\nRuntime: 123.25\n").unwrap();

        let state = DataFile::new(&path).load_or_create().unwrap();

        assert_eq!(state.runtime, 123.25);
        assert_eq!(
            state.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallbox.yaml");
        std::fs::write(&path, "Runtime: [not, a, number]\n").unwrap();

        let result = DataFile::new(&path).load_or_create();
        assert!(matches!(result, Err(PersistenceError::Yaml { .. })));
    }

    #[test]
    fn test_unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("missing").join("wallbox.yaml"));

        let result = data_file.load_or_create();
        assert!(matches!(result, Err(PersistenceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));
        let measurement = measurement(13, 42.5);

        tokio_test::assert_ok!(data_file.save(&measurement).await);

        let stored = std::fs::read_to_string(data_file.path()).unwrap();
        assert!(stored.contains("Runtime: 42.5"));
        assert!(!stored.contains("Power"));
        assert_eq!(
            data_file.load_or_create().unwrap(),
            PersistedState::from(&measurement)
        );
    }

    #[tokio::test]
    async fn test_later_saves_overwrite_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));

        tokio_test::assert_ok!(data_file.save(&measurement(13, 1.0)).await);
        tokio_test::assert_ok!(data_file.clone().save(&measurement(14, 2.0)).await);

        assert_eq!(data_file.load_or_create().unwrap().runtime, 2.0);
    }

    #[test]
    fn test_straggling_write_does_not_replace_newer_state() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));
        let backup = data_file.clone();

        // A backup reserved its slot first but only gets to write after the
        // final save has finished
        let backup_ticket = backup.ticket();
        let final_ticket = data_file.ticket();
        let final_state = PersistedState::from(&measurement(14, 2.0));
        data_file.write(final_ticket, &final_state).unwrap();
        backup
            .write(backup_ticket, &PersistedState::from(&measurement(13, 1.0)))
            .unwrap();

        assert_eq!(data_file.load_or_create().unwrap(), final_state);
    }

    #[test]
    fn test_concurrent_writers_keep_file_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let data_file = data_file.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let ticket = data_file.ticket();
                        let state = PersistedState::from(&measurement(i, f64::from(i)));
                        data_file.write(ticket, &state).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let state = data_file.load_or_create().unwrap();
        assert_eq!(
            state.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, state.runtime as u32, 0, 0)
                .unwrap()
        );
        let mut tmp = data_file.path().as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_data_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let data_file = DataFile::new(dir.path().join("wallbox.yaml"));

        data_file.load_or_create().unwrap();
        let mode = std::fs::metadata(data_file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        data_file.save(&measurement(13, 1.0)).await.unwrap();
        let mode = std::fs::metadata(data_file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
