//! Persistence of the rolling conversation history.
//!
//! The state lives in a single JSON file. Writes go to a temporary sibling
//! and are renamed into place under an exclusive lock, so a reader never
//! sees a half-written file. Two overlapping invocations can still lose one
//! of their updates (last writer wins).

use crate::conversation::ConversationState;
use crate::error::{HowtoError, Result};
use crate::providers::{SystemTimeProvider, TimeProvider};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Storage for [`ConversationState`].
pub trait StateStore: Send + Sync {
    /// Reads the persisted state, creating and persisting an empty one if absent.
    fn load(&self) -> Result<ConversationState>;

    /// Overwrites the persisted state.
    fn save(&self, state: &ConversationState) -> Result<()>;

    /// Discards whatever is stored and writes a fresh empty state.
    fn reset(&self) -> Result<ConversationState>;
}

pub struct FileStateStore {
    path: PathBuf,
    time_provider: Box<dyn TimeProvider>,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self::with_time_provider(path, Box::new(SystemTimeProvider))
    }

    pub fn with_time_provider(path: PathBuf, time_provider: Box<dyn TimeProvider>) -> Self {
        Self { path, time_provider }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HowtoError::storage(&format!("Failed to create state directory {}", parent.display()), e)
            })?;
        }
        Ok(())
    }

    fn read_existing(&self) -> Result<Option<ConversationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            HowtoError::storage(&format!("Failed to read state file {}", self.path.display()), e)
        })?;
        let state = serde_json::from_str(&content).map_err(|e| {
            HowtoError::storage(&format!("Failed to parse state file {}", self.path.display()), e)
        })?;
        Ok(Some(state))
    }

    fn write_atomic(&self, state: &ConversationState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| HowtoError::storage("Failed to serialize state", e))?;

        let tmp_path = self.temp_path();
        let mut tmp_file = File::create(&tmp_path)
            .map_err(|e| HowtoError::storage("Failed to create temporary state file", e))?;
        tmp_file
            .write_all(content.as_bytes())
            .and_then(|_| tmp_file.sync_all())
            .map_err(|e| HowtoError::storage("Failed to write state file", e))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| HowtoError::storage("Failed to replace state file", e))?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    fn lock(&self) -> Result<StateLock> {
        StateLock::acquire(&self.path.with_extension("lock"))
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<ConversationState> {
        self.ensure_dir()?;
        if let Some(state) = self.read_existing()? {
            debug!("Loaded {} history messages from {}", state.history.len(), self.path.display());
            return Ok(state);
        }

        let _lock = self.lock()?;
        // Another invocation may have initialized it while we waited.
        if let Some(state) = self.read_existing()? {
            return Ok(state);
        }
        let state = ConversationState::empty(self.time_provider.now());
        self.write_atomic(&state)?;
        info!("Initialized conversation state at {}", self.path.display());
        Ok(state)
    }

    fn save(&self, state: &ConversationState) -> Result<()> {
        if state.has_system_message() {
            return Err(HowtoError::Storage(
                "refusing to persist a system message as conversation history".to_string(),
            ));
        }
        self.ensure_dir()?;
        let _lock = self.lock()?;

        let mut state = state.clone();
        match self.read_existing() {
            Ok(Some(previous)) if previous.last_update > state.last_update => {
                warn!("Clock moved backwards, keeping previous last update timestamp");
                state.last_update = previous.last_update;
            }
            Ok(_) => {}
            Err(e) => debug!("Overwriting unreadable state: {}", e),
        }

        self.write_atomic(&state)?;
        debug!("Saved {} history messages to {}", state.history.len(), self.path.display());
        Ok(())
    }

    fn reset(&self) -> Result<ConversationState> {
        self.ensure_dir()?;
        let _lock = self.lock()?;
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| HowtoError::storage("Failed to delete state file", e))?;
        }
        let state = ConversationState::empty(self.time_provider.now());
        self.write_atomic(&state)?;
        info!("Reset conversation state at {}", self.path.display());
        Ok(state)
    }
}

/// Exclusive advisory lock released on drop.
struct StateLock {
    file: File,
}

impl StateLock {
    fn acquire(lock_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| HowtoError::storage("Failed to open state lock file", e))?;

        FileExt::lock_exclusive(&file)
            .map_err(|e| HowtoError::storage("Failed to lock state file", e))?;
        Ok(Self { file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::providers::FixedTimeProvider;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn store_at(dir: &TempDir, now: chrono::DateTime<Utc>) -> FileStateStore {
        FileStateStore::with_time_provider(
            dir.path().join("howto").join("state.json"),
            Box::new(FixedTimeProvider(now)),
        )
    }

    #[test]
    fn test_load_initializes_missing_state() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let store = store_at(&dir, now);

        let state = store.load().unwrap();
        assert!(state.history.is_empty());
        assert_eq!(state.last_update, now);
        assert!(store.path().exists(), "initial state should be persisted");
    }

    #[test]
    fn test_load_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, Utc::now());

        let first = store.load().unwrap();
        let second = store.load().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::milliseconds(123);
        let store = store_at(&dir, now);
        store.load().unwrap();

        let mut state = ConversationState::empty(now);
        state.history = vec![Message::user("bash command to list files"), Message::assistant("ls")];
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.history, state.history);
        assert_eq!(loaded.last_update, now);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, Utc::now());
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "not json at all").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, HowtoError::Storage(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_reset_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let store = store_at(&dir, now);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{\"version\": 3").unwrap();

        let state = store.reset().unwrap();
        assert!(state.history.is_empty());
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_save_rejects_system_messages() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, Utc::now());
        let mut state = ConversationState::empty(Utc::now());
        state.history.push(Message::system("be terse"));

        assert!(matches!(store.save(&state), Err(HowtoError::Storage(_))));
    }

    #[test]
    fn test_save_never_moves_last_update_backwards() {
        let dir = TempDir::new().unwrap();
        let later = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let earlier = later - Duration::minutes(5);
        let store = store_at(&dir, later);

        store.save(&ConversationState::empty(later)).unwrap();
        store.save(&ConversationState::empty(earlier)).unwrap();

        assert_eq!(store.load().unwrap().last_update, later);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, Utc::now());
        store.save(&ConversationState::empty(Utc::now())).unwrap();
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_lock_is_released_after_save() {
        let dir = TempDir::new().unwrap();
        let store = store_at(&dir, Utc::now());
        store.save(&ConversationState::empty(Utc::now())).unwrap();

        let lock_file = File::open(store.path.with_extension("lock")).unwrap();
        FileExt::try_lock_exclusive(&lock_file).unwrap();
        FileExt::unlock(&lock_file).unwrap();
    }
}
