//! Check-in reminders.
//!
//! The only persisted state in the crate: a single key holding the due time
//! of the next reminder as stringified epoch milliseconds. Scheduling
//! overwrites it; clearing removes it. A reminder is due strictly *after*
//! that instant.
//!
//! Push registration is optional and best-effort. A registrar that fails
//! is logged and otherwise ignored; the stored timestamp stands.

use crate::error::LensError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Storage key for the next reminder's due time.
pub const REMINDER_KEY: &str = "bodyfatai_next_reminder";

const STORE_DIR: &str = "bodyfat-lens";
const STORE_FILE: &str = "store.json";

/// Minimal string key-value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LensError>;
    fn set(&self, key: &str, value: &str) -> Result<(), LensError>;
    fn remove(&self, key: &str) -> Result<(), LensError>;
}

/// In-memory store, for tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LensError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LensError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LensError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// JSON object on disk. Writes replace the file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data dir>/bodyfat-lens/store.json`, or the working directory when
    /// the platform has no data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(STORE_DIR)
            .join(STORE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, detail: impl ToString) -> LensError {
        LensError::Storage {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, LensError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.storage_error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), LensError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.storage_error(e))?;

        let json = serde_json::to_vec_pretty(entries).map_err(|e| self.storage_error(e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.storage_error(e))?;
        tmp.write_all(&json).map_err(|e| self.storage_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.storage_error(e.error))?;
        debug!("Wrote {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn update(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), LensError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.load()?;
        f(&mut entries);
        self.save(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, LensError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LensError> {
        self.update(|m| {
            m.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), LensError> {
        self.update(|m| {
            m.remove(key);
        })
    }
}

/// Source of "now", as milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Registers a reminder with a push service. Best-effort.
pub trait PushRegistrar: Send + Sync {
    fn register(&self, due_at_ms: u64) -> Result<(), String>;
}

pub struct ReminderScheduler<S, C = SystemClock> {
    store: S,
    clock: C,
    push: Option<Box<dyn PushRegistrar>>,
}

impl<S: KeyValueStore> ReminderScheduler<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: KeyValueStore, C: Clock> ReminderScheduler<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            push: None,
        }
    }

    pub fn with_push(mut self, registrar: Box<dyn PushRegistrar>) -> Self {
        self.push = Some(registrar);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stored due time, if any. An unparseable value counts as absent.
    pub fn due_at(&self) -> Result<Option<u64>, LensError> {
        let Some(raw) = self.store.get(REMINDER_KEY)? else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) => Ok(Some(ms)),
            Err(_) => {
                warn!("Ignoring malformed reminder timestamp {:?}", raw);
                Ok(None)
            }
        }
    }

    /// `true` once the current time is strictly past the stored due time.
    pub fn is_due(&self) -> Result<bool, LensError> {
        Ok(self
            .due_at()?
            .is_some_and(|due| self.clock.now_ms() > due))
    }

    /// Schedule the next reminder `interval` from now, replacing any other.
    pub fn schedule_in(&self, interval: Duration) -> Result<u64, LensError> {
        let due = self
            .clock
            .now_ms()
            .saturating_add(interval.as_millis() as u64);
        self.store.set(REMINDER_KEY, &due.to_string())?;
        info!("Next check-in reminder due at {} ms", due);

        if let Some(push) = &self.push {
            if let Err(e) = push.register(due) {
                warn!("Push registration failed, continuing without push: {}", e);
            }
        }
        Ok(due)
    }

    pub fn clear(&self) -> Result<(), LensError> {
        self.store.remove(REMINDER_KEY)?;
        debug!("Reminder cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    #[derive(Clone, Default)]
    struct FixedClock(Arc<AtomicU64>);

    impl FixedClock {
        fn at(ms: u64) -> Self {
            Self(Arc::new(AtomicU64::new(ms)))
        }
        fn set(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Refusing;

    impl PushRegistrar for Refusing {
        fn register(&self, _due_at_ms: u64) -> Result<(), String> {
            Err("permission denied".into())
        }
    }

    #[test]
    fn absent_key_is_not_due() {
        let s = ReminderScheduler::with_clock(MemoryStore::new(), FixedClock::at(1_000));
        assert!(!s.is_due().unwrap());
        assert_eq!(s.due_at().unwrap(), None);
    }

    #[test]
    fn due_fourteen_days_later() {
        let t = 1_700_000_000_000;
        let clock = FixedClock::at(t);
        let s = ReminderScheduler::with_clock(MemoryStore::new(), clock.clone());
        let due = s.schedule_in(Duration::from_secs(14 * 24 * 60 * 60)).unwrap();
        assert_eq!(due, t + 14 * DAY_MS);
        assert_eq!(s.store().get(REMINDER_KEY).unwrap(), Some(due.to_string()));

        clock.set(t + 14 * DAY_MS - 1);
        assert!(!s.is_due().unwrap());
        clock.set(t + 14 * DAY_MS);
        assert!(!s.is_due().unwrap(), "due strictly after the instant");
        clock.set(t + 14 * DAY_MS + 1);
        assert!(s.is_due().unwrap());
    }

    #[test]
    fn scheduling_overwrites_and_clear_removes() {
        let clock = FixedClock::at(0);
        let s = ReminderScheduler::with_clock(MemoryStore::new(), clock.clone());
        s.schedule_in(Duration::from_millis(10)).unwrap();
        clock.set(5);
        s.schedule_in(Duration::from_millis(10)).unwrap();
        assert_eq!(s.due_at().unwrap(), Some(15));
        s.clear().unwrap();
        assert_eq!(s.due_at().unwrap(), None);
        assert!(!s.is_due().unwrap());
    }

    #[test]
    fn push_failure_keeps_timestamp() {
        let s = ReminderScheduler::with_clock(MemoryStore::new(), FixedClock::at(100))
            .with_push(Box::new(Refusing));
        let due = s.schedule_in(Duration::from_millis(50)).unwrap();
        assert_eq!(due, 150);
        assert_eq!(s.due_at().unwrap(), Some(150));
    }

    #[test]
    fn malformed_value_counts_as_absent() {
        let store = MemoryStore::new();
        store.set(REMINDER_KEY, "next tuesday").unwrap();
        let s = ReminderScheduler::with_clock(store, FixedClock::at(u64::MAX));
        assert!(!s.is_due().unwrap());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::new(&path);
        store.set(REMINDER_KEY, "42").unwrap();
        store.set("other", "x").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(REMINDER_KEY).unwrap(), Some("42".into()));
        reopened.remove(REMINDER_KEY).unwrap();
        assert_eq!(FileStore::new(&path).get(REMINDER_KEY).unwrap(), None);
        assert_eq!(FileStore::new(&path).get("other").unwrap(), Some("x".into()));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileStore::new(&path).get(REMINDER_KEY).unwrap_err();
        assert!(matches!(err, LensError::Storage { .. }));
    }

    #[test]
    fn default_path_ends_with_store_file() {
        assert!(FileStore::default_path().ends_with("bodyfat-lens/store.json"));
    }
}
