use anyhow::{bail, Result};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::cache::FreshnessCache;
use crate::record::Record;

/// Default time an alarm list read stays valid.
pub const DEFAULT_ALARM_TTL: Duration = Duration::from_secs(60);

/// A plate the operators want to be told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmEntry {
    pub id: i64,
    pub car_name: String,
    pub plate: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Persisted alarm list owned outside this crate.
pub trait AlarmStore: Send + Sync {
    /// Alarms ordered newest first.
    fn list_alarms(&self) -> Result<Vec<AlarmEntry>, StoreError>;

    fn add_alarm(&self, car_name: &str, plate: &str) -> Result<i64, StoreError>;

    /// Returns `true` when an alarm was removed.
    fn delete_alarm(&self, id: i64) -> Result<bool, StoreError>;
}

/// Account lookup used by the login layer.
pub trait UserStore: Send + Sync {
    fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Inserts the user unless the name is already taken.
    fn create_user(&self, username: &str, password_hash: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    next_alarm_id: i64,
    alarms: Vec<AlarmEntry>,
    next_user_id: i64,
    users: HashMap<String, UserRecord>,
}

/// In-process store, used by the binary and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AlarmStore for MemoryStore {
    fn list_alarms(&self) -> Result<Vec<AlarmEntry>, StoreError> {
        let inner = self.lock();
        let mut alarms = inner.alarms.clone();
        alarms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alarms)
    }

    fn add_alarm(&self, car_name: &str, plate: &str) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        inner.next_alarm_id += 1;
        let id = inner.next_alarm_id;
        inner.alarms.push(AlarmEntry {
            id,
            car_name: car_name.to_string(),
            plate: plate.to_string(),
            created_at: Utc::now().naive_utc(),
        });
        Ok(id)
    }

    fn delete_alarm(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.alarms.len();
        inner.alarms.retain(|alarm| alarm.id != id);
        Ok(inner.alarms.len() != before)
    }
}

impl UserStore for MemoryStore {
    fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock().users.get(username).cloned())
    }

    fn create_user(&self, username: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.users.contains_key(username) {
            return Ok(());
        }
        inner.next_user_id += 1;
        let user = UserRecord {
            id: inner.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        inner.users.insert(username.to_string(), user);
        Ok(())
    }
}

/// Alarm list fronted by a TTL cache.
pub struct Alarms {
    store: Arc<dyn AlarmStore>,
    cache: FreshnessCache<Vec<AlarmEntry>>,
    ttl: Duration,
}

impl Alarms {
    pub fn new(store: Arc<dyn AlarmStore>, ttl: Duration) -> Self {
        let source = store.clone();
        Self {
            store,
            cache: FreshnessCache::new(move || Ok(source.list_alarms()?)),
            ttl,
        }
    }

    pub fn list(&self) -> Result<Arc<Vec<AlarmEntry>>> {
        self.cache.get(self.ttl)
    }

    /// Stores a new alarm; the plate is kept upper-cased.
    pub fn add(&self, car_name: &str, plate: &str) -> Result<i64> {
        let car_name = car_name.trim();
        let plate = plate.trim().to_uppercase();
        if car_name.is_empty() {
            bail!(StoreError::Invalid {
                field: "car_name",
                reason: "must not be empty".into(),
            });
        }
        if plate.is_empty() {
            bail!(StoreError::Invalid {
                field: "plate",
                reason: "must not be empty".into(),
            });
        }
        let id = self.store.add_alarm(car_name, &plate)?;
        self.cache.invalidate();
        tracing::info!(alarm_id = id, plate = %plate, "alarm added");
        Ok(id)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = self.store.delete_alarm(id)?;
        self.cache.invalidate();
        if removed {
            tracing::info!(alarm_id = id, "alarm deleted");
        }
        Ok(removed)
    }
}

/// A snapshot record whose plate is on the alarm list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmHit<'a> {
    pub alarm: &'a AlarmEntry,
    pub record: &'a Record,
}

/// Pairs every record with the alarm its plate matches, ignoring case.
pub fn find_hits<'a>(alarms: &'a [AlarmEntry], records: &'a [Record]) -> Vec<AlarmHit<'a>> {
    let by_plate: HashMap<String, &AlarmEntry> = alarms
        .iter()
        .map(|alarm| (alarm.plate.to_uppercase(), alarm))
        .collect();
    records
        .iter()
        .filter_map(|record| {
            by_plate
                .get(&record.plate.to_uppercase())
                .map(|alarm| AlarmHit { alarm, record })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryStore,
        lists: AtomicUsize,
    }

    impl AlarmStore for CountingStore {
        fn list_alarms(&self) -> Result<Vec<AlarmEntry>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_alarms()
        }

        fn add_alarm(&self, car_name: &str, plate: &str) -> Result<i64, StoreError> {
            self.inner.add_alarm(car_name, plate)
        }

        fn delete_alarm(&self, id: i64) -> Result<bool, StoreError> {
            self.inner.delete_alarm(id)
        }
    }

    fn counting() -> Arc<CountingStore> {
        Arc::new(CountingStore {
            inner: MemoryStore::new(),
            lists: AtomicUsize::new(0),
        })
    }

    #[test]
    fn list_is_served_from_cache_within_ttl() {
        let store = counting();
        let alarms = Alarms::new(store.clone(), DEFAULT_ALARM_TTL);
        let first = alarms.list().expect("first");
        let second = alarms.list().expect("second");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_normalizes_and_refreshes_the_list() {
        let store = counting();
        let alarms = Alarms::new(store.clone(), DEFAULT_ALARM_TTL);
        assert!(alarms.list().expect("empty").is_empty());
        let id = alarms.add("  Gol prata ", " abc1d23 ").expect("add");
        let listed = alarms.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].car_name, "Gol prata");
        assert_eq!(listed[0].plate, "ABC1D23");
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_rejects_blank_fields() {
        let alarms = Alarms::new(Arc::new(MemoryStore::new()), DEFAULT_ALARM_TTL);
        let err = alarms.add("Gol", "   ").unwrap_err();
        assert!(err.to_string().contains("plate"));
        assert!(alarms.add("", "ABC1D23").is_err());
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let alarms = Alarms::new(Arc::new(MemoryStore::new()), DEFAULT_ALARM_TTL);
        let id = alarms.add("Onix", "XYZ9A87").expect("add");
        assert!(alarms.delete(id).expect("delete"));
        assert!(!alarms.delete(id).expect("delete again"));
        assert!(alarms.list().expect("list").is_empty());
    }

    #[test]
    fn memory_store_lists_newest_first() {
        let store = MemoryStore::new();
        let first = store.add_alarm("A", "AAA1111").expect("add");
        let second = store.add_alarm("B", "BBB2222").expect("add");
        let ids: Vec<i64> = store
            .list_alarms()
            .expect("list")
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn create_user_ignores_duplicates() {
        let store = MemoryStore::new();
        store.create_user("operador", "hash-1").expect("create");
        store.create_user("operador", "hash-2").expect("create again");
        let user = store.get_user("operador").expect("get").expect("present");
        assert_eq!(user.password_hash, "hash-1");
        assert!(store.get_user("ghost").expect("get").is_none());
    }

    #[test]
    fn hits_match_plates_case_insensitively() {
        let store = MemoryStore::new();
        store.add_alarm("Gol", "ABC1D23").expect("add");
        let alarms = store.list_alarms().expect("list");
        let records = vec![
            Record {
                plate: "abc1d23".into(),
                ..Record::default()
            },
            Record {
                plate: "ZZZ0000".into(),
                ..Record::default()
            },
        ];
        let hits = find_hits(&alarms, &records);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].alarm.car_name, "Gol");
        assert_eq!(hits[0].record.plate, "abc1d23");
    }
}
