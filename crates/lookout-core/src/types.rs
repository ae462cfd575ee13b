use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Face encoding vector produced by the upstream recognition model
/// (typically 128-dimensional).
pub type Encoding = Vec<f32>;

/// Opaque handle to the cache entry created or refreshed by an admission.
///
/// Tickets are unique for the lifetime of the cache that minted them, so a
/// late backfill can never land on an entry that replaced a cleared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryTicket(pub(crate) u64);

impl EntryTicket {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identifier of the persisted detection record behind a cache entry.
///
/// `Pending` is a valid reference whose record has not been written yet.
/// It must never be read as "no record".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
    Pending,
    Resolved(String),
}

impl RecordRef {
    pub fn is_pending(&self) -> bool {
        matches!(self, RecordRef::Pending)
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            RecordRef::Pending => None,
            RecordRef::Resolved(id) => Some(id),
        }
    }
}

/// Lifecycle of a cache entry relative to the cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Seen within the cooldown window: repeat sightings are suppressed.
    Fresh,
    /// Cooldown elapsed: the next matching sighting re-alerts.
    Stale,
}

/// One distinct face remembered for a user.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub encoding: Encoding,
    pub last_seen_at: DateTime<Utc>,
    pub record: RecordRef,
    pub(crate) ticket: EntryTicket,
}

impl CacheEntry {
    pub fn ticket(&self) -> EntryTicket {
        self.ticket
    }

    /// Time elapsed since the entry was last refreshed.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.last_seen_at
    }

    pub fn state(&self, now: DateTime<Utc>, cooldown: TimeDelta) -> EntryState {
        if self.age(now) < cooldown {
            EntryState::Fresh
        } else {
            EntryState::Stale
        }
    }
}

/// Outcome of running one detection through the admission gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    /// Caller should persist a record and emit an alert.
    pub should_process: bool,
    pub is_duplicate: bool,
    /// No cached face matched; a new entry was appended.
    pub new_person: bool,
    /// Record of the cached face that suppressed this sighting.
    pub duplicate_of: Option<RecordRef>,
    /// Entry to backfill once the persisted record id is known.
    #[serde(skip)]
    pub ticket: Option<EntryTicket>,
}

impl AdmissionDecision {
    pub(crate) fn new_person(ticket: EntryTicket) -> Self {
        Self {
            should_process: true,
            is_duplicate: false,
            new_person: true,
            duplicate_of: None,
            ticket: Some(ticket),
        }
    }

    pub(crate) fn duplicate(of: RecordRef) -> Self {
        Self {
            should_process: false,
            is_duplicate: true,
            new_person: false,
            duplicate_of: Some(of),
            ticket: None,
        }
    }

    pub(crate) fn returning(ticket: EntryTicket) -> Self {
        Self {
            should_process: true,
            is_duplicate: false,
            new_person: false,
            duplicate_of: None,
            ticket: Some(ticket),
        }
    }

    /// Decision for an event that carried no encoding at all: always a new
    /// sighting, never cached.
    pub fn uncached() -> Self {
        Self {
            should_process: true,
            is_duplicate: false,
            new_person: true,
            duplicate_of: None,
            ticket: None,
        }
    }
}

/// Diagnostic view of a single cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub index: usize,
    pub record: RecordRef,
    pub last_seen_at: DateTime<Utc>,
    pub age_secs: i64,
    pub encoding_length: usize,
    pub state: EntryState,
}

/// Read-only snapshot of one user's cache, as returned by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub user_id: String,
    pub cooldown_secs: i64,
    pub threshold: f32,
    pub entries: Vec<EntrySnapshot>,
}

/// Bounds applied by an explicit sweep. `None` leaves that dimension unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepPolicy {
    /// Entries whose age is at least this long are dropped.
    pub max_age: Option<TimeDelta>,
    /// Per-user cap; the most recently seen entries are kept.
    pub max_entries_per_user: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub entries_removed: usize,
    pub users_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(last_seen_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            encoding: vec![0.0; 3],
            last_seen_at,
            record: RecordRef::Pending,
            ticket: EntryTicket(1),
        }
    }

    #[test]
    fn test_entry_state_transitions_at_cooldown() {
        let t0 = Utc::now();
        let e = entry(t0);
        let cooldown = TimeDelta::minutes(10);
        assert_eq!(e.state(t0 + TimeDelta::minutes(9), cooldown), EntryState::Fresh);
        assert_eq!(e.state(t0 + TimeDelta::minutes(10), cooldown), EntryState::Stale);
    }

    #[test]
    fn test_record_ref_serialization() {
        let pending = serde_json::to_value(RecordRef::Pending).unwrap();
        assert_eq!(pending, serde_json::json!({ "state": "pending" }));

        let resolved = serde_json::to_value(RecordRef::Resolved("abc".into())).unwrap();
        assert_eq!(resolved, serde_json::json!({ "state": "resolved", "id": "abc" }));
    }

    #[test]
    fn test_pending_is_not_an_id() {
        assert!(RecordRef::Pending.is_pending());
        assert_eq!(RecordRef::Pending.id(), None);
        assert_eq!(RecordRef::Resolved("r1".into()).id(), Some("r1"));
    }
}
