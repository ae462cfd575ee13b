//! Per-user cooldown cache.
//!
//! Each user owns an independent slot guarded by its own mutex. The outer
//! map lock is only held long enough to find or create a slot, so matching
//! for one user never blocks another.

use crate::types::{CacheEntry, EntryTicket, SweepPolicy, SweepReport};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

type Slot = Arc<Mutex<Vec<CacheEntry>>>;

/// Process-local map from user id to that user's cached faces.
#[derive(Default)]
pub struct FaceCache {
    slots: RwLock<HashMap<String, Slot>>,
    next_ticket: AtomicU64,
}

// A panic while a guard is held can only leave a Vec that was fully pushed
// or fully refreshed, so poisoned locks are safe to keep using.
fn lock(slot: &Mutex<Vec<CacheEntry>>) -> MutexGuard<'_, Vec<CacheEntry>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mint_ticket(&self) -> EntryTicket {
        EntryTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    fn slot(&self, user_id: &str) -> Option<Slot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(user_id).cloned()
    }

    fn slot_or_insert(&self, user_id: &str) -> Slot {
        if let Some(slot) = self.slot(user_id) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.entry(user_id.to_string()).or_default().clone()
    }

    /// Run `f` with exclusive access to the user's entries, creating an
    /// empty slot if the user has none.
    pub fn with_user<R>(&self, user_id: &str, f: impl FnOnce(&mut Vec<CacheEntry>) -> R) -> R {
        let slot = self.slot_or_insert(user_id);
        let mut entries = lock(&slot);
        f(&mut entries)
    }

    /// Like [`with_user`](Self::with_user) but never creates a slot.
    pub fn with_existing<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut Vec<CacheEntry>) -> R,
    ) -> Option<R> {
        let slot = self.slot(user_id)?;
        let mut entries = lock(&slot);
        Some(f(&mut entries))
    }

    /// Remove every entry for the user. Returns how many were dropped.
    ///
    /// Takes the user's lock, so it serializes with any in-flight admission.
    pub fn clear(&self, user_id: &str) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots.get(user_id).cloned() else {
            return 0;
        };

        let removed = {
            let mut entries = lock(&slot);
            let n = entries.len();
            entries.clear();
            n
        };

        // Only the map and our local clone hold the slot: no admission has it
        // checked out, so the slot itself can go.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(user_id);
        }
        removed
    }

    /// Evict entries according to `policy`. Never invoked implicitly.
    pub fn sweep(&self, now: DateTime<Utc>, policy: SweepPolicy) -> SweepReport {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let mut report = SweepReport::default();

        slots.retain(|_, slot| {
            let mut entries = lock(slot);
            let before = entries.len();

            if let Some(max_age) = policy.max_age {
                entries.retain(|e| e.age(now) < max_age);
            }
            if let Some(cap) = policy.max_entries_per_user {
                keep_most_recent(&mut entries, cap);
            }

            report.entries_removed += before - entries.len();
            let keep = !entries.is_empty() || Arc::strong_count(slot) > 1;
            if !keep {
                report.users_removed += 1;
            }
            keep
        });

        report
    }

    /// Users that currently have a slot.
    pub fn users(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut users: Vec<String> = slots.keys().cloned().collect();
        users.sort();
        users
    }

    /// Total number of cached entries across all users.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().map(|slot| lock(slot).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keep the `cap` most recently seen entries, preserving insertion order.
fn keep_most_recent(entries: &mut Vec<CacheEntry>, cap: usize) {
    if entries.len() <= cap {
        return;
    }
    let mut by_recency: Vec<(usize, DateTime<Utc>)> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e.last_seen_at))
        .collect();
    by_recency.sort_by(|a, b| b.1.cmp(&a.1));
    let keep: HashSet<usize> = by_recency.into_iter().take(cap).map(|(i, _)| i).collect();

    let mut i = 0;
    entries.retain(|_| {
        let kept = keep.contains(&i);
        i += 1;
        kept
    });
}
