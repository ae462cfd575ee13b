//! Admission gate: decides whether a detection is a new sighting, a
//! returning face whose cooldown has lapsed, or a duplicate to suppress.

use crate::cache::FaceCache;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{
    AdmissionDecision, CacheEntry, CacheStatus, EntrySnapshot, EntryTicket, RecordRef,
    SweepPolicy, SweepReport,
};
use chrono::{DateTime, TimeDelta, Utc};

/// Default cooldown, in seconds, before a cached face may alert again.
pub const DEFAULT_COOLDOWN_SECS: i64 = 600;

/// Owns the per-user cache and applies the matcher and cooldown to it.
///
/// Intended to be constructed once by the application and shared behind an
/// `Arc`; every method takes `&self`.
pub struct AdmissionGate<M = EuclideanMatcher> {
    cache: FaceCache,
    matcher: M,
    cooldown: TimeDelta,
}

impl AdmissionGate<EuclideanMatcher> {
    pub fn new(cooldown: TimeDelta, threshold: f32) -> Self {
        Self::with_matcher(EuclideanMatcher::new(threshold), cooldown)
    }
}

impl Default for AdmissionGate<EuclideanMatcher> {
    fn default() -> Self {
        Self::with_matcher(
            EuclideanMatcher::default(),
            TimeDelta::seconds(DEFAULT_COOLDOWN_SECS),
        )
    }
}

impl<M: Matcher> AdmissionGate<M> {
    pub fn with_matcher(matcher: M, cooldown: TimeDelta) -> Self {
        Self {
            cache: FaceCache::new(),
            matcher,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    pub fn threshold(&self) -> f32 {
        self.matcher.threshold()
    }

    pub fn cache(&self) -> &FaceCache {
        &self.cache
    }

    /// Decide whether a sighting should be persisted and alerted on.
    ///
    /// The whole scan-and-mutate sequence runs under the user's lock. The
    /// first cached face that matches wins, even if a later one is closer.
    pub fn admit(&self, user_id: &str, encoding: &[f32], now: DateTime<Utc>) -> AdmissionDecision {
        self.cache.with_user(user_id, |entries| {
            let matched = entries
                .iter()
                .position(|e| self.matcher.similar(&e.encoding, encoding));

            let Some(idx) = matched else {
                let ticket = self.cache.mint_ticket();
                entries.push(CacheEntry {
                    encoding: encoding.to_vec(),
                    last_seen_at: now,
                    record: RecordRef::Pending,
                    ticket,
                });
                tracing::debug!(
                    user = user_id,
                    dims = encoding.len(),
                    cached = entries.len(),
                    "new face cached"
                );
                return AdmissionDecision::new_person(ticket);
            };

            let entry = &mut entries[idx];
            let age = entry.age(now);
            if age < self.cooldown {
                tracing::debug!(
                    user = user_id,
                    age_secs = age.num_seconds(),
                    record = ?entry.record,
                    "face within cooldown; suppressing"
                );
                return AdmissionDecision::duplicate(entry.record.clone());
            }

            tracing::debug!(
                user = user_id,
                age_secs = age.num_seconds(),
                "face returned after cooldown; re-alerting"
            );
            entry.last_seen_at = now;
            AdmissionDecision::returning(entry.ticket)
        })
    }

    /// Attach the persisted record id to the entry an admission reserved.
    ///
    /// Returns `false` if that entry no longer exists (cleared or swept in
    /// the meantime); the record itself is unaffected.
    pub fn resolve_record(&self, user_id: &str, ticket: EntryTicket, record_id: &str) -> bool {
        let resolved = self
            .cache
            .with_existing(user_id, |entries| {
                match entries.iter_mut().find(|e| e.ticket == ticket) {
                    Some(entry) => {
                        entry.record = RecordRef::Resolved(record_id.to_string());
                        true
                    }
                    None => false,
                }
            })
            .unwrap_or(false);

        if !resolved {
            tracing::debug!(user = user_id, record_id, "backfill target gone; skipping");
        }
        resolved
    }

    /// Forget every cached face for the user. Idempotent.
    pub fn clear(&self, user_id: &str) -> usize {
        let removed = self.cache.clear(user_id);
        tracing::info!(user = user_id, removed, "face cache cleared");
        removed
    }

    /// Diagnostic snapshot. Never mutates; unknown users report no entries.
    pub fn status(&self, user_id: &str, now: DateTime<Utc>) -> CacheStatus {
        let entries: Vec<EntrySnapshot> = self
            .cache
            .with_existing(user_id, |entries| {
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, e)| EntrySnapshot {
                        index,
                        record: e.record.clone(),
                        last_seen_at: e.last_seen_at,
                        age_secs: e.age(now).num_seconds(),
                        encoding_length: e.encoding.len(),
                        state: e.state(now, self.cooldown),
                    })
                    .collect()
            })
            .unwrap_or_default();

        CacheStatus {
            user_id: user_id.to_string(),
            cooldown_secs: self.cooldown.num_seconds(),
            threshold: self.matcher.threshold(),
            entries,
        }
    }

    /// Explicit eviction pass; see [`SweepPolicy`].
    pub fn sweep(&self, now: DateTime<Utc>, policy: SweepPolicy) -> SweepReport {
        let report = self.cache.sweep(now, policy);
        tracing::info!(
            entries_removed = report.entries_removed,
            users_removed = report.users_removed,
            "face cache swept"
        );
        report
    }
}
