//! lookout-core: duplicate-sighting suppression for unknown-face alerts.
//!
//! Compares incoming face encodings against a per-user cache of recently
//! seen faces and decides whether a detection deserves a new alert.

pub mod cache;
pub mod gate;
pub mod matcher;
pub mod types;

pub use cache::FaceCache;
pub use gate::{AdmissionGate, DEFAULT_COOLDOWN_SECS};
pub use matcher::{euclidean_distance, EuclideanMatcher, Matcher, DEFAULT_THRESHOLD};
pub use types::{
    AdmissionDecision, CacheEntry, CacheStatus, Encoding, EntrySnapshot, EntryState, EntryTicket,
    RecordRef, SweepPolicy, SweepReport,
};
