//! Face-encoding similarity.
//!
//! Incomparable encodings (empty, or of different dimension) are never
//! similar: the caller then treats the sighting as a new person rather than
//! rejecting it.

/// Default Euclidean distance below which two encodings are the same person.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Strategy for deciding whether two encodings belong to the same person.
pub trait Matcher: Send + Sync {
    /// Must be symmetric: `similar(a, b) == similar(b, a)`.
    fn similar(&self, a: &[f32], b: &[f32]) -> bool;

    /// Decision threshold, reported by cache diagnostics.
    fn threshold(&self) -> f32;
}

/// Euclidean distance between two encodings, or `None` if they are not
/// comparable.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return None;
    }

    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum();
    Some(sum.sqrt())
}

/// Matches when the Euclidean distance is strictly below `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn similar(&self, a: &[f32], b: &[f32]) -> bool {
        // NaN distances compare false, so poisoned vectors fail open too.
        euclidean_distance(a, b).is_some_and(|d| d < self.threshold)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_encodings_match() {
        let a = [0.1, 0.2, 0.3];
        assert!(EuclideanMatcher::default().similar(&a, &a));
    }

    #[test]
    fn test_distance_known_value() {
        let d = euclidean_distance(&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.1]).unwrap();
        assert!((d - 0.1).abs() < 1e-6);

        let d = euclidean_distance(&[0.0, 0.0, 0.0], &[5.0, 5.0, 5.0]).unwrap();
        assert!((d - 75.0f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let m = EuclideanMatcher::new(0.5);
        assert!(!m.similar(&[0.0, 1.0], &[0.5, 1.0]));
        assert!(m.similar(&[0.0, 1.0], &[0.25, 1.0]));
    }

    #[test]
    fn test_default_threshold_boundary() {
        let m = EuclideanMatcher::default();
        assert!(m.similar(&[0.0], &[0.59]));
        assert!(!m.similar(&[0.0], &[0.61]));
        assert!(!m.similar(&[0.0], &[1.0]));
    }

    #[test]
    fn test_symmetry() {
        let m = EuclideanMatcher::default();
        let pairs: [(&[f32], &[f32]); 5] = [
            (&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.1]),
            (&[0.0, 0.0, 0.0], &[5.0, 5.0, 5.0]),
            (&[0.2, -0.4], &[0.5, -0.1]),
            (&[], &[1.0]),
            (&[1.0, 2.0], &[1.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(m.similar(a, b), m.similar(b, a), "asymmetric for {a:?} / {b:?}");
        }
    }

    #[test]
    fn test_empty_never_matches() {
        let m = EuclideanMatcher::default();
        assert!(!m.similar(&[], &[]));
        assert!(!m.similar(&[], &[0.0]));
        assert_eq!(euclidean_distance(&[], &[]), None);
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let m = EuclideanMatcher::default();
        assert!(!m.similar(&[0.0, 0.0], &[0.0, 0.0, 0.0]));
        assert_eq!(euclidean_distance(&[0.0], &[0.0, 0.0]), None);
    }

    #[test]
    fn test_nan_never_matches() {
        let m = EuclideanMatcher::default();
        assert!(!m.similar(&[f32::NAN, 0.0], &[0.0, 0.0]));
    }
}
