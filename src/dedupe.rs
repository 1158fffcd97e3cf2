use std::collections::HashSet;

use crate::hash::Fingerprint;

/// Outcome of observing a fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// First observation within this run.
    FirstSeen,
    /// Seen earlier in this run.
    Duplicate,
}

/// Run-scoped membership structure over fingerprints.
///
/// Implementations may trade exactness for memory, but must document their
/// false-positive rate; [`DedupeSet`] is exact.
pub trait MembershipSet {
    /// Record `fingerprint`, reporting whether it was already present.
    fn observe(&mut self, fingerprint: Fingerprint) -> Observation;
    /// True if `fingerprint` was observed (without recording it).
    fn contains(&self, fingerprint: &Fingerprint) -> bool;
    /// Number of distinct fingerprints observed.
    fn len(&self) -> usize;
    /// True when nothing has been observed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact in-memory dedupe set; memory is O(unique records) at 16 bytes per key
/// plus table overhead.
#[derive(Debug, Default)]
pub struct DedupeSet {
    seen: HashSet<Fingerprint>,
}

impl DedupeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty set pre-sized for `capacity` unique fingerprints.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
        }
    }
}

impl MembershipSet for DedupeSet {
    fn observe(&mut self, fingerprint: Fingerprint) -> Observation {
        if self.seen.insert(fingerprint) {
            Observation::FirstSeen
        } else {
            Observation::Duplicate
        }
    }

    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

impl FromIterator<Fingerprint> for DedupeSet {
    fn from_iter<T: IntoIterator<Item = Fingerprint>>(iter: T) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}
