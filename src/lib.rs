#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Command-line runners shared by the binaries.
pub mod apps;
/// Manifests, grouping, dark-ratio, and distribution reports.
pub mod audit;
/// Pipeline configuration types.
pub mod config;
/// Centralized constants used across normalization, merge, splits, and audit.
pub mod constants;
/// Upstream and canonical record types.
pub mod data;
/// Run-scoped fingerprint membership sets.
pub mod dedupe;
/// Content fingerprints and seeded hashing.
pub mod hash;
/// Multi-source merge engine.
pub mod merge;
/// Aggregate histogram metrics.
pub mod metrics;
/// Shape detection and canonical mapping.
pub mod normalize;
/// Deterministic RNG for shuffles and sampling.
pub mod rng;
/// Canonical record sinks.
pub mod sink;
/// Source declarations and streaming record readers.
pub mod source;
/// Train/validation splitting and stratified sampling.
pub mod splits;
/// Input and output transports (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;
/// Corpus validation against an optional fingerprint cache.
pub mod validate;

mod errors;

pub use audit::{DarkBand, DistributionReport, GroupReport, GroupingSpec, Manifest};
pub use config::{AuditConfig, MergeConfig, NormalizerConfig, SplitConfig, StratifiedConfig};
pub use data::{CanonicalRecord, SkipReason, UpstreamRecord};
pub use dedupe::{DedupeSet, MembershipSet, Observation};
pub use errors::CorpusError;
pub use hash::{Fingerprint, fingerprint};
pub use merge::{MergeEngine, MergeStats, SourceStats};
pub use normalize::Normalizer;
pub use sink::{JsonlSink, RecordSink};
pub use source::concatenated::{ConcatenatedParser, ConcatenatedStats};
pub use source::{RecordReader, SourceSpec};
pub use splits::{SplitLabel, SplitStats, split_corpus, stratified_sample};
pub use types::{CategoryId, GroupName, SourceId};
pub use validate::{ValidationReport, Validator};
