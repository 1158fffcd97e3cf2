/// Upstream dataset identifier attached to every canonical record.
/// Examples: `alpaca`, `dolly_15k`, `hh_rlhf`
pub type SourceId = String;
/// Coarse domain label attached by the normalizer.
/// Examples: `chat`, `code`, `math`, `fiction`
pub type CategoryId = String;
/// Name of an auditor group built from several categories.
/// Examples: `dark`, `technical`, `general`
pub type GroupName = String;
/// Record tally per tag (category or source), ordered by tag.
/// Example: `{"chat": 120, "code": 40}`
pub type TagCounts = std::collections::BTreeMap<String, u64>;
