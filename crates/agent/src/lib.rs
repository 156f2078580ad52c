//! Scoring functions behind the recommendation oracle port.
//!
//! - `HeuristicOracle` - deterministic rule-based scoring, the default.
//! - `LlmRecommendationOracle` - adapts any [`llm::LlmClient`] by rendering a
//!   prompt from the behaviour profile and decoding the reply tolerantly.
//! - `DisabledOracle` - reports "not configured" so every pass fails its precondition.
//!
//! The model only proposes candidates. Expiry, contact snapshots and insight
//! defaults are always filled in by the core.

pub mod decode;
pub mod heuristic;
pub mod llm;
pub mod oracle;
pub mod prompt;

pub use heuristic::HeuristicOracle;
pub use llm::LlmClient;
pub use oracle::{build_oracle, DisabledOracle, LlmRecommendationOracle};
