// Threshold evaluation module
pub mod blocklist;
pub mod thresholds;

pub use blocklist::{BlockList, BlockRule, BlockRuleError};
pub use thresholds::{current_tier, evaluate, CrossingDecision};
