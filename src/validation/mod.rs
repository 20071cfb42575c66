//! Rule validation module.
//!
//! - Event rule model with a typed constraint view
//! - Ordered, short-circuiting rule evaluation for one gate
//! - Per-event rule set caching with staleness tracking

pub mod evaluator;
pub mod rule_cache;
pub mod rules;

pub use evaluator::*;
pub use rule_cache::*;
pub use rules::*;
