//! Declarative, windowed rule evaluation over normalised events
//! (spec.md §4.4).

pub mod engine;
pub mod rule;

pub use engine::{RulesEngine, TriggeredAlert};
pub use rule::{Condition, CustomPredicate, Rule, RuleStats};
