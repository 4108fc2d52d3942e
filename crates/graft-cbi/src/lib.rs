#![doc = include_str!("../README.md")]

//! Dynamic-predicate fault localization.

pub mod predicate;
pub mod propagate;
pub mod rank;

pub use predicate::{EngineError, Predicate, PredicateOps, Rel, Sign, SitePredicate, StateTest};
pub use propagate::PropagationState;
pub use rank::{enumerate_candidates, rank, rank_against, true_runs, RankingRecord};
