#![doc = include_str!("../README.md")]

//! Variant representation, caching, and localization.

pub mod cache;
pub mod harness;
pub mod localization;
pub mod rep;

pub use cache::{digest_of, CompileCache, CompileState, SourceSnapshot, TestCache, TestOutcome,
    CACHE_VERSION};
pub use harness::{parse_fitness, substitute, PortAllocator, PORT_MIN, PORT_WRAP};
pub use localization::{
    flatten, path_scheme, source_order, uniform_scheme, FlattenPolicy, LocalizationError, Scheme,
    WeightedPath,
};
pub use rep::{
    CVariant, EvalContext, Mutation, TestCase, Variant, VariantConfig, VariantError,
    REPRESENTATION_VERSION,
};
