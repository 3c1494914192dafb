//! Core types for the formic form engine: branded IDs, schema fragments,
//! the condition-evaluator contract, engine events, and the error taxonomy.
//!
//! This crate is dependency-light on purpose. The tree machinery lives in
//! `formic-engine`; everything here is plain data shared across crates.

pub mod conditions;
pub mod data;
pub mod errors;
pub mod events;
pub mod ids;
pub mod schema;
