//! Deterministic customer-health scoring and churn-risk pipeline.
//!
//! RULE: Scoring is a pure function of the loaded inputs, the reference
//! instant and the forest seed. Same inputs, same config — same master
//! table, byte for byte.
//! RULE: Stages hand data to each other through `BTreeMap`s keyed by
//! user_id, so iteration order never depends on hashing.

pub mod account;
pub mod aggregate;
pub mod cohort;
pub mod error;
pub mod event;
pub mod features;
pub mod forest;
pub mod health;
pub mod master;
pub mod ml_model;
pub mod pipeline;
pub mod population;
pub mod risk;
pub mod rng;
pub mod rule_model;
pub mod store;
pub mod summary;
pub mod synthetic;
pub mod types;
