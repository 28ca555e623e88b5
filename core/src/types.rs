//! Shared primitive types used across the entire pipeline.

/// A stable, unique identifier for a customer account.
pub type UserId = String;

/// The canonical run identifier.
pub type RunId = String;
