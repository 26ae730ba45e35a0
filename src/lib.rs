//! Harvest geocoded places from DBpedia, partition them by country, and
//! derive boundary geometry for vague place regions.
//!
//! The pipeline has three stages, each usable on its own:
//!
//! - [`sparql`] retrieves places page by page from a SPARQL endpoint,
//!   riding out rate limits with cooldown-and-retry.
//! - [`split`] partitions a harvested CSV into per-country files in two
//!   streaming passes.
//! - [`geometry`] derives a convex hull in-process and delegates the
//!   concave alpha-shape outline to an external engine.
//!
//! [`report`] renders a human-readable summary of a retrieval run.

pub mod error;
pub mod geometry;
pub mod harvest;
pub mod progress;
pub mod report;
pub mod sparql;
pub mod split;

pub use error::AppError;
pub use report::RunReport;
