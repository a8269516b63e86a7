//! Rank pull-request contributors by weekly merges and reaction-weighted comment quality.
//!
//! A run lists merged pull requests for each repository, pulls their comments,
//! reactions and (optionally) reviews through a SQLite-backed cache, scores every
//! countable comment, and folds Monday-anchored weekly winners into per-user totals.

pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod ext;
pub mod model;
pub mod pipeline;
pub mod remote;
pub mod render;
pub mod scoring;
pub mod store;
pub mod util;
pub mod window;
