//! Filtering and aggregation core for Italian train-punctuality dashboards.
//!
//! Gold tables (pre-aggregated CSV) are decoded into typed rows, filtered by
//! a single [`filters::FilterState`] and reduced into KPIs, series, a delay
//! histogram, leaderboards and map points by [`pipeline::apply_filters`].

pub mod aggregate;
pub mod decoder;
pub mod error;
pub mod filters;
pub mod grain;
pub mod loader;
pub mod manifest;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod reports;
pub mod sources;
pub mod state;
pub mod stations;
pub mod types;
pub mod util;
