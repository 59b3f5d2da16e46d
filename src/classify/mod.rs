mod classifier;
mod ensemble;
mod grid;
mod metrics;
mod sensitivity;
#[cfg(test)]
mod tests;

pub use classifier::{ClassificationResult, classify};
pub use ensemble::{EnsembleDimension, ensemble_filter};
pub use grid::parse_grid;
pub use metrics::{
    MetricKind, Metrics, OutcomeCounts, compute_metrics, metrics_by, metrics_by_category,
    metrics_by_model, metrics_by_strategy,
};
pub use sensitivity::sensitivity_search;
