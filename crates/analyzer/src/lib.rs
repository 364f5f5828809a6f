//! ERC20 classification pipeline, activity ranking, report generator, and data sinks.

pub mod activity;
pub mod pipeline;
pub mod reporter;
pub mod scan;
pub mod sink;

pub use activity::ActivityCounter;
pub use pipeline::{BatchClassifier, BatchOutcome, BatchStats, CancelPolicy, ClassifierConfig};
pub use scan::{scan_blocks, ScanOutcome};
