// Request and upstream counters

mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
