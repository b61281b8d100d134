// Streaming pipeline: tick ingestion, windowing, decisions and the per-instrument worker
pub mod decision;
pub mod price_feed;
pub mod tick_aggregator;
pub mod worker;

pub use decision::{DecisionPolicy, PolicyDecision};
pub use price_feed::{parse_line, HttpPricingStream, TickStream};
pub use tick_aggregator::TickAggregator;
pub use worker::{run_workers, StopReason, Worker, WorkerOutcome, WorkerState};
