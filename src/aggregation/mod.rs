pub mod concurrent_map;
pub mod engine;

pub use engine::{AggregationEngine, AggregationEngineFactory};
