pub mod evaluator;
pub mod thermal;
pub mod throughput;
pub mod tracker;
