pub mod engine;
pub mod indexer;
