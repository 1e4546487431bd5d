pub mod config;
pub mod errors;
pub mod export;
pub mod ingestor;
pub mod models;
pub mod proxy;
pub mod sources;
pub mod utils;
pub mod variants;
