pub mod bracket;
pub mod cache;
pub mod config;
pub mod error;
pub mod http_client;
pub mod leaderboard;
pub mod parser;
pub mod prediction;
pub mod record;
pub mod scoring;
pub mod service;
pub mod source;
pub mod stage;
pub mod store;
