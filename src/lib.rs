pub mod analytics;
pub mod api;
pub mod clock;
pub mod config;
pub mod rate_limit;
pub mod storage;
