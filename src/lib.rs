pub mod clock;
pub mod config;
pub mod hours;
pub mod http;
pub mod orchestrator;
pub mod rate_limit;
pub mod reply;
pub mod session;
pub mod store;
pub mod types;
