pub mod api;
pub mod daemon;
pub mod metrics;
pub mod state;
