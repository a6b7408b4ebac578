pub mod metrics;
pub mod predict;
pub mod status;
