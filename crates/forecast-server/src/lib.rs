//! Forecast server - HTTP front end for the forecasting pipeline

pub mod api;
pub mod config;
pub mod watcher;
