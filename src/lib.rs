//! NutriVision client: meal-photo upload, analysis job polling and the
//! notification store behind the terminal UI.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod poller;
pub mod processing;
pub mod ui;
