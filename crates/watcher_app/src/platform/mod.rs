//! Process-level glue for the `shift_watcher` binary: CLI, configuration,
//! logging and report output around one `Watcher::run_once` call.
mod app;
mod config;
mod logging;
mod persistence;

pub use app::run_app;
