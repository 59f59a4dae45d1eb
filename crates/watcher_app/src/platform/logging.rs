//! Logger setup for the binary and a sink that turns engine events into log lines.

use std::path::PathBuf;

use engine_logging::{engine_debug, engine_trace, LevelFilter, LogDestination};
use watcher_engine::{ProgressSink, WatchEvent};

/// Terminal logging, plus a file when `log_file` is set.
pub fn initialize(log_file: Option<PathBuf>, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match log_file {
        Some(path) => LogDestination::Both(path),
        None => LogDestination::Terminal,
    };
    engine_logging::initialize(destination, level);
}

/// Forwards engine events to the log. Failures are already logged at warn
/// level by the engine, so these stay at debug and below.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: WatchEvent) {
        match event {
            WatchEvent::Progress(progress) => {
                engine_trace!(
                    "{} stage={:?} bytes={:?}",
                    progress.url,
                    progress.stage,
                    progress.bytes
                );
            }
            WatchEvent::SourceCompleted(outcome) => {
                engine_debug!("Source finished: {} {:?}", outcome.url, outcome.result);
            }
            WatchEvent::ChannelCompleted(outcome) => {
                engine_debug!("Channel finished: {} {:?}", outcome.channel, outcome.result);
            }
        }
    }
}
