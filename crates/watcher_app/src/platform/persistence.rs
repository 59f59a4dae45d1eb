use std::path::Path;

use engine_logging::{engine_error, engine_info};
use watcher_core::RunReport;
use watcher_engine::AtomicFileWriter;

/// Write the run report as JSON. A failed write is logged, not fatal: the
/// codes are already stored and notified.
pub(crate) fn save_report(path: &Path, report: &RunReport) {
    let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
        engine_error!("Report path {:?} has no file name", path);
        return;
    };

    let writer = AtomicFileWriter::for_path(path);
    match writer.write_json(filename, report) {
        Ok(written) => engine_info!("Wrote run report to {:?}", written),
        Err(err) => engine_error!("Failed to write run report to {:?}: {}", path, err),
    }
}
