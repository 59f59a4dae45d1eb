//! Watcher core: pure scanning, aggregation and reporting logic.
mod aggregate;
mod batch;
mod report;
mod scanner;
mod source;

pub use aggregate::{aggregate, CodeHit};
pub use batch::NotificationBatch;
pub use report::{ChannelOutcome, ChannelResult, RunReport, SourceOutcome, SourceResult};
pub use scanner::{
    normalize_text, normalize_token, CodePattern, CodeScanner, PatternError,
    BUILTIN_PATTERNS, DEFAULT_MIN_LENGTH,
};
pub use source::{Source, SourceError, SourceKind};
