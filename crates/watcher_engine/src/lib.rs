//! Watcher engine: fetching, extraction, persistence and notification.
mod decode;
mod extract;
mod fetch;
mod notify;
mod persist;
mod pipeline;
mod store;
mod types;

pub use decode::{decode_body, DecodedBody};
pub use extract::{ExtractionError, Extractor, VisibleTextExtractor};
pub use fetch::{FetchSettings, Fetcher, NullSink, ProgressSink, ReqwestFetcher, DEFAULT_USER_AGENT};
pub use notify::{
    compose_message, Channel, EmailChannel, EmailSettings, Notifier, NotifyError, WebhookChannel,
    WebhookSettings,
};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use pipeline::{SourceFailure, Watcher, DEFAULT_MAX_IN_FLIGHT};
pub use store::{Clock, CodeRecord, CodeStore, InsertOutcome, StoreError};
pub use types::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, SourceProgress, Stage, WatchEvent,
};
