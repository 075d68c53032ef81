//! Shared plumbing for the livertc SFU: configuration loading, logging
//! initialization, Prometheus metrics and the recording upload hook.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod uploader;

pub use config::{parse_room_tokens, Config};
pub use metrics::SfuMetrics;
pub use uploader::{build_uploader, HttpUploader, NoopUploader, RecordingUploader};
