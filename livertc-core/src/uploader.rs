//! Recording upload hook.
//!
//! When a track recorder closes, the SFU hands the finished file to an
//! uploader on a detached task. The trait keeps the SFU core testable and
//! lets deployments run without object storage at all.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::UploadConfig;

#[async_trait]
pub trait RecordingUploader: Send + Sync {
    /// Whether uploads should be attempted at all.
    fn enabled(&self) -> bool;

    /// Push one finished recording to storage.
    async fn upload(&self, path: &Path) -> anyhow::Result<()>;
}

/// Uploader used when uploads are disabled or misconfigured.
pub struct NoopUploader;

#[async_trait]
impl RecordingUploader for NoopUploader {
    fn enabled(&self) -> bool {
        false
    }

    async fn upload(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

/// HTTP PUT uploader for S3-style object storage.
///
/// Objects land at `{endpoint}/{bucket}/[{prefix}/]{filename}` with the
/// configured static credentials as basic auth.
pub struct HttpUploader {
    client: reqwest::Client,
    cfg: UploadConfig,
}

impl HttpUploader {
    /// Returns `None` when uploads are disabled or the target is incomplete:
    /// endpoint, bucket and both credentials are all required.
    pub fn from_config(cfg: &UploadConfig) -> Option<Self> {
        if !cfg.enabled
            || cfg.endpoint.is_empty()
            || cfg.bucket.is_empty()
            || cfg.access_key.is_empty()
            || cfg.secret_key.is_empty()
        {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            cfg: cfg.clone(),
        })
    }

    fn object_url(&self, name: &str) -> String {
        let endpoint = self.cfg.endpoint.trim_end_matches('/');
        let prefix = self.cfg.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{endpoint}/{}/{name}", self.cfg.bucket)
        } else {
            format!("{endpoint}/{}/{prefix}/{name}", self.cfg.bucket)
        }
    }
}

fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".ogg") {
        "audio/ogg"
    } else if name.ends_with(".ivf") {
        "video/x-ivf"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl RecordingUploader for HttpUploader {
    fn enabled(&self) -> bool {
        true
    }

    async fn upload(&self, path: &Path) -> anyhow::Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("recording path has no file name: {}", path.display()))?
            .to_string();
        let body = tokio::fs::read(path).await?;
        let size = body.len();

        self.client
            .put(self.object_url(&name))
            .header(reqwest::header::CONTENT_TYPE, content_type_for(&name))
            .basic_auth(&self.cfg.access_key, Some(&self.cfg.secret_key))
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        info!(file = %name, size, "uploaded recording");

        if self.cfg.delete_after_upload {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(file = %name, error = %e, "could not remove uploaded recording");
            }
        }
        Ok(())
    }
}

/// Build the uploader from config, falling back to the no-op uploader.
pub fn build_uploader(cfg: &UploadConfig) -> Arc<dyn RecordingUploader> {
    match HttpUploader::from_config(cfg) {
        Some(u) => Arc::new(u),
        None => Arc::new(NoopUploader),
    }
}
