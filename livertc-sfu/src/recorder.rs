//! Per-track recording: container selection and the close/upload protocol.
//!
//! Opus ingress is persisted as OGG, VP8/VP9 as IVF, both through the
//! `webrtc::media::io::Writer` trait. Any other codec records nothing and
//! the fanout forwards as usual.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp;

use livertc_core::RecordingUploader;

const OGG_SAMPLE_RATE: u32 = 48000;
const OGG_CHANNEL_COUNT: u8 = 2;

pub type RtpWriter = Box<dyn Writer + Send + Sync>;

/// Open a container writer for the given codec, or `None` when the codec
/// is not recorded. The record directory is created lazily; open failures
/// are logged and swallowed so the fanout keeps forwarding.
pub fn open_recorder(
    mime_type: &str,
    dir: &Path,
    room: &str,
    track_id: &str,
) -> Option<(RtpWriter, PathBuf)> {
    let ext = if mime_type.eq_ignore_ascii_case(MIME_TYPE_OPUS) {
        "ogg"
    } else if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP8)
        || mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9)
    {
        "ivf"
    } else {
        return None;
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "could not create record directory");
        return None;
    }

    let ts = chrono::Utc::now().timestamp();
    let path = dir.join(format!("{room}_{track_id}_{ts}.{ext}"));
    let file = match File::create(&path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not create recording file");
            return None;
        }
    };

    let writer: RtpWriter = if ext == "ogg" {
        match OggWriter::new(file, OGG_SAMPLE_RATE, OGG_CHANNEL_COUNT) {
            Ok(w) => Box::new(w),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not open OGG writer");
                return None;
            }
        }
    } else {
        let four_cc = if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9) {
            *b"VP90"
        } else {
            *b"VP80"
        };
        let header = IVFFileHeader {
            signature: *b"DKIF",
            version: 0,
            header_size: 32,
            four_cc,
            width: 640,
            height: 480,
            timebase_denominator: 30,
            timebase_numerator: 1,
            num_frames: 900,
            unused: 0,
        };
        match IVFWriter::new(file, &header) {
            Ok(w) => Box::new(w),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not open IVF writer");
                return None;
            }
        }
    };

    info!(room, track_id, path = %path.display(), "recording track");
    Some((writer, path))
}

struct ActiveRecorder {
    writer: RtpWriter,
    path: PathBuf,
}

/// Holder for a fanout's optional recorder.
///
/// Writes come from the fanout read loop only; close may race with late
/// installs and with itself, so both go through the inner lock and the
/// first close wins. Closing flushes the container and hands the file to
/// the uploader on a detached task exactly once.
pub(crate) struct RecorderSlot {
    inner: Mutex<Option<ActiveRecorder>>,
    closed: AtomicBool,
    uploader: Arc<dyn RecordingUploader>,
}

impl RecorderSlot {
    pub(crate) fn new(uploader: Arc<dyn RecordingUploader>) -> Self {
        Self {
            inner: Mutex::new(None),
            closed: AtomicBool::new(false),
            uploader,
        }
    }

    pub(crate) fn install(&self, writer: RtpWriter, path: PathBuf) {
        let mut inner = self.inner.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        *inner = Some(ActiveRecorder { writer, path });
    }

    pub(crate) fn write(&self, pkt: &rtp::packet::Packet) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(rec) = self.inner.lock().as_mut() {
            if let Err(e) = rec.writer.write_rtp(pkt) {
                debug!(path = %rec.path.display(), error = %e, "recorder write failed");
            }
        }
    }

    pub(crate) fn close_and_upload(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(mut rec) = self.inner.lock().take() else {
            return;
        };
        if let Err(e) = rec.writer.close() {
            warn!(path = %rec.path.display(), error = %e, "recorder close failed");
        }
        if self.uploader.enabled() {
            let uploader = Arc::clone(&self.uploader);
            let path = rec.path;
            // Detached from whatever request triggered the close: the
            // upload must survive room teardown.
            tokio::spawn(async move {
                if let Err(e) = uploader.upload(&path).await {
                    warn!(file = %path.display(), error = %e, "recording upload failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use livertc_core::NoopUploader;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingUploader {
        uploads: AtomicUsize,
    }

    #[async_trait]
    impl RecordingUploader for CountingUploader {
        fn enabled(&self) -> bool {
            true
        }

        async fn upload(&self, _path: &Path) -> anyhow::Result<()> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NullWriter {
        closes: Arc<AtomicUsize>,
    }

    impl Writer for NullWriter {
        fn write_rtp(
            &mut self,
            _pkt: &rtp::packet::Packet,
        ) -> std::result::Result<(), webrtc::media::Error> {
            Ok(())
        }

        fn close(&mut self) -> std::result::Result<(), webrtc::media::Error> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_open_recorder_opus() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, path) =
            open_recorder(MIME_TYPE_OPUS, dir.path(), "demo", "mic0").expect("opus is recorded");
        writer.close().unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("demo_mic0_"));
        assert!(name.ends_with(".ogg"));
        // The OGG ID and comment header pages are written on open.
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size > 40, "expected OGG headers on disk, got {size} bytes");
    }

    #[test]
    fn test_open_recorder_vp8() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, path) =
            open_recorder(MIME_TYPE_VP8, dir.path(), "demo", "cam0").expect("vp8 is recorded");
        writer.close().unwrap();

        assert!(path.extension().is_some_and(|e| e == "ivf"));
        // 32-byte IVF file header.
        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size >= 32, "expected IVF header on disk, got {size} bytes");
    }

    #[test]
    fn test_open_recorder_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let opened = open_recorder(MIME_TYPE_VP9, &nested, "demo", "cam0");
        assert!(opened.is_some());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_open_recorder_other_codec() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_recorder("video/H264", dir.path(), "demo", "cam0").is_none());
    }

    #[tokio::test]
    async fn test_slot_close_uploads_exactly_once() {
        let uploader = Arc::new(CountingUploader {
            uploads: AtomicUsize::new(0),
        });
        let closes = Arc::new(AtomicUsize::new(0));
        let slot = RecorderSlot::new(uploader.clone());
        slot.install(
            Box::new(NullWriter {
                closes: closes.clone(),
            }),
            PathBuf::from("/tmp/demo_cam0_0.ivf"),
        );

        slot.close_and_upload();
        slot.close_and_upload();
        slot.close_and_upload();

        // Let the detached upload task run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_refuses_writes_after_close() {
        let slot = RecorderSlot::new(Arc::new(NoopUploader));
        let closes = Arc::new(AtomicUsize::new(0));
        slot.install(
            Box::new(NullWriter {
                closes: closes.clone(),
            }),
            PathBuf::from("/tmp/demo_mic0_0.ogg"),
        );
        slot.close_and_upload();

        // Writes after close are dropped and installs are rejected.
        slot.write(&rtp::packet::Packet::default());
        slot.install(
            Box::new(NullWriter {
                closes: closes.clone(),
            }),
            PathBuf::from("/tmp/demo_mic0_1.ogg"),
        );
        slot.close_and_upload();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_close_without_recorder() {
        let slot = RecorderSlot::new(Arc::new(NoopUploader));
        slot.close_and_upload();
        slot.write(&rtp::packet::Packet::default());
    }
}
