//! Per-track fan-out: one read loop per published track, replicating each
//! RTP packet to every subscriber's local track and, optionally, to a
//! container writer on disk.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::MarshalSize;

use livertc_core::{RecordingUploader, SfuMetrics};

use crate::recorder::{RecorderSlot, RtpWriter};

const RECEIVE_MTU: usize = 1500;

struct Subscription {
    /// Weakly held: the room's subscriber set is the source of truth for
    /// liveness, and detach prunes entries as subscribers leave.
    conn: Weak<RTCPeerConnection>,
    local: Arc<TrackLocalStaticRTP>,
}

/// Fans one remote track out to any number of subscriber-local tracks.
///
/// The read loop is the sole reader of the remote track. Closing is
/// idempotent; the first close stops the loop, flushes the recorder and
/// schedules its upload.
pub struct TrackFanout {
    remote: Arc<TrackRemote>,
    room: String,
    locals: RwLock<Vec<Subscription>>,
    recorder: RecorderSlot,
    closed: CancellationToken,
    metrics: Arc<SfuMetrics>,
}

impl TrackFanout {
    pub fn new(
        remote: Arc<TrackRemote>,
        room: String,
        metrics: Arc<SfuMetrics>,
        uploader: Arc<dyn RecordingUploader>,
    ) -> Self {
        Self {
            remote,
            room,
            locals: RwLock::new(Vec::new()),
            recorder: RecorderSlot::new(uploader),
            closed: CancellationToken::new(),
            metrics,
        }
    }

    /// Install a recording writer. Installing after the read loop started
    /// is allowed; packets read before the install are simply not recorded.
    pub fn set_recorder(&self, writer: RtpWriter, path: PathBuf) {
        self.recorder.install(writer, path);
    }

    /// Mirror this track into `pc`. Any failure leaves the subscriber
    /// without this one track and is not reported: the subscription as a
    /// whole stays valid.
    pub async fn attach_to_subscriber(&self, pc: &Arc<RTCPeerConnection>) {
        let codec = self.remote.codec().capability;
        let local = Arc::new(TrackLocalStaticRTP::new(
            codec,
            self.remote.id(),
            self.remote.stream_id(),
        ));

        let sender = match pc
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
        {
            Ok(sender) => sender,
            Err(e) => {
                debug!(room = %self.room, track = %self.remote.id(), error = %e, "add_track failed, skipping subscriber");
                return;
            }
        };

        // The sender-side RTCP stream must be drained or the interceptor
        // pipeline stalls. The task ends when the peer connection closes
        // the sender.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; RECEIVE_MTU];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        self.locals.write().push(Subscription {
            conn: Arc::downgrade(pc),
            local,
        });
    }

    /// Stop replicating to `pc`. Dead entries from connections that were
    /// dropped without a detach are pruned on the way.
    pub fn detach_from_subscriber(&self, pc: &Arc<RTCPeerConnection>) {
        self.locals.write().retain(|sub| match sub.conn.upgrade() {
            Some(conn) => !Arc::ptr_eq(&conn, pc),
            None => false,
        });
    }

    /// Idempotent. The first caller stops the read loop and closes the
    /// recorder, which schedules exactly one upload.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.recorder.close_and_upload();
    }

    /// Read RTP from the remote track until EOF or close, replicating each
    /// packet to all currently attached subscribers.
    pub async fn read_loop(&self) {
        let mut buf = vec![0u8; RECEIVE_MTU];
        loop {
            let pkt = tokio::select! {
                _ = self.closed.cancelled() => break,
                res = self.remote.read(&mut buf) => match res {
                    Ok((pkt, _)) => pkt,
                    // Includes the normal EOF when the publisher goes away.
                    Err(_) => break,
                },
            };

            // Ingress traffic counts even when the packet turns out to be
            // malformed.
            self.metrics.add_rtp_bytes(&self.room, pkt.marshal_size());
            self.metrics.inc_rtp_packets(&self.room);

            self.recorder.write(&pkt);

            let targets: Vec<Arc<TrackLocalStaticRTP>> = {
                let locals = self.locals.read();
                locals
                    .iter()
                    .filter(|sub| sub.conn.strong_count() > 0)
                    .map(|sub| Arc::clone(&sub.local))
                    .collect()
            };
            for local in targets {
                // Each subscriber gets its own packet value so send-side
                // header rewrites cannot bleed across destinations.
                let _ = local.write_rtp(&isolated_copy(&pkt)).await;
            }
        }
        info!(room = %self.room, track = %self.remote.id(), "track fan-out stopped");
    }
}

/// Copy a packet for one fan-out destination: fresh header struct, payload
/// bytes copied out of the shared read buffer.
fn isolated_copy(pkt: &rtp::packet::Packet) -> rtp::packet::Packet {
    rtp::packet::Packet {
        header: pkt.header.clone(),
        payload: Bytes::copy_from_slice(&pkt.payload),
    }
}
