//! A room couples at most one publisher with any number of subscribers and
//! owns the fan-out of every published track.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::track::track_remote::TrackRemote;

use livertc_core::{Config, RecordingUploader, SfuMetrics};

use crate::error::{Result, SfuError};
use crate::fanout::TrackFanout;
use crate::recorder::open_recorder;

const FALLBACK_STUN: &str = "stun:stun.l.google.com:19302";
const PLI_INTERVAL: Duration = Duration::from_secs(2);

/// Point-in-time room snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RoomInfo {
    pub name: String,
    pub has_publisher: bool,
    pub tracks: usize,
    pub subscribers: usize,
}

#[derive(Default)]
struct RoomState {
    publisher: Option<Arc<RTCPeerConnection>>,
    tracks: HashMap<String, Arc<TrackFanout>>,
    subscribers: Vec<Arc<RTCPeerConnection>>,
}

pub struct Room {
    name: String,
    state: RwLock<RoomState>,
    cfg: Arc<Config>,
    metrics: Arc<SfuMetrics>,
    uploader: Arc<dyn RecordingUploader>,
}

impl Room {
    pub fn new(
        name: impl Into<String>,
        cfg: Arc<Config>,
        metrics: Arc<SfuMetrics>,
        uploader: Arc<dyn RecordingUploader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: RwLock::new(RoomState::default()),
            cfg,
            metrics,
            uploader,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> RoomInfo {
        let st = self.state.read();
        RoomInfo {
            name: self.name.clone(),
            has_publisher: st.publisher.is_some(),
            tracks: st.tracks.len(),
            subscribers: st.subscribers.len(),
        }
    }

    fn ice_configuration(&self) -> RTCConfiguration {
        let mut servers = Vec::new();
        if !self.cfg.ice.stun.is_empty() {
            servers.push(RTCIceServer {
                urls: self.cfg.ice.stun.clone(),
                ..Default::default()
            });
        }
        if !self.cfg.ice.turn.is_empty() {
            servers.push(RTCIceServer {
                urls: self.cfg.ice.turn.clone(),
                username: self.cfg.ice.turn_username.clone(),
                credential: self.cfg.ice.turn_password.clone(),
            });
        }
        if servers.is_empty() {
            servers.push(RTCIceServer {
                urls: vec![FALLBACK_STUN.to_string()],
                ..Default::default()
            });
        }
        RTCConfiguration {
            ice_servers: servers,
            ..Default::default()
        }
    }

    async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Arc::new(
            api.new_peer_connection(self.ice_configuration()).await?,
        ))
    }

    /// Accept a publisher's SDP offer and return the answer once ICE
    /// gathering completed (the WHIP client expects a non-trickle answer).
    pub async fn publish(self: &Arc<Self>, offer_sdp: String) -> Result<String> {
        if self.state.read().publisher.is_some() {
            return Err(SfuError::PublisherExists);
        }

        let pc = self.new_peer_connection().await?;

        {
            let room = Arc::downgrade(self);
            let conn = Arc::downgrade(&pc);
            pc.on_ice_connection_state_change(Box::new(move |state| {
                if is_terminal_ice_state(state) {
                    let room = room.clone();
                    let conn = conn.clone();
                    tokio::spawn(async move {
                        if let (Some(room), Some(conn)) = (room.upgrade(), conn.upgrade()) {
                            room.close_publisher(conn).await;
                        }
                    });
                }
                Box::pin(async {})
            }));
        }

        {
            let room = Arc::downgrade(self);
            pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
                let room = room.clone();
                Box::pin(async move {
                    if let Some(room) = room.upgrade() {
                        room.accept_track(remote).await;
                    }
                })
            }));
        }

        let answer = negotiate(&pc, offer_sdp).await?;

        {
            let mut st = self.state.write();
            if st.publisher.is_some() {
                // Lost the race against a concurrent publish.
                drop(st);
                let _ = pc.close().await;
                return Err(SfuError::PublisherExists);
            }
            st.publisher = Some(Arc::clone(&pc));
        }
        info!(room = %self.name, "publisher connected");

        Ok(answer)
    }

    /// Accept a subscriber's SDP offer, mirror every live track into the
    /// new connection and return the non-trickle answer.
    pub async fn subscribe(self: &Arc<Self>, offer_sdp: String) -> Result<String> {
        let max_subs = self.cfg.sfu.max_subs_per_room;
        if max_subs > 0 && self.state.read().subscribers.len() >= max_subs {
            return Err(SfuError::SubscriberLimit);
        }

        let pc = self.new_peer_connection().await?;

        {
            let room = Arc::downgrade(self);
            let conn = Arc::downgrade(&pc);
            pc.on_ice_connection_state_change(Box::new(move |state| {
                if is_terminal_ice_state(state) {
                    let room = room.clone();
                    let conn = conn.clone();
                    tokio::spawn(async move {
                        if let (Some(room), Some(conn)) = (room.upgrade(), conn.upgrade()) {
                            room.remove_subscriber(conn).await;
                        }
                    });
                }
                Box::pin(async {})
            }));
        }

        let fanouts: Vec<Arc<TrackFanout>> =
            self.state.read().tracks.values().cloned().collect();
        for fanout in &fanouts {
            fanout.attach_to_subscriber(&pc).await;
        }

        let answer = negotiate(&pc, offer_sdp).await?;

        self.state.write().subscribers.push(Arc::clone(&pc));
        self.metrics.inc_subscribers(&self.name);
        info!(room = %self.name, "subscriber connected");

        Ok(answer)
    }

    /// Wire a freshly announced publisher track into the room: fan it out
    /// to current subscribers, start its read loop and PLI ticker, and
    /// record it when configured.
    async fn accept_track(self: Arc<Self>, remote: Arc<TrackRemote>) {
        let track_id = remote.id();
        let mime_type = remote.codec().capability.mime_type.clone();
        info!(room = %self.name, track = %track_id, codec = %mime_type, "publisher track");

        let fanout = Arc::new(TrackFanout::new(
            Arc::clone(&remote),
            self.name.clone(),
            Arc::clone(&self.metrics),
            Arc::clone(&self.uploader),
        ));

        if self.cfg.recording.enabled {
            if let Some((writer, path)) =
                open_recorder(&mime_type, &self.cfg.recording.dir, &self.name, &track_id)
            {
                fanout.set_recorder(writer, path);
            }
        }

        let subscribers = {
            let mut st = self.state.write();
            st.tracks.insert(track_id, Arc::clone(&fanout));
            st.subscribers.clone()
        };
        for sub in &subscribers {
            fanout.attach_to_subscriber(sub).await;
        }

        {
            let fanout = Arc::clone(&fanout);
            tokio::spawn(async move {
                fanout.read_loop().await;
            });
        }

        // Periodic PLI keeps the publisher emitting keyframes so that
        // late joiners get a decodable picture within a couple of seconds.
        let room = Arc::downgrade(&self);
        let media_ssrc = remote.ssrc();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PLI_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(room) = room.upgrade() else {
                    return;
                };
                let publisher = room.state.read().publisher.clone();
                let Some(publisher) = publisher else {
                    return;
                };
                let _ = publisher
                    .write_rtcp(&[Box::new(PictureLossIndication {
                        sender_ssrc: 0,
                        media_ssrc,
                    })])
                    .await;
            }
        });
    }

    /// Tear down the publisher side. No-op when `pc` is not the current
    /// publisher, which makes racing ICE callbacks and admin closes safe.
    /// Subscribers stay registered; their tracks simply go idle.
    pub(crate) async fn close_publisher(&self, pc: Arc<RTCPeerConnection>) {
        let fanouts = {
            let mut st = self.state.write();
            let is_current = st
                .publisher
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &pc));
            if is_current {
                st.publisher = None;
                std::mem::take(&mut st.tracks)
            } else {
                HashMap::new()
            }
        };
        if !fanouts.is_empty() {
            info!(room = %self.name, tracks = fanouts.len(), "publisher disconnected");
        }
        for fanout in fanouts.values() {
            fanout.close();
        }
        let _ = pc.close().await;
    }

    /// Detach a subscriber from every fan-out and forget it. Safe to call
    /// more than once for the same connection.
    pub(crate) async fn remove_subscriber(&self, pc: Arc<RTCPeerConnection>) {
        let was_registered = {
            let mut st = self.state.write();
            let before = st.subscribers.len();
            st.subscribers.retain(|sub| !Arc::ptr_eq(sub, &pc));
            let removed = st.subscribers.len() != before;
            if removed {
                for fanout in st.tracks.values() {
                    fanout.detach_from_subscriber(&pc);
                }
            }
            removed
        };
        let _ = pc.close().await;
        if was_registered {
            self.metrics.dec_subscribers(&self.name);
            debug!(room = %self.name, "subscriber removed");
        }
    }

    /// Close every connection and fan-out in the room.
    pub async fn close(&self) {
        let (publisher, fanouts, subscribers) = {
            let mut st = self.state.write();
            (
                st.publisher.take(),
                std::mem::take(&mut st.tracks),
                std::mem::take(&mut st.subscribers),
            )
        };

        if let Some(pc) = publisher {
            let _ = pc.close().await;
        }
        for fanout in fanouts.values() {
            fanout.close();
        }
        for sub in subscribers {
            let _ = sub.close().await;
        }
        self.metrics.set_subscribers(&self.name, 0);
        info!(room = %self.name, "room closed");
    }
}

fn is_terminal_ice_state(state: RTCIceConnectionState) -> bool {
    matches!(
        state,
        RTCIceConnectionState::Failed
            | RTCIceConnectionState::Disconnected
            | RTCIceConnectionState::Closed
    )
}

/// Apply the remote offer and produce a complete local answer, waiting for
/// ICE gathering so the SDP carries all candidates. The connection is
/// closed before any error is reported.
async fn negotiate(pc: &Arc<RTCPeerConnection>, offer_sdp: String) -> Result<String> {
    match negotiate_inner(pc, offer_sdp).await {
        Ok(answer) => Ok(answer),
        Err(e) => {
            let _ = pc.close().await;
            Err(e)
        }
    }
}

async fn negotiate_inner(pc: &Arc<RTCPeerConnection>, offer_sdp: String) -> Result<String> {
    let offer = RTCSessionDescription::offer(offer_sdp)?;
    pc.set_remote_description(offer).await?;
    let answer = pc.create_answer(None).await?;
    let mut gather_complete = pc.gathering_complete_promise().await;
    pc.set_local_description(answer).await?;
    let _ = gather_complete.recv().await;

    match pc.local_description().await {
        Some(desc) => Ok(desc.sdp),
        None => Err(SfuError::Negotiation(webrtc::Error::new(
            "local description unavailable".to_string(),
        ))),
    }
}
