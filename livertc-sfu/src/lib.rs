//! livertc SFU core.
//!
//! A selective forwarding unit for one publisher and many subscribers per
//! named room. The SFU never touches media payloads: it reads RTP from the
//! publisher's tracks and replicates each packet to every subscriber,
//! requesting keyframes on a fixed cadence so late joiners lock on quickly.
//!
//! ## Architecture
//!
//! - [`Manager`]: registry of rooms, entry point for signaling
//! - [`Room`]: one publisher slot plus a set of subscribers and fan-outs
//! - [`TrackFanout`]: per-track read loop replicating RTP to subscribers,
//!   with optional OGG/IVF recording and upload on close
//!
//! Signaling is non-trickle WHIP/WHEP: callers hand in a complete SDP
//! offer and get back an answer with all ICE candidates gathered.

mod error;
mod fanout;
mod manager;
mod recorder;
mod room;

pub use error::{Result, SfuError};
pub use webrtc::Error as WebRtcError;
pub use fanout::TrackFanout;
pub use manager::Manager;
pub use recorder::{open_recorder, RtpWriter};
pub use room::{Room, RoomInfo};
