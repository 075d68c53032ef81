//! HTTP surface of the livertc SFU: WHIP publish and WHEP play signaling,
//! room and recording listings, admin room close, health and metrics.

pub mod http;

pub use http::{create_router, AppState, AuthPolicy, RateLimiter};
