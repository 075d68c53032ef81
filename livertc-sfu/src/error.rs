use thiserror::Error;

#[derive(Error, Debug)]
pub enum SfuError {
    #[error("publisher already exists in this room")]
    PublisherExists,

    #[error("subscriber limit reached")]
    SubscriberLimit,

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, SfuError>;
