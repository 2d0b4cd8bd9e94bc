//! error types for the deck-dealing protocol

use thiserror::Error;

/// protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// malformed or unrecognized wire message, fatal to the connection
    #[error("malformed wire message: {0}")]
    BadFormat(String),

    /// challenge mismatch or bad response signature, no retry budget
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// signature verification failed during the pipeline or reveal,
    /// fatal to the whole session
    #[error("signature verification failed: {0}")]
    BadSignature(String),

    /// decrypted deck has the wrong size, duplicate values or values
    /// out of range, fatal to the whole session
    #[error("deck validation failed: {0}")]
    InvalidDeck(String),

    /// a slot failed to decrypt while peeling a layer
    #[error("decryption failed while peeling layer {0}")]
    DecryptionFailed(u32),

    /// message arrived in a state that does not expect it
    #[error("message out of turn: {0}")]
    OutOfTurn(String),

    /// peer closed the connection in the middle of a frame
    #[error("peer disconnected mid-frame")]
    PeerDisconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
