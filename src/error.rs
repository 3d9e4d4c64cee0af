//! Error taxonomy for the handshake engine.
//!
//! Parse and protocol failures never produce a reply on the wire; they are
//! surfaced here so the caller and the local traces can tell them apart.

use {crate::frame::FrameError, thiserror::Error};

pub type Result<T, E = SaeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SaeError {
    /// Malformed, undersized or out-of-range field in a received frame.
    /// The offending frame is dropped without a reply.
    #[error("malformed frame: {0}")]
    Parse(#[from] FrameError),

    /// Well-formed frame that violates the protocol (reflection, group
    /// downgrade, replayed confirm counter). Dropped without a reply.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Peer named a password identifier with no configured credential.
    #[error("unknown password identifier")]
    UnknownPasswordIdentifier,

    /// No group acceptable to both peers remains to negotiate.
    #[error("no acceptable group remains")]
    NoAcceptableGroup,

    /// Local resource failure (random source, derivation budget). Fatal to
    /// the current handshake attempt only.
    #[error("resource exhaustion: {0}")]
    Resource(&'static str),

    /// Bounded retransmission and renegotiation attempts were exceeded.
    #[error("handshake timed out")]
    Timeout,
}
