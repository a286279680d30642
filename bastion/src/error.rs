//! Collection of error handling types and aliases.

use thiserror::Error;

use crate::wire::DisconnectReason;

/// The disconnection side for [`DisconnectError`].
#[derive(Debug, Clone, Copy)]
pub enum DisconnectedBy {
    /// The session has been disconnected by _us_.
    Us,

    /// The session has been disconnected by _them_.
    Them,
}

/// The error type describing disconnect.
#[must_use]
#[derive(Debug, Error, Clone)]
#[error("The session has been disconnected by {by:?} for {reason:?}: {description}")]
pub struct DisconnectError {
    /// Side that sent the disconnect message.
    pub by: DisconnectedBy,

    /// Reason for disconnect.
    pub reason: DisconnectReason,

    /// Description of the disconnect reason.
    pub description: String,
}

/// The error types that can occur when manipulating this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// I/O Error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A packet that does not decode as its message mandates.
    #[error("Malformed packet: {0}")]
    Malformed(&'static str),

    /// The message received was unexpected in the current context.
    #[error("Peer sent a message that made no sense in the current context")]
    UnexpectedMessage,

    /// A MAC algorithm name outside of the catalog.
    #[error("Unknown MAC algorithm `{0}`")]
    UnknownMac(String),

    /// A MAC key that is missing or too short for the algorithm.
    #[error("MAC key missing or too short for the algorithm")]
    InvalidMacKey,

    /// Packet integrity error.
    #[error(transparent)]
    Integrity(#[from] digest::MacError),

    /// An authentication method list that does not validate.
    #[error("Invalid authentication method list: {0}")]
    InvalidMethodList(String),

    /// Every configured authentication method list was eliminated.
    #[error("No authentication method list usable after eliminating disabled methods")]
    NoMethodsRemain,

    /// The session has been disconnected.
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),

    /// A state that should be unreachable has been reached.
    #[error("Internal error: {0}")]
    Internal(&'static str),
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
