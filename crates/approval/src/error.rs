//! Authorization gate error types.

use crate::RequestToken;
use thiserror::Error;

/// Gate errors.
///
/// Both variants are client-usage faults: the caller resolved a token that
/// was never issued, was already consumed, or sat unanswered too long.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// No pending proposal exists for this token.
    #[error("unknown request token: {0}")]
    UnknownToken(RequestToken),

    /// The proposal outlived the gate's time-to-live and was discarded.
    #[error("request token expired: {0}")]
    Expired(RequestToken),
}

pub type Result<T> = std::result::Result<T, Error>;
