//! Caller-facing error codes.
//!
//! Every RPC reply carries one of these as its primary result channel:
//! `Ok(..)` stands for `DM_OK` / `WS_OK`, and side-channel outputs are only
//! meaningful on `Ok`.  Backend error codes never appear here; registries
//! translate them into [`DmError::Backend`] with a message.
//!
//! # Error classes
//!
//! | Class | Variants |
//! |-------|----------|
//! | Precondition | `ScreenNotFound`, `InvalidSession`, `InvalidParam`, `InvalidOperation` |
//! | Transient    | `ProxyNotReady`, `Timeout` (caller may retry later) |
//! | Expected race | `WsError::DoNothing` |

use thiserror::Error;

use crate::domain::screen_identity::ScreenId;
use crate::domain::session::SessionId;

/// Display / screen manager errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DmError {
    /// The logical screen id is not registered.
    #[error("screen not found: {0}")]
    ScreenNotFound(ScreenId),

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The operation is not valid for this screen (e.g. mirroring from a
    /// virtual source, destroying a real screen).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The remote display manager could not be reached; retry later.
    #[error("display manager proxy not ready")]
    ProxyNotReady,

    /// The operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The rendering backend rejected the request.
    #[error("backend call failed: {0}")]
    Backend(String),
}

/// Window session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WsError {
    /// Nothing changed.  Returned for no-op requests and for expected races
    /// (e.g. focusing a session that is being torn down).
    #[error("nothing to do")]
    DoNothing,

    #[error("invalid session: {0}")]
    InvalidSession(SessionId),

    /// The request is understood but not allowed in the current state.
    #[error("invalid operation")]
    InvalidOperation,

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The remote session manager could not be reached; retry later.
    #[error("session manager proxy not ready")]
    ProxyNotReady,

    #[error("operation timed out")]
    Timeout,
}
