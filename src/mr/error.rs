//! Engine-wide error type.
//!
//! The Go source this was ported from relies on bare `error` returns and
//! `log.Panic`. This rewrite gives each error kind a name so callers can
//! match on it, while still letting `?` compose against `anyhow::Error`
//! at RPC boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MrError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker bind failed: no free port found in {attempts} candidates starting at {start}")]
    PortExhausted { start: u16, attempts: u32 },

    #[error("worker registration failed after {attempts} attempts: {source}")]
    RegistrationFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("rpc call `{call}` failed: {source}")]
    Rpc {
        call: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("plugin `{0}` not found in registry")]
    UnknownPlugin(String),

    #[error("job cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MrError>;
