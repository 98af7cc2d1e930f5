//! Error taxonomy of the simulator.
//!
//! Only [`Error::Timeout`] is ever recovered: the RPC call sites convert it
//! into a skipped peer (lookup) or an evicted bucket head (routing table).
//! Every other variant aborts the simulation run and surfaces through the
//! binary as a nonzero exit.

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A constructor parameter was outside its documented range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Too many consecutive identifier collisions while joining nodes.
    ///
    /// This is a safety bound, not a normal outcome: it only trips when the
    /// identifier space is so saturated that fresh random identifiers keep
    /// landing on already-joined nodes.
    #[error("identifier space exhausted after {attempts} colliding joins")]
    IdentifierSpaceExhausted { attempts: usize },

    /// A simulated RPC did not answer in time.
    #[error("rpc timeout")]
    Timeout,
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
