use thiserror::Error;

use crate::channel::ChannelState;

/// Every failure the core pipeline can surface to a caller. The policy for
/// *where* an error ends up (returned, logged, or both) is documented on
/// the operation that raises it, not here.
#[derive(Debug, Error)]
pub enum PerfkitError {
    #[error("operation not valid in channel state {current:?}")]
    InvalidState { current: ChannelState },

    #[error("no such {kind} with id {id}")]
    NotFound { kind: &'static str, id: usize },

    #[error("channel has no spawner source, no target path, and no pid to attach to")]
    NoTarget,

    #[error("failed to spawn target process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("no factory registered for {kind} kind {name:?}")]
    InvalidKind { kind: &'static str, name: String },

    /// Unreachable today: `RowType` is a closed Rust enum, so the type
    /// system already rejects anything outside the stable set at compile
    /// time. Kept for parity with the wire format's error table and as the
    /// slot a future row type would return if it were added to the wire
    /// format before this enum caught up.
    #[error("manifest row type is not in the stable wire-format set")]
    UnsupportedType,

    #[error("encoder rejected a batch: {0}")]
    EncoderFailure(String),

    #[error("listener peer for subscription {0} is gone")]
    PeerGone(usize),
}

pub type Result<T> = std::result::Result<T, PerfkitError>;
