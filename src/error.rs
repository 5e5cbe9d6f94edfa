/// Error types for Tessera operations.
///
/// One enum covers the failure modes of the whole crate. Data-path errors
/// (`KeyNotFound`, `TreeUnbuilt`) are ordinary and surfaced to the caller;
/// background-loop errors (`PeerUnreachable`) are logged by the loops and
/// never propagated; configuration and TLS errors are fatal at startup.
use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Configuration failed validation; fatal at startup.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },

    /// Key not present in the store.
    #[error("key '{key}' not found")]
    KeyNotFound {
        /// The key that was not found
        key: String,
    },

    /// Diff requested on a Merkle tree without a root.
    #[error("cannot diff: merkle tree not built")]
    TreeUnbuilt,

    /// A wire body failed to decode; returned to the sender as HTTP 400.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A peer could not be reached or answered badly. Background loops log
    /// and drop these; the next tick is the retry.
    #[error("peer '{peer}' unreachable: {reason}")]
    PeerUnreachable {
        /// Base URL of the peer
        peer: String,
        /// Transport-level detail
        reason: String,
    },

    /// Not enough replica acknowledgements within the quorum threshold.
    #[error("quorum not met: {acks} of {required} required acks")]
    QuorumNotMet {
        /// Acks actually received
        acks: usize,
        /// Acks the quorum requires
        required: usize,
    },

    /// mTLS material unreadable or invalid; fatal at startup.
    #[error("TLS setup failed: {reason}")]
    TlsSetup {
        /// What went wrong while loading certificates or keys
        reason: String,
    },

    /// Storage backend failure. The in-memory store never produces this;
    /// it exists for persistent backends behind the same trait.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;
