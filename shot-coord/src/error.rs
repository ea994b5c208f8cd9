use std::time::Duration;

/// Errors produced while talking to the coordination store.
///
/// None of these are authoritative: the store may or may not have applied the
/// script. Primitives surface them as [`crate::Decision::Error`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached, or the connection dropped mid-call.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// The round-trip did not complete within the configured operation timeout.
    #[error("coordination store timed out after {0:?}")]
    Timeout(Duration),

    /// The store rejected the script itself (wrong key type, bad argument).
    #[error("script `{script}` failed: {reason}")]
    Script {
        /// The script that failed.
        script: &'static str,
        /// What the store reported.
        reason: String,
    },

    /// The script ran but returned a shape the primitive cannot interpret.
    #[error("unexpected reply from script `{script}`: {reply}")]
    UnexpectedReply {
        /// The script that replied.
        script: &'static str,
        /// A rendering of the reply.
        reply: String,
    },
}

impl StoreError {
    /// True when the script reply could not be interpreted.
    pub fn is_unexpected_reply(&self) -> bool {
        matches!(self, StoreError::UnexpectedReply { .. })
    }
}
