//! Domain error taxonomy shared across the workspace.

/// Errors produced by domain logic and surfaced through every layer.
///
/// Variants map onto the failure classes of the analysis pipeline:
/// unreadable sources never start processing, inference failures abort
/// the owning job, store failures must not leave partial frame writes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Input failed validation before any processing started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The video file could not be opened or probed.
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    /// A Detector or Classifier call failed. The message carries the
    /// collaborator's error text verbatim so it can be recorded on the job.
    #[error("Inference failure: {0}")]
    Inference(String),

    /// The result store rejected an operation.
    #[error("Store unavailable: {0}")]
    Store(String),

    /// Anything else. Message is logged server-side and sanitized at the
    /// HTTP boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}
