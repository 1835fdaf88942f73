//! Pipeline error taxonomy.
//!
//! Every variant maps to a failure class with a defined job outcome:
//! source and inference errors abort the owning job (fail-fast), store
//! errors do the same rather than dropping frames silently, and
//! cancellation is a clean stop between batches.

use skyguard_db::catalog::CatalogError;
use skyguard_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The video could not be opened, probed, or decoded.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// A Detector or Classifier call failed; the collaborator's error
    /// text is preserved verbatim for the job record.
    #[error("inference failure: {0}")]
    Inference(String),

    /// The result store rejected a write. The job fails rather than
    /// continuing with gaps in its result set.
    #[error("result store error: {0}")]
    Store(#[from] StoreError),

    /// The durable record store rejected a write.
    #[error("record store error: {0}")]
    Catalog(#[from] CatalogError),

    /// The job was cancelled between batches (shutdown or explicit stop).
    #[error("job cancelled")]
    Cancelled,
}
