//! Background job instrumentation.
//!
//! For index lifecycle work: builds, snapshot save/load, batch embedding.
//! Uses INTERNAL span kind since these are not store client operations.

use tracing::{field, span, Level, Span};

/// Background job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundJobType {
    /// Full index rebuild from the rule store
    IndexBuild,
    /// Snapshot write
    IndexSave,
    /// Snapshot read
    IndexLoad,
    /// Batch embedding of rule texts
    EmbeddingGeneration,
}

impl BackgroundJobType {
    /// Get job type as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexBuild => "index.build",
            Self::IndexSave => "index.save",
            Self::IndexLoad => "index.load",
            Self::EmbeddingGeneration => "embedding.generate",
        }
    }
}

/// Create background job span.
///
/// # Arguments
///
/// * `job_type` - Type of background job
/// * `target` - Job target (snapshot directory, model name, ...)
///
/// # Example
///
/// ```rust,ignore
/// let span = background_span(BackgroundJobType::IndexBuild, "rules");
/// let _guard = span.enter();
/// ```
pub fn background_span(job_type: BackgroundJobType, target: &str) -> Span {
    span!(
        Level::INFO,
        "background.job",
        otel.name = format!("{} {}", job_type.as_str(), target),
        otel.kind = "internal",
        job.type = job_type.as_str(),
        job.target = target,
        job.batch_size = field::Empty,
        job.duration_ms = field::Empty,
        job.status = field::Empty,
    )
}

/// Record job outcome on `span`.
///
/// * `batch_size` - Number of items processed (optional)
/// * `duration_ms` - Processing duration in milliseconds (optional)
/// * `status` - Job status ("success", "failed")
pub fn record_background_metrics(
    span: &Span,
    batch_size: Option<usize>,
    duration_ms: Option<u64>,
    status: &str,
) {
    if let Some(size) = batch_size {
        span.record("job.batch_size", size);
    }
    if let Some(duration) = duration_ms {
        span.record("job.duration_ms", duration);
    }
    span.record("job.status", status);
}
