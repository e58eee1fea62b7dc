//! Tracing instrumentation for the rule index.
//!
//! Span fields follow the OpenTelemetry naming used by `tracing-opentelemetry`
//! (`otel.name`, `otel.kind`), so the spans export cleanly if a collector
//! layer is installed. Nothing here depends on an exporter.
//!
//! **Store spans** (`db_span`): `{db.operation.name} {collection}`, client kind.
//!
//! **Background jobs** (`background_span`): index build/save/load and batch
//! embedding, internal kind, with `job.type`, `job.status`, `job.batch_size`
//! and `job.duration_ms`.

pub mod background;
pub mod db;

pub use background::{background_span, record_background_metrics, BackgroundJobType};
pub use db::{db_span, DbOperation};
