//! clausegraph-orchestration: analysis runs over the compliance core
//!
//! Wires the core and the section store into the operator-facing workflows:
//!
//! - [`ingest`]: document ingest (normalize, decompose, embed, persist) and
//!   the standards diff workflow (identify, gate, diff)
//! - [`impact`]: change-impact detection with bounded fan-out and deadlines
//! - [`coverage`]: framework coverage assessment and catalog seeding
//! - [`traceability`]: document hierarchy from extracted cross-references
//! - [`reports`]: run and impact persistence, JSON/CSV export, review flow
//!
//! Service handles (store, embedding provider, reranker) are constructed at
//! startup and passed in explicitly, so tests swap deterministic doubles.

pub mod coverage;
pub mod error;
pub mod impact;
pub mod ingest;
pub mod rationale;
pub mod reports;
pub mod run;
pub mod traceability;

pub use coverage::{iso_13485_catalog, load_catalog_json, CoverageService};
pub use error::{AnalysisError, Result};
pub use impact::{ChangeImpactAnalyzer, DeltaInput};
pub use ingest::{IngestReceipt, IngestService, SectionInput, StandardsAnalysis, StandardsDiffService};
pub use reports::{ReportStore, StoredRun};
pub use run::{AnalysisRun, RunState};
pub use traceability::{HierarchyNode, TraceabilityService};

/// Install a tracing subscriber honoring `RUST_LOG`, for binaries and tests.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
