//! clausegraph-storage: tenant-scoped persistent section index
//!
//! # Core contracts
//!
//! 1. **Tenant isolation**: every read and write is tenant-scoped; a query
//!    without a tenant id is refused, and no result ever crosses tenants.
//! 2. **Transactional ingest**: a document's sections and their embeddings
//!    persist together or not at all.
//! 3. **Coherent cache**: search legs scan an in-memory tenant snapshot
//!    that is invalidated by every write to that tenant.
//!
//! # Usage
//!
//! ```rust,ignore
//! use clausegraph_storage::{SectionFilter, SectionStore, SqliteSectionStore};
//!
//! let store = SqliteSectionStore::connect("sqlite://clausegraph.db", 1536).await?;
//! store.upsert_document(&doc).await?;
//! store.upsert_sections(&tenant, doc.doc_id, sections, vectors).await?;
//! let qsp = store
//!     .get_sections(&tenant, &SectionFilter { doc_kind: Some(DocKind::Qsp), ..Default::default() })
//!     .await?;
//! ```

pub mod cache;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use cache::TenantCache;
pub use domain::{CatalogStore, SectionFilter, SectionStore, StoredSection};
pub use error::{Result, StorageError};
pub use infrastructure::SqliteSectionStore;
