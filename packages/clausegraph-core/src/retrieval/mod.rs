//! Hybrid retrieval over indexed sections
//!
//! ```text
//! query ──► lexical (trigram) ──┐
//!       ──► dense (cosine)   ───┼──► merge ──► cross-encoder ──► confidence
//!                               └── absent leg scores 0
//! ```

pub mod confidence;
mod hybrid;
mod ports;
mod rerank;
pub mod trigram;

pub use confidence::{calibrate, ConfidenceWeights};
pub use hybrid::HybridRetriever;
pub use ports::{ScoredSection, SectionSearch};
pub use rerank::{HttpReranker, HttpRerankerConfig, Reranker};
