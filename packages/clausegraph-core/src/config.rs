//! Engine configuration
//!
//! Every option is read from the process environment and carries a default,
//! so a bare environment yields a working engine. Invalid values fall back
//! to the default with a warning rather than failing startup.

use tracing::warn;

/// Runtime configuration for the retrieval and change-impact engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Fixed embedding dimension; every stored vector must match it
    pub embedding_dim: usize,
    /// Truncation applied immediately before an embedding call
    pub embedding_max_chars: usize,
    /// Cosine similarity floor for reporting an impact
    pub impact_sim_threshold: f64,
    /// Lexical candidate cap for hybrid retrieval
    pub hybrid_bm25_k: usize,
    /// Vector candidate cap for hybrid retrieval
    pub hybrid_vec_k: usize,
    /// Concurrent deltas per analysis run
    pub delta_fanout: usize,
    /// Per-delta wall-clock deadline in seconds
    pub delta_deadline_sec: u64,
    /// Whole-run deadline in seconds
    pub run_deadline_sec: u64,
    /// Cross-encoder rerank stage toggle
    pub rerank_enabled: bool,
    /// Enforce the standard-identification gate; when false, any identified
    /// pair of standards is diffed and the gate outcome is informational
    pub gate_enforced: bool,
    /// Rationale tier: similarity above this reads "Strong"
    pub strength_strong: f64,
    /// Rationale tier: similarity above this reads "Moderate"
    pub strength_moderate: f64,
    /// Confidence weights: lexical, vector, rerank, clause-id bonus
    pub conf_w_bm25: f64,
    pub conf_w_vector: f64,
    pub conf_w_rerank: f64,
    pub conf_w_clause: f64,
    /// In-flight request cap on the embedding provider connection pool
    pub embed_concurrency: usize,
    /// Inputs per embedding request batch
    pub embed_batch_size: usize,
    /// Retries after the first attempt on transient store faults
    pub store_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 1536,
            embedding_max_chars: 16_000,
            impact_sim_threshold: 0.55,
            hybrid_bm25_k: 50,
            hybrid_vec_k: 50,
            delta_fanout: 8,
            delta_deadline_sec: 30,
            run_deadline_sec: 600,
            rerank_enabled: true,
            gate_enforced: true,
            strength_strong: 0.75,
            strength_moderate: 0.65,
            conf_w_bm25: 0.20,
            conf_w_vector: 0.30,
            conf_w_rerank: 0.45,
            conf_w_clause: 0.05,
            embed_concurrency: 16,
            embed_batch_size: 64,
            store_retries: 2,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            embedding_dim: env_parse("EMBEDDING_DIM", d.embedding_dim),
            embedding_max_chars: env_parse("EMBEDDING_MAX_CHARS", d.embedding_max_chars),
            impact_sim_threshold: env_parse("IMPACT_SIM_THRESHOLD", d.impact_sim_threshold),
            hybrid_bm25_k: env_parse("HYBRID_BM25_K", d.hybrid_bm25_k),
            hybrid_vec_k: env_parse("HYBRID_VEC_K", d.hybrid_vec_k),
            delta_fanout: env_parse("DELTA_FANOUT", d.delta_fanout),
            delta_deadline_sec: env_parse("DELTA_DEADLINE_SEC", d.delta_deadline_sec),
            run_deadline_sec: env_parse("RUN_DEADLINE_SEC", d.run_deadline_sec),
            rerank_enabled: env_parse("RERANK_ENABLED", d.rerank_enabled),
            gate_enforced: env_parse("GATE_ENFORCED", d.gate_enforced),
            strength_strong: env_parse("STRENGTH_STRONG", d.strength_strong),
            strength_moderate: env_parse("STRENGTH_MODERATE", d.strength_moderate),
            conf_w_bm25: env_parse("CONF_W_BM25", d.conf_w_bm25),
            conf_w_vector: env_parse("CONF_W_VECTOR", d.conf_w_vector),
            conf_w_rerank: env_parse("CONF_W_RERANK", d.conf_w_rerank),
            conf_w_clause: env_parse("CONF_W_CLAUSE", d.conf_w_clause),
            embed_concurrency: env_parse("EMBED_CONCURRENCY", d.embed_concurrency),
            embed_batch_size: env_parse("EMBED_BATCH_SIZE", d.embed_batch_size),
            store_retries: env_parse("STORE_RETRIES", d.store_retries),
        }
        .validated()
    }

    /// Clamp out-of-range values back to safe defaults.
    fn validated(mut self) -> Self {
        let d = Self::default();
        if self.embedding_dim == 0 {
            warn!("EMBEDDING_DIM must be positive, using {}", d.embedding_dim);
            self.embedding_dim = d.embedding_dim;
        }
        if !(0.0..=1.0).contains(&self.impact_sim_threshold) {
            warn!(
                "IMPACT_SIM_THRESHOLD out of [0,1], using {}",
                d.impact_sim_threshold
            );
            self.impact_sim_threshold = d.impact_sim_threshold;
        }
        if self.delta_fanout == 0 {
            self.delta_fanout = d.delta_fanout;
        }
        if self.embed_batch_size == 0 {
            self.embed_batch_size = d.embed_batch_size;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("{key}={raw:?} is not valid, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_published_table() {
        let c = EngineConfig::default();
        assert_eq!(c.embedding_dim, 1536);
        assert_eq!(c.embedding_max_chars, 16_000);
        assert_eq!(c.impact_sim_threshold, 0.55);
        assert_eq!(c.hybrid_bm25_k, 50);
        assert_eq!(c.hybrid_vec_k, 50);
        assert_eq!(c.delta_fanout, 8);
        assert_eq!(c.delta_deadline_sec, 30);
        assert_eq!(c.run_deadline_sec, 600);
        assert!(c.rerank_enabled);
        assert!(c.gate_enforced);
    }

    #[test]
    fn validation_restores_defaults() {
        let c = EngineConfig {
            embedding_dim: 0,
            impact_sim_threshold: 4.2,
            ..EngineConfig::default()
        }
        .validated();
        assert_eq!(c.embedding_dim, 1536);
        assert_eq!(c.impact_sim_threshold, 0.55);
    }
}
