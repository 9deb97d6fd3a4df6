//! Confidence calibration
//!
//! Folds the three retrieval signals and the clause-id bonus into a single
//! score in [0, 1]:
//!
//! ```text
//! confidence = w_bm25 · min(bm25/6, 1)
//!            + w_vec  · vector_sim
//!            + w_rank · sigmoid(rerank_raw)
//!            + w_clause · [clause id appears in query]
//! ```
//!
//! clamped to [0, 1] and rounded to three decimals. When the reranker was
//! skipped, its term contributes nothing.

/// Weight set for the calibration formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    pub bm25: f64,
    pub vector: f64,
    pub rerank: f64,
    pub clause_bonus: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            bm25: 0.20,
            vector: 0.30,
            rerank: 0.45,
            clause_bonus: 0.05,
        }
    }
}

/// Maximum attainable weighted field score; used to normalize bm25.
const BM25_CEILING: f64 = 6.0;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Calibrate a candidate's confidence from its raw signals.
pub fn calibrate(
    weights: &ConfidenceWeights,
    bm25_score: f64,
    vector_sim: f64,
    rerank_raw: Option<f64>,
    clause_id_match: bool,
) -> f64 {
    let bm25_norm = (bm25_score / BM25_CEILING).min(1.0);
    let mut confidence = weights.bm25 * bm25_norm + weights.vector * vector_sim;
    if let Some(raw) = rerank_raw {
        confidence += weights.rerank * sigmoid(raw);
    }
    if clause_id_match {
        confidence += weights.clause_bonus;
    }
    round3(confidence.clamp(0.0, 1.0))
}

pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_calibration_point() {
        // bm25 3.0 → 0.5, vector 0.80, rerank 2.0, clause match
        let c = calibrate(&ConfidenceWeights::default(), 3.0, 0.80, Some(2.0), true);
        assert_eq!(c, 0.786);
    }

    #[test]
    fn confidence_is_clamped_and_rounded() {
        let w = ConfidenceWeights::default();
        let c = calibrate(&w, 100.0, 1.0, Some(50.0), true);
        assert!(c <= 1.0);
        let c = calibrate(&w, 0.0, 0.0, None, false);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn skipped_reranker_contributes_nothing() {
        let w = ConfidenceWeights::default();
        let with = calibrate(&w, 3.0, 0.8, Some(0.0), false);
        let without = calibrate(&w, 3.0, 0.8, None, false);
        // sigmoid(0) = 0.5, so the with-rerank score carries exactly that term
        assert!((with - without - 0.45 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
