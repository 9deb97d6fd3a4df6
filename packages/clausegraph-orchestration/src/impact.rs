//! Change impact detection
//!
//! For each regulatory delta, embeds the change text and searches the
//! tenant's QSP corpus for sections above the similarity floor. Deltas run
//! concurrently under a bounded fan-out with per-delta deadlines; the final
//! record order is deterministic regardless of completion order: input delta
//! order, then descending similarity, then section id.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clausegraph_core::embedding::EmbeddingProvider;
use clausegraph_core::models::{
    ChangeType, Delta, DocKind, ImpactRecord, ReportStatus, RunSummary, Section, SkippedDelta,
};
use clausegraph_core::retrieval::ScoredSection;
use clausegraph_core::{CoreError, EngineConfig};
use clausegraph_storage::{SectionFilter, SectionStore};

use crate::error::Result;
use crate::rationale::{self, Strength};
use crate::reports::ReportStore;
use crate::run::AnalysisRun;

/// Characters of section text copied into the display snippet field.
const QSP_TEXT_SNIPPET_CHARS: usize = 300;

/// Wire-shaped delta as submitted by callers; validated into a typed
/// [`Delta`] before any run state exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaInput {
    pub clause_id: String,
    pub change_type: String,
    #[serde(default)]
    pub change_text: Option<String>,
    #[serde(default)]
    pub old_text: Option<String>,
    #[serde(default)]
    pub new_text: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
}

impl DeltaInput {
    pub fn into_delta(self) -> std::result::Result<Delta, CoreError> {
        if self.clause_id.trim().is_empty() {
            return Err(CoreError::InputInvalid("delta without a clause id".into()));
        }
        let change_type = ChangeType::parse(&self.change_type)?;
        let (old_text, new_text) = match change_type {
            ChangeType::Added => (None, self.new_text.or(self.change_text)),
            ChangeType::Modified => (self.old_text, self.new_text.or(self.change_text)),
            ChangeType::Deleted => (self.old_text.or(self.change_text), None),
        };
        Ok(Delta {
            clause_id: self.clause_id,
            change_type,
            old_text,
            new_text,
            framework: self.framework,
        })
    }
}

enum DeltaOutcome {
    Impacts(Vec<ScoredSection>),
    Skipped(String),
    /// Excluded from results without a skip entry: a modified delta whose
    /// sides are identical after normalization
    Noop,
    EmbeddingFailed(String),
    DeadlineExpired,
    StoreFailed(String),
}

/// Change impact analysis service. Service handles are shared `Arc`s built
/// once at startup.
pub struct ChangeImpactAnalyzer {
    store: Arc<dyn SectionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reports: Arc<ReportStore>,
    config: EngineConfig,
}

impl ChangeImpactAnalyzer {
    pub fn new(
        store: Arc<dyn SectionStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reports: Arc<ReportStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            reports,
            config,
        }
    }

    /// Validate wire-shaped deltas and run the analysis. Input errors
    /// surface before a run row is created.
    pub async fn detect_impacts_raw(
        &self,
        tenant_id: &str,
        inputs: Vec<DeltaInput>,
        top_k: usize,
    ) -> Result<RunSummary> {
        let deltas = inputs
            .into_iter()
            .map(DeltaInput::into_delta)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.detect_impacts(tenant_id, deltas, top_k).await
    }

    /// Analyze which QSP sections are implicated by `deltas`.
    pub async fn detect_impacts(
        &self,
        tenant_id: &str,
        deltas: Vec<Delta>,
        top_k: usize,
    ) -> Result<RunSummary> {
        if tenant_id.trim().is_empty() {
            return Err(CoreError::TenantScopeViolation(
                "detect_impacts requires a tenant id".into(),
            )
            .into());
        }

        let mut run = AnalysisRun::start(tenant_id, "change_impact");
        self.reports.save_run(&run).await?;
        let run_id = run.run_id;
        info!(%run_id, tenant = tenant_id, deltas = deltas.len(), "impact analysis started");

        // An empty QSP corpus completes immediately with guidance; it is not
        // an error.
        let qsp_filter = SectionFilter {
            doc_kind: Some(DocKind::Qsp),
            ..Default::default()
        };
        let corpus = self.store.get_sections(tenant_id, &qsp_filter).await?;
        if corpus.is_empty() {
            run.complete(0)?;
            self.reports.save_run(&run).await?;
            return Ok(RunSummary {
                run_id,
                status: ReportStatus::Completed,
                total_changes_analyzed: deltas.len(),
                total_impacts_found: 0,
                threshold: self.config.impact_sim_threshold,
                partial: false,
                guidance: Some(
                    "No QSP sections are indexed for this tenant. Ingest QSP documents \
                     and re-run the analysis."
                        .to_string(),
                ),
                skipped: Vec::new(),
                impacts: Vec::new(),
            });
        }

        let run_deadline = Instant::now() + Duration::from_secs(self.config.run_deadline_sec);
        let delta_deadline = Duration::from_secs(self.config.delta_deadline_sec);

        let mut tasks = stream::iter(deltas.iter().cloned().enumerate().map(|(idx, delta)| {
            let analyzer = self;
            async move {
                let outcome =
                    match tokio::time::timeout(delta_deadline, analyzer.analyze_delta(tenant_id, &delta, top_k))
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => DeltaOutcome::DeadlineExpired,
                    };
                (idx, delta, outcome)
            }
        }))
        .buffer_unordered(self.config.delta_fanout.max(1));

        let mut outcomes: Vec<(usize, Delta, DeltaOutcome)> = Vec::with_capacity(deltas.len());
        let mut run_timed_out = false;
        loop {
            match tokio::time::timeout_at(run_deadline, tasks.next()).await {
                Ok(Some(item)) => outcomes.push(item),
                Ok(None) => break,
                Err(_) => {
                    warn!(%run_id, "run deadline exceeded");
                    run_timed_out = true;
                    break;
                }
            }
        }
        drop(tasks);
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        // A store failure after retries fails the whole run.
        if let Some((_, delta, DeltaOutcome::StoreFailed(msg))) = outcomes
            .iter()
            .find(|(_, _, o)| matches!(o, DeltaOutcome::StoreFailed(_)))
        {
            warn!(%run_id, clause = %delta.clause_id, error = %msg, "store exhausted retries");
            run.fail(msg.clone(), None)?;
            self.reports.save_run(&run).await?;
            return Ok(RunSummary {
                run_id,
                status: ReportStatus::Failed,
                total_changes_analyzed: deltas.len(),
                total_impacts_found: 0,
                threshold: self.config.impact_sim_threshold,
                partial: false,
                guidance: Some(format!("analysis failed: {msg}")),
                skipped: Vec::new(),
                impacts: Vec::new(),
            });
        }

        let mut impacts: Vec<ImpactRecord> = Vec::new();
        let mut skipped: Vec<SkippedDelta> = Vec::new();
        let mut partial = false;
        let mut doc_names: AHashMap<Uuid, String> = AHashMap::new();

        for (_, delta, outcome) in &outcomes {
            match outcome {
                DeltaOutcome::Impacts(candidates) => {
                    let mut ranked = candidates.clone();
                    ranked.sort_by(|a, b| {
                        b.score
                            .partial_cmp(&a.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.section.section_id.cmp(&b.section.section_id))
                    });
                    for (index, hit) in ranked.iter().enumerate() {
                        let qsp_doc = self
                            .doc_name(tenant_id, hit.section.doc_id, &mut doc_names)
                            .await;
                        impacts.push(self.build_impact(
                            run_id, tenant_id, delta, index as u32, hit, qsp_doc,
                        ));
                    }
                }
                DeltaOutcome::Skipped(reason) => skipped.push(SkippedDelta {
                    clause_id: delta.clause_id.clone(),
                    reason: reason.clone(),
                }),
                DeltaOutcome::Noop => {
                    debug!(clause = %delta.clause_id, "modified delta with identical sides, excluded");
                }
                DeltaOutcome::EmbeddingFailed(msg) => {
                    partial = true;
                    skipped.push(SkippedDelta {
                        clause_id: delta.clause_id.clone(),
                        reason: format!("embedding_unavailable: {msg}"),
                    });
                }
                DeltaOutcome::DeadlineExpired => {
                    partial = true;
                    skipped.push(SkippedDelta {
                        clause_id: delta.clause_id.clone(),
                        reason: "delta_deadline_exceeded".to_string(),
                    });
                }
                DeltaOutcome::StoreFailed(_) => unreachable!("handled above"),
            }
        }

        // Serialized write phase; the upsert key makes reruns idempotent.
        self.reports.upsert_impacts(&impacts).await?;

        let status = if run_timed_out {
            run.fail("run deadline exceeded".to_string(), Some(impacts.len()))?;
            ReportStatus::Failed
        } else {
            run.complete(impacts.len())?;
            if partial {
                ReportStatus::Partial
            } else {
                ReportStatus::Completed
            }
        };
        self.reports.save_run(&run).await?;

        info!(
            %run_id,
            impacts = impacts.len(),
            skipped = skipped.len(),
            status = status.as_str(),
            "impact analysis finished"
        );

        Ok(RunSummary {
            run_id,
            status,
            total_changes_analyzed: deltas.len(),
            total_impacts_found: impacts.len(),
            threshold: self.config.impact_sim_threshold,
            partial,
            guidance: None,
            skipped,
            impacts,
        })
    }

    async fn analyze_delta(&self, tenant_id: &str, delta: &Delta, top_k: usize) -> DeltaOutcome {
        let change_text = delta.change_text();
        if change_text.trim().is_empty() {
            return DeltaOutcome::Skipped("empty_change_text".to_string());
        }
        if delta.change_type == ChangeType::Modified {
            let old = delta.old_text.as_deref().unwrap_or("");
            let new = delta.new_text.as_deref().unwrap_or("");
            if clausegraph_core::text::normalize(old) == clausegraph_core::text::normalize(new) {
                return DeltaOutcome::Noop;
            }
        }

        let query_vec = match self.embedder.embed(change_text).await {
            Ok(v) => v,
            Err(e) => return DeltaOutcome::EmbeddingFailed(e.to_string()),
        };

        let mut attempt = 0;
        loop {
            match self
                .store
                .vector_search(
                    tenant_id,
                    &query_vec,
                    Some(DocKind::Qsp),
                    top_k,
                    self.config.impact_sim_threshold,
                )
                .await
            {
                Ok(hits) => {
                    debug!(clause = %delta.clause_id, hits = hits.len(), "delta analyzed");
                    return DeltaOutcome::Impacts(hits);
                }
                Err(e) if e.is_transient() && attempt < self.config.store_retries => {
                    attempt += 1;
                    warn!(clause = %delta.clause_id, attempt, error = %e, "retrying vector search");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => return DeltaOutcome::StoreFailed(e.to_string()),
            }
        }
    }

    fn build_impact(
        &self,
        run_id: Uuid,
        tenant_id: &str,
        delta: &Delta,
        impact_index: u32,
        hit: &ScoredSection,
        qsp_doc: String,
    ) -> ImpactRecord {
        let section: &Section = &hit.section;
        let strength = Strength::for_similarity(
            hit.score,
            self.config.strength_strong,
            self.config.strength_moderate,
        );
        let rationale = rationale::build(
            delta.change_type,
            strength,
            &delta.clause_id,
            &section.heading,
            hit.score,
        );
        let now = Utc::now();
        ImpactRecord {
            impact_id: Uuid::new_v4(),
            run_id,
            tenant_id: tenant_id.to_string(),
            clause_id: delta.clause_id.clone(),
            change_type: delta.change_type,
            impact_index,
            qsp_doc,
            qsp_clause: section.clause_id.clone(),
            qsp_text: section.text.chars().take(QSP_TEXT_SNIPPET_CHARS).collect(),
            qsp_text_full: section.text.clone(),
            heading: section.heading.clone(),
            similarity: (hit.score * 1000.0).round() / 1000.0,
            rationale,
            reviewed: false,
            custom_rationale: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Display-name lookup with a per-run memo; failures fall back to an
    /// empty id rather than failing the record.
    async fn doc_name(
        &self,
        tenant_id: &str,
        doc_id: Uuid,
        memo: &mut AHashMap<Uuid, String>,
    ) -> String {
        if let Some(name) = memo.get(&doc_id) {
            return name.clone();
        }
        let name = match self.store.get_document(tenant_id, doc_id).await {
            Ok(Some(doc)) => rationale::qsp_doc_id(&doc.display_name),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(%doc_id, error = %e, "document lookup failed");
                String::new()
            }
        };
        memo.insert(doc_id, name.clone());
        name
    }
}
