//! Document traceability
//!
//! QSP sections reference the work instructions and forms that implement
//! them and cite the regulations they satisfy. This module rebuilds that
//! hierarchy for a tenant and answers "what is downstream of this document"
//! for reviewer impact triage.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tracing::info;

use clausegraph_core::models::DocKind;
use clausegraph_core::parser::{extract_citations, extract_cross_references};
use clausegraph_core::CoreError;
use clausegraph_storage::{SectionFilter, SectionStore};

use crate::error::Result;
use crate::rationale::qsp_doc_id;

/// Position of a document class in the quality hierarchy. Lower levels
/// implement higher ones.
pub fn document_level(kind: &str) -> u8 {
    match kind {
        "QM" => 1,
        "QSP" => 2,
        "WI" => 3,
        "FORM" => 4,
        _ => 5,
    }
}

/// One document's place in the tenant's traceability graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Compact document token, e.g. "7.3-3" or "WI-ENG-003"
    pub doc_token: String,
    pub kind: String,
    pub level: u8,
    /// Documents this one implements (higher level)
    pub parents: Vec<String>,
    /// Documents implementing this one (lower level)
    pub children: Vec<String>,
    /// Regulatory citations found in the document's sections
    pub citations: Vec<String>,
}

pub struct TraceabilityService {
    store: Arc<dyn SectionStore>,
}

impl TraceabilityService {
    pub fn new(store: Arc<dyn SectionStore>) -> Self {
        Self { store }
    }

    /// Build the tenant's document hierarchy from section cross-references.
    pub async fn build_hierarchy(&self, tenant_id: &str) -> Result<AHashMap<String, HierarchyNode>> {
        if tenant_id.trim().is_empty() {
            return Err(
                CoreError::TenantScopeViolation("traceability requires a tenant id".into()).into(),
            );
        }

        let sections = self
            .store
            .get_sections(
                tenant_id,
                &SectionFilter {
                    doc_kind: Some(DocKind::Qsp),
                    ..Default::default()
                },
            )
            .await?;

        let mut nodes: AHashMap<String, HierarchyNode> = AHashMap::new();
        let mut doc_tokens: AHashMap<uuid::Uuid, String> = AHashMap::new();

        for section in &sections {
            let source = match doc_tokens.get(&section.doc_id) {
                Some(token) => token.clone(),
                None => {
                    let token = match self.store.get_document(tenant_id, section.doc_id).await? {
                        Some(doc) => qsp_doc_id(&doc.display_name),
                        None => continue,
                    };
                    doc_tokens.insert(section.doc_id, token.clone());
                    token
                }
            };
            if source.is_empty() {
                continue;
            }

            let body = format!("{}\n{}", section.heading, section.text);
            let refs = extract_cross_references(&body);
            let citations = extract_citations(&body);

            let source_node = nodes.entry(source.clone()).or_insert_with(|| HierarchyNode {
                doc_token: source.clone(),
                kind: "QSP".to_string(),
                level: document_level("QSP"),
                parents: Vec::new(),
                children: Vec::new(),
                citations: Vec::new(),
            });
            for citation in &citations {
                let label = match &citation.clause {
                    Some(clause) => format!("{} {}", citation.standard, clause),
                    None => citation.standard.clone(),
                };
                if !source_node.citations.contains(&label) {
                    source_node.citations.push(label);
                }
            }

            for reference in refs {
                let target = reference.target_doc.clone();
                if target == source {
                    continue;
                }
                let target_level = document_level(&reference.kind);
                let source_level = document_level("QSP");

                // The lower-level document implements the higher-level one
                let (parent, child) = if target_level > source_level {
                    (source.clone(), target.clone())
                } else {
                    (target.clone(), source.clone())
                };

                nodes
                    .entry(target.clone())
                    .or_insert_with(|| HierarchyNode {
                        doc_token: target.clone(),
                        kind: reference.kind.clone(),
                        level: target_level,
                        parents: Vec::new(),
                        children: Vec::new(),
                        citations: Vec::new(),
                    });

                if let Some(parent_node) = nodes.get_mut(&parent) {
                    if !parent_node.children.contains(&child) {
                        parent_node.children.push(child.clone());
                    }
                }
                if let Some(child_node) = nodes.get_mut(&child) {
                    if !child_node.parents.contains(&parent) {
                        child_node.parents.push(parent);
                    }
                }
            }
        }

        info!(tenant = tenant_id, documents = nodes.len(), "hierarchy built");
        Ok(nodes)
    }

    /// All documents downstream of `doc_token`: everything that implements
    /// it, transitively.
    pub async fn impacted_documents(
        &self,
        tenant_id: &str,
        doc_token: &str,
    ) -> Result<Vec<String>> {
        let hierarchy = self.build_hierarchy(tenant_id).await?;
        let mut impacted = Vec::new();
        let mut visited: AHashSet<String> = AHashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(doc_token.to_string());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if current != doc_token {
                impacted.push(current.clone());
            }
            if let Some(node) = hierarchy.get(&current) {
                for child in &node.children {
                    if !visited.contains(child) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }

        impacted.sort();
        Ok(impacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_the_quality_pyramid() {
        assert!(document_level("QM") < document_level("QSP"));
        assert!(document_level("QSP") < document_level("WI"));
        assert!(document_level("WI") < document_level("FORM"));
        assert_eq!(document_level("UNKNOWN"), 5);
    }
}
