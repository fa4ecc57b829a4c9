use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};

use lookbook_core::config::SearchConfig;
use lookbook_core::traits::{EmbeddingProvider, ProductMetadataStore, ReasoningProvider, VectorIndex};
use lookbook_core::types::{DebugTelemetry, Modality, PlanOutcome, Query, SearchResponse};
use lookbook_core::{Error, Result};
use lookbook_planner::{QueryPlanner, Summarizer};

use crate::fusion::{fuse, Fusion};
use crate::retriever::{Retrieval, Retriever};

/// Planner, retriever, fusion, and summary behind one `search` call.
///
/// Holds only immutable collaborators, so one orchestrator can serve
/// concurrent requests. Dropping a `search` future abandons its sub-queries.
pub struct SearchOrchestrator {
    planner: QueryPlanner,
    retriever: Retriever,
    summarizer: Summarizer,
    metadata: Arc<dyn ProductMetadataStore>,
    config: Arc<SearchConfig>,
}

pub struct SearchComponents {
    pub reasoning: Option<Arc<dyn ReasoningProvider>>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub text_index: Arc<dyn VectorIndex>,
    pub image_index: Arc<dyn VectorIndex>,
    pub metadata: Arc<dyn ProductMetadataStore>,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl SearchOrchestrator {
    pub fn new(components: SearchComponents, config: Arc<SearchConfig>) -> Self {
        let SearchComponents { reasoning, embedder, text_index, image_index, metadata } = components;
        Self {
            planner: QueryPlanner::new(reasoning.clone(), Arc::clone(&config)),
            retriever: Retriever::new(embedder, text_index, image_index, Arc::clone(&config)),
            summarizer: Summarizer::new(reasoning, config.summary_policy()),
            metadata,
            config,
        }
    }

    pub fn planner(&self) -> &QueryPlanner { &self.planner }

    fn validate(&self, query: &Query) -> Result<()> {
        if !query.has_text() && !query.has_image() {
            return Err(Error::InvalidQuery("query needs text or an image".into()));
        }
        let chars = query.text.chars().count();
        if chars > self.config.max_query_chars {
            return Err(Error::InvalidQuery(format!("query text is {} characters, limit is {}", chars, self.config.max_query_chars)));
        }
        Ok(())
    }

    /// Run the whole pipeline. Returns a complete response or exactly one error.
    pub async fn search(&self, query: &Query) -> Result<SearchResponse> {
        let span = info_span!("search", text_chars = query.text.len(), has_image = query.has_image(), history = query.history.len());
        self.search_inner(query).instrument(span).await
    }

    async fn search_inner(&self, query: &Query) -> Result<SearchResponse> {
        let start = Instant::now();
        self.validate(query)?;

        let outcome = self.planner.plan(query).await;
        let retrieval = match self.retriever.retrieve(outcome.plan(), query.image_bytes()).await {
            Ok(r) => r,
            Err(Error::RetrievalUnavailable { failures, .. }) => {
                let failed = Retrieval { hits: Vec::new(), failures: failures.clone() };
                let snapshot = telemetry(&outcome, &failed, &Fusion::default(), elapsed_ms(start));
                return Err(Error::RetrievalUnavailable { failures, debug: Some(Box::new(snapshot)) });
            }
            Err(e) => return Err(e),
        };

        let fusion = fuse(&retrieval.hits, outcome.plan(), self.metadata.as_ref(), &self.config).await?;
        let assistant_message = self.summarizer.summarize(&query.text, &fusion.results).await;
        let report = telemetry(&outcome, &retrieval, &fusion, elapsed_ms(start));
        if !report.partial_failures.is_empty() {
            warn!(failed = report.partial_failures.len(), "search completed with partial failures");
        }
        info!(
            results = fusion.results.len(),
            candidates = report.candidate_count,
            plan_source = ?report.plan_source,
            elapsed_ms = report.processing_time_ms,
            "search complete"
        );
        Ok(SearchResponse { assistant_message, results: fusion.results, debug: report })
    }
}

fn telemetry(outcome: &PlanOutcome, retrieval: &Retrieval, fusion: &Fusion, processing_time_ms: f64) -> DebugTelemetry {
    DebugTelemetry {
        query_plan: outcome.plan().clone(),
        plan_source: outcome.source(),
        fallback_reason: outcome.fallback_reason().map(str::to_string),
        text_results_count: retrieval.count(Modality::Text),
        image_results_count: retrieval.count(Modality::Image),
        candidate_count: fusion.candidate_count,
        total_unique_results: fusion.results.len(),
        partial_failures: retrieval.failures.clone(),
        orphaned_ids: fusion.orphaned_ids.clone(),
        processing_time_ms,
    }
}
