use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use lookbook_core::call::guarded;
use lookbook_core::config::SearchConfig;
use lookbook_core::traits::{EmbeddingProvider, VectorIndex};
use lookbook_core::types::{FailureStage, Modality, QueryPlan, RawHit, SubQueryFailure};
use lookbook_core::{Error, Result};

/// Hits from every successful sub-query plus the isolated failures.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub hits: Vec<RawHit>,
    pub failures: Vec<SubQueryFailure>,
}

impl Retrieval {
    pub fn count(&self, modality: Modality) -> usize {
        self.hits.iter().filter(|h| h.modality == modality).count()
    }
}

#[derive(Clone, Copy)]
enum SubQuery<'a> {
    Text(&'a str),
    Image(&'a [u8]),
}

impl SubQuery<'_> {
    fn modality(&self) -> Modality {
        match self {
            SubQuery::Text(_) => Modality::Text,
            SubQuery::Image(_) => Modality::Image,
        }
    }
}

/// Fans a plan out into embed + index sub-queries and joins them all.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    text_index: Arc<dyn VectorIndex>,
    image_index: Arc<dyn VectorIndex>,
    config: Arc<SearchConfig>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, text_index: Arc<dyn VectorIndex>, image_index: Arc<dyn VectorIndex>, config: Arc<SearchConfig>) -> Self {
        Self { embedder, text_index, image_index, config }
    }

    /// Per-index `k`: plans with attribute filters over-fetch so enough
    /// candidates survive filtering.
    pub fn fetch_k(&self, plan: &QueryPlan) -> usize {
        if plan.has_filters() { plan.top_k.saturating_mul(self.config.filter_overfetch) } else { plan.top_k }
    }

    /// Run one sub-query per refined query, plus one for the image when the
    /// plan uses it. Text sub-queries are skipped when the image carries all
    /// of the weight. Fails only when every dispatched sub-query failed.
    pub async fn retrieve(&self, plan: &QueryPlan, image: Option<&[u8]>) -> Result<Retrieval> {
        let k = self.fetch_k(plan);
        let image = if plan.use_image {
            let supplied = image.filter(|b| !b.is_empty());
            if supplied.is_none() {
                warn!("plan requests image retrieval but no image was supplied");
            }
            supplied
        } else {
            None
        };

        let mut sub_queries: Vec<(usize, SubQuery<'_>)> = Vec::with_capacity(plan.refined_queries.len() + 1);
        if image.is_none() || plan.effective_weights().0 > 0.0 {
            sub_queries.extend(plan.refined_queries.iter().enumerate().map(|(i, q)| (i, SubQuery::Text(q.as_str()))));
        } else {
            debug!(skipped = plan.refined_queries.len(), "text carries no weight; image sub-query only");
        }
        if let Some(bytes) = image {
            sub_queries.push((plan.image_query_index(), SubQuery::Image(bytes)));
        }
        let dispatched = sub_queries.len();
        let outcomes = join_all(sub_queries.into_iter().map(|(idx, sq)| self.run_sub_query(idx, sq, k))).await;

        let mut retrieval = Retrieval::default();
        for outcome in outcomes {
            match outcome {
                Ok(hits) => retrieval.hits.extend(hits),
                Err(failure) => retrieval.failures.push(failure),
            }
        }
        if retrieval.failures.len() == dispatched {
            warn!(failed = dispatched, "every retrieval sub-query failed");
            return Err(Error::RetrievalUnavailable { failures: retrieval.failures, debug: None });
        }
        info!(
            sub_queries = dispatched,
            failed = retrieval.failures.len(),
            text_hits = retrieval.count(Modality::Text),
            image_hits = retrieval.count(Modality::Image),
            "retrieval complete"
        );
        Ok(retrieval)
    }

    async fn run_sub_query(&self, source_query_index: usize, sub_query: SubQuery<'_>, k: usize) -> std::result::Result<Vec<RawHit>, SubQueryFailure> {
        let modality = sub_query.modality();
        let failure = |stage: FailureStage, e: Error| {
            warn!(modality = %modality, source_query_index, stage = ?stage, error = %e, "sub-query failed");
            SubQueryFailure { modality, source_query_index, stage, timed_out: e.is_timeout(), reason: e.to_string() }
        };

        let policy = self.config.embed_policy();
        let vector = match sub_query {
            SubQuery::Text(text) => guarded("embed_text", policy, || self.embedder.embed_text(text)).await,
            SubQuery::Image(bytes) => guarded("embed_image", policy, || self.embedder.embed_image(bytes)).await,
        }
        .map_err(|e| failure(FailureStage::Embed, e))?;

        let index = match modality {
            Modality::Text => &self.text_index,
            Modality::Image => &self.image_index,
        };
        let hits = guarded("vector_index", self.config.index_policy(), || index.query(&vector, k))
            .await
            .map_err(|e| failure(FailureStage::Index, e))?;
        debug!(modality = %modality, source_query_index, hits = hits.len(), "sub-query complete");

        Ok(hits
            .into_iter()
            .take(k)
            .map(|h| RawHit { product_id: h.product_id, raw_score: h.score, modality, source_query_index })
            .collect())
    }
}
