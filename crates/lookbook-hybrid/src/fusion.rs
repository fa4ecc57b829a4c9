//! Merge per-modality hit lists into one deduplicated ranking.
//!
//! Ranking is a pure function of the hits and the plan: each modality's raw
//! scores are normalized, the best normalized score per product and modality
//! is kept, and the two aggregates are combined with the plan's effective
//! weights. Ties fall back to the earliest sub-query, then to the number of
//! contributing modalities, then to the product id.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use lookbook_core::call::guarded;
use lookbook_core::config::{ScoreNormalization, SearchConfig};
use lookbook_core::traits::ProductMetadataStore;
use lookbook_core::types::{FusedResult, Modality, ProductId, ProductMetadata, QueryPlan, RawHit};
use lookbook_core::{Error, Result};

use crate::filters::AttributeFilter;

/// One product after scoring, before the metadata join.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedProduct {
    pub product_id: ProductId,
    pub combined_score: f32,
    pub text_score: Option<f32>,
    pub image_score: Option<f32>,
    pub first_query_index: usize,
}

impl RankedProduct {
    pub fn modalities(&self) -> BTreeSet<Modality> {
        let mut set = BTreeSet::new();
        if self.text_score.is_some() { set.insert(Modality::Text); }
        if self.image_score.is_some() { set.insert(Modality::Image); }
        set
    }

    fn modality_count(&self) -> usize {
        usize::from(self.text_score.is_some()) + usize::from(self.image_score.is_some())
    }
}

fn clamped(raw: f32) -> f32 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

struct Normalizer { mode: ScoreNormalization, text_max: f32, image_max: f32 }

impl Normalizer {
    fn new(mode: ScoreNormalization, hits: &[RawHit]) -> Self {
        let best = |m: Modality| hits.iter().filter(|h| h.modality == m).map(|h| clamped(h.raw_score)).fold(0.0f32, f32::max);
        Self { mode, text_max: best(Modality::Text), image_max: best(Modality::Image) }
    }

    fn apply(&self, hit: &RawHit) -> f32 {
        let score = clamped(hit.raw_score);
        match self.mode {
            ScoreNormalization::Clamp => score,
            ScoreNormalization::MaxScale => {
                let max = match hit.modality { Modality::Text => self.text_max, Modality::Image => self.image_max };
                if max > 0.0 { score / max } else { 0.0 }
            }
        }
    }
}

fn keep_max(slot: &mut Option<f32>, score: f32) {
    *slot = Some(slot.map_or(score, |s| s.max(score)));
}

/// Total order used for the final ranking.
pub fn compare_ranked(a: &RankedProduct, b: &RankedProduct) -> Ordering {
    b.combined_score.total_cmp(&a.combined_score)
        .then_with(|| a.first_query_index.cmp(&b.first_query_index))
        .then_with(|| b.modality_count().cmp(&a.modality_count()))
        .then_with(|| a.product_id.cmp(&b.product_id))
}

/// Score and order every distinct product in `hits`. Not truncated.
pub fn rank(hits: &[RawHit], plan: &QueryPlan, normalization: ScoreNormalization) -> Vec<RankedProduct> {
    let normalizer = Normalizer::new(normalization, hits);
    let (text_weight, image_weight) = plan.effective_weights();

    let mut by_product: HashMap<&str, RankedProduct> = HashMap::new();
    for hit in hits {
        let score = normalizer.apply(hit);
        let entry = by_product.entry(hit.product_id.as_str()).or_insert_with(|| RankedProduct {
            product_id: hit.product_id.clone(),
            combined_score: 0.0,
            text_score: None,
            image_score: None,
            first_query_index: hit.source_query_index,
        });
        entry.first_query_index = entry.first_query_index.min(hit.source_query_index);
        match hit.modality {
            Modality::Text => keep_max(&mut entry.text_score, score),
            Modality::Image => keep_max(&mut entry.image_score, score),
        }
    }

    let mut ranked: Vec<RankedProduct> = by_product.into_values().map(|mut p| {
        p.combined_score = text_weight * p.text_score.unwrap_or(0.0) + image_weight * p.image_score.unwrap_or(0.0);
        p
    }).collect();
    ranked.sort_by(compare_ranked);
    ranked
}

/// Output of [`fuse`]: final results plus what telemetry needs.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    pub results: Vec<FusedResult>,
    /// Distinct products before truncation.
    pub candidate_count: usize,
    /// Ranked ids with no metadata record.
    pub orphaned_ids: Vec<ProductId>,
}

fn fused(product: RankedProduct, meta: &ProductMetadata) -> FusedResult {
    FusedResult {
        contributing_modalities: product.modalities(),
        product_id: product.product_id,
        combined_score: product.combined_score,
        description: meta.description.clone(),
        image_path: meta.image_path.clone(),
        categories: meta.categories.clone(),
    }
}

/// Rank `hits`, cut to `plan.top_k`, and join product metadata.
///
/// With attribute filters, metadata is joined for every candidate first so
/// filtering happens before the cut. Ids without metadata are dropped and
/// reported in [`Fusion::orphaned_ids`]; a failing store fails the call.
pub async fn fuse(hits: &[RawHit], plan: &QueryPlan, store: &dyn ProductMetadataStore, config: &SearchConfig) -> Result<Fusion> {
    let mut ranked = rank(hits, plan, config.normalization);
    let candidate_count = ranked.len();
    let filter = match plan.filters.as_ref() {
        Some(f) if !f.is_empty() => Some(AttributeFilter::compile(f)?).filter(|f| !f.is_empty()),
        _ => None,
    };
    if filter.is_none() {
        ranked.truncate(plan.top_k);
    }
    if ranked.is_empty() {
        return Ok(Fusion { candidate_count, ..Fusion::default() });
    }

    let ids: Vec<ProductId> = ranked.iter().map(|p| p.product_id.clone()).collect();
    let metadata = guarded("metadata", config.metadata_policy(), || store.get_many(&ids))
        .await
        .map_err(|e| match e {
            Error::Metadata(_) => e,
            other => Error::Metadata(other.to_string()),
        })?;

    let mut results = Vec::with_capacity(plan.top_k.min(ranked.len()));
    let mut orphaned_ids = Vec::new();
    for product in ranked {
        match metadata.get(&product.product_id) {
            None => orphaned_ids.push(product.product_id),
            Some(meta) if filter.as_ref().is_some_and(|f| !f.matches(meta)) => {}
            Some(meta) => results.push(fused(product, meta)),
        }
    }
    results.truncate(plan.top_k);
    if !orphaned_ids.is_empty() {
        warn!(count = orphaned_ids.len(), ids = ?orphaned_ids, "vector hits without product metadata dropped");
    }
    debug!(candidates = candidate_count, returned = results.len(), "fusion complete");
    Ok(Fusion { results, candidate_count, orphaned_ids })
}
