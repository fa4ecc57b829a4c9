//! Domain types shared by the planner, retriever, fusion and orchestrator.
//!
//! Everything here is created per request and dropped once the response is
//! produced; nothing is cached across requests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub type ProductId = String;
pub type Categories = BTreeMap<String, String>;

/// An input/representation channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prior conversational turn supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// Immutable input to a single search request.
#[derive(Clone, Default)]
pub struct Query {
    pub text: String,
    pub image: Option<Vec<u8>>,
    pub history: Vec<ChatTurn>,
}

impl Query {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self { image: Some(bytes), ..Self::default() }
    }

    #[must_use]
    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// The image blob, treating an empty upload as absent.
    pub fn image_bytes(&self) -> Option<&[u8]> {
        self.image.as_deref().filter(|b| !b.is_empty())
    }

    pub fn has_image(&self) -> bool {
        self.image_bytes().is_some()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("image_bytes", &self.image.as_ref().map(Vec::len))
            .field("history", &self.history.len())
            .finish()
    }
}

/// The planner's structured decision about how to execute retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPlan {
    pub refined_queries: Vec<String>,
    pub use_image: bool,
    pub text_weight: f32,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl QueryPlan {
    /// `(text_weight, image_weight)` actually applied during fusion.
    ///
    /// Without image retrieval the text aggregate carries the whole score.
    pub fn effective_weights(&self) -> (f32, f32) {
        if self.use_image {
            let tw = self.text_weight.clamp(0.0, 1.0);
            (tw, 1.0 - tw)
        } else {
            (1.0, 0.0)
        }
    }

    pub fn has_filters(&self) -> bool {
        self.filters.as_ref().is_some_and(|f| !f.is_empty())
    }

    /// Index of the image sub-query, placed after every refined text query.
    pub fn image_query_index(&self) -> usize {
        self.refined_queries.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    Planned,
    Fallback,
}

/// Result of planning: either a validated provider plan or the deterministic fallback.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PlanOutcome {
    Planned { plan: QueryPlan },
    Fallback { plan: QueryPlan, reason: String },
}

impl PlanOutcome {
    pub fn plan(&self) -> &QueryPlan {
        match self {
            PlanOutcome::Planned { plan } | PlanOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn into_plan(self) -> QueryPlan {
        match self {
            PlanOutcome::Planned { plan } | PlanOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn source(&self) -> PlanSource {
        match self {
            PlanOutcome::Planned { .. } => PlanSource::Planned,
            PlanOutcome::Fallback { .. } => PlanSource::Fallback,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            PlanOutcome::Planned { .. } => None,
            PlanOutcome::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Fixed-length vector tagged with its modality and producing model.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub modality: Modality,
    pub model: String,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, modality: Modality, model: impl Into<String>) -> Self {
        Self { values, modality, model: model.into() }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Vectors are only comparable inside the same model space.
    pub fn is_comparable(&self, other: &EmbeddingVector) -> bool {
        self.model == other.model && self.dim() == other.dim()
    }
}

/// `(id, score)` pair returned by a vector index; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub product_id: ProductId,
    pub score: f32,
}

/// One nearest-neighbor result from one vector-index query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub product_id: ProductId,
    pub raw_score: f32,
    pub modality: Modality,
    pub source_query_index: usize,
}

/// Product record held by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub product_id: ProductId,
    pub description: String,
    pub image_path: String,
    #[serde(default)]
    pub categories: Categories,
}

/// Deduplicated, ranked result with modality provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub product_id: ProductId,
    pub combined_score: f32,
    pub contributing_modalities: BTreeSet<Modality>,
    pub description: String,
    pub image_path: String,
    pub categories: Categories,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Embed,
    Index,
}

/// An isolated sub-query failure, reported through telemetry only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueryFailure {
    pub modality: Modality,
    pub source_query_index: usize,
    pub stage: FailureStage,
    pub timed_out: bool,
    pub reason: String,
}

/// Observational record of one request. Never affects ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugTelemetry {
    pub query_plan: QueryPlan,
    pub plan_source: PlanSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub text_results_count: usize,
    pub image_results_count: usize,
    pub candidate_count: usize,
    pub total_unique_results: usize,
    pub partial_failures: Vec<SubQueryFailure>,
    pub orphaned_ids: Vec<ProductId>,
    pub processing_time_ms: f64,
}

/// Complete structured response of a search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub assistant_message: String,
    pub results: Vec<FusedResult>,
    pub debug: DebugTelemetry,
}
