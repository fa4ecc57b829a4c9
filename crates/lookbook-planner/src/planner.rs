use std::sync::Arc;

use tracing::{debug, info, warn};

use lookbook_core::call::guarded;
use lookbook_core::config::SearchConfig;
use lookbook_core::traits::{GenerationOptions, ReasoningProvider};
use lookbook_core::types::{PlanOutcome, Query, QueryPlan};
use lookbook_core::{Error, Result};

use crate::parse::parse_plan;
use crate::prompt::planning_prompt;

/// Stands in for the refined query when only an image was supplied.
pub const IMAGE_ONLY_PLACEHOLDER: &str = "similar items to the uploaded image";

pub const PLANNING_OPTIONS: GenerationOptions = GenerationOptions { temperature: 0.3, max_output_tokens: 500 };

/// Turns a raw query into a validated [`QueryPlan`].
///
/// Holds no per-request state; a single planner serves concurrent requests.
pub struct QueryPlanner {
    provider: Option<Arc<dyn ReasoningProvider>>,
    config: Arc<SearchConfig>,
}

impl QueryPlanner {
    pub fn new(provider: Option<Arc<dyn ReasoningProvider>>, config: Arc<SearchConfig>) -> Self {
        Self { provider, config }
    }

    /// Ask the provider for a plan. Fails with `PlanningUnavailable` when the
    /// provider is missing, unreachable, slow, or replies with an invalid plan.
    pub async fn try_plan(&self, query: &Query) -> Result<QueryPlan> {
        let provider = self.provider.as_ref().ok_or_else(|| Error::PlanningUnavailable("no reasoning provider configured".into()))?;
        let prompt = planning_prompt(&query.text, query.has_image(), &query.history, self.config.history_turns);
        let reply = guarded("planner", self.config.planner_policy(), || provider.generate(&prompt, PLANNING_OPTIONS))
            .await
            .map_err(|e| match e {
                Error::PlanningUnavailable(_) => e,
                other => Error::PlanningUnavailable(other.to_string()),
            })?;
        debug!(reply_chars = reply.len(), "planner replied");
        parse_plan(&reply, query.has_image(), &self.config)
    }

    /// Plan, recovering from any planning failure with [`Self::fallback_plan`].
    pub async fn plan(&self, query: &Query) -> PlanOutcome {
        match self.try_plan(query).await {
            Ok(plan) => {
                info!(refined = plan.refined_queries.len(), use_image = plan.use_image, text_weight = plan.text_weight, top_k = plan.top_k, "query planned");
                PlanOutcome::Planned { plan }
            }
            Err(e) => {
                warn!(error = %e, "planning failed; using fallback plan");
                PlanOutcome::Fallback { plan: self.fallback_plan(query), reason: e.to_string() }
            }
        }
    }

    /// Deterministic plan derived from the query alone.
    pub fn fallback_plan(&self, query: &Query) -> QueryPlan {
        let has_image = query.has_image();
        let text = query.text.trim();
        let refined = if text.is_empty() && has_image { IMAGE_ONLY_PLACEHOLDER.to_string() } else { text.to_string() };
        let text_weight = match (query.has_text(), has_image) {
            (true, true) => self.config.default_text_weight,
            (false, true) => 0.0,
            _ => 1.0,
        };
        QueryPlan {
            refined_queries: vec![refined],
            use_image: has_image,
            text_weight,
            top_k: self.config.default_top_k,
            filters: None,
            reasoning: Some("Fallback plan".to_string()),
        }
    }
}
