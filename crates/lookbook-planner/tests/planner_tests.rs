use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lookbook_core::call::CallPolicy;
use lookbook_core::config::SearchConfig;
use lookbook_core::traits::{GenerationOptions, ReasoningProvider};
use lookbook_core::types::{ChatTurn, FusedResult, PlanSource, Query};
use lookbook_core::{Error, Result};
use lookbook_planner::summary::{found_message, NO_RESULTS_MESSAGE};
use lookbook_planner::{QueryPlanner, Summarizer, IMAGE_ONLY_PLACEHOLDER};

/// Replays canned replies in order and records every prompt it sees.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn replying(replies: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self { replies: Mutex::new(replies.into()), prompts: Mutex::default() })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    async fn generate(&self, prompt: &str, _options: GenerationOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Err(Error::Provider("script exhausted".into())))
    }
}

struct SlowProvider;

#[async_trait]
impl ReasoningProvider for SlowProvider {
    async fn generate(&self, _prompt: &str, _options: GenerationOptions) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("{}".into())
    }
}

fn planner(provider: Arc<dyn ReasoningProvider>) -> QueryPlanner {
    QueryPlanner::new(Some(provider), Arc::new(SearchConfig::default()))
}

fn png_stub() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]
}

#[tokio::test]
async fn out_of_range_text_weight_is_clamped() {
    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": ["denim jacket"], "use_image": true, "text_weight": 1.7, "top_k": 20}"#.into())]);
    let outcome = planner(provider).plan(&Query::text("vintage denim jacket").with_image(png_stub())).await;
    assert_eq!(outcome.source(), PlanSource::Planned);
    assert_eq!(outcome.plan().text_weight, 1.0);

    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": ["x"], "text_weight": -3, "top_k": 0}"#.into())]);
    let plan = planner(provider).plan(&Query::text("x")).await.into_plan();
    assert_eq!(plan.text_weight, 0.0);
    assert_eq!(plan.top_k, 1);
}

#[tokio::test]
async fn fenced_reply_with_prose_is_accepted() {
    let reply = "Sure! Here is the plan:\n```json\n{\n  \"refined_queries\": [\"black midi dress\", \" black midi dress \", \"summer wedding dress\", \"\"],\n  \"use_image\": false,\n  \"text_weight\": 1.0,\n  \"top_k\": 500,\n  \"filters\": {\"Color\": \"Black\", \"brand\": \"acme\"},\n  \"reasoning\": \"color given\"\n}\n```";
    let provider = ScriptedProvider::replying(vec![Ok(reply.into())]);
    let outcome = planner(provider).plan(&Query::text("black midi dress for a summer wedding")).await;
    let plan = outcome.plan();
    assert_eq!(outcome.source(), PlanSource::Planned);
    assert_eq!(plan.refined_queries, vec!["black midi dress", "summer wedding dress"]);
    assert_eq!(plan.top_k, SearchConfig::default().max_top_k);
    let filters = plan.filters.as_ref().expect("filters kept");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters["color"], "black");
    assert_eq!(plan.reasoning.as_deref(), Some("color given"));
}

#[tokio::test]
async fn float_top_k_does_not_force_a_fallback() {
    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": ["wool coat"], "use_image": false, "text_weight": 1.0, "top_k": 20.0}"#.into())]);
    let outcome = planner(provider).plan(&Query::text("wool coat")).await;
    assert_eq!(outcome.source(), PlanSource::Planned);
    assert_eq!(outcome.plan().top_k, 20);
}

#[tokio::test]
async fn refined_queries_are_capped() {
    let reply = r#"{"refined_queries": ["a", "b", "c", "d", "e", "f", "g"], "use_image": false, "text_weight": 1, "top_k": 10}"#;
    let provider = ScriptedProvider::replying(vec![Ok(reply.into())]);
    let plan = planner(provider).plan(&Query::text("letters")).await.into_plan();
    assert_eq!(plan.refined_queries.len(), SearchConfig::default().max_refined_queries);
}

#[tokio::test]
async fn malformed_reply_falls_back() {
    let provider = ScriptedProvider::replying(vec![Ok("I am not sure what you mean.".into())]);
    let outcome = planner(provider).plan(&Query::text("black top with polka dot pattern")).await;
    assert_eq!(outcome.source(), PlanSource::Fallback);
    assert!(outcome.fallback_reason().is_some());
    let plan = outcome.plan();
    assert_eq!(plan.refined_queries, vec!["black top with polka dot pattern"]);
    assert!(!plan.use_image);
    assert_eq!(plan.text_weight, 1.0);
    assert_eq!(plan.top_k, 20);

    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": [], "use_image": false}"#.into())]);
    let outcome = planner(provider).plan(&Query::text("shoes")).await;
    assert_eq!(outcome.source(), PlanSource::Fallback);

    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": "not a list"}"#.into())]);
    assert!(planner(provider).try_plan(&Query::text("shoes")).await.is_err());
}

#[tokio::test]
async fn image_only_query_gets_placeholder_and_image_weight() {
    let planner = QueryPlanner::new(None, Arc::new(SearchConfig::default()));
    let outcome = planner.plan(&Query::image(png_stub())).await;
    assert_eq!(outcome.source(), PlanSource::Fallback);
    let plan = outcome.plan();
    assert!(plan.use_image);
    assert_eq!(plan.refined_queries, vec![IMAGE_ONLY_PLACEHOLDER]);
    assert_eq!(plan.text_weight, 0.0);
    assert_eq!(plan.effective_weights(), (0.0, 1.0));
}

#[tokio::test]
async fn fallback_with_both_modalities_uses_default_weight() {
    let planner = QueryPlanner::new(None, Arc::new(SearchConfig::default()));
    let plan = planner.fallback_plan(&Query::text("vintage denim jacket").with_image(png_stub()));
    assert!(plan.use_image);
    assert_eq!(plan.text_weight, 0.5);
}

#[tokio::test]
async fn use_image_requires_an_image() {
    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": ["red dress"], "use_image": true, "text_weight": 0.3, "top_k": 20}"#.into())]);
    let plan = planner(provider).plan(&Query::text("red dress").with_image(Vec::new())).await.into_plan();
    assert!(!plan.use_image);
    assert_eq!(plan.effective_weights(), (1.0, 0.0));
}

#[tokio::test]
async fn prompt_carries_recent_history_and_image_marker() {
    let provider = ScriptedProvider::replying(vec![Ok(r#"{"refined_queries": ["red dress"]}"#.into())]);
    let history = vec![
        ChatTurn::new("user", "turn one"),
        ChatTurn::new("assistant", "turn two"),
        ChatTurn::new("user", "turn three"),
        ChatTurn::new("assistant", "turn four"),
    ];
    let query = Query::text("same style but in red").with_image(png_stub()).with_history(history);
    let plan = planner(provider.clone()).plan(&query).await.into_plan();
    assert!(plan.use_image, "missing use_image defaults to image presence");

    let prompt = provider.last_prompt();
    assert!(!prompt.contains("turn one"));
    assert!(prompt.contains("assistant: turn two"));
    assert!(prompt.contains("assistant: turn four"));
    assert!(prompt.ends_with("Query: \"same style but in red\" [with image]"));
}

#[tokio::test]
async fn transient_failure_is_retried_once() {
    let provider = ScriptedProvider::replying(vec![
        Err(Error::Transient("503".into())),
        Ok(r#"{"refined_queries": ["linen shirt"], "top_k": 15}"#.into()),
    ]);
    let outcome = planner(provider).plan(&Query::text("linen shirt")).await;
    assert_eq!(outcome.source(), PlanSource::Planned);
    assert_eq!(outcome.plan().top_k, 15);
}

#[tokio::test]
async fn slow_provider_times_out_into_fallback() {
    let mut config = SearchConfig::default();
    config.timeouts.planner_ms = 30;
    let planner = QueryPlanner::new(Some(Arc::new(SlowProvider)), Arc::new(config));
    let outcome = planner.plan(&Query::text("wool coat")).await;
    assert_eq!(outcome.source(), PlanSource::Fallback);
    assert!(outcome.fallback_reason().unwrap_or_default().contains("Timed out"));
}

fn result(id: &str, score: f32) -> FusedResult {
    FusedResult {
        product_id: id.into(),
        combined_score: score,
        contributing_modalities: Default::default(),
        description: format!("{id} description"),
        image_path: format!("images/{id}.jpg"),
        categories: Default::default(),
    }
}

#[tokio::test]
async fn summary_fallbacks() {
    let policy = CallPolicy::new(Duration::from_millis(200), 0);
    let silent = Summarizer::new(None, policy);
    assert_eq!(silent.summarize("q", &[]).await, NO_RESULTS_MESSAGE);
    assert_eq!(silent.summarize("q", &[result("a", 0.9)]).await, found_message(1));

    let failing = Summarizer::new(Some(ScriptedProvider::replying(vec![Err(Error::Provider("down".into()))])), policy);
    let msg = failing.summarize("q", &[result("a", 0.9), result("b", 0.5)]).await;
    assert_eq!(msg, "I found 2 products matching your query. Check out the results below!");
}

#[tokio::test]
async fn summary_prompt_lists_top_results() {
    let provider = ScriptedProvider::replying(vec![Ok("  A tidy selection of jackets.  ".into())]);
    let summarizer = Summarizer::new(Some(provider.clone()), CallPolicy::new(Duration::from_millis(200), 0));
    let results: Vec<FusedResult> = (0..7).map(|i| result(&format!("p{i}"), 0.9 - i as f32 * 0.1)).collect();
    let msg = summarizer.summarize("denim jacket", &results).await;
    assert_eq!(msg, "A tidy selection of jackets.");
    let prompt = provider.last_prompt();
    assert!(prompt.contains("1. p0 description... (relevance: 0.90)"));
    assert!(prompt.contains("5. p4 description"));
    assert!(!prompt.contains("p5 description"));
    assert!(prompt.contains("Total results: 7"));
}
