use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use lookbook_core::config::{ScoreNormalization, SearchConfig};
use lookbook_core::traits::ProductMetadataStore;
use lookbook_core::types::{Modality, ProductId, ProductMetadata, QueryPlan, RawHit};
use lookbook_core::{Error, Result};
use lookbook_hybrid::{fuse, rank};
use lookbook_vector::Catalog;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn hit(id: &str, score: f32, modality: Modality, idx: usize) -> RawHit {
    RawHit { product_id: id.to_string(), raw_score: score, modality, source_query_index: idx }
}

fn plan(text_weight: f32, use_image: bool, top_k: usize) -> QueryPlan {
    QueryPlan { refined_queries: vec!["q".into()], use_image, text_weight, top_k, filters: None, reasoning: None }
}

fn product(id: &str, description: &str, categories: &[(&str, &str)]) -> ProductMetadata {
    ProductMetadata {
        product_id: id.into(),
        description: description.into(),
        image_path: format!("images/{id}.jpg"),
        categories: categories.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
}

fn random_hits(rng: &mut StdRng) -> Vec<RawHit> {
    let n = rng.gen_range(0..40);
    (0..n)
        .map(|_| {
            let modality = if rng.gen_bool(0.5) { Modality::Text } else { Modality::Image };
            let idx = rng.gen_range(0..4);
            hit(&format!("p{}", rng.gen_range(0..12)), rng.gen_range(-0.2f32..1.2), modality, idx)
        })
        .collect()
}

#[test]
fn weighted_combination_matches_worked_example() {
    let hits = vec![hit("p1", 0.8, Modality::Text, 0), hit("p1", 0.4, Modality::Image, 1)];
    let ranked = rank(&hits, &plan(0.6, true, 10), ScoreNormalization::Clamp);
    assert_eq!(ranked.len(), 1);
    assert!((ranked[0].combined_score - 0.64).abs() < 1e-6, "got {}", ranked[0].combined_score);
    assert_eq!(ranked[0].modalities().len(), 2);
}

#[test]
fn max_aggregation_per_modality() {
    let hits = vec![
        hit("p1", 0.3, Modality::Text, 0),
        hit("p1", 0.9, Modality::Text, 2),
        hit("p2", 0.85, Modality::Text, 1),
    ];
    let ranked = rank(&hits, &plan(1.0, false, 10), ScoreNormalization::Clamp);
    assert_eq!(ranked[0].product_id, "p1");
    assert!((ranked[0].combined_score - 0.9).abs() < 1e-6);
    assert_eq!(ranked[0].first_query_index, 0);
}

#[test]
fn text_only_plan_ignores_stated_image_weight() {
    let hits = vec![hit("p1", 0.7, Modality::Text, 0), hit("p2", 0.99, Modality::Image, 1)];
    let ranked = rank(&hits, &plan(0.2, false, 10), ScoreNormalization::Clamp);
    assert_eq!(ranked[0].product_id, "p1");
    assert!((ranked[0].combined_score - 0.7).abs() < 1e-6);
    assert_eq!(ranked[1].combined_score, 0.0);
}

#[test]
fn ties_break_on_query_index_then_modalities_then_id() {
    let hits = vec![
        // all three combine to 0.5 under equal weights
        hit("c", 0.5, Modality::Text, 1),
        hit("c", 0.5, Modality::Image, 1),
        hit("b", 1.0, Modality::Text, 1),
        hit("a", 1.0, Modality::Image, 1),
        hit("z", 1.0, Modality::Text, 0),
    ];
    let ranked = rank(&hits, &plan(0.5, true, 10), ScoreNormalization::Clamp);
    let ids: Vec<&str> = ranked.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(ids, vec!["z", "c", "a", "b"]);
}

#[test]
fn clamp_normalization_bounds_scores() {
    let hits = vec![hit("hi", 1.4, Modality::Text, 0), hit("nan", f32::NAN, Modality::Text, 0), hit("neg", -0.3, Modality::Text, 0)];
    let ranked = rank(&hits, &plan(1.0, false, 10), ScoreNormalization::Clamp);
    for r in &ranked {
        assert!((0.0..=1.0).contains(&r.combined_score), "{} out of range", r.combined_score);
    }
    assert_eq!(ranked[0].product_id, "hi");
    assert_eq!(ranked[0].combined_score, 1.0);
}

#[test]
fn max_scale_normalization_rescales_each_modality() {
    // image scores live on a narrower native scale than text scores
    let hits = vec![
        hit("t1", 0.9, Modality::Text, 0),
        hit("t2", 0.45, Modality::Text, 0),
        hit("i1", 0.30, Modality::Image, 1),
        hit("i2", 0.15, Modality::Image, 1),
    ];
    let ranked = rank(&hits, &plan(0.5, true, 10), ScoreNormalization::MaxScale);
    let score: HashMap<&str, f32> = ranked.iter().map(|r| (r.product_id.as_str(), r.combined_score)).collect();
    assert!((score["t1"] - 0.5).abs() < 1e-6);
    assert!((score["i1"] - 0.5).abs() < 1e-6);
    assert!((score["t2"] - 0.25).abs() < 1e-6);
    assert!((score["i2"] - 0.25).abs() < 1e-6);

    let zero = rank(&[hit("none", -0.4, Modality::Image, 0)], &plan(0.0, true, 10), ScoreNormalization::MaxScale);
    assert_eq!(zero[0].combined_score, 0.0);
}

#[test]
fn ranking_is_deterministic_and_deduplicated() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let hits = random_hits(&mut rng);
        let p = plan(rng.gen_range(0.0..=1.0), rng.gen_bool(0.5), 50);
        for mode in [ScoreNormalization::Clamp, ScoreNormalization::MaxScale] {
            let first = rank(&hits, &p, mode);
            let mut reversed = hits.clone();
            reversed.reverse();
            assert_eq!(first, rank(&hits, &p, mode));
            assert_eq!(first, rank(&reversed, &p, mode), "order of hits must not matter");
            let unique: HashSet<&str> = first.iter().map(|r| r.product_id.as_str()).collect();
            assert_eq!(unique.len(), first.len());
            let distinct_inputs: HashSet<&str> = hits.iter().map(|h| h.product_id.as_str()).collect();
            assert_eq!(first.len(), distinct_inputs.len());
        }
    }
}

#[test]
fn raising_a_raw_score_never_lowers_the_product_score() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..300 {
        let hits = random_hits(&mut rng);
        if hits.is_empty() {
            continue;
        }
        let p = plan(rng.gen_range(0.0..=1.0), true, 50);
        let pick = rng.gen_range(0..hits.len());
        let mut raised = hits.clone();
        raised[pick].raw_score += rng.gen_range(0.0..0.5);
        let target = hits[pick].product_id.clone();
        for mode in [ScoreNormalization::Clamp, ScoreNormalization::MaxScale] {
            let score_of = |hs: &[RawHit]| rank(hs, &p, mode).into_iter().find(|r| r.product_id == target).map(|r| r.combined_score).unwrap_or(0.0);
            let before = score_of(&hits);
            let after = score_of(&raised);
            assert!(after + 1e-6 >= before, "{mode:?}: {before} -> {after}");
        }
    }
}

#[tokio::test]
async fn fuse_truncates_joins_and_reports_orphans() {
    let catalog = Catalog::from_products([
        product("p1", "Blue denim jacket", &[("category", "jacket")]),
        product("p3", "Grey wool coat", &[]),
    ]);
    let hits = vec![
        hit("p1", 0.9, Modality::Text, 0),
        hit("ghost", 0.8, Modality::Text, 0),
        hit("p3", 0.7, Modality::Text, 0),
        hit("p4", 0.1, Modality::Text, 0),
    ];
    let fusion = fuse(&hits, &plan(1.0, false, 3), &catalog, &SearchConfig::default()).await.unwrap();
    assert_eq!(fusion.candidate_count, 4);
    assert_eq!(fusion.orphaned_ids, vec!["ghost".to_string()]);
    let ids: Vec<&str> = fusion.results.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p3"], "p4 was cut by top_k before the join");
    assert_eq!(fusion.results[0].description, "Blue denim jacket");
    assert_eq!(fusion.results[0].image_path, "images/p1.jpg");
    assert_eq!(fusion.results[0].categories.get("category").map(String::as_str), Some("jacket"));
    assert!(fusion.results.iter().all(|r| r.contributing_modalities.iter().all(|m| *m == Modality::Text)));
}

#[tokio::test]
async fn filters_apply_before_truncation_on_whole_words() {
    let catalog = Catalog::from_products([
        product("zip", "Zippered black hoodie", &[("category", "hoodie")]),
        product("red1", "Cotton t-shirt", &[("color", "Red"), ("category", "top")]),
        product("red2", "A RED summer dress", &[]),
        product("blue", "Blue dress", &[]),
    ]);
    let hits = vec![
        hit("zip", 0.99, Modality::Text, 0),
        hit("blue", 0.95, Modality::Text, 0),
        hit("red2", 0.6, Modality::Text, 0),
        hit("red1", 0.5, Modality::Text, 0),
    ];
    let mut p = plan(1.0, false, 2);
    p.filters = Some(BTreeMap::from([("color".to_string(), "red".to_string())]));
    let fusion = fuse(&hits, &p, &catalog, &SearchConfig::default()).await.unwrap();
    let ids: Vec<&str> = fusion.results.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(ids, vec!["red2", "red1"]);
}

struct BrokenStore;

#[async_trait]
impl ProductMetadataStore for BrokenStore {
    async fn get_many(&self, _ids: &[ProductId]) -> Result<HashMap<ProductId, ProductMetadata>> {
        Err(Error::Provider("connection reset".into()))
    }
}

#[tokio::test]
async fn metadata_failure_is_fatal() {
    let hits = vec![hit("p1", 0.9, Modality::Text, 0)];
    let err = fuse(&hits, &plan(1.0, false, 5), &BrokenStore, &SearchConfig::default()).await.unwrap_err();
    assert!(matches!(err, Error::Metadata(_)));

    let empty = fuse(&[], &plan(1.0, false, 5), &BrokenStore, &SearchConfig::default()).await.unwrap();
    assert!(empty.results.is_empty(), "no lookup is made without candidates");
}
