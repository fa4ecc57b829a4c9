use std::collections::BTreeMap;

use lookbook_core::traits::{ProductMetadataStore, VectorIndex};
use lookbook_core::types::{EmbeddingVector, Modality, ProductMetadata};
use lookbook_vector::{write_vectors, Catalog, InMemoryVectorIndex, LanceVectorIndex, VectorRecord};

fn unit(values: &[f32]) -> Vec<f32> {
    let n = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    values.iter().map(|x| x / n).collect()
}

fn query(values: &[f32], modality: Modality) -> EmbeddingVector {
    EmbeddingVector::new(unit(values), modality, "test-model")
}

#[tokio::test]
async fn lance_index_ranks_by_cosine_similarity() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = lookbook_vector::table::open_db(&tmp.path().to_string_lossy()).await?;
    let records = vec![
        VectorRecord::new("p-east", unit(&[1.0, 0.0, 0.0, 0.0])),
        VectorRecord::new("p-north", unit(&[0.0, 1.0, 0.0, 0.0])),
        VectorRecord::new("p-northeast", unit(&[1.0, 1.0, 0.0, 0.0])),
    ];
    let written = write_vectors(&conn, "text_vectors", Modality::Text, 4, &records).await?;
    assert_eq!(written, 3);

    let index = LanceVectorIndex::open(&conn, "text_vectors", Modality::Text).await?;
    assert_eq!(index.dim(), 4);
    assert_eq!(index.modality(), Modality::Text);

    let hits = index.query(&query(&[1.0, 0.1, 0.0, 0.0], Modality::Text), 2).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].product_id, "p-east");
    assert_eq!(hits[1].product_id, "p-northeast");
    assert!(hits[0].score >= hits[1].score);
    assert!(hits[0].score > 0.9 && hits[0].score <= 1.0 + 1e-4);
    Ok(())
}

#[tokio::test]
async fn lance_index_rejects_mismatched_dimensions() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = lookbook_vector::table::open_db(&tmp.path().to_string_lossy()).await?;
    write_vectors(&conn, "image_vectors", Modality::Image, 3, &[VectorRecord::new("a", unit(&[1.0, 2.0, 3.0]))]).await?;
    let index = LanceVectorIndex::open(&conn, "image_vectors", Modality::Image).await?;
    let err = index.query(&query(&[1.0, 0.0], Modality::Image), 5).await.unwrap_err();
    assert!(matches!(err, lookbook_core::Error::Index(_)));

    let bad = write_vectors(&conn, "image_vectors", Modality::Image, 3, &[VectorRecord::new("b", vec![1.0])]).await;
    assert!(bad.is_err());
    Ok(())
}

#[tokio::test]
async fn in_memory_index_breaks_ties_by_product_id() -> anyhow::Result<()> {
    let mut index = InMemoryVectorIndex::new(Modality::Image);
    index.insert("zeta", vec![0.0, 1.0]);
    index.insert("alpha", vec![0.0, 2.0]);
    index.insert("mid", vec![1.0, 1.0]);
    let hits = index.query(&query(&[0.0, 1.0], Modality::Image), 10).await?;
    let ids: Vec<&str> = hits.iter().map(|h| h.product_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "zeta", "mid"]);
    assert!(index.query(&query(&[1.0, 0.0, 0.0], Modality::Image), 1).await.is_err());
    assert!(index.query(&query(&[0.0, 1.0], Modality::Image), 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn catalog_omits_unknown_ids() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("products.json");
    std::fs::write(&path, r#"[
        {"product_id": "p1", "description": "Blue denim jacket", "image_path": "images/p1.jpg",
         "categories": {"color": "blue", "category": "jacket"}},
        {"product_id": "p2", "description": "Red summer dress", "image_path": "images/p2.jpg"}
    ]"#)?;
    let catalog = Catalog::load(&path)?;
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get("p2").map(|p| p.categories.is_empty()), Some(true));

    let found = catalog.get_many(&["p1".to_string(), "ghost".to_string()]).await?;
    assert_eq!(found.len(), 1);
    let p1 = &found["p1"];
    let expected: BTreeMap<String, String> = [("category", "jacket"), ("color", "blue")].into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    assert_eq!(p1.categories, expected);

    let inline = Catalog::from_products([ProductMetadata { product_id: "x".into(), description: "d".into(), image_path: "i".into(), categories: BTreeMap::new() }]);
    assert!(inline.get("x").is_some());
    Ok(())
}
