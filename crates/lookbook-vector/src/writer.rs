use anyhow::{bail, Result};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use lookbook_core::types::{Modality, ProductId};

use crate::schema::build_vector_schema;
use crate::table::ensure_vector_table;

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub product_id: ProductId,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn new(product_id: impl Into<ProductId>, vector: Vec<f32>) -> Self {
        Self { product_id: product_id.into(), vector }
    }
}

/// Append `records` to the `modality` table, creating it on first write.
/// Every vector must be exactly `dim` wide.
pub async fn write_vectors(conn: &Connection, table: &str, modality: Modality, dim: usize, records: &[VectorRecord]) -> Result<usize> {
    if records.is_empty() { return Ok(0); }
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
        bail!("vector for {} has dim {}, expected {}", bad.product_id, bad.vector.len(), dim);
    }
    let dim = i32::try_from(dim)?;
    ensure_vector_table(conn, table, dim).await?;

    let schema = build_vector_schema(dim);
    let ids: Vec<String> = records.iter().map(|r| r.product_id.clone()).collect();
    let modalities: Vec<&str> = records.iter().map(|_| modality.as_str()).collect();
    let vectors: Vec<Option<Vec<Option<f32>>>> = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect())).collect();
    let batch = RecordBatch::try_new(schema.clone(), vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(modalities)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
    ])?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.open_table(table).execute().await?.add(reader).execute().await?;
    info!(table, modality = %modality, rows = records.len(), "vectors written");
    Ok(records.len())
}
