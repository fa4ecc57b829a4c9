use async_trait::async_trait;
use arrow_array::{Array, Float32Array, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::debug;

use lookbook_core::traits::VectorIndex;
use lookbook_core::types::{EmbeddingVector, IndexHit, Modality};
use lookbook_core::{Error, Result};

use crate::schema::{vector_dim, PRODUCT_ID_COLUMN};

fn index_error(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}

/// Cosine nearest-neighbor search over one LanceDB table.
///
/// Scores are `1 - cosine distance`, so identical directions score 1.0.
pub struct LanceVectorIndex {
    table: Table,
    modality: Modality,
    dim: usize,
}

impl LanceVectorIndex {
    pub async fn open(conn: &Connection, name: &str, modality: Modality) -> Result<Self> {
        let table = conn.open_table(name).execute().await.map_err(index_error)?;
        let schema = table.schema().await.map_err(index_error)?;
        let dim = vector_dim(&schema).ok_or_else(|| Error::Index(format!("table {name} has no fixed-size vector column")))?;
        Ok(Self { table, modality, dim })
    }

    pub fn dim(&self) -> usize { self.dim }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    fn modality(&self) -> Modality { self.modality }

    async fn query(&self, vector: &EmbeddingVector, k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 { return Ok(Vec::new()); }
        if vector.dim() != self.dim {
            return Err(Error::Index(format!("query dim {} does not match index dim {}", vector.dim(), self.dim)));
        }
        let mut stream = self.table
            .vector_search(vector.values.clone())
            .map_err(index_error)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(index_error)?;

        let mut hits = Vec::with_capacity(k);
        while let Some(batch) = stream.try_next().await.map_err(index_error)? {
            let ids = batch.column_by_name(PRODUCT_ID_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| Error::Index("product_id column missing".into()))?;
            let distances = batch.column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| Error::Index("_distance column missing".into()))?;
            for i in 0..batch.num_rows() {
                if ids.is_null(i) { continue; }
                hits.push(IndexHit { product_id: ids.value(i).to_string(), score: 1.0 - distances.value(i) });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.product_id.cmp(&b.product_id)));
        hits.truncate(k);
        debug!(modality = %self.modality, k, returned = hits.len(), "lance query");
        Ok(hits)
    }
}
