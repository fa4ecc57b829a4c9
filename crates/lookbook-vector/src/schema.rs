use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const PRODUCT_ID_COLUMN: &str = "product_id";
pub const MODALITY_COLUMN: &str = "modality";
pub const VECTOR_COLUMN: &str = "vector";

/// One row per product per modality; the vector width is fixed per table.
pub fn build_vector_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(PRODUCT_ID_COLUMN, DataType::Utf8, false),
        Field::new(MODALITY_COLUMN, DataType::Utf8, false),
        Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
    ]))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}
