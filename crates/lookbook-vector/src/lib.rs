//! Vector indexes and product metadata for the lookbook search pipeline.
//!
//! Text and image vectors live in separate LanceDB tables, one row per
//! product. [`LanceVectorIndex`] and [`InMemoryVectorIndex`] both implement
//! `VectorIndex`; [`Catalog`] implements `ProductMetadataStore`.

pub mod catalog;
pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use catalog::Catalog;
pub use memory::InMemoryVectorIndex;
pub use search::LanceVectorIndex;
pub use writer::{write_vectors, VectorRecord};
