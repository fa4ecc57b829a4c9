//! Multimodal retrieval and fusion.
//!
//! [`SearchOrchestrator`] drives one request end to end: plan the query,
//! fan out embed + nearest-neighbor sub-queries with [`Retriever`], merge
//! them with [`fusion::fuse`], and summarize the ranked list.

pub mod filters;
pub mod fusion;
pub mod orchestrator;
pub mod retriever;

pub use filters::AttributeFilter;
pub use fusion::{fuse, rank, Fusion, RankedProduct};
pub use orchestrator::{SearchComponents, SearchOrchestrator};
pub use retriever::{Retrieval, Retriever};
