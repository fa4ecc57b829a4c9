use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use lookbook_core::traits::ProductMetadataStore;
use lookbook_core::types::{ProductId, ProductMetadata};
use lookbook_core::Result;

/// Product metadata loaded once from a JSON array of records.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<ProductId, ProductMetadata>,
}

impl Catalog {
    pub fn from_products(products: impl IntoIterator<Item = ProductMetadata>) -> Self {
        let products = products.into_iter().map(|p| (p.product_id.clone(), p)).collect();
        Self { products }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
        let products: Vec<ProductMetadata> = serde_json::from_str(&raw).with_context(|| format!("parsing catalog {}", path.display()))?;
        let catalog = Self::from_products(products);
        info!(path = %path.display(), products = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize { self.products.len() }

    pub fn is_empty(&self) -> bool { self.products.is_empty() }

    pub fn get(&self, id: &str) -> Option<&ProductMetadata> { self.products.get(id) }

    pub fn products(&self) -> impl Iterator<Item = &ProductMetadata> { self.products.values() }
}

#[async_trait]
impl ProductMetadataStore for Catalog {
    async fn get_many(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, ProductMetadata>> {
        Ok(ids.iter().filter_map(|id| self.products.get(id).map(|p| (id.clone(), p.clone()))).collect())
    }
}
