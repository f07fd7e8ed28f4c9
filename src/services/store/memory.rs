use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{ProductStore, StoreError, StoreResult};
use crate::models::product::{Product, ScoredProduct};
use crate::models::query::{FindOptions, ProductFilter, SortDirection, SortField, SortSpec};

/// Process-local store for development and tests.
///
/// Text matching is a plain word count over title and description, which is
/// close enough to a `$text` score to rank results sensibly.
#[derive(Default)]
pub struct InMemoryProductStore {
    products: RwLock<HashMap<ObjectId, Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn text_score(product: &Product, query_terms: &[String]) -> f64 {
    let haystack = terms(&format!("{} {}", product.title, product.description));
    query_terms
        .iter()
        .map(|term| haystack.iter().filter(|word| *word == term).count())
        .sum::<usize>() as f64
}

fn matches(product: &Product, filter: &ProductFilter) -> bool {
    if filter.active_only && !product.is_active {
        return false;
    }
    if !filter.categories.is_empty() && !filter.categories.contains(&product.category) {
        return false;
    }
    match &filter.text {
        Some(text) => text_score(product, &terms(text)) > 0.0,
        None => true,
    }
}

fn compare(a: &Product, b: &Product, sort: &SortSpec) -> Ordering {
    let ordering = match sort.field {
        SortField::Price => a.price.total_cmp(&b.price),
        SortField::Title => a.title.cmp(&b.title),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
    .then_with(|| a.id.cmp(&b.id));
    match sort.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn create(&self, product: Product) -> StoreResult<Product> {
        self.products.write().insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Product>> {
        Ok(self.products.read().get(id).cloned())
    }

    async fn find(&self, filter: &ProductFilter, options: &FindOptions) -> StoreResult<Vec<Product>> {
        let mut found: Vec<Product> = self
            .products
            .read()
            .values()
            .filter(|product| matches(product, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| compare(a, b, &options.sort));
        Ok(found
            .into_iter()
            .skip(options.skip as usize)
            .take(options.limit as usize)
            .collect())
    }

    async fn count(&self, filter: &ProductFilter) -> StoreResult<u64> {
        let products = self.products.read();
        Ok(products.values().filter(|product| matches(product, filter)).count() as u64)
    }

    async fn save(&self, product: &Product) -> StoreResult<()> {
        let mut products = self.products.write();
        match products.get_mut(&product.id) {
            Some(stored) => {
                *stored = product.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(product.id)),
        }
    }

    async fn search(&self, text: &str, limit: u64) -> StoreResult<Vec<ScoredProduct>> {
        let query_terms = terms(text);
        let mut hits: Vec<ScoredProduct> = self
            .products
            .read()
            .values()
            .filter(|product| product.is_active)
            .filter_map(|product| {
                let score = text_score(product, &query_terms);
                (score > 0.0).then(|| ScoredProduct {
                    product: product.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.product.created_at.cmp(&a.product.created_at))
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }
}
