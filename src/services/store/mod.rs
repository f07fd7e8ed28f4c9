use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use thiserror::Error;

use crate::models::product::{Product, ScoredProduct};
use crate::models::query::{FindOptions, ProductFilter};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryProductStore;
pub use mongo::MongoProductStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("failed to decode document: {0}")]
    Decode(#[from] mongodb::bson::de::Error),
    #[error("product {0} does not exist")]
    Missing(ObjectId),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for products. Every call is a single atomic operation on the
/// backing store.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn create(&self, product: Product) -> StoreResult<Product>;

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Product>>;

    async fn find(&self, filter: &ProductFilter, options: &FindOptions) -> StoreResult<Vec<Product>>;

    async fn count(&self, filter: &ProductFilter) -> StoreResult<u64>;

    /// Replaces the stored document with `product`.
    async fn save(&self, product: &Product) -> StoreResult<()>;

    /// Full-text search over active products, best match first.
    async fn search(&self, text: &str, limit: u64) -> StoreResult<Vec<ScoredProduct>>;
}

pub type DynProductStore = Arc<dyn ProductStore>;
