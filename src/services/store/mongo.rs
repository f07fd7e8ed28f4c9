use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    options::{FindOptions as MongoFindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use tracing::{debug, info};

use super::{ProductStore, StoreError, StoreResult};
use crate::models::product::{Product, ScoredProduct};
use crate::models::query::{FindOptions, ProductFilter};

pub const PRODUCTS_COLLECTION: &str = "products";

#[derive(Clone)]
pub struct MongoProductStore {
    collection: Collection<Product>,
}

impl MongoProductStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(PRODUCTS_COLLECTION),
        }
    }

    /// Text index backing `$text` queries over title and description.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let model = IndexModel::builder()
            .keys(doc! { "title": "text", "description": "text" })
            .options(
                IndexOptions::builder()
                    .name("product_text".to_string())
                    .build(),
            )
            .build();
        self.collection.create_index(model, None).await?;
        info!(collection = PRODUCTS_COLLECTION, "text index ensured");
        Ok(())
    }
}

fn filter_document(filter: &ProductFilter) -> Document {
    let mut query = Document::new();
    match filter.categories.as_slice() {
        [] => {}
        [single] => {
            query.insert("category", single.as_str());
        }
        many => {
            let names: Vec<&str> = many.iter().map(|category| category.as_str()).collect();
            query.insert("category", doc! { "$in": names });
        }
    }
    if let Some(text) = &filter.text {
        query.insert("$text", doc! { "$search": text.as_str() });
    }
    if filter.active_only {
        query.insert("isActive", true);
    }
    query
}

#[async_trait]
impl ProductStore for MongoProductStore {
    async fn create(&self, product: Product) -> StoreResult<Product> {
        self.collection.insert_one(&product, None).await?;
        debug!(id = %product.id, "product inserted");
        Ok(product)
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Product>> {
        Ok(self.collection.find_one(doc! { "_id": *id }, None).await?)
    }

    async fn find(&self, filter: &ProductFilter, options: &FindOptions) -> StoreResult<Vec<Product>> {
        let mut sort = Document::new();
        sort.insert(options.sort.field.column(), options.sort.direction.as_i32());
        let find_options = MongoFindOptions::builder()
            .sort(sort)
            .skip(options.skip)
            .limit(options.limit as i64)
            .build();
        let cursor = self
            .collection
            .find(filter_document(filter), find_options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, filter: &ProductFilter) -> StoreResult<u64> {
        Ok(self
            .collection
            .count_documents(filter_document(filter), None)
            .await?)
    }

    async fn save(&self, product: &Product) -> StoreResult<()> {
        let result = self
            .collection
            .replace_one(doc! { "_id": product.id }, product, None)
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::Missing(product.id));
        }
        Ok(())
    }

    async fn search(&self, text: &str, limit: u64) -> StoreResult<Vec<ScoredProduct>> {
        let raw: Collection<Document> = self.collection.clone_with_type();
        let find_options = MongoFindOptions::builder()
            .projection(doc! { "score": { "$meta": "textScore" } })
            .sort(doc! { "score": { "$meta": "textScore" } })
            .limit(limit as i64)
            .build();
        let filter = doc! {
            "$text": { "$search": text },
            "isActive": true,
        };
        let documents: Vec<Document> = raw.find(filter, find_options).await?.try_collect().await?;

        documents
            .into_iter()
            .map(|mut document| -> StoreResult<ScoredProduct> {
                let score = document
                    .remove("score")
                    .and_then(|value| value.as_f64())
                    .unwrap_or_default();
                let product: Product = bson::from_document(document)?;
                Ok(ScoredProduct { product, score })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::Category;

    #[test]
    fn test_filter_document_shapes() {
        let filter = ProductFilter {
            categories: vec![Category::Books],
            text: Some("rust".to_string()),
            active_only: true,
        };
        assert_eq!(
            filter_document(&filter),
            doc! {
                "category": "Books",
                "$text": { "$search": "rust" },
                "isActive": true,
            }
        );

        let many = ProductFilter {
            categories: vec![Category::Books, Category::Food],
            ..ProductFilter::default()
        };
        assert_eq!(
            filter_document(&many),
            doc! { "category": { "$in": ["Books", "Food"] } }
        );
        assert_eq!(filter_document(&ProductFilter::default()), Document::new());
    }
}
