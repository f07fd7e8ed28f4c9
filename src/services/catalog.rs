//! Request orchestration for product endpoints.
//!
//! Every operation runs the same way: field rules first, then the
//! suspicious-pattern check on any body, then exactly one store call, and
//! finally a single envelope. Nothing reaches the store until the input has
//! passed validation.

use mongodb::bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::errors::ApiError;
use crate::models::envelope::ApiResponse;
use crate::models::product::{Category, NewProduct, Product, ProductPatch, ProductResponse};
use crate::models::query::{
    FindOptions, PageRequest, Pagination, ProductFilter, ProductPage, SortSpec, SEARCH_RESULT_CAP,
};
use crate::services::rules::{CREATE_PRODUCT, LIST_PRODUCTS, PRODUCT_ID, UPDATE_PRODUCT};
use crate::services::sanitize::find_suspicious;
use crate::services::store::DynProductStore;
use crate::services::validation::{violations_from, Location, Violation};

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Clone)]
pub struct ProductCatalog {
    store: DynProductStore,
}

impl ProductCatalog {
    pub fn new(store: DynProductStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, mut body: Value) -> ApiResult<ProductResponse> {
        let violations = CREATE_PRODUCT.run(&mut body);
        if !violations.is_empty() {
            return Err(ApiError::Validation(violations));
        }
        reject_suspicious(&body)?;

        let input: NewProduct = from_body(body)?;
        let product = Product::new(input);
        check_schema(&product)?;

        let product = self
            .store
            .create(product)
            .await
            .map_err(ApiError::internal("Failed to create product"))?;
        info!(id = %product.id, title = %product.title, "product created");
        Ok(ApiResponse::created(
            "Product created successfully",
            ProductResponse::from(product),
        ))
    }

    pub async fn list(&self, mut query: Value) -> ApiResult<ProductPage> {
        let violations = LIST_PRODUCTS.run(&mut query);
        if !violations.is_empty() {
            return Err(ApiError::Validation(violations));
        }

        let page = PageRequest {
            page: query_u64(&query, "page").unwrap_or(PageRequest::default().page),
            limit: query_u64(&query, "limit").unwrap_or(PageRequest::default().limit),
        };
        let filter = ProductFilter {
            categories: query_categories(&query),
            text: query_str(&query, "search")
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            active_only: true,
        };
        let options = FindOptions {
            sort: query_str(&query, "sort")
                .and_then(SortSpec::parse)
                .unwrap_or_default(),
            skip: page.skip(),
            limit: page.limit,
        };
        debug!(?filter, ?options, "listing products");

        let products = self
            .store
            .find(&filter, &options)
            .await
            .map_err(ApiError::internal("Failed to fetch products"))?;
        let total = self
            .store
            .count(&filter)
            .await
            .map_err(ApiError::internal("Failed to fetch products"))?;

        Ok(ApiResponse::success(
            "Products retrieved successfully",
            Some(ProductPage {
                products: products.into_iter().map(ProductResponse::from).collect(),
                pagination: Pagination::new(page, total),
            }),
        ))
    }

    pub async fn get(&self, id: &str) -> ApiResult<ProductResponse> {
        let id = parse_id(id, Vec::new())?;
        let product = self.load(&id, "Failed to fetch product").await?;
        Ok(ApiResponse::success(
            "Product retrieved successfully",
            Some(ProductResponse::from(product)),
        ))
    }

    pub async fn update(&self, id: &str, mut body: Value) -> ApiResult<ProductResponse> {
        let body_violations = UPDATE_PRODUCT.run(&mut body);
        let id = parse_id(id, body_violations)?;
        reject_suspicious(&body)?;
        let patch: ProductPatch = from_body(body)?;

        let mut product = self.load(&id, "Failed to update product").await?;
        product.apply(patch);
        check_schema(&product)?;

        self.store
            .save(&product)
            .await
            .map_err(ApiError::internal("Failed to update product"))?;
        info!(id = %product.id, "product updated");
        Ok(ApiResponse::success(
            "Product updated successfully",
            Some(ProductResponse::from(product)),
        ))
    }

    /// Soft delete. Deleting an inactive product again is a no-op success.
    pub async fn delete(&self, id: &str) -> ApiResult<Value> {
        let id = parse_id(id, Vec::new())?;
        let mut product = self.load(&id, "Failed to delete product").await?;
        product.soft_delete();
        self.store
            .save(&product)
            .await
            .map_err(ApiError::internal("Failed to delete product"))?;
        info!(id = %product.id, "product deactivated");
        Ok(ApiResponse::success("Product deleted successfully", None))
    }

    pub async fn search(&self, mut query: Value) -> ApiResult<Vec<ProductResponse>> {
        let violations = LIST_PRODUCTS.run(&mut query);
        if !violations.is_empty() {
            return Err(ApiError::Validation(violations));
        }
        let Some(text) = query_str(&query, "q").map(str::trim).filter(|q| !q.is_empty()) else {
            return Err(ApiError::Validation(vec![Violation::new(
                "q",
                "Search query is required",
                Location::Query,
            )]));
        };

        let hits = self
            .store
            .search(text, SEARCH_RESULT_CAP)
            .await
            .map_err(ApiError::internal("Failed to search products"))?;
        debug!(query = text, hits = hits.len(), "search complete");
        Ok(ApiResponse::success(
            "Search results retrieved successfully",
            Some(hits.into_iter().map(ProductResponse::from).collect()),
        ))
    }

    async fn load(&self, id: &ObjectId, context: &'static str) -> Result<Product, ApiError> {
        self.store
            .find_by_id(id)
            .await
            .map_err(ApiError::internal(context))?
            .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))
    }
}

/// Validates the `id` path parameter; `pending` holds body violations that
/// should be reported after it.
fn parse_id(raw: &str, pending: Vec<Violation>) -> Result<ObjectId, ApiError> {
    let mut params = json!({ "id": raw });
    let mut violations = PRODUCT_ID.run(&mut params);
    violations.extend(pending);
    if !violations.is_empty() {
        return Err(ApiError::Validation(violations));
    }
    ObjectId::parse_str(raw).map_err(|_| {
        ApiError::Validation(vec![Violation::new("id", "Invalid product ID", Location::Params)])
    })
}

fn reject_suspicious(body: &Value) -> Result<(), ApiError> {
    match find_suspicious(body) {
        Some(found) => {
            warn!(path = %found.path, pattern = found.pattern, "suspicious input rejected");
            Err(ApiError::Rejected)
        }
        None => Ok(()),
    }
}

fn from_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|err| {
        ApiError::Validation(vec![Violation::new(
            "body",
            format!("Malformed product payload: {err}"),
            Location::Body,
        )])
    })
}

fn check_schema(product: &Product) -> Result<(), ApiError> {
    product
        .validate()
        .map_err(|errors| ApiError::Validation(violations_from(&errors)))
}

fn query_str<'a>(query: &'a Value, key: &str) -> Option<&'a str> {
    match query.get(key)? {
        Value::String(text) => Some(text.as_str()),
        Value::Array(items) => items.last().and_then(Value::as_str),
        _ => None,
    }
}

fn query_u64(query: &Value, key: &str) -> Option<u64> {
    query_str(query, key).and_then(|raw| raw.trim().parse().ok())
}

fn query_categories(query: &Value) -> Vec<Category> {
    match query.get("category") {
        Some(Value::String(name)) => name.parse::<Category>().into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|name| name.parse::<Category>().ok())
            .collect(),
        _ => Vec::new(),
    }
}
