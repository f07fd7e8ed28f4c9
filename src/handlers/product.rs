use actix_web::{delete, get, post, put, web};
use serde_json::Value;

use crate::middleware::QueryParams;
use crate::models::product::ProductResponse;
use crate::models::query::ProductPage;
use crate::services::catalog::{ApiResult, ProductCatalog};

#[get("")]
async fn list_products(
    catalog: web::Data<ProductCatalog>,
    query: QueryParams,
) -> ApiResult<ProductPage> {
    catalog.list(query.into_inner()).await
}

#[post("")]
async fn create_product(
    catalog: web::Data<ProductCatalog>,
    body: web::Json<Value>,
) -> ApiResult<ProductResponse> {
    catalog.create(body.into_inner()).await
}

// Registered ahead of `/{id}` so "search" is never taken for an id.
#[get("/search")]
async fn search_products(
    catalog: web::Data<ProductCatalog>,
    query: QueryParams,
) -> ApiResult<Vec<ProductResponse>> {
    catalog.search(query.into_inner()).await
}

#[get("/{id}")]
async fn get_product(
    catalog: web::Data<ProductCatalog>,
    id: web::Path<String>,
) -> ApiResult<ProductResponse> {
    catalog.get(&id).await
}

#[put("/{id}")]
async fn update_product(
    catalog: web::Data<ProductCatalog>,
    id: web::Path<String>,
    body: web::Json<Value>,
) -> ApiResult<ProductResponse> {
    catalog.update(&id, body.into_inner()).await
}

#[delete("/{id}")]
async fn delete_product(
    catalog: web::Data<ProductCatalog>,
    id: web::Path<String>,
) -> ApiResult<Value> {
    catalog.delete(&id).await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/products")
            .service(list_products)
            .service(create_product)
            .service(search_products)
            .service(get_product)
            .service(update_product)
            .service(delete_product),
    );
}
