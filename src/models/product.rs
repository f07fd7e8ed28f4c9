use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Cameras,
    Laptops,
    Accessories,
    Headphones,
    Food,
    Books,
    #[serde(rename = "Clothes/Shoes")]
    ClothesShoes,
    #[serde(rename = "Beauty/Health")]
    BeautyHealth,
    Sports,
    Outdoor,
    Home,
}

impl Category {
    pub const NAMES: [&'static str; 12] = [
        "Electronics",
        "Cameras",
        "Laptops",
        "Accessories",
        "Headphones",
        "Food",
        "Books",
        "Clothes/Shoes",
        "Beauty/Health",
        "Sports",
        "Outdoor",
        "Home",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Cameras => "Cameras",
            Category::Laptops => "Laptops",
            Category::Accessories => "Accessories",
            Category::Headphones => "Headphones",
            Category::Food => "Food",
            Category::Books => "Books",
            Category::ClothesShoes => "Clothes/Shoes",
            Category::BeautyHealth => "Beauty/Health",
            Category::Sports => "Sports",
            Category::Outdoor => "Outdoor",
            Category::Home => "Home",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s {
            "Electronics" => Category::Electronics,
            "Cameras" => Category::Cameras,
            "Laptops" => Category::Laptops,
            "Accessories" => Category::Accessories,
            "Headphones" => Category::Headphones,
            "Food" => Category::Food,
            "Books" => Category::Books,
            "Clothes/Shoes" => Category::ClothesShoes,
            "Beauty/Health" => Category::BeautyHealth,
            "Sports" => Category::Sports,
            "Outdoor" => Category::Outdoor,
            "Home" => Category::Home,
            other => return Err(UnknownCategory(other.to_string())),
        };
        Ok(category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductImage {
    #[validate(length(min = 1, message = "Image public_id is required"))]
    pub public_id: String,
    #[validate(url(message = "Invalid image URL"))]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review: Option<String>,
    pub user: Option<ObjectId>,
}

/// Stored shape of a product document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[validate(length(min = 1, max = 100, message = "Product name cannot exceed 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub short_description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub original_price: Option<f64>,
    pub category: Category,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i64,
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ProductImage>,
    pub is_active: bool,
    pub is_new: bool,
    pub is_sale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Body of a create request after validation and sanitization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    #[serde(default, alias = "short_description")]
    pub short_description: Option<String>,
    pub price: f64,
    #[serde(default, alias = "original_price")]
    pub original_price: Option<f64>,
    pub category: Category,
    pub stock: i64,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default, alias = "is_new")]
    pub is_new: Option<bool>,
    #[serde(default, alias = "is_sale")]
    pub is_sale: Option<bool>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// Partial update. Absent fields leave the stored value alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "short_description")]
    pub short_description: Option<String>,
    pub price: Option<f64>,
    #[serde(alias = "original_price")]
    pub original_price: Option<f64>,
    pub category: Option<Category>,
    pub stock: Option<i64>,
    pub images: Option<Vec<ProductImage>>,
    #[serde(alias = "is_active")]
    pub is_active: Option<bool>,
    #[serde(alias = "is_new")]
    pub is_new: Option<bool>,
    #[serde(alias = "is_sale")]
    pub is_sale: Option<bool>,
    pub badge: Option<String>,
    pub rating: Option<f64>,
}

impl Product {
    pub fn new(input: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            title: input.title,
            description: input.description,
            short_description: input.short_description,
            price: input.price,
            original_price: input.original_price,
            category: input.category,
            stock: input.stock,
            images: input.images,
            is_active: true,
            is_new: input.is_new.unwrap_or(true),
            is_sale: input.is_sale.unwrap_or(true),
            badge: input.badge,
            rating: input.rating,
            reviews: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: ProductPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if patch.short_description.is_some() {
            self.short_description = patch.short_description;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if patch.original_price.is_some() {
            self.original_price = patch.original_price;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(images) = patch.images {
            self.images = images;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(is_new) = patch.is_new {
            self.is_new = is_new;
        }
        if let Some(is_sale) = patch.is_sale {
            self.is_sale = is_sale;
        }
        if patch.badge.is_some() {
            self.badge = patch.badge;
        }
        if patch.rating.is_some() {
            self.rating = patch.rating;
        }
        self.touch();
    }

    pub fn soft_delete(&mut self) {
        self.is_active = false;
        self.touch();
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    pub fn formatted_price(&self) -> String {
        format!("${:.2}", self.price)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Keeps the stored `public_id` key so images can be sent back unchanged.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResponse {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    pub review: Option<String>,
    pub user: Option<String>,
}

/// What clients see. Ids are rendered as hex strings and timestamps as RFC 3339.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    pub price: f64,
    pub formatted_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    pub category: Category,
    pub stock: i64,
    pub in_stock: bool,
    pub images: Vec<ImageResponse>,
    pub is_active: bool,
    pub is_new: bool,
    pub is_sale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub reviews: Vec<ReviewResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(value: Product) -> Self {
        Self {
            id: value.id.to_hex(),
            formatted_price: value.formatted_price(),
            in_stock: value.is_in_stock(),
            title: value.title,
            description: value.description,
            short_description: value.short_description,
            price: value.price,
            original_price: value.original_price,
            category: value.category,
            stock: value.stock,
            images: value
                .images
                .into_iter()
                .map(|image| ImageResponse {
                    public_id: image.public_id,
                    url: image.url,
                })
                .collect(),
            is_active: value.is_active,
            is_new: value.is_new,
            is_sale: value.is_sale,
            badge: value.badge,
            rating: value.rating,
            reviews: value
                .reviews
                .into_iter()
                .map(|review| ReviewResponse {
                    review: review.review,
                    user: review.user.map(|user| user.to_hex()),
                })
                .collect(),
            score: None,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// A search hit with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    pub product: Product,
    pub score: f64,
}

impl From<ScoredProduct> for ProductResponse {
    fn from(value: ScoredProduct) -> Self {
        let mut response = ProductResponse::from(value.product);
        response.score = Some(value.score);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phone() -> Product {
        Product::new(
            serde_json::from_value(json!({
                "title": "Phone",
                "description": "A phone",
                "price": 100,
                "category": "Electronics",
                "stock": 5
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_category_round_trips_through_names() {
        for name in Category::NAMES {
            let category: Category = name.parse().unwrap();
            assert_eq!(category.as_str(), name);
            assert_eq!(serde_json::to_value(category).unwrap(), json!(name));
        }
        assert!("Garbage".parse::<Category>().is_err());
    }

    #[test]
    fn test_new_product_defaults() {
        let product = phone();
        assert!(product.is_active);
        assert!(product.is_new);
        assert!(product.is_sale);
        assert!(product.reviews.is_empty());
        assert_eq!(product.created_at, product.updated_at);
        assert!(product.validate().is_ok());
    }

    #[test]
    fn test_apply_patch_only_touches_present_fields() {
        let mut product = phone();
        product.apply(ProductPatch {
            price: Some(80.5),
            category: Some(Category::Home),
            ..ProductPatch::default()
        });
        assert_eq!(product.price, 80.5);
        assert_eq!(product.category, Category::Home);
        assert_eq!(product.title, "Phone");
        assert_eq!(product.stock, 5);
    }

    #[test]
    fn test_schema_validation_rejects_negative_stock() {
        let mut product = phone();
        product.stock = -1;
        let errors = product.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("stock"));
    }

    #[test]
    fn test_response_view_fields() {
        let mut product = phone();
        product.stock = 0;
        let response = ProductResponse::from(product.clone());
        assert_eq!(response.id, product.id.to_hex());
        assert_eq!(response.formatted_price, "$100.00");
        assert!(!response.in_stock);

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["isActive"], json!(true));
        assert_eq!(body["category"], json!("Electronics"));
        assert!(body.get("score").is_none());
    }
}
