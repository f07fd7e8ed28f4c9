//! Field rules for each product endpoint.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::product::Category;
use crate::services::validation::{EachRule, FieldRule, RuleSet, Sanitizer};

pub const SORT_KEYS: [&str; 8] = [
    "price",
    "-price",
    "title",
    "-title",
    "name",
    "-name",
    "createdAt",
    "-createdAt",
];

static TITLE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\s\-_,\.]+$").expect("title pattern must compile"));

pub static CREATE_PRODUCT: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new()
        .rule(
            FieldRule::body("title")
                .trim()
                .not_empty("Product name is required")
                .max_length(100, "Product name cannot exceed 100 characters")
                .sanitize(Sanitizer::StripSuspicious)
                .matches(&TITLE_CHARS, "Product name contains invalid characters")
                .sanitize(Sanitizer::Escape),
        )
        .rule(
            FieldRule::body("description")
                .trim()
                .not_empty("Product description is required")
                .max_length(2000, "Description cannot exceed 2000 characters")
                .sanitize(Sanitizer::StripSuspicious)
                .sanitize(Sanitizer::Escape),
        )
        .rule(
            FieldRule::body("price")
                .not_empty("Price is required")
                .float(Some(0.0), None, "Price must be a positive number")
                .sanitize(Sanitizer::ToNumber),
        )
        .rule(
            FieldRule::body("category")
                .trim()
                .not_empty("Category is required")
                .one_of(&Category::NAMES, "Invalid category selected"),
        )
        .rule(
            FieldRule::body("stock")
                .not_empty("Stock is required")
                .int(Some(0), None, "Stock must be a non-negative integer")
                .sanitize(Sanitizer::ToNumber),
        )
        .rule(FieldRule::body("images").optional().is_array("Images must be an array"))
        .rule(EachRule::new(
            "images",
            FieldRule::body("public_id").not_empty("Image public_id is required"),
        ))
        .rule(EachRule::new(
            "images",
            FieldRule::body("url")
                .not_empty("Image URL is required")
                .url("Invalid image URL"),
        ))
});

pub static PRODUCT_ID: Lazy<RuleSet> =
    Lazy::new(|| RuleSet::new().rule(FieldRule::param("id").object_id("Invalid product ID")));

pub static UPDATE_PRODUCT: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new()
        .rule(
            FieldRule::body("title")
                .optional()
                .trim()
                .not_empty("Product name is required")
                .max_length(100, "Product name cannot exceed 100 characters"),
        )
        .rule(
            FieldRule::body("description")
                .optional()
                .trim()
                .not_empty("Product description is required")
                .max_length(2000, "Description cannot exceed 2000 characters"),
        )
        .rule(
            FieldRule::body("price")
                .optional()
                .float(Some(0.0), None, "Price must be a positive number")
                .sanitize(Sanitizer::ToNumber),
        )
        .rule(
            FieldRule::body("category")
                .optional()
                .trim()
                .one_of(&Category::NAMES, "Invalid category selected"),
        )
        .rule(
            FieldRule::body("stock")
                .optional()
                .int(Some(0), None, "Stock must be a non-negative integer")
                .sanitize(Sanitizer::ToNumber),
        )
        .rule(FieldRule::body("images").optional().is_array("Images must be an array"))
        .rule(EachRule::new(
            "images",
            FieldRule::body("public_id").not_empty("Image public_id is required"),
        ))
        .rule(EachRule::new(
            "images",
            FieldRule::body("url")
                .not_empty("Image URL is required")
                .url("Invalid image URL"),
        ))
});

pub static LIST_PRODUCTS: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::new()
        .rule(
            FieldRule::query("page")
                .optional()
                .int(Some(1), None, "Page must be a positive integer"),
        )
        .rule(
            FieldRule::query("limit")
                .optional()
                .int(Some(1), Some(100), "Limit must be between 1 and 100"),
        )
        .rule(
            FieldRule::query("category")
                .optional()
                .trim()
                .one_of(&Category::NAMES, "Invalid category"),
        )
        .rule(
            FieldRule::query("sort")
                .optional()
                .one_of(&SORT_KEYS, "Invalid sort parameter"),
        )
        .rule(
            FieldRule::query("search")
                .optional()
                .trim()
                .min_length(1, "Search query cannot be empty"),
        )
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(violations: &[crate::services::validation::Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn test_create_accepts_minimal_product() {
        let mut body = json!({
            "title": "Phone",
            "description": "A phone",
            "price": 100,
            "category": "Electronics",
            "stock": 5
        });
        assert!(CREATE_PRODUCT.run(&mut body).is_empty());
    }

    #[test]
    fn test_create_reports_every_missing_field() {
        let violations = CREATE_PRODUCT.run(&mut json!({}));
        assert_eq!(
            fields(&violations),
            vec!["title", "description", "price", "category", "stock"]
        );
        assert_eq!(violations[0].message, "Product name is required");
    }

    #[test]
    fn test_create_casts_numeric_strings() {
        let mut body = json!({
            "title": "Phone",
            "description": "A phone",
            "price": " 19.99 ",
            "category": "Electronics",
            "stock": "7"
        });
        assert!(CREATE_PRODUCT.run(&mut body).is_empty());
        assert_eq!(body["price"], json!(19.99));
        assert_eq!(body["stock"], json!(7));
    }

    #[test]
    fn test_create_rejects_unknown_category() {
        let mut body = json!({
            "title": "Phone",
            "description": "A phone",
            "price": 100,
            "category": "Garbage",
            "stock": 5
        });
        let violations = CREATE_PRODUCT.run(&mut body);
        assert_eq!(fields(&violations), vec!["category"]);
        assert_eq!(violations[0].message, "Invalid category selected");
    }

    #[test]
    fn test_create_title_is_sanitized_then_checked() {
        let mut body = json!({
            "title": "  Drop   Earrings ",
            "description": "Silver <b>drop</b> earrings",
            "price": 10.5,
            "category": "Accessories",
            "stock": 2
        });
        assert!(CREATE_PRODUCT.run(&mut body).is_empty());
        assert_eq!(body["title"], json!("Earrings"));
        assert_eq!(body["description"], json!("Silver &lt;b&gt;&lt;&#x2F;b&gt; earrings"));

        let mut bad = json!({
            "title": "Phone #1!",
            "description": "x",
            "price": 1,
            "category": "Electronics",
            "stock": 1
        });
        let violations = CREATE_PRODUCT.run(&mut bad);
        assert_eq!(violations[0].message, "Product name contains invalid characters");
    }

    #[test]
    fn test_create_checks_images_when_present() {
        let mut body = json!({
            "title": "Camera",
            "description": "A camera",
            "price": 250,
            "category": "Cameras",
            "stock": 1,
            "images": [{ "public_id": "", "url": "not a url" }]
        });
        let violations = CREATE_PRODUCT.run(&mut body);
        assert_eq!(fields(&violations), vec!["images[0].public_id", "images[0].url"]);
    }

    #[test]
    fn test_update_fields_are_optional_but_bounded() {
        assert!(UPDATE_PRODUCT.run(&mut json!({})).is_empty());
        let violations = UPDATE_PRODUCT.run(&mut json!({ "price": -5, "stock": 1.5 }));
        assert_eq!(fields(&violations), vec!["price", "stock"]);

        let violations = UPDATE_PRODUCT.run(&mut json!({ "title": "   ", "description": "" }));
        assert_eq!(fields(&violations), vec!["title", "description"]);
        assert_eq!(violations[0].message, "Product name is required");
        assert_eq!(violations[1].message, "Product description is required");
    }

    #[test]
    fn test_list_query_bounds() {
        assert!(LIST_PRODUCTS.run(&mut json!({ "page": "2", "limit": "100", "sort": "-price" })).is_empty());
        let violations = LIST_PRODUCTS.run(&mut json!({
            "page": "0",
            "limit": "101",
            "category": "Garbage",
            "sort": "-weight",
            "search": "   "
        }));
        assert_eq!(
            fields(&violations),
            vec!["page", "limit", "category", "sort", "search"]
        );
    }

    #[test]
    fn test_product_id_format() {
        assert!(PRODUCT_ID.run(&mut json!({ "id": "64b7f0c2a1b2c3d4e5f60718" })).is_empty());
        let violations = PRODUCT_ID.run(&mut json!({ "id": "42" }));
        assert_eq!(violations[0].message, "Invalid product ID");
    }
}
