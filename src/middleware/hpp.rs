//! HTTP parameter pollution guard for query strings.
//!
//! Repeating a key (`?sort=price&sort=-price`) would otherwise smuggle an
//! array into a scalar parameter. Keys outside the whitelist collapse to
//! their last value; whitelisted keys keep every value.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use serde_json::{Map, Value};

use crate::errors::ApiError;
use crate::services::validation::{Location, Violation};

pub const HPP_WHITELIST: [&str; 4] = ["price", "stock", "rating", "category"];

/// Query string as an untyped JSON object, after pollution handling.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams(pub Value);

impl QueryParams {
    pub fn from_pairs(pairs: Vec<(String, String)>, whitelist: &[&str]) -> Self {
        let mut map = Map::new();
        for (key, value) in pairs {
            let value = Value::String(value);
            if !whitelist.contains(&key.as_str()) {
                map.insert(key, value);
                continue;
            }
            match map.get_mut(&key) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(key, value);
                }
            }
        }
        QueryParams(Value::Object(map))
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl FromRequest for QueryParams {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let parsed = web::Query::<Vec<(String, String)>>::from_query(req.query_string())
            .map(|pairs| QueryParams::from_pairs(pairs.into_inner(), &HPP_WHITELIST))
            .map_err(|err| {
                ApiError::Validation(vec![Violation::new(
                    "query",
                    format!("Malformed query string: {err}"),
                    Location::Query,
                )])
            });
        ready(parsed)
    }
}
