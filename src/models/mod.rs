pub mod envelope;
pub mod product;
pub mod query;
