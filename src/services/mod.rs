pub mod catalog;
pub mod rules;
pub mod sanitize;
pub mod store;
pub mod validation;
