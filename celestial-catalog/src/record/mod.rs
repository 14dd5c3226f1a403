//! Record/Catalog model: values with explicit absence, schemas and masks.

pub mod catalog;
pub mod mask;
pub mod schema;
pub mod value;

pub use catalog::{Catalog, CatalogDocument, Row};
pub use mask::Mask;
pub use schema::{AliasEntry, CoordinateFields, FieldAliases, Schema};
pub use value::Value;
