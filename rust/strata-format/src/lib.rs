//! Schema data model for hierarchical tables: groups, typed leaves, declared type names
//! and the primitive types they resolve to.

pub mod field_path;
pub mod primitive;
pub mod schema;
pub mod schema_builder;
pub mod type_name;

pub use field_path::FieldPath;
pub use primitive::PrimitiveType;
pub use schema::{GroupNode, LeafNode, SchemaNode};
pub use type_name::TypeName;
