pub mod builders;
pub mod catalog;
pub mod db;

pub use builders::AssociationBuilder;
pub use catalog::{catalog_from, write_catalog_dir};
pub use db::{associations_of, TestDb};
