use miette::Diagnostic;
use thiserror::Error;

use crate::catalog::errors::CatalogError;

#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(access_index::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(access_index::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(access_index::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Hierarchy cycle detected: {0}")]
    #[diagnostic(
        code(access_index::hierarchy_cycle),
        help("Remove one of the hierarchy edges on the listed path; flattening requires an acyclic hierarchy")
    )]
    HierarchyCycle(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(access_index::configuration))]
    Configuration(String),

    #[error("{0}")]
    #[diagnostic(code(access_index::other))]
    Other(String),
}
