use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("Failed to load catalog file `{path}`")]
    #[diagnostic(
        code(access_index::catalog::load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    CatalogLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog: {0}")]
    #[diagnostic(
        code(access_index::catalog::invalid),
        help("Each catalog file must contain `application`, `node`, or `role` KDL nodes")
    )]
    InvalidCatalog(String),

    #[error("Invalid node: {0}")]
    #[diagnostic(
        code(access_index::catalog::invalid_node),
        help("Node syntax: node \"<application>\" \"<object type>\" \"<value>\" attribute=\"<name>\" {{ ... }}")
    )]
    InvalidNode(String),

    #[error("Undefined application `{0}`")]
    #[diagnostic(
        code(access_index::catalog::undefined_application),
        help("Define the application with: application \"<name>\" {{ schema \"<type>\" {{ ... }} }}")
    )]
    UndefinedApplication(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(access_index::catalog::undefined_role),
        help("Define the role with: role \"<name>\" {{ ... }}")
    )]
    UndefinedRole(String),

    #[error("Cyclic role inheritance detected: {0}")]
    #[diagnostic(
        code(access_index::catalog::cyclic_roles),
        help("Check the `includes` and `requires` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(access_index::catalog::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(access_index::catalog::io))]
    Io(#[from] std::io::Error),
}
