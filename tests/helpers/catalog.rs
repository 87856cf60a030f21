use access_index::catalog::loader::compile_catalog;
use access_index::catalog::parser::parse_kdl_document;
use access_index::catalog::Catalog;
use std::fs;
use tempfile::TempDir;

/// Compile a catalog from a single KDL document
pub fn catalog_from(kdl: &str) -> Catalog {
    let parsed = parse_kdl_document(kdl).expect("Failed to parse test catalog");
    compile_catalog(vec![parsed]).expect("Failed to compile test catalog")
}

/// Write catalog files into a fresh directory
pub fn write_catalog_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (name, content) in files {
        fs::write(dir.path().join(name), content).expect("Failed to write catalog file");
    }
    dir
}
