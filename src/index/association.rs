use serde::{Deserialize, Serialize};

use crate::errors::IndexError;

/// Application key used for associations that carry no application.
pub const ANY_APPLICATION: &str = "any";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Role,
    Node,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Role => "role",
            OwnerKind::Node => "node",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "role" => Some(OwnerKind::Role),
            "node" => Some(OwnerKind::Node),
            _ => None,
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    /// Role name, or node id ("application/type/value")
    pub id: String,
}

impl OwnerRef {
    pub fn role(name: &str) -> Self {
        Self {
            kind: OwnerKind::Role,
            id: name.to_string(),
        }
    }

    pub fn node(id: &str) -> Self {
        Self {
            kind: OwnerKind::Node,
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type", rename_all = "lowercase")]
pub enum TargetKind {
    /// Value of the named attribute
    Attribute(String),
    Permission,
    /// Free-form target written by an external collector
    Unstructured,
}

impl TargetKind {
    pub fn kind_str(&self) -> &'static str {
        match self {
            TargetKind::Attribute(_) => "attribute",
            TargetKind::Permission => "permission",
            TargetKind::Unstructured => "unstructured",
        }
    }

    /// Attribute name for attribute targets, empty otherwise.
    pub fn type_name(&self) -> &str {
        match self {
            TargetKind::Attribute(name) => name,
            _ => "",
        }
    }

    pub fn from_columns(kind: &str, type_name: &str) -> Result<Self, IndexError> {
        match kind {
            "attribute" => Ok(TargetKind::Attribute(type_name.to_string())),
            "permission" => Ok(TargetKind::Permission),
            "unstructured" => Ok(TargetKind::Unstructured),
            other => Err(IndexError::Other(format!(
                "unknown target kind `{other}` in stored association"
            ))),
        }
    }
}

/// Uniqueness key of an association within one owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssociationKey {
    pub application: String,
    pub kind: TargetKind,
    pub name: String,
}

impl AssociationKey {
    pub fn new(application: Option<&str>, kind: &TargetKind, name: &str) -> Self {
        Self {
            application: application.unwrap_or(ANY_APPLICATION).to_string(),
            kind: kind.clone(),
            name: name.to_string(),
        }
    }
}

/// A target reachable from an owner, either persisted or about to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAssociation {
    /// Row id once persisted
    pub id: Option<i64>,
    pub owner: Option<OwnerRef>,
    pub application: Option<String>,
    pub kind: TargetKind,
    pub target_name: String,
    pub rights: Option<String>,
    /// "self|parent|grandparent" path that produced this association
    pub hierarchy: Option<String>,
    /// Copied down from an ancestor or a referenced node rather than owned directly
    pub flattened: bool,
    pub classifications: Vec<String>,
}

impl TargetAssociation {
    pub fn new(application: Option<&str>, kind: TargetKind, target_name: &str) -> Self {
        Self {
            id: None,
            owner: None,
            application: application.map(str::to_string),
            kind,
            target_name: target_name.to_string(),
            rights: None,
            hierarchy: None,
            flattened: false,
            classifications: Vec::new(),
        }
    }

    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.application.as_deref(), &self.kind, &self.target_name)
    }

    /// Copy of this association on behalf of a descendant or a role, with the
    /// descendant's name prepended to the path.
    pub fn copy_with_prefix(&self, prefix: &str) -> Self {
        let hierarchy = match self.hierarchy.as_deref() {
            Some(theirs) if !theirs.is_empty() => format!("{prefix}|{theirs}"),
            _ => prefix.to_string(),
        };
        Self {
            id: None,
            owner: None,
            application: self.application.clone(),
            kind: self.kind.clone(),
            target_name: self.target_name.clone(),
            rights: self.rights.clone(),
            hierarchy: Some(hierarchy),
            flattened: true,
            classifications: self.classifications.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            TargetKind::Attribute(name) => format!("attribute {name}={}", self.target_name),
            TargetKind::Permission => format!("permission {}", self.target_name),
            TargetKind::Unstructured => format!("unstructured {}", self.target_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_with_prefix() {
        let mut src = TargetAssociation::new(Some("ad"), TargetKind::Permission, "Invoice List");
        src.id = Some(7);
        src.owner = Some(OwnerRef::node("ad/group/cn=g1"));
        src.rights = Some("read".into());
        src.hierarchy = Some("G1".into());
        src.classifications = vec!["Sensitive".into()];

        let copy = src.copy_with_prefix("G2");
        assert_eq!(copy.hierarchy.as_deref(), Some("G2|G1"));
        assert!(copy.flattened);
        assert!(copy.id.is_none());
        assert!(copy.owner.is_none());
        assert_eq!(copy.rights.as_deref(), Some("read"));
        assert_eq!(copy.classifications, vec!["Sensitive"]);
        assert_eq!(copy.key(), src.key());
    }

    #[test]
    fn test_copy_without_source_path() {
        let src = TargetAssociation::new(None, TargetKind::Unstructured, "\\\\srv\\share");
        let copy = src.copy_with_prefix("G2");
        assert_eq!(copy.hierarchy.as_deref(), Some("G2"));
    }

    #[test]
    fn test_key_uses_any_application() {
        let a = TargetAssociation::new(None, TargetKind::Permission, "x");
        assert_eq!(a.key().application, ANY_APPLICATION);
    }

    #[test]
    fn test_target_kind_columns() {
        let kind = TargetKind::Attribute("tcode".into());
        assert_eq!(kind.kind_str(), "attribute");
        assert_eq!(kind.type_name(), "tcode");
        assert_eq!(
            TargetKind::from_columns("attribute", "tcode").unwrap(),
            kind
        );
        assert_eq!(
            TargetKind::from_columns("permission", "").unwrap(),
            TargetKind::Permission
        );
        assert!(TargetKind::from_columns("bogus", "").is_err());
    }

    #[test]
    fn test_owner_kind_parse() {
        assert_eq!(OwnerKind::parse("role"), Some(OwnerKind::Role));
        assert_eq!(OwnerKind::parse("node"), Some(OwnerKind::Node));
        assert_eq!(OwnerKind::parse("R"), None);
        assert_eq!(OwnerRef::role("R").to_string(), "role:R");
    }
}
