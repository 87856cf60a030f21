use serde::{Deserialize, Serialize};

/// Object type of the schema describing accounts. Role grants are expressed
/// against account attributes; every other schema describes catalog nodes.
pub const SCHEMA_ACCOUNT: &str = "account";

/// Identity of a node: "application/type/value" e.g. "ad/group/cn=admins"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub application: String,
    pub object_type: String,
    pub value: String,
}

impl NodeKey {
    pub fn new(application: &str, object_type: &str, value: &str) -> Self {
        Self {
            application: application.to_string(),
            object_type: object_type.to_string(),
            value: value.to_string(),
        }
    }

    /// Values may themselves contain slashes (DNs, paths), so only the
    /// first two separators are significant.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '/');
        let application = parts.next()?;
        let object_type = parts.next()?;
        let value = parts.next()?;
        if application.is_empty() || object_type.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(application, object_type, value))
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.application, self.object_type, self.value)
    }
}

/// Which way the hierarchy attribute points, as physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyDirection {
    /// Values name the node's parents (e.g. `memberOf`).
    Parent,
    /// Values name the node's children (e.g. "Child Profiles").
    Child,
}

impl HierarchyDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent" => Some(Self::Parent),
            "child" => Some(Self::Child),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyAttribute {
    pub name: String,
    pub direction: HierarchyDirection,
}

/// One attribute of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    /// Values of indexed attributes become target associations.
    pub indexed: bool,
    /// Set when values reference nodes of another schema in the same application.
    pub object_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub object_type: String,
    pub identity_attribute: Option<String>,
    pub display_attribute: Option<String>,
    pub hierarchy: Option<HierarchyAttribute>,
    pub index_permissions: bool,
    pub attributes: Vec<AttributeDefinition>,
}

impl Schema {
    /// The display attribute is often the identity attribute, which carries
    /// nothing a raw value doesn't already say.
    pub fn has_display_name(&self) -> bool {
        match &self.display_attribute {
            Some(display) => self.identity_attribute.as_deref() != Some(display.as_str()),
            None => false,
        }
    }

    pub fn is_hierarchy_attribute(&self, name: &str) -> bool {
        self.hierarchy.as_ref().is_some_and(|h| h.name == name)
    }

    /// Indexed attributes other than the hierarchy attribute.
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes
            .iter()
            .filter(move |a| a.indexed && !self.is_hierarchy_attribute(&a.name))
    }

    pub fn has_indexed_attribute(&self) -> bool {
        self.indexed_attributes().next().is_some()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Application {
    pub name: String,
    pub schemas: Vec<Schema>,
}

impl Application {
    pub fn schema(&self, object_type: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.object_type == object_type)
    }

    pub fn account_schema(&self) -> Option<&Schema> {
        self.schema(SCHEMA_ACCOUNT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttribute {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub target: String,
    pub rights: Option<String>,
}

/// An entitlement or group value on an application.
#[derive(Debug, Clone)]
pub struct Node {
    /// `NodeKey` rendered as a string; also the owner id of its associations.
    pub id: String,
    pub application: String,
    pub object_type: String,
    /// Account attribute that carries this value, e.g. "memberOf".
    pub attribute: Option<String>,
    pub value: String,
    pub display_name: Option<String>,
    pub attributes: Vec<NodeAttribute>,
    /// Values of the schema's hierarchy attribute: parents or children
    /// depending on the schema direction.
    pub hierarchy: Vec<String>,
    pub permissions: Vec<Permission>,
    pub classifications: Vec<String>,
}

impl Node {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(&self.application, &self.object_type, &self.value)
    }

    pub fn displayable_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.value)
    }

    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|a| a.name == attribute)
            .map(|a| a.values.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEntitlement {
    pub application: String,
    pub attribute: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermission {
    pub application: String,
    pub target: String,
    pub rights: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Role {
    pub name: String,
    pub disabled: bool,
    /// Roles this role inherits from
    pub includes: Vec<String>,
    /// Roles provisioned along with this one
    pub requires: Vec<String>,
    pub entitlements: Vec<RoleEntitlement>,
    pub permissions: Vec<RolePermission>,
}

// ---------- Plan compiler output ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGrant {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub target: String,
    pub rights: Option<String>,
}

/// Everything one application would receive if a role were assigned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountGrant {
    pub application: String,
    pub attributes: Vec<AttributeGrant>,
    pub permissions: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantList {
    pub accounts: Vec<AccountGrant>,
}

impl GrantList {
    pub fn account_mut(&mut self, application: &str) -> &mut AccountGrant {
        let pos = match self.accounts.iter().position(|a| a.application == application) {
            Some(pos) => pos,
            None => {
                self.accounts.push(AccountGrant {
                    application: application.to_string(),
                    ..Default::default()
                });
                self.accounts.len() - 1
            }
        };
        &mut self.accounts[pos]
    }

    pub fn is_empty(&self) -> bool {
        self.accounts
            .iter()
            .all(|a| a.attributes.is_empty() && a.permissions.is_empty())
    }
}

impl AccountGrant {
    /// Add attribute values, collapsing values already granted.
    pub fn add_values(&mut self, attribute: &str, values: &[String]) {
        let pos = match self.attributes.iter().position(|a| a.name == attribute) {
            Some(pos) => pos,
            None => {
                self.attributes.push(AttributeGrant {
                    name: attribute.to_string(),
                    values: Vec::new(),
                });
                self.attributes.len() - 1
            }
        };
        let grant = &mut self.attributes[pos];
        for value in values {
            if !grant.values.contains(value) {
                grant.values.push(value.clone());
            }
        }
    }

    pub fn add_permission(&mut self, target: &str, rights: Option<&str>) {
        self.permissions.push(PermissionGrant {
            target: target.to_string(),
            rights: rights.map(str::to_string),
        });
    }
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedCatalog {
    pub applications: Vec<Application>,
    pub nodes: Vec<Node>,
    pub roles: Vec<Role>,
}
