use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "target_associations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub owner_kind: String, // "role" | "node"
    pub owner_id: String,
    pub application: Option<String>,
    pub target_kind: String, // "attribute" | "permission" | "unstructured"
    pub target_type: String, // attribute name, empty for other kinds
    pub target_name: String,
    pub rights: Option<String>,
    pub hierarchy: Option<String>,
    pub flattened: i64, // 1 = copied from an ancestor or a referenced node
    pub classifications: Option<String>, // JSON array of names
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
