//! Data models for work items.
//!
//! This module defines the core data structures:
//! - `ItemId` - Stable integer identifier of a work item
//! - `Item` - A work item record (fields plus typed relations)
//! - `Relation` - A link from one item to another, typed at decode time
//! - `ItemQuery` - A structured filter resolved by the remote store

pub mod query;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub use query::{ItemQuery, QueryOrder, WorkItemType};

/// Link type the tracker uses for "this item is the parent of the target".
pub const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";

/// Link type the tracker uses for "this item is a child of the target".
pub const HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";

/// Stable, store-wide unique work item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(ItemId)
            .map_err(|_| crate::Error::InvalidFilter(format!("invalid work item id: {:?}", s)))
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Render a list of ids as `1,2,3` (the tracker's batch syntax, also used in logs).
pub fn join_ids(ids: &[ItemId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// What a relation means for the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The owning item is the parent of the target.
    ParentOf,
    /// The owning item is a child of the target (the target is its parent).
    ChildOf,
    /// Any other link (related, artifact, hyperlink, ...).
    Other,
}

impl RelationKind {
    /// Classify a tracker link type name.
    pub fn from_rel(rel: &str) -> Self {
        match rel {
            HIERARCHY_FORWARD => RelationKind::ParentOf,
            HIERARCHY_REVERSE => RelationKind::ChildOf,
            _ => RelationKind::Other,
        }
    }
}

static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*$").expect("trailing id pattern is valid"));

/// Extract the target id from a link URL such as `.../_apis/wit/workItems/55`.
///
/// Returns `None` when the URL does not end in digits or the number overflows.
pub fn parse_target_id(url: &str) -> Option<ItemId> {
    TRAILING_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(ItemId)
}

/// A link from an item to another resource.
///
/// The hierarchy meaning (`kind`, `target_id`) is derived once when the
/// record is decoded; the raw `rel`/`url` pair is kept so the item
/// serializes back to the shape the tracker returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRelation", into = "RawRelation")]
pub struct Relation {
    pub kind: RelationKind,
    pub target_id: Option<ItemId>,
    pub rel: String,
    pub url: String,
    pub attributes: Option<Value>,
}

impl Relation {
    /// A child-of link pointing at `parent`, shaped like the tracker's own.
    pub fn child_of(parent: ItemId) -> Self {
        Self::from(RawRelation {
            rel: HIERARCHY_REVERSE.to_string(),
            url: format!("https://dev.azure.com/_apis/wit/workItems/{}", parent),
            attributes: None,
        })
    }
}

/// Wire shape of a relation: `{ "rel": ..., "url": ..., "attributes": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRelation {
    #[serde(default)]
    rel: String,
    #[serde(default)]
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<Value>,
}

impl From<RawRelation> for Relation {
    fn from(raw: RawRelation) -> Self {
        let kind = RelationKind::from_rel(&raw.rel);
        let target_id = parse_target_id(&raw.url);
        Self {
            kind,
            target_id,
            rel: raw.rel,
            url: raw.url,
            attributes: raw.attributes,
        }
    }
}

impl From<Relation> for RawRelation {
    fn from(relation: Relation) -> Self {
        Self {
            rel: relation.rel,
            url: relation.url,
            attributes: relation.attributes,
        }
    }
}

/// A work item as returned by the remote tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Work item id
    pub id: ItemId,

    /// Revision number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<u64>,

    /// Named fields (`System.Title`, `System.State`, ...), kept opaque
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Links to other items; absent unless relations were requested
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub relations: Vec<Relation>,

    /// Canonical REST URL of the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Relation>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Relation>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Item {
    /// Create an item with no fields and no relations.
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            fields: Map::new(),
            relations: Vec::new(),
            url: None,
        }
    }

    /// Builder: set a field value.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builder: attach a child-of link to `parent`.
    pub fn with_parent(mut self, parent: impl Into<ItemId>) -> Self {
        self.relations.push(Relation::child_of(parent.into()));
        self
    }

    /// The parent id, if this item has a parseable child-of link.
    ///
    /// An item with a child-of link whose target cannot be parsed, or whose
    /// target is id 0, is treated as a root.
    pub fn parent_id(&self) -> Option<ItemId> {
        self.relations
            .iter()
            .find(|r| r.kind == RelationKind::ChildOf)
            .and_then(|r| r.target_id)
            .filter(|id| id.0 != 0)
    }

    /// A string field, if present and a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.field_str("System.Title")
    }

    pub fn state(&self) -> Option<&str> {
        self.field_str("System.State")
    }

    pub fn work_item_type(&self) -> Option<&str> {
        self.field_str("System.WorkItemType")
    }

    pub fn iteration_path(&self) -> Option<&str> {
        self.field_str("System.IterationPath")
    }

    /// Assignee, either a plain string or an identity object.
    ///
    /// Identity objects yield their `uniqueName`, falling back to `displayName`.
    pub fn assigned_to(&self) -> Option<&str> {
        match self.fields.get("System.AssignedTo")? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(identity) => identity
                .get("uniqueName")
                .or_else(|| identity.get("displayName"))
                .and_then(Value::as_str),
            _ => None,
        }
    }

    /// Copy of this item without relation links.
    pub fn without_relations(&self) -> Self {
        Self {
            relations: Vec::new(),
            ..self.clone()
        }
    }
}
