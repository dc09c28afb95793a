//! Structured item filters.
//!
//! An `ItemQuery` is what callers hand to `ItemStore::find_ids`. It is
//! validated on construction so a malformed filter is rejected before any
//! request leaves the process; rendering it into the tracker's query
//! language is the store adapter's job.

use serde::Serialize;

use super::Item;
use crate::{Error, Result};

/// Longest accepted free-text filter value.
const MAX_FILTER_LEN: usize = 256;

/// Types included when a caller asks for "All".
pub const DEFAULT_TYPES: [&str; 4] = ["Epic", "Feature", "User Story", "Task"];

/// Name of a work item type (`Epic`, `User Story`, `Bug`, ...).
///
/// Process templates define their own types, so any reasonable name is
/// accepted; only empty or control-character names are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkItemType(String);

impl WorkItemType {
    pub fn parse(name: &str) -> Result<Self> {
        Ok(Self(validate_text("type", name)?))
    }

    pub fn epic() -> Self {
        Self("Epic".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Epic, Feature, User Story and Task.
    pub fn defaults() -> Vec<Self> {
        DEFAULT_TYPES.iter().map(|t| Self(t.to_string())).collect()
    }

    /// Parse a `type` query parameter: `All` expands to the default set.
    pub fn parse_selector(selector: &str) -> Result<Vec<Self>> {
        if selector.trim().eq_ignore_ascii_case("all") {
            Ok(Self::defaults())
        } else {
            Ok(vec![Self::parse(selector)?])
        }
    }

    /// Parse an optional narrowing filter: absent, blank or `All` means any type.
    pub fn parse_filter(filter: Option<&str>) -> Result<Option<Self>> {
        match filter.map(str::trim) {
            None | Some("") => Ok(None),
            Some(f) if f.eq_ignore_ascii_case("all") => Ok(None),
            Some(f) => Self::parse(f).map(Some),
        }
    }
}

/// Result ordering requested from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrder {
    /// Type, then newest created first
    #[default]
    TypeThenCreated,
    /// Newest created first
    Created,
    /// Type, then state
    TypeThenState,
    /// Type, then most recently changed first
    TypeThenChanged,
}

/// A structured work item filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemQuery {
    /// Restrict to these types (empty means any type)
    pub types: Vec<WorkItemType>,
    /// Exact iteration path
    pub iteration_path: Option<String>,
    /// Exact assignee (unique name or display name)
    pub assigned_to: Option<String>,
    /// Substring of the title
    pub title_contains: Option<String>,
    /// Include items in the `Removed` state
    pub include_removed: bool,
    /// Requested ordering
    pub order: QueryOrder,
}

impl ItemQuery {
    /// Items of the given types, newest first within each type.
    pub fn by_types(types: Vec<WorkItemType>) -> Self {
        Self {
            types,
            order: QueryOrder::TypeThenCreated,
            ..Self::default()
        }
    }

    /// Everything in an iteration (sprint).
    pub fn iteration(path: &str) -> Result<Self> {
        Ok(Self {
            iteration_path: Some(validate_text("iteration path", path)?),
            order: QueryOrder::TypeThenState,
            ..Self::default()
        })
    }

    /// Title substring search.
    pub fn title(text: &str) -> Result<Self> {
        Ok(Self {
            title_contains: Some(validate_text("search text", text)?),
            order: QueryOrder::TypeThenChanged,
            ..Self::default()
        })
    }

    /// Builder: restrict to an assignee. Blank values mean "anyone".
    pub fn assigned_to(mut self, assignee: Option<&str>) -> Result<Self> {
        self.assigned_to = match assignee {
            Some(a) if !a.trim().is_empty() => Some(validate_text("assignee", a)?),
            _ => None,
        };
        Ok(self)
    }

    /// Builder: restrict to one type.
    pub fn of_type(mut self, work_item_type: Option<WorkItemType>) -> Self {
        if let Some(t) = work_item_type {
            self.types = vec![t];
        }
        self
    }

    /// Evaluate this filter against a record.
    ///
    /// Used by stores that hold items locally; the remote store evaluates
    /// the rendered query server-side instead.
    pub fn matches(&self, item: &Item) -> bool {
        if !self.include_removed && item.state() == Some("Removed") {
            return false;
        }
        if !self.types.is_empty() {
            let Some(t) = item.work_item_type() else {
                return false;
            };
            if !self.types.iter().any(|wanted| wanted.as_str() == t) {
                return false;
            }
        }
        if let Some(ref path) = self.iteration_path {
            if item.iteration_path() != Some(path.as_str()) {
                return false;
            }
        }
        if let Some(ref assignee) = self.assigned_to {
            let display = item
                .fields
                .get("System.AssignedTo")
                .and_then(|v| v.get("displayName"))
                .and_then(|v| v.as_str());
            if item.assigned_to() != Some(assignee.as_str()) && display != Some(assignee.as_str())
            {
                return false;
            }
        }
        if let Some(ref text) = self.title_contains {
            let needle = text.to_lowercase();
            match item.title() {
                Some(title) if title.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

fn validate_text(what: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidFilter(format!("{} must not be empty", what)));
    }
    if trimmed.chars().count() > MAX_FILTER_LEN {
        return Err(Error::InvalidFilter(format!(
            "{} exceeds {} characters",
            what, MAX_FILTER_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::InvalidFilter(format!(
            "{} contains control characters",
            what
        )));
    }
    Ok(trimmed.to_string())
}
