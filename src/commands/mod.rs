//! Command implementations for the Workboard CLI.
//!
//! Each command returns a result type implementing [`Output`], so `main`
//! can print it as JSON (default) or human-readable text (`--human`).

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::config::{ConfigPaths, ResolvedConfig, Resolved};
use crate::hierarchy::{Termination, TreeView};
use crate::models::{Item, ItemId, WorkItemType};
use crate::queries::{ItemList, Queries};
use crate::Result;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_string<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "failed to serialize output: {}"}}"#, e))
}

/// One line per item: `#id [Type] Title (State)`.
fn item_line(item: &Item) -> String {
    let mut line = format!(
        "#{} [{}] {}",
        item.id,
        item.work_item_type().unwrap_or("?"),
        item.title().unwrap_or("(untitled)")
    );
    if let Some(state) = item.state() {
        line.push_str(&format!(" ({})", state));
    }
    if let Some(assignee) = item.assigned_to() {
        line.push_str(&format!(" @{}", assignee));
    }
    line
}

// ============================================================================
// Items
// ============================================================================

/// A flat list of work items.
#[derive(Debug, Clone)]
pub struct ItemsResult {
    pub items: Vec<Item>,
}

impl Output for ItemsResult {
    fn to_json(&self) -> String {
        json_string(&ItemList::from(self.items.clone()))
    }

    fn to_human(&self) -> String {
        if self.items.is_empty() {
            return "No work items found.".to_string();
        }
        let mut lines = vec![format!("{} work item(s):", self.items.len())];
        lines.extend(self.items.iter().map(|i| format!("  {}", item_line(i))));
        lines.join("\n")
    }
}

/// List items by type, or the items of one iteration.
pub async fn items(
    queries: &Queries<'_>,
    work_item_type: Option<&str>,
    iteration: Option<&str>,
    assigned_to: Option<&str>,
) -> Result<ItemsResult> {
    let items = match iteration {
        Some(path) => {
            let filter = WorkItemType::parse_filter(work_item_type)?;
            queries.iteration_items(path, assigned_to, filter).await?
        }
        None => {
            let types = WorkItemType::parse_selector(work_item_type.unwrap_or("Epic"))?;
            queries.items_by_type(types).await?
        }
    };
    Ok(ItemsResult { items })
}

/// Fetch items by id, in the order given.
pub async fn fetch(queries: &Queries<'_>, raw_ids: &[String]) -> Result<ItemsResult> {
    let ids = raw_ids
        .iter()
        .map(|raw| raw.parse::<ItemId>())
        .collect::<Result<Vec<_>>>()?;
    Ok(ItemsResult {
        items: queries.batch(&ids).await?,
    })
}

pub async fn children(queries: &Queries<'_>, raw_id: &str) -> Result<ItemsResult> {
    let id = raw_id.parse::<ItemId>()?;
    Ok(ItemsResult {
        items: queries.children(id).await?,
    })
}

pub async fn search(
    queries: &Queries<'_>,
    text: &str,
    work_item_type: Option<&str>,
) -> Result<ItemsResult> {
    let filter = WorkItemType::parse_filter(work_item_type)?;
    Ok(ItemsResult {
        items: queries.search(text, filter).await?,
    })
}

// ============================================================================
// Tree
// ============================================================================

/// An iteration's items and their ancestors.
#[derive(Debug, Clone)]
pub struct TreeResult {
    pub view: TreeView,
}

impl TreeResult {
    /// Render as an indented tree; sprint items are marked with `*`.
    fn render(&self) -> Vec<String> {
        let items = &self.view.value;
        let present: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
        let sprint: HashSet<ItemId> = self.view.sprint_ids.iter().copied().collect();

        let mut children: HashMap<ItemId, Vec<&Item>> = HashMap::new();
        let mut roots: Vec<&Item> = Vec::new();
        for item in items {
            match item.parent_id() {
                Some(parent) if parent != item.id && present.contains(&parent) => {
                    children.entry(parent).or_default().push(item)
                }
                _ => roots.push(item),
            }
        }

        let mut lines = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(&Item, usize)> = roots.iter().rev().map(|i| (*i, 0)).collect();
        // Items on a parent cycle have no root; append them afterwards.
        let mut leftovers = items.iter().rev();
        loop {
            let Some((item, depth)) = stack.pop() else {
                match leftovers.find(|i| !visited.contains(&i.id)) {
                    Some(item) => {
                        stack.push((item, 0));
                        continue;
                    }
                    None => break,
                }
            };
            if !visited.insert(item.id) {
                continue;
            }
            let marker = if sprint.contains(&item.id) { "*" } else { " " };
            lines.push(format!("{}{}{}", "  ".repeat(depth), marker, item_line(item)));
            if let Some(kids) = children.get(&item.id) {
                stack.extend(kids.iter().rev().map(|k| (*k, depth + 1)));
            }
        }
        lines
    }
}

impl Output for TreeResult {
    fn to_json(&self) -> String {
        json_string(&self.view)
    }

    fn to_human(&self) -> String {
        if self.view.value.is_empty() {
            return "No work items in this iteration.".to_string();
        }
        let mut lines = vec![format!(
            "{} item(s), {} in the iteration:",
            self.view.value.len(),
            self.view.sprint_ids.len()
        )];
        lines.extend(self.render());
        if !self.view.complete {
            let reason = match self.view.termination {
                Termination::TotalCapReached => "item limit reached",
                Termination::LoopCapReached => "depth limit reached",
                _ => "incomplete",
            };
            lines.push(format!("(truncated: {}; some ancestors are missing)", reason));
        }
        lines.join("\n")
    }
}

pub async fn tree(
    queries: &Queries<'_>,
    iteration: &str,
    assigned_to: Option<&str>,
) -> Result<TreeResult> {
    let closure = queries.iteration_tree(iteration, assigned_to).await?;
    Ok(TreeResult {
        view: closure.into(),
    })
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    pub source: Option<String>,
}

impl ConfigEntry {
    fn from_resolved<T: ToString>(key: &str, resolved: Option<&Resolved<T>>) -> Self {
        Self {
            key: key.to_string(),
            value: resolved.map(|r| r.value.to_string()),
            source: resolved.map(|r| r.source.to_string()),
        }
    }
}

/// Resolved settings, with the token masked.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigShowResult {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub configured: bool,
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("config: {}", self.config_file.display()),
            format!("state:  {}", self.state_file.display()),
            String::new(),
        ];
        for entry in &self.settings {
            match (&entry.value, &entry.source) {
                (Some(value), Some(source)) => {
                    lines.push(format!("  {:<22} {}  ({})", entry.key, value, source))
                }
                _ => lines.push(format!("  {:<22} (not set)", entry.key)),
            }
        }
        if !self.configured {
            lines.push(String::new());
            lines.push("Not configured: set organization, project and pat.".to_string());
        }
        lines.join("\n")
    }
}

pub fn config_show(paths: &ConfigPaths, resolved: &ResolvedConfig) -> ConfigShowResult {
    let masked_pat = resolved.pat.as_ref().map(|r| Resolved {
        value: crate::config::mask_secret(&r.value),
        source: r.source.clone(),
    });

    let settings = vec![
        ConfigEntry::from_resolved("organization", resolved.organization.as_ref()),
        ConfigEntry::from_resolved("project", resolved.project.as_ref()),
        ConfigEntry::from_resolved("team", resolved.team.as_ref()),
        ConfigEntry::from_resolved("pat", masked_pat.as_ref()),
        ConfigEntry::from_resolved("host", Some(&resolved.host)),
        ConfigEntry::from_resolved("port", Some(&resolved.port)),
        ConfigEntry::from_resolved("api-version", Some(&resolved.api_version)),
        ConfigEntry::from_resolved("request-timeout-secs", Some(&resolved.request_timeout_secs)),
        ConfigEntry::from_resolved("fetch-concurrency", Some(&resolved.fetch_concurrency)),
    ];

    ConfigShowResult {
        config_file: paths.config_file.clone(),
        state_file: paths.state_file.clone(),
        configured: resolved.is_configured(),
        settings,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub path: PathBuf,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} in {}", self.key, self.path.display())
    }
}

pub fn config_set(paths: &ConfigPaths, key: &str, value: &str) -> Result<ConfigSetResult> {
    let path = paths.set_value(key, value)?;
    Ok(ConfigSetResult {
        key: key.to_string(),
        path: path.to_path_buf(),
    })
}

// ============================================================================
// Version
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VersionResult {
    pub version: String,
    pub commit: String,
    pub built: String,
}

impl Output for VersionResult {
    fn to_json(&self) -> String {
        json_string(self)
    }

    fn to_human(&self) -> String {
        format!("wb {} ({}, built {})", self.version, self.commit, self.built)
    }
}

pub fn version() -> VersionResult {
    VersionResult {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("WB_GIT_COMMIT").to_string(),
        built: env!("WB_BUILD_TIMESTAMP").to_string(),
    }
}
