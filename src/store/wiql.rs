//! WIQL rendering for `ItemQuery`.
//!
//! Only the small subset of WIQL the dashboard needs is produced here:
//! flat `WorkItems` selections with equality/`CONTAINS` predicates and the
//! one-hop `WorkItemLinks` query used for children.

use crate::models::{HIERARCHY_FORWARD, ItemId, ItemQuery, QueryOrder};

const SELECT_FIELDS: &str = "[System.Id], [System.Title], [System.State], [System.WorkItemType], [System.AssignedTo], [System.AreaPath], [System.IterationPath]";

/// Quote a string literal, doubling embedded single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render a flat item query.
pub fn render(query: &ItemQuery) -> String {
    let mut clauses: Vec<String> = Vec::new();

    match query.types.as_slice() {
        [] => {}
        [single] => clauses.push(format!("[System.WorkItemType] = {}", quote(single.as_str()))),
        many => {
            let list = many
                .iter()
                .map(|t| quote(t.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("[System.WorkItemType] IN ({})", list));
        }
    }

    if let Some(ref path) = query.iteration_path {
        clauses.push(format!("[System.IterationPath] = {}", quote(path)));
    }
    if let Some(ref assignee) = query.assigned_to {
        clauses.push(format!("[System.AssignedTo] = {}", quote(assignee)));
    }
    if let Some(ref text) = query.title_contains {
        clauses.push(format!("[System.Title] CONTAINS {}", quote(text)));
    }
    if !query.include_removed {
        clauses.push("[System.State] <> 'Removed'".to_string());
    }

    let mut wiql = format!("SELECT {} FROM WorkItems", SELECT_FIELDS);
    if !clauses.is_empty() {
        wiql.push_str(" WHERE ");
        wiql.push_str(&clauses.join(" AND "));
    }
    wiql.push_str(" ORDER BY ");
    wiql.push_str(order_by(query.order));
    wiql
}

fn order_by(order: QueryOrder) -> &'static str {
    match order {
        QueryOrder::TypeThenCreated => "[System.WorkItemType], [System.CreatedDate] DESC",
        QueryOrder::Created => "[System.CreatedDate] DESC",
        QueryOrder::TypeThenState => "[System.WorkItemType], [System.State]",
        QueryOrder::TypeThenChanged => "[System.WorkItemType], [System.ChangedDate] DESC",
    }
}

/// Render the link query returning the direct children of `parent`.
pub fn render_children(parent: ItemId) -> String {
    format!(
        "SELECT [System.Id] FROM WorkItemLinks WHERE ([Source].[System.Id] = {}) AND ([System.Links.LinkType] = {}) MODE (MustContain)",
        parent,
        quote(HIERARCHY_FORWARD)
    )
}
