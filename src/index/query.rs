//! Filter, sort, and pagination helpers for index queries.

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filters for listing tasks from the index.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub parent_id: Option<String>,
    /// Matches a subtree: `path = prefix OR path LIKE 'prefix.%'`.
    pub path_prefix: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Sort fields accepted for the tasks table.
const ALLOWED_SORT_FIELDS: &[&str] = &[
    "path",
    "title",
    "status",
    "priority",
    "created_at",
    "updated_at",
    "due_date",
    "completion_percentage",
];

/// Build the WHERE clause and its bind values for a filter.
pub(crate) fn build_where_clause(filter: &TaskFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(project) = &filter.project {
        conditions.push("project = ?".to_string());
        binds.push(project.clone());
    }
    if let Some(status) = &filter.status {
        conditions.push("status = ?".to_string());
        binds.push(status.clone());
    }
    if let Some(assignee) = &filter.assignee {
        conditions.push("assignee = ?".to_string());
        binds.push(assignee.clone());
    }
    if let Some(parent_id) = &filter.parent_id {
        conditions.push("parent_id = ?".to_string());
        binds.push(parent_id.clone());
    }
    if let Some(prefix) = &filter.path_prefix {
        conditions.push("(path = ? OR path LIKE ?)".to_string());
        binds.push(prefix.clone());
        binds.push(format!("{}.%", prefix));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, binds)
}

/// Build the ORDER BY clause, falling back to the default field for
/// anything not in the allow list.
pub(crate) fn build_order_clause(filter: &TaskFilter, default_field: &str) -> String {
    let field = filter
        .sort_by
        .as_deref()
        .filter(|f| ALLOWED_SORT_FIELDS.contains(f))
        .unwrap_or(default_field);
    let order = match filter.sort_order.unwrap_or_default() {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    format!("ORDER BY {} {}", field, order)
}

/// Build the LIMIT/OFFSET clause.
pub(crate) fn build_limit_offset_clause(filter: &TaskFilter) -> String {
    let mut clause = String::new();
    if let Some(limit) = filter.limit {
        clause.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = filter.offset
        && offset > 0
    {
        clause.push_str(&format!(" OFFSET {}", offset));
    }
    clause
}
