//! Statement execution models.

use crate::services::driver::{ColumnDescription, Row};

use serde::{Deserialize, Serialize};

/// Longest SQL text logged when abridging is requested.
pub const ABRIDGED_SQL_LEN: usize = 512;

/// Status token returned to the host after a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResponse {
    /// Status message
    pub message: String,
}

impl AdapterResponse {
    /// The response Impala statements produce; the driver reports no status detail.
    pub fn ok() -> Self {
        Self { message: "OK".to_string() }
    }
}

impl std::fmt::Display for AdapterResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fetched result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column metadata
    pub columns: Vec<ColumnDescription>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Get the number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Text of one cell; strings as-is, other scalars rendered, NULL as `None`.
    pub fn text(&self, row: usize, column: usize) -> Option<String> {
        match self.rows.get(row)?.get(column)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Text of the first column of every row.
    pub fn first_column(&self) -> Vec<String> {
        (0..self.rows.len()).filter_map(|row| self.text(row, 0)).collect()
    }
}

/// SQL text as written to logs.
///
/// With `abridge`, only the first 512 characters are kept, followed by `...`.
pub fn log_sql(sql: &str, abridge: bool) -> String {
    if !abridge {
        return sql.to_string();
    }
    let truncated: String = sql.chars().take(ABRIDGED_SQL_LEN).collect();
    format!("{truncated}...")
}

/// Metadata from a leading `/* {...} */` query comment.
///
/// Hosts prepend a JSON object describing the node being run. Anything that is not
/// a JSON object inside the first block comment yields empty metadata.
pub fn query_comment_metadata(sql: &str) -> serde_json::Map<String, serde_json::Value> {
    let trimmed = sql.trim_start();
    let Some(body) = trimmed.strip_prefix("/*") else {
        return serde_json::Map::new();
    };
    let Some(end) = body.find("*/") else {
        return serde_json::Map::new();
    };
    match serde_json::from_str::<serde_json::Value>(body[..end].trim()) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
