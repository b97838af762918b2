//! Column records produced by metadata introspection.

use crate::models::relation::RelationType;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One table statistic, e.g. `bytes` or `rows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    /// Metric name
    pub label: String,
    /// Metric value
    pub value: i64,
    /// Always empty; the engine provides no description
    pub description: String,
    /// Always true
    pub include: bool,
}

/// Table statistics keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats(BTreeMap<String, StatEntry>);

impl TableStats {
    /// Parse a raw statistics string such as `"1109049927 bytes, 14093476 rows"`.
    ///
    /// Absent or malformed input yields empty statistics.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };

        let mut stats = BTreeMap::new();
        for segment in raw.split(',') {
            let mut parts = segment.split_whitespace();
            let (Some(value), Some(label), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Self::default();
            };
            let Ok(value) = value.parse::<i64>() else {
                return Self::default();
            };
            stats.insert(
                label.to_string(),
                StatEntry {
                    label: label.to_string(),
                    value,
                    description: String::new(),
                    include: true,
                },
            );
        }
        Self(stats)
    }

    /// Look up one metric.
    pub fn get(&self, metric: &str) -> Option<&StatEntry> {
        self.0.get(metric)
    }

    /// Check if there are no statistics.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = &StatEntry> {
        self.0.values()
    }

    /// Flatten into `stats:<metric>:{label,value,description,include}` keys.
    pub fn to_flat_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut flat = serde_json::Map::new();
        for (metric, entry) in &self.0 {
            flat.insert(format!("stats:{metric}:label"), entry.label.clone().into());
            flat.insert(format!("stats:{metric}:value"), entry.value.into());
            flat.insert(format!("stats:{metric}:description"), entry.description.clone().into());
            flat.insert(format!("stats:{metric}:include"), entry.include.into());
        }
        flat
    }
}

/// One column of one table, with the table's identity and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRecord {
    /// Schema containing the table
    pub schema: String,
    /// Table name
    pub table_name: String,
    /// Table type, when known
    pub table_type: Option<RelationType>,
    /// Table owner
    pub table_owner: Option<String>,
    /// Column name
    pub column_name: String,
    /// Zero-based position among the table's columns
    pub column_index: usize,
    /// Engine type name
    pub data_type: String,
    /// Table statistics
    pub table_stats: TableStats,
}

impl ColumnRecord {
    /// Impala type names are used as-is.
    pub fn translate_type(dtype: &str) -> String {
        dtype.to_string()
    }

    /// Check if this is a string-typed column.
    pub fn is_string(&self) -> bool {
        let lower = self.data_type.to_lowercase();
        lower == "string"
            || lower == "text"
            || lower.starts_with("varchar")
            || lower.starts_with("char")
    }

    /// Widening is only supported between string columns.
    pub fn can_expand_to(&self, other: &ColumnRecord) -> bool {
        self.is_string() && other.is_string()
    }

    /// Cast a literal to this column's type.
    pub fn literal(&self, value: &str) -> String {
        format!("cast({} as {})", value, self.data_type)
    }

    /// Column name in double quotes.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.column_name)
    }

    /// Flat dictionary form consumed by catalog generation.
    ///
    /// Statistics are merged into the root; absent optional fields are omitted.
    pub fn to_column_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut dict = serde_json::Map::new();
        dict.insert("table_schema".into(), self.schema.clone().into());
        dict.insert("table_name".into(), self.table_name.clone().into());
        if let Some(table_type) = self.table_type {
            dict.insert("table_type".into(), table_type.as_str().into());
        }
        if let Some(owner) = &self.table_owner {
            dict.insert("table_owner".into(), owner.clone().into());
        }
        dict.insert("column".into(), self.column_name.clone().into());
        dict.insert("column_index".into(), self.column_index.into());
        dict.insert("dtype".into(), self.data_type.clone().into());
        dict.extend(self.table_stats.to_flat_map());
        dict
    }
}

impl std::fmt::Display for ColumnRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ImpalaColumn {} ({})>", self.column_name, self.data_type)
    }
}
