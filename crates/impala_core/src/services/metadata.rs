//! Parsing of table metadata into [`ColumnRecord`]s.
//!
//! Two sources produce identical records: the rows of `describe extended` and the
//! free-text table information cached by an earlier listing. Parsing never fails;
//! anything unrecognised is skipped.

use crate::models::{ColumnRecord, QueryResult, Relation, RelationType, TableStats};

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Marks the start of the table metadata section.
pub const DETAILED_TABLE_INFORMATION: &str = "# Detailed Table Information";
/// Marks the start of the partition section; ends the column section when present.
pub const PARTITION_INFORMATION: &str = "# Partition Information";

const KEY_TABLE_OWNER: &str = "Owner";
const KEY_TABLE_STATISTICS: &str = "Statistics";
const KEY_TABLE_TYPE: &str = "Table Type";

static INFORMATION_COLUMNS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^ *\|-- (.+?): (.+) \(nullable = (\w+)\)").unwrap()
});
static INFORMATION_OWNER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Owner: (.*?)\r?$").unwrap());
static INFORMATION_STATISTICS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Statistics: (.*?)\r?$").unwrap());

/// One `name`/`type` row of `describe` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeRow {
    /// Column name, section marker or metadata key
    pub name: String,
    /// Column type or metadata value
    pub data_type: String,
}

impl DescribeRow {
    /// Create a row.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into() }
    }

    /// Rows of a `describe` result set.
    ///
    /// Columns are looked up as `name` and `type`, falling back to the first two
    /// positions. NULL cells become empty strings.
    pub fn from_result(result: &QueryResult) -> Vec<Self> {
        let name_col = result.column_index("name").unwrap_or(0);
        let type_col = result.column_index("type").unwrap_or(1);
        (0..result.row_count())
            .map(|row| Self {
                name: result.text(row, name_col).unwrap_or_default(),
                data_type: result.text(row, type_col).unwrap_or_default(),
            })
            .collect()
    }

    fn is_comment_or_blank(&self) -> bool {
        let name = self.name.trim();
        name.is_empty() || name.starts_with('#')
    }
}

/// Stateless parser for Impala table metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataParser;

impl MetadataParser {
    /// Index of the row that ends the column section.
    ///
    /// The partition marker wins over the detailed-information marker. Without
    /// either, every row belongs to the column section.
    pub fn find_table_information_separator(rows: &[DescribeRow]) -> usize {
        let position = |marker: &str| rows.iter().position(|row| row.name.starts_with(marker));
        position(PARTITION_INFORMATION)
            .or_else(|| position(DETAILED_TABLE_INFORMATION))
            .unwrap_or(rows.len())
    }

    /// Build column records from `describe extended` rows.
    pub fn parse_describe_extended(relation: &Relation, rows: &[DescribeRow]) -> Vec<ColumnRecord> {
        let pos = Self::find_table_information_separator(rows);
        let (column_rows, rest) = rows.split_at(pos);

        let metadata: HashMap<&str, &str> = rest
            .iter()
            .skip(1)
            .filter(|row| !row.is_comment_or_blank())
            .map(|row| (metadata_key(&row.name), row.data_type.trim()))
            .collect();

        let table_owner = metadata.get(KEY_TABLE_OWNER).map(|owner| owner.to_string());
        let table_stats = TableStats::parse(metadata.get(KEY_TABLE_STATISTICS).copied());

        let columns: Vec<ColumnRecord> = column_rows
            .iter()
            .filter(|row| !row.is_comment_or_blank() && !row.data_type.trim().is_empty())
            .enumerate()
            .map(|(column_index, row)| ColumnRecord {
                schema: relation.schema.clone(),
                table_name: relation.identifier.clone(),
                table_type: relation.known_type(),
                table_owner: table_owner.clone(),
                column_name: row.name.trim().to_string(),
                column_index,
                data_type: row.data_type.trim().to_string(),
                table_stats: table_stats.clone(),
            })
            .collect();

        tracing::trace!(
            relation = %relation,
            separator = pos,
            columns = columns.len(),
            "Parsed describe output"
        );
        columns
    }

    /// Relation type from the `Table Type:` row of `describe formatted` output.
    pub fn table_type(rows: &[DescribeRow]) -> Option<RelationType> {
        rows.iter()
            .find(|row| !row.is_comment_or_blank() && metadata_key(&row.name) == KEY_TABLE_TYPE)
            .map(|row| RelationType::from_table_type(row.data_type.trim()))
    }

    /// Build column records from cached table information.
    ///
    /// Returns nothing when the relation carries no information.
    pub fn parse_columns_from_information(relation: &Relation) -> Vec<ColumnRecord> {
        let Some(information) = relation.information.as_deref() else {
            return Vec::new();
        };

        let table_owner = INFORMATION_OWNER_REGEX
            .captures(information)
            .map(|caps| caps[1].to_string());
        let raw_stats = INFORMATION_STATISTICS_REGEX
            .captures(information)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());
        let table_stats = TableStats::parse(raw_stats);

        INFORMATION_COLUMNS_REGEX
            .captures_iter(information)
            .enumerate()
            .map(|(column_index, caps)| ColumnRecord {
                schema: relation.schema.clone(),
                table_name: relation.identifier.clone(),
                table_type: relation.known_type(),
                table_owner: table_owner.clone(),
                column_name: caps[1].to_string(),
                column_index,
                data_type: caps[2].to_string(),
                table_stats: table_stats.clone(),
            })
            .collect()
    }
}

/// Metadata keys end at the first colon (`Owner:` -> `Owner`).
fn metadata_key(name: &str) -> &str {
    name.split_once(':').map_or(name, |(key, _)| key).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::driver::ColumnDescription;
    use serde_json::json;

    fn relation() -> Relation {
        Relation::new("analytics", "orders").with_type(RelationType::Table)
    }

    fn rows(pairs: &[(&str, &str)]) -> Vec<DescribeRow> {
        pairs.iter().map(|(name, data_type)| DescribeRow::new(*name, *data_type)).collect()
    }

    #[test]
    fn test_parse_describe_extended() {
        let rows = rows(&[
            ("id", "int"),
            ("name", "string"),
            ("# Detailed Table Information", ""),
            ("Owner", "alice"),
            ("Statistics", "100 bytes, 5 rows"),
        ]);

        let columns = MetadataParser::parse_describe_extended(&relation(), &rows);

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column_name, "id");
        assert_eq!(columns[0].data_type, "int");
        assert_eq!(columns[0].column_index, 0);
        assert_eq!(columns[1].column_name, "name");
        assert_eq!(columns[1].column_index, 1);
        for column in &columns {
            assert_eq!(column.table_owner.as_deref(), Some("alice"));
            assert_eq!(column.table_stats.get("rows").unwrap().value, 5);
            assert_eq!(column.table_stats.get("bytes").unwrap().value, 100);
            assert_eq!(column.table_type, Some(RelationType::Table));
        }
    }

    #[test]
    fn test_describe_formatted_layout() {
        let rows = rows(&[
            ("# col_name", "data_type"),
            ("", ""),
            ("order_id", "bigint"),
            ("amount", "decimal(10,2)"),
            ("", ""),
            ("# Detailed Table Information", ""),
            ("Database:", "analytics"),
            ("Owner:", "  etl_user  "),
            ("Table Type:", "MANAGED_TABLE"),
        ]);

        let columns = MetadataParser::parse_describe_extended(&relation(), &rows);

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column_index, 0);
        assert_eq!(columns[1].data_type, "decimal(10,2)");
        assert_eq!(columns[1].column_index, 1);
        assert_eq!(columns[0].table_owner.as_deref(), Some("etl_user"));
        assert!(columns[0].table_stats.is_empty());
    }

    #[test]
    fn test_partition_marker_takes_precedence() {
        let rows = rows(&[
            ("id", "int"),
            ("# Partition Information", ""),
            ("# col_name", "data_type"),
            ("dt", "string"),
            ("# Detailed Table Information", ""),
            ("Owner", "bob"),
        ]);

        assert_eq!(MetadataParser::find_table_information_separator(&rows), 1);
        let columns = MetadataParser::parse_describe_extended(&relation(), &rows);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].column_name, "id");
        assert_eq!(columns[0].table_owner.as_deref(), Some("bob"));
    }

    #[test]
    fn test_missing_separator_treats_all_rows_as_columns() {
        let rows = rows(&[("id", "int"), ("# comment", ""), ("name", "string")]);

        assert_eq!(MetadataParser::find_table_information_separator(&rows), 3);
        let columns = MetadataParser::parse_describe_extended(&relation(), &rows);
        assert_eq!(columns.len(), 2);
        assert!(columns.iter().all(|c| c.table_owner.is_none() && c.table_stats.is_empty()));
        assert!(MetadataParser::parse_describe_extended(&relation(), &[]).is_empty());
    }

    #[test]
    fn test_table_type_lookup() {
        let view = rows(&[("id", "int"), ("# Detailed Table Information", ""), ("Table Type:", "VIRTUAL_VIEW ")]);
        assert_eq!(MetadataParser::table_type(&view), Some(RelationType::View));

        let table = rows(&[("Table Type:", "EXTERNAL_TABLE")]);
        assert_eq!(MetadataParser::table_type(&table), Some(RelationType::Table));
        assert_eq!(MetadataParser::table_type(&rows(&[("id", "int")])), None);
    }

    #[test]
    fn test_rows_without_type_are_skipped() {
        let rows = rows(&[("id", "int"), ("broken", " "), ("name", "string")]);
        let columns = MetadataParser::parse_describe_extended(&relation(), &rows);
        assert_eq!(columns.iter().map(|c| c.column_index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(columns[1].column_name, "name");
    }

    #[test]
    fn test_parse_columns_from_information() {
        let information = "Database: analytics\n\
             Owner: alice\n\
             Statistics: 1109049927 bytes, 14093476 rows\n\
             Schema: root\n  \
             |-- id: int (nullable = true)\n  \
             |-- amount: decimal(10,2) (nullable = false)\n";
        let relation = relation().with_information(information);

        let columns = MetadataParser::parse_columns_from_information(&relation);

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].column_name, "id");
        assert_eq!(columns[0].data_type, "int");
        assert_eq!(columns[1].column_name, "amount");
        assert_eq!(columns[1].data_type, "decimal(10,2)");
        assert_eq!(columns[1].column_index, 1);
        assert_eq!(columns[0].table_owner.as_deref(), Some("alice"));
        assert_eq!(columns[0].table_stats.get("bytes").unwrap().value, 1109049927);
    }

    #[test]
    fn test_both_sources_produce_identical_records() {
        let described = MetadataParser::parse_describe_extended(
            &relation(),
            &rows(&[
                ("id", "int"),
                ("# Detailed Table Information", ""),
                ("Owner", "alice"),
                ("Statistics", "100 bytes, 5 rows"),
            ]),
        );
        let cached = MetadataParser::parse_columns_from_information(
            &relation().with_information(
                "Owner: alice\nStatistics: 100 bytes, 5 rows\n |-- id: int (nullable = true)\n",
            ),
        );
        assert_eq!(described, cached);
    }

    #[test]
    fn test_information_without_columns() {
        assert!(MetadataParser::parse_columns_from_information(&relation()).is_empty());
        let relation = relation().with_information("orders");
        assert!(MetadataParser::parse_columns_from_information(&relation).is_empty());
    }

    #[test]
    fn test_describe_rows_from_result() {
        let result = QueryResult {
            columns: vec![
                ColumnDescription { name: "name".into(), type_name: "STRING".into() },
                ColumnDescription { name: "type".into(), type_name: "STRING".into() },
                ColumnDescription { name: "comment".into(), type_name: "STRING".into() },
            ],
            rows: vec![vec![json!("id"), json!("int"), json!(null)], vec![json!("x"), json!(null), json!("")]],
        };

        let rows = DescribeRow::from_result(&result);
        assert_eq!(rows, vec![DescribeRow::new("id", "int"), DescribeRow::new("x", "")]);
    }
}
