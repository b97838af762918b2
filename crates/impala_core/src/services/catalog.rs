//! Schema and relation introspection, and catalog generation.
//!
//! Catalog generation fans out one task per relation. Each task opens its own
//! connection; at most `max_workers` run at once.

use crate::error::{AdapterError, AdapterResult};
use crate::models::{ColumnRecord, Connection, Credentials, Relation, RelationType, TableStats};
use crate::services::connection::ConnectionManager;
use crate::services::metadata::{DescribeRow, MetadataParser};

use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Default number of relations described concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Logical type of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogType {
    /// `int`, `double`
    Number,
    /// `timestamp`
    DateTime,
    /// `date`
    Date,
    /// `boolean`
    Boolean,
    /// Everything else
    Text,
}

impl CatalogType {
    /// Map an Impala type name; anything unrecognised is text.
    pub fn for_column_type(column_type: &str) -> Self {
        match column_type.trim().to_lowercase().as_str() {
            "int" | "double" => Self::Number,
            "timestamp" => Self::DateTime,
            "date" => Self::Date,
            "boolean" => Self::Boolean,
            _ => Self::Text,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Text => "text",
        }
    }
}

/// One column of the generated catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    /// Always absent; Impala has no database level
    pub table_database: Option<String>,
    /// Schema containing the table
    pub table_schema: String,
    /// Table name
    pub table_name: String,
    /// Table type, when resolved
    pub table_type: Option<RelationType>,
    /// Table owner
    pub table_owner: Option<String>,
    /// Fully qualified `schema.table.column`
    pub column_name: String,
    /// Zero-based position among the table's columns
    pub column_index: usize,
    /// Engine type name
    pub column_type: String,
    /// Logical type derived from `column_type`
    pub catalog_type: CatalogType,
    /// Table statistics, flattened into the root by `to_dict`
    #[serde(skip)]
    pub table_stats: TableStats,
}

impl CatalogRow {
    /// Build a catalog row from a column record.
    pub fn from_column(column: &ColumnRecord) -> Self {
        Self {
            table_database: None,
            table_schema: column.schema.clone(),
            table_name: column.table_name.clone(),
            table_type: column.table_type,
            table_owner: column.table_owner.clone(),
            column_name: format!("{}.{}.{}", column.schema, column.table_name, column.column_name),
            column_index: column.column_index,
            column_type: column.data_type.clone(),
            catalog_type: CatalogType::for_column_type(&column.data_type),
            table_stats: column.table_stats.clone(),
        }
    }

    /// Flat dictionary form, statistics merged into the root.
    pub fn to_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut dict = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        dict.extend(self.table_stats.to_flat_map());
        dict
    }
}

/// Generated catalog plus the errors of relations that could not be described.
#[derive(Debug, Default)]
pub struct Catalog {
    /// One row per column of every described relation
    pub rows: Vec<CatalogRow>,
    /// Failures of individual listings and describes
    pub errors: Vec<AdapterError>,
}

/// Introspection queries over one or many connections.
#[derive(Debug, Clone)]
pub struct CatalogService {
    manager: ConnectionManager,
    credentials: Arc<Credentials>,
    max_workers: usize,
}

impl CatalogService {
    /// Create a service opening connections for `credentials`.
    pub fn new(manager: ConnectionManager, credentials: Arc<Credentials>) -> Self {
        Self { manager, credentials, max_workers: DEFAULT_MAX_WORKERS }
    }

    /// Set how many relations are described concurrently.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// All schemas (Impala databases).
    pub fn list_schemas(&self, conn: &mut Connection) -> AdapterResult<Vec<String>> {
        let (_, result) = self.manager.execute(conn, "show databases", true)?;
        Ok(result.first_column())
    }

    /// Check if a schema exists.
    pub fn check_schema_exists(&self, conn: &mut Connection, schema: &str) -> AdapterResult<bool> {
        Ok(self.list_schemas(conn)?.iter().any(|name| name == schema))
    }

    /// Relations in a schema, queried directly.
    ///
    /// A missing schema or a failed listing yields no relations. Relation types are
    /// left unresolved.
    pub fn list_relations_without_caching(
        &self,
        conn: &mut Connection,
        schema: &str,
    ) -> AdapterResult<Vec<Relation>> {
        let result = match self.manager.execute(conn, &format!("show tables in {schema}"), true) {
            Ok((_, result)) => result,
            Err(e) if e.is_object_not_found() => {
                tracing::debug!(schema = %schema, "Schema not found, no relations");
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::debug!(schema = %schema, error = %e, "Error while retrieving information about schema");
                return Ok(Vec::new());
            }
        };

        result
            .rows
            .iter()
            .map(|row| match row.as_slice() {
                [serde_json::Value::String(identifier)] => Ok(Relation::new(schema, identifier.as_str())),
                other => Err(AdapterError::runtime(format!(
                    "Invalid value from \"show tables in {schema}\", got {} values, expected 1",
                    other.len()
                ))),
            })
            .collect()
    }

    /// Columns of a relation.
    ///
    /// Uses the relation's cached information when it yields columns, otherwise
    /// runs `describe extended`. Resolves the relation type from the describe
    /// output as a side effect.
    pub fn columns_in_relation(
        &self,
        conn: &mut Connection,
        relation: &Relation,
    ) -> AdapterResult<Vec<ColumnRecord>> {
        let cached = MetadataParser::parse_columns_from_information(relation);
        if !cached.is_empty() {
            return Ok(cached);
        }

        let rows = self.describe(conn, "extended", relation)?;
        if let Some(table_type) = MetadataParser::table_type(&rows) {
            let _ = relation.relation_type_or_resolve(|| Ok::<_, Infallible>(table_type));
        }
        Ok(MetadataParser::parse_describe_extended(relation, &rows))
    }

    /// Relation type, looked up with `describe formatted` on first access.
    pub fn relation_type(
        &self,
        conn: &mut Connection,
        relation: &Relation,
    ) -> AdapterResult<RelationType> {
        relation.relation_type_or_resolve(|| {
            let rows = self.describe(conn, "formatted", relation)?;
            Ok(MetadataParser::table_type(&rows).unwrap_or(RelationType::Table))
        })
    }

    fn describe(
        &self,
        conn: &mut Connection,
        mode: &str,
        relation: &Relation,
    ) -> AdapterResult<Vec<DescribeRow>> {
        let sql = format!("describe {mode} {}", relation.render());
        let (_, result) = self.manager.execute(conn, &sql, true)?;
        Ok(DescribeRow::from_result(&result))
    }

    /// Catalog of every relation in `schemas`.
    ///
    /// Per-relation failures are collected in [`Catalog::errors`]; they do not
    /// fail the whole catalog.
    pub async fn get_catalog(&self, schemas: &[String]) -> Catalog {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut catalog = Catalog::default();

        let mut listings = JoinSet::new();
        for schema in schemas {
            let service = self.clone();
            let schema = schema.clone();
            let semaphore = Arc::clone(&semaphore);
            listings.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tokio::task::spawn_blocking(move || service.relations_on_fresh_connection(&schema)).await
            });
        }

        let mut relations = Vec::new();
        while let Some(joined) = listings.join_next().await {
            match flatten(joined) {
                Ok(found) => relations.extend(found),
                Err(e) => catalog.errors.push(e),
            }
        }

        let mut describes = JoinSet::new();
        for relation in relations {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            describes.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                tokio::task::spawn_blocking(move || service.catalog_rows_for(&relation)).await
            });
        }

        while let Some(joined) = describes.join_next().await {
            match flatten(joined) {
                Ok(rows) => catalog.rows.extend(rows),
                Err(e) => {
                    tracing::warn!(error = %e, "Encountered an error while generating catalog");
                    catalog.errors.push(e);
                }
            }
        }

        tracing::debug!(
            rows = catalog.rows.len(),
            errors = catalog.errors.len(),
            "Catalog generated"
        );
        catalog
    }

    fn relations_on_fresh_connection(&self, schema: &str) -> AdapterResult<Vec<Relation>> {
        let mut conn = Connection::new(format!("list_{schema}"), Arc::clone(&self.credentials));
        self.manager.open(&mut conn);
        let relations = self.list_relations_without_caching(&mut conn, schema);
        self.manager.close(&mut conn);
        relations
    }

    fn catalog_rows_for(&self, relation: &Relation) -> AdapterResult<Vec<CatalogRow>> {
        let mut conn = Connection::new(relation.render(), Arc::clone(&self.credentials));
        self.manager.open(&mut conn);
        let columns = self.columns_in_relation(&mut conn, relation);
        self.manager.close(&mut conn);

        let columns = columns?;
        let table_type = relation.known_type();
        Ok(columns
            .iter()
            .map(|column| CatalogRow { table_type: table_type.or(column.table_type), ..CatalogRow::from_column(column) })
            .collect())
    }
}

type Joined<T> = Result<Result<AdapterResult<T>, JoinError>, JoinError>;

fn flatten<T>(joined: Joined<T>) -> AdapterResult<T> {
    joined
        .and_then(|inner| inner)
        .map_err(|e| AdapterError::runtime_with_source("Catalog task failed", e))?
}
