use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One result record, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

fn default_use_cache() -> bool {
    true
}

// POST /sql/generate body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateSqlRequest {
    pub question: String,
    #[serde(default)]
    pub execute_query: bool,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

// POST /sql/generate response
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GenerateSqlResponse {
    pub sql: String,
    pub execution_time: f64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Warehouse tables handed to the generator as context.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaContext {
    pub tables: Vec<TableSchema>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Render as `CREATE TABLE` statements, the shape LLMs are most reliable with.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let _ = writeln!(out, "CREATE TABLE {} (", table.name);
            let cols: Vec<String> = table
                .columns
                .iter()
                .map(|c| format!("\t{} {}", c.name, c.data_type))
                .collect();
            let _ = writeln!(out, "{}", cols.join(",\n"));
            let _ = writeln!(out, ")\n");
        }
        out
    }
}

// GET /sql/tables
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TablesResponse {
    pub tables: Vec<TableSchema>,
}

// GET /health
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: f64,
    pub database_connected: bool,
    pub cache_connected: bool,
}

// GET /health/detailed
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DetailedHealthResponse {
    #[serde(flatten)]
    pub health: HealthResponse,
    pub uptime_seconds: u64,
    pub cache_entries: usize,
    pub rate_limited_clients: usize,
}
