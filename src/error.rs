//! Error types shared by the resolver, the aggregation engine and the sinks.

use std::path::PathBuf;

/// How the star schema is normally produced when the store file is missing.
pub const BUILD_HINT: &str = "Build it first:\n  \
    1. load the raw order CSVs into staging tables\n  \
    2. cast the staging tables to typed columns\n  \
    3. build the star schema (fact_order_item, dim_date, dim_product) into this file";

/// Errors that abort an analytics run.
#[derive(Debug)]
pub enum AnalyticsError {
    /// The analytic store could not be opened or is not a database
    StoreUnavailable { path: PathBuf, reason: String },
    /// None of the tolerated column shapes matched
    SchemaResolution {
        table: String,
        subject: &'static str,
        found: Vec<String>,
    },
    /// The store rejected or failed a query
    QueryExecution(rusqlite::Error),
    /// A configured schema, table or column name is not a plain identifier
    InvalidIdentifier(String),
    /// The visualization sink failed to emit a table
    Sink(String),
}

impl std::fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalyticsError::StoreUnavailable { path, reason } => write!(
                f,
                "Analytic store not available at {}: {}\n\n{}",
                path.display(),
                reason,
                BUILD_HINT
            ),
            AnalyticsError::SchemaResolution {
                table,
                subject,
                found,
            } => write!(
                f,
                "Could not determine {} column in {}. Columns found: [{}]",
                subject,
                table,
                found.join(", ")
            ),
            AnalyticsError::QueryExecution(err) => write!(f, "Query failed: {}", err),
            AnalyticsError::InvalidIdentifier(name) => {
                write!(f, "Invalid identifier: {:?}", name)
            }
            AnalyticsError::Sink(msg) => write!(f, "Visualization sink error: {}", msg),
        }
    }
}

impl std::error::Error for AnalyticsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalyticsError::QueryExecution(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(err: rusqlite::Error) -> Self {
        AnalyticsError::QueryExecution(err)
    }
}

impl From<std::io::Error> for AnalyticsError {
    fn from(err: std::io::Error) -> Self {
        AnalyticsError::Sink(format!("I/O error: {}", err))
    }
}

impl From<csv::Error> for AnalyticsError {
    fn from(err: csv::Error) -> Self {
        AnalyticsError::Sink(format!("CSV error: {}", err))
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Sink(format!("JSON error: {}", err))
    }
}
