//! Run configuration: where the store lives, how the star schema is named,
//! and the parameters handed to the aggregation entry points.

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Trailing window, in months, for the smoothed revenue series.
pub const ROLLING_WINDOW_MONTHS: usize = 3;

pub const DEFAULT_TOP_N: usize = 15;
pub const DEFAULT_MAX_MONTH: u32 = 12;

/// Largest cohort offset a run will build a matrix for (20 years).
pub const MAX_COHORT_MONTH_LIMIT: u32 = 240;

/// A schema, table or column name that is safe to interpolate into SQL.
///
/// Identifiers cannot be bound as query parameters, so anything that comes
/// from configuration must match `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, AnalyticsError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AnalyticsError::InvalidIdentifier(name));
        }
        Ok(Identifier(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for SQL text.
    pub fn quoted(&self) -> String {
        quote_ident(&self.0)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quotes an identifier read from the store catalog, keeping its case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Names of the tables and join keys that make up the order star schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSchema {
    pub schema: Identifier,
    pub fact_table: Identifier,
    pub date_table: Identifier,
    pub product_table: Identifier,
    /// Fact column referencing the date dimension
    pub purchase_date_key: Identifier,
    /// Surrogate key of the date dimension
    pub date_key: Identifier,
    pub product_id: Identifier,
    pub customer_id: Identifier,
}

impl StarSchema {
    /// The default star with every table living under `schema`.
    pub fn with_schema(schema: &str) -> Result<Self, AnalyticsError> {
        Ok(StarSchema {
            schema: Identifier::new(schema)?,
            fact_table: Identifier::new("fact_order_item")?,
            date_table: Identifier::new("dim_date")?,
            product_table: Identifier::new("dim_product")?,
            purchase_date_key: Identifier::new("purchase_date_key")?,
            date_key: Identifier::new("date_key")?,
            product_id: Identifier::new("product_id")?,
            customer_id: Identifier::new("customer_id")?,
        })
    }

    /// `"schema"."table"` for use in a FROM clause.
    pub fn qualified(&self, table: &Identifier) -> String {
        format!("{}.{}", self.schema.quoted(), table.quoted())
    }

    /// `schema.table` for messages.
    pub fn display_name(&self, table: &Identifier) -> String {
        format!("{}.{}", self.schema, table)
    }
}

impl Default for StarSchema {
    fn default() -> Self {
        StarSchema {
            schema: Identifier("mart".to_string()),
            fact_table: Identifier("fact_order_item".to_string()),
            date_table: Identifier("dim_date".to_string()),
            product_table: Identifier("dim_product".to_string()),
            purchase_date_key: Identifier("purchase_date_key".to_string()),
            date_key: Identifier("date_key".to_string()),
            product_id: Identifier("product_id".to_string()),
            customer_id: Identifier("customer_id".to_string()),
        }
    }
}

/// File format written by the bundled sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {:?}", s)),
        }
    }
}

/// Configuration for a single analytics run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Path to the SQLite file holding the star schema
    pub database_path: PathBuf,
    pub star: StarSchema,
    /// Number of categories kept in the revenue ranking (default: 15)
    pub top_n: usize,
    /// Largest month offset in the cohort matrix (default: 12)
    pub max_month: u32,
    /// Directory the sink writes into (default: "docs/charts")
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            database_path: PathBuf::from("data/processed/olist.sqlite"),
            star: StarSchema::default(),
            top_n: DEFAULT_TOP_N,
            max_month: DEFAULT_MAX_MONTH,
            output_dir: PathBuf::from("docs/charts"),
            output_format: OutputFormat::Csv,
        }
    }
}

impl RunConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        RunConfig {
            database_path: database_path.into(),
            ..RunConfig::default()
        }
    }

    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Reads `DATABASE_PATH`, `STAR_SCHEMA`, `TOP_N`, `MAX_COHORT_MONTH`,
    /// `OUTPUT_DIR` and `OUTPUT_FORMAT`.
    ///
    /// # Errors
    /// Returns `InvalidIdentifier` if `STAR_SCHEMA` is not a plain identifier.
    pub fn from_env() -> Result<Self, AnalyticsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AnalyticsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RunConfig::default();

        let star = match lookup("STAR_SCHEMA") {
            Some(schema) => StarSchema::with_schema(&schema)?,
            None => defaults.star,
        };

        Ok(RunConfig {
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            star,
            top_n: lookup("TOP_N")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.top_n),
            max_month: lookup("MAX_COHORT_MONTH")
                .and_then(|v| v.parse::<u32>().ok())
                .map(clamp_max_month)
                .unwrap_or(defaults.max_month),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            output_format: lookup("OUTPUT_FORMAT")
                .and_then(|v| v.parse::<OutputFormat>().ok())
                .unwrap_or(defaults.output_format),
        })
    }
}

fn clamp_max_month(max_month: u32) -> u32 {
    if max_month > MAX_COHORT_MONTH_LIMIT {
        warn!(
            "MAX_COHORT_MONTH {} exceeds {}, clamping",
            max_month, MAX_COHORT_MONTH_LIMIT
        );
        return MAX_COHORT_MONTH_LIMIT;
    }
    max_month
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_identifier_validation() {
        assert!(Identifier::new("fact_order_item").is_ok());
        assert!(Identifier::new("_stage2").is_ok());
        assert!(Identifier::new("").is_err());
        assert!(Identifier::new("2fast").is_err());
        assert!(Identifier::new("mart; DROP TABLE x").is_err());
        assert!(Identifier::new("dim\"date").is_err());
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("Item_Price"), "\"Item_Price\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_star_schema_names() {
        let star = StarSchema::default();
        assert_eq!(star.qualified(&star.fact_table), "\"mart\".\"fact_order_item\"");
        assert_eq!(star.display_name(&star.date_table), "mart.dim_date");
        assert_eq!(StarSchema::with_schema("mart").unwrap(), star);
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.top_n, 15);
        assert_eq!(config.max_month, 12);
        assert_eq!(config.output_format, OutputFormat::Csv);
        assert_eq!(ROLLING_WINDOW_MONTHS, 3);
    }

    #[test]
    fn test_from_lookup_overrides_and_fallbacks() {
        let mut env = HashMap::new();
        env.insert("DATABASE_PATH", "/tmp/orders.sqlite");
        env.insert("TOP_N", "5");
        env.insert("MAX_COHORT_MONTH", "not-a-number");
        env.insert("OUTPUT_FORMAT", "JSON");
        env.insert("STAR_SCHEMA", "warehouse");

        let config = RunConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/orders.sqlite"));
        assert_eq!(config.top_n, 5);
        assert_eq!(config.max_month, 12);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.star.schema.as_str(), "warehouse");
        assert_eq!(config.output_dir, PathBuf::from("docs/charts"));
    }

    #[test]
    fn test_from_lookup_clamps_huge_max_month() {
        let config = RunConfig::from_lookup(|key| {
            (key == "MAX_COHORT_MONTH").then(|| u32::MAX.to_string())
        })
        .unwrap();
        assert_eq!(config.max_month, MAX_COHORT_MONTH_LIMIT);

        let config =
            RunConfig::from_lookup(|key| (key == "MAX_COHORT_MONTH").then(|| "36".to_string()))
                .unwrap();
        assert_eq!(config.max_month, 36);
    }

    #[test]
    fn test_output_format_parses() {
        assert_eq!(" Csv ".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("png".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_from_lookup_rejects_bad_schema() {
        let result = RunConfig::from_lookup(|key| {
            (key == "STAR_SCHEMA").then(|| "mart.x".to_string())
        });
        assert!(matches!(result, Err(AnalyticsError::InvalidIdentifier(_))));
    }
}
