pub mod calendar;
pub mod config;
pub mod error;
pub mod store;
pub mod resolver;
pub mod aggregation;
pub mod cohort;
pub mod sink;
pub mod report;

#[cfg(test)]
mod fixtures;


pub use calendar::MonthKey;
pub use config::{
    Identifier, OutputFormat, RunConfig, StarSchema, MAX_COHORT_MONTH_LIMIT, ROLLING_WINDOW_MONTHS,
};
pub use error::AnalyticsError;
pub use store::{ColumnInfo, StarSchemaStore};
pub use resolver::rules::{ColumnExpr, ColumnRule, RuleChain, TableAlias, TableCatalog};
pub use resolver::{ResolvedExpressions, SchemaResolver};
pub use aggregation::{
    smooth_revenue,
    AggregationEngine,
    CategoryRevenue,
    CohortActivity,
    MonthlyRevenue,
    UNKNOWN_CATEGORY,
};
pub use cohort::CohortMatrix;
pub use sink::{CsvSink, JsonSink, RecordingSink, VisualizationSink};
pub use report::{build_report, render_report, run, Report};
