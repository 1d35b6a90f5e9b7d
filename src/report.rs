//! Run orchestration: open the store, resolve the schema, compute the three
//! tables, hand them to a sink, release the store.

use crate::aggregation::{AggregationEngine, CategoryRevenue, MonthlyRevenue};
use crate::cohort::CohortMatrix;
use crate::config::RunConfig;
use crate::error::AnalyticsError;
use crate::resolver::{ResolvedExpressions, SchemaResolver};
use crate::sink::VisualizationSink;
use crate::store::StarSchemaStore;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span};
use uuid::Uuid;

/// Everything a run computes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub expressions: ResolvedExpressions,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub top_categories: Vec<CategoryRevenue>,
    pub cohort_matrix: CohortMatrix,
}

/// Resolves expressions and computes all three tables against `store`.
///
/// Nothing is returned unless every computation succeeds.
pub fn build_report(store: &StarSchemaStore, config: &RunConfig) -> Result<Report, AnalyticsError> {
    let expressions = SchemaResolver::new(store).resolve_all()?;
    let engine = AggregationEngine::new(store, &expressions);

    let monthly_revenue = engine.monthly_revenue()?;
    let top_categories = engine.top_categories(config.top_n)?;
    let activity = engine.cohort_activity(config.max_month)?;
    let cohort_matrix = CohortMatrix::from_long(&activity, config.max_month);

    Ok(Report {
        expressions,
        monthly_revenue,
        top_categories,
        cohort_matrix,
    })
}

/// Renders every table of `report`.
pub fn render_report(
    report: &Report,
    sink: &mut dyn VisualizationSink,
) -> Result<(), AnalyticsError> {
    sink.render_monthly_revenue(&report.monthly_revenue)?;
    sink.render_top_categories(&report.top_categories)?;
    sink.render_cohort_matrix(&report.cohort_matrix)?;
    Ok(())
}

/// Runs the whole pipeline for one configuration.
///
/// The store is opened once and closed before returning; on an error it is
/// released as the handle drops. Tables are rendered only after all three
/// have been computed, so a failed run renders nothing.
pub fn run(config: &RunConfig, sink: &mut dyn VisualizationSink) -> Result<Report, AnalyticsError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id);
    let _guard = span.enter();

    info!(
        "Reading star schema {} from {}",
        config.star.schema,
        config.database_path.display()
    );
    let store = StarSchemaStore::open(&config.database_path, config.star.clone())?;
    let report = build_report(&store, config)?;
    store.close()?;

    render_report(&report, sink)?;
    match sink.location() {
        Some(location) => info!("Saved charts to {}", location.display()),
        None => info!("Rendered charts"),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::StarFixture;
    use crate::sink::RecordingSink;

    #[test]
    fn test_build_report_from_fixture() {
        let mut fixture = StarFixture::new();
        fixture.product("p1", Some("toys"));
        fixture.product("p2", Some("garden"));
        fixture.sale("c1", "p1", "2024-01-10", 100.0, 10.0);
        fixture.sale("c1", "p2", "2024-02-10", 50.0, 5.0);
        fixture.sale("c2", "p2", "2024-02-11", 20.0, 0.0);

        let config = RunConfig::default();
        let report = build_report(&fixture.store, &config).unwrap();

        assert_eq!(report.monthly_revenue.len(), 2);
        assert_eq!(report.top_categories[0].category, "toys");
        assert_eq!(report.cohort_matrix.row_labels(), vec!["2024-01", "2024-02"]);
        assert_eq!(report.cohort_matrix.cells()[0][..2], [1u64, 1]);
        assert_eq!(report.cohort_matrix.cells()[1][0], 1);
    }

    #[test]
    fn test_render_report_hits_every_table() {
        let mut fixture = StarFixture::new();
        fixture.product("p1", Some("toys"));
        fixture.sale("c1", "p1", "2024-01-10", 100.0, 0.0);

        let report = build_report(&fixture.store, &RunConfig::default()).unwrap();
        let mut sink = RecordingSink::new();
        render_report(&report, &mut sink).unwrap();

        assert_eq!(sink.renders, 3);
        assert_eq!(sink.cohort_matrix.as_ref(), Some(&report.cohort_matrix));
    }

    #[test]
    fn test_run_with_missing_store_renders_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RunConfig::new(tmp.path().join("missing.sqlite"));
        let mut sink = RecordingSink::new();

        let result = run(&config, &mut sink);
        assert!(matches!(result, Err(AnalyticsError::StoreUnavailable { .. })));
        assert_eq!(sink.renders, 0);
    }
}
