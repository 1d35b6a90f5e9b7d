//! Aggregation Engine
//!
//! Three read-only analytic queries over the order star schema, each built
//! from the expressions chosen by the schema resolver:
//!
//! - monthly revenue with a trailing 3-month average
//! - top-N categories by revenue
//! - cohort activity: distinct active customers per (cohort month, month offset)
//!
//! Only identifiers are interpolated into the SQL text; they come either from
//! validated configuration or from the store catalog. Limits and labels are
//! bound as parameters.

pub mod primitives;
pub mod windows;

use crate::calendar::MonthKey;
use crate::config::ROLLING_WINDOW_MONTHS;
use crate::error::AnalyticsError;
use crate::resolver::ResolvedExpressions;
use crate::store::StarSchemaStore;
use primitives::mean;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use windows::FixedWindow;

/// Label used for products whose category is NULL or blank.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Characters stripped from category labels: space, tab, LF, VT, FF, CR.
const LABEL_WHITESPACE: &str = "' ' || char(9, 10, 11, 12, 13)";

/// Revenue for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub month: MonthKey,
    pub revenue: f64,
    /// Trailing mean over up to `ROLLING_WINDOW_MONTHS` months ending here
    pub smoothed_revenue: f64,
}

/// Revenue attributed to one product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
}

/// Long-form cohort row: customers of `cohort_month` active `month_offset`
/// months after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortActivity {
    pub cohort_month: MonthKey,
    pub month_offset: u32,
    pub active_customers: u64,
}

/// Trailing moving average over `ROLLING_WINDOW_MONTHS`, narrowing at the start.
pub fn smooth_revenue(revenues: &[f64]) -> Vec<f64> {
    FixedWindow::new(ROLLING_WINDOW_MONTHS).apply(revenues, mean)
}

/// Runs the analytic queries against one store with one set of expressions.
pub struct AggregationEngine<'a> {
    store: &'a StarSchemaStore,
    exprs: &'a ResolvedExpressions,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(store: &'a StarSchemaStore, exprs: &'a ResolvedExpressions) -> Self {
        AggregationEngine { store, exprs }
    }

    fn monthly_revenue_sql(&self) -> String {
        let star = self.store.star();
        let date = self.exprs.date.to_sql();
        format!(
            "SELECT
               month_start({date}) AS month_start,
               SUM({revenue})      AS revenue
             FROM {fact} f
             JOIN {dim_date} d
               ON d.{date_key} = f.{purchase_date_key}
             WHERE {date} IS NOT NULL
             GROUP BY 1
             ORDER BY 1",
            date = date,
            revenue = self.exprs.revenue.to_sql(),
            fact = star.qualified(&star.fact_table),
            dim_date = star.qualified(&star.date_table),
            date_key = star.date_key.quoted(),
            purchase_date_key = star.purchase_date_key.quoted(),
        )
    }

    fn top_categories_sql(&self) -> String {
        let star = self.store.star();
        format!(
            "SELECT
               COALESCE(NULLIF(TRIM(CAST({category} AS TEXT), {whitespace}), ''), ?2) AS category,
               SUM({revenue})                                                       AS revenue
             FROM {fact} f
             JOIN {dim_product} p
               ON p.{product_id} = f.{product_id}
             GROUP BY 1
             ORDER BY 2 DESC, 1 ASC
             LIMIT ?1",
            category = self.exprs.category.to_sql(),
            whitespace = LABEL_WHITESPACE,
            revenue = self.exprs.revenue.to_sql(),
            fact = star.qualified(&star.fact_table),
            dim_product = star.qualified(&star.product_table),
            product_id = star.product_id.quoted(),
        )
    }

    fn cohort_activity_sql(&self) -> String {
        let star = self.store.star();
        format!(
            "WITH first_purchase AS (
               SELECT
                 f.{customer_id}             AS customer_id,
                 MIN(f.{purchase_date_key})  AS first_date_key
               FROM {fact} f
               GROUP BY 1
             ),
             first_month AS (
               SELECT
                 fp.customer_id,
                 month_start({date}) AS cohort_month
               FROM first_purchase fp
               JOIN {dim_date} d
                 ON d.{date_key} = fp.first_date_key
             ),
             activity AS (
               SELECT
                 fm.cohort_month,
                 month_start({date}) AS activity_month,
                 f.{customer_id}     AS customer_id
               FROM {fact} f
               JOIN {dim_date} d
                 ON d.{date_key} = f.{purchase_date_key}
               JOIN first_month fm
                 ON fm.customer_id = f.{customer_id}
             ),
             offsets AS (
               SELECT
                 cohort_month,
                 month_diff(cohort_month, activity_month) AS month_offset,
                 COUNT(DISTINCT customer_id)              AS active_customers
               FROM activity
               WHERE cohort_month IS NOT NULL
                 AND activity_month IS NOT NULL
               GROUP BY 1, 2
             )
             SELECT cohort_month, month_offset, active_customers
             FROM offsets
             WHERE month_offset BETWEEN 0 AND ?1
             ORDER BY cohort_month, month_offset",
            date = self.exprs.date.to_sql(),
            fact = star.qualified(&star.fact_table),
            dim_date = star.qualified(&star.date_table),
            date_key = star.date_key.quoted(),
            purchase_date_key = star.purchase_date_key.quoted(),
            customer_id = star.customer_id.quoted(),
        )
    }

    /// Revenue per calendar month in ascending order, with the smoothed series.
    ///
    /// Fact rows whose date key has no match in the date dimension are left
    /// out by the join.
    pub fn monthly_revenue(&self) -> Result<Vec<MonthlyRevenue>, AnalyticsError> {
        let sql = self.monthly_revenue_sql();
        debug!(query = %sql, "monthly revenue");

        let conn = self.store.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let month = month_column(row, 0)?;
            let revenue = row.get::<_, Option<f64>>(1)?.unwrap_or(0.0);
            Ok((month, revenue))
        })?;

        let mut months = Vec::new();
        let mut revenues = Vec::new();
        for row in rows {
            let (month, revenue) = row?;
            months.push(month);
            revenues.push(revenue);
        }

        let smoothed = smooth_revenue(&revenues);
        let result: Vec<MonthlyRevenue> = months
            .into_iter()
            .zip(revenues)
            .zip(smoothed)
            .map(|((month, revenue), smoothed_revenue)| MonthlyRevenue {
                month,
                revenue,
                smoothed_revenue,
            })
            .collect();

        info!("Computed revenue for {} months", result.len());
        Ok(result)
    }

    /// The `top_n` categories by revenue, highest first, ties by label.
    pub fn top_categories(&self, top_n: usize) -> Result<Vec<CategoryRevenue>, AnalyticsError> {
        let sql = self.top_categories_sql();
        debug!(query = %sql, top_n, "top categories");

        let limit = i64::try_from(top_n).unwrap_or(i64::MAX);
        let conn = self.store.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![limit, UNKNOWN_CATEGORY], |row| {
            Ok(CategoryRevenue {
                category: row.get(0)?,
                revenue: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
            })
        })?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }

        info!("Ranked {} categories (top {})", categories.len(), top_n);
        Ok(categories)
    }

    /// Distinct active customers per (cohort month, month offset) for offsets
    /// `0..=max_month`, ordered by cohort then offset.
    ///
    /// Buckets with no activity are absent; see [`crate::cohort::CohortMatrix`]
    /// for the dense form.
    pub fn cohort_activity(&self, max_month: u32) -> Result<Vec<CohortActivity>, AnalyticsError> {
        let sql = self.cohort_activity_sql();
        debug!(query = %sql, max_month, "cohort activity");

        let conn = self.store.connection();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([i64::from(max_month)], |row| {
            Ok(CohortActivity {
                cohort_month: month_column(row, 0)?,
                month_offset: row.get::<_, i64>(1)? as u32,
                active_customers: row.get::<_, i64>(2)? as u64,
            })
        })?;

        let mut activity = Vec::new();
        for row in rows {
            activity.push(row?);
        }

        info!("Computed {} cohort activity rows", activity.len());
        Ok(activity)
    }
}

fn month_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<MonthKey> {
    let text: String = row.get(idx)?;
    MonthKey::parse(&text).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(
            idx,
            format!("Invalid month: {}", text),
            rusqlite::types::Type::Text,
        )
    })
}
