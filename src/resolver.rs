//! Schema Resolution
//!
//! Inspects the star schema catalog once per run and decides which column
//! expressions the aggregation queries use for the date axis, the revenue
//! measure and the category dimension. Several generations of the star are
//! tolerated; see [`rules::RuleChain`] for the preference orders.

pub mod rules;

use crate::config::Identifier;
use crate::error::AnalyticsError;
use crate::store::StarSchemaStore;
use rules::{ColumnExpr, Resolution, RuleChain, TableCatalog};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The three expressions bound for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExpressions {
    /// Expression on the date dimension (alias `d`)
    pub date: ColumnExpr,
    /// Expression on the fact table (alias `f`)
    pub revenue: ColumnExpr,
    /// Expression on the product dimension (alias `p`)
    pub category: ColumnExpr,
}

/// Reads catalogs from a store and applies the rule chains to them.
///
/// Resolution only issues catalog queries, so it can be repeated freely.
pub struct SchemaResolver<'a> {
    store: &'a StarSchemaStore,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(store: &'a StarSchemaStore) -> Self {
        SchemaResolver { store }
    }

    /// Column catalog of one star table, labelled `schema.table`.
    pub fn catalog(&self, table: &Identifier) -> Result<TableCatalog, AnalyticsError> {
        let columns = self.store.table_columns(table)?;
        Ok(TableCatalog::new(
            self.store.star().display_name(table),
            columns,
        ))
    }

    pub fn resolve_date(&self) -> Result<ColumnExpr, AnalyticsError> {
        let star = self.store.star();
        let catalog = self.catalog(&star.date_table)?;
        let resolution = RuleChain::date_axis(star.date_key.as_str()).evaluate(&catalog)?;
        log_resolution(&catalog, &resolution);
        Ok(resolution.expr)
    }

    pub fn resolve_revenue(&self) -> Result<ColumnExpr, AnalyticsError> {
        let catalog = self.catalog(&self.store.star().fact_table)?;
        let resolution = RuleChain::revenue_measure().evaluate(&catalog)?;
        log_resolution(&catalog, &resolution);
        Ok(resolution.expr)
    }

    pub fn resolve_category(&self) -> Result<ColumnExpr, AnalyticsError> {
        let catalog = self.catalog(&self.store.star().product_table)?;
        let resolution = RuleChain::category_dimension().evaluate(&catalog)?;
        log_resolution(&catalog, &resolution);
        Ok(resolution.expr)
    }

    /// Resolves all three expressions, failing on the first that cannot be.
    pub fn resolve_all(&self) -> Result<ResolvedExpressions, AnalyticsError> {
        Ok(ResolvedExpressions {
            date: self.resolve_date()?,
            revenue: self.resolve_revenue()?,
            category: self.resolve_category()?,
        })
    }
}

fn log_resolution(catalog: &TableCatalog, resolution: &Resolution) {
    info!(
        table = catalog.table(),
        rule = resolution.rule.as_str(),
        "Using {} from {}",
        resolution.expr,
        catalog.table()
    );
}
