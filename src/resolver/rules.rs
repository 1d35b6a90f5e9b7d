//! Candidate rules for picking a column expression out of a table catalog.
//!
//! Each rule looks at the catalog and either produces an expression or
//! declines. A `RuleChain` tries its rules in priority order and the first
//! match wins; rules are never combined.

use crate::config::quote_ident;
use crate::error::AnalyticsError;
use crate::store::ColumnInfo;
use serde::{Deserialize, Serialize};

/// Column catalog of one table, matched case-insensitively.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    table: String,
    columns: Vec<ColumnInfo>,
}

impl TableCatalog {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        TableCatalog {
            table: table.into(),
            columns,
        }
    }

    /// Builds a catalog from bare names with no declared types.
    pub fn from_names(table: impl Into<String>, names: &[&str]) -> Self {
        let columns = names.iter().map(|name| ColumnInfo::new(*name, "")).collect();
        TableCatalog::new(table, columns)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn find(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Column names in catalog order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// Alias a table carries in the analytic queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableAlias {
    Fact,
    Date,
    Product,
}

impl TableAlias {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableAlias::Fact => "f",
            TableAlias::Date => "d",
            TableAlias::Product => "p",
        }
    }
}

/// A resolved column reference, or a sum of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnExpr {
    Column { alias: TableAlias, name: String },
    Sum(Vec<ColumnExpr>),
}

impl ColumnExpr {
    pub fn column(alias: TableAlias, name: impl Into<String>) -> Self {
        ColumnExpr::Column {
            alias,
            name: name.into(),
        }
    }

    /// SQL text with quoted identifiers, e.g. `(f."item_price" + f."freight_value")`.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnExpr::Column { alias, name } => format!("{}.{}", alias.as_str(), quote_ident(name)),
            ColumnExpr::Sum(terms) => {
                let parts: Vec<String> = terms.iter().map(ColumnExpr::to_sql).collect();
                format!("({})", parts.join(" + "))
            }
        }
    }
}

impl std::fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// One way of deriving an expression from a catalog.
pub trait ColumnRule: Send + Sync {
    fn name(&self) -> String;
    fn resolve(&self, catalog: &TableCatalog, alias: TableAlias) -> Option<ColumnExpr>;
}

/// Matches a single column by name.
pub struct ExactColumn {
    column: String,
}

impl ExactColumn {
    pub fn new(column: impl Into<String>) -> Self {
        ExactColumn {
            column: column.into(),
        }
    }
}

impl ColumnRule for ExactColumn {
    fn name(&self) -> String {
        self.column.clone()
    }

    fn resolve(&self, catalog: &TableCatalog, alias: TableAlias) -> Option<ColumnExpr> {
        catalog
            .find(&self.column)
            .map(|column| ColumnExpr::column(alias, column.name.clone()))
    }
}

/// Matches the first column, in catalog order, whose declared type contains
/// one of the markers.
pub struct FirstOfType {
    markers: &'static [&'static str],
}

impl FirstOfType {
    pub fn new(markers: &'static [&'static str]) -> Self {
        FirstOfType { markers }
    }
}

impl ColumnRule for FirstOfType {
    fn name(&self) -> String {
        format!("first {} column", self.markers.join("/"))
    }

    fn resolve(&self, catalog: &TableCatalog, alias: TableAlias) -> Option<ColumnExpr> {
        catalog
            .columns()
            .iter()
            .find(|column| {
                let declared = column.declared_type.to_uppercase();
                self.markers.iter().any(|marker| declared.contains(marker))
            })
            .map(|column| ColumnExpr::column(alias, column.name.clone()))
    }
}

/// Matches only when every listed column is present, producing their sum.
pub struct SumOfColumns {
    columns: &'static [&'static str],
}

impl SumOfColumns {
    pub fn new(columns: &'static [&'static str]) -> Self {
        SumOfColumns { columns }
    }
}

impl ColumnRule for SumOfColumns {
    fn name(&self) -> String {
        self.columns.join(" + ")
    }

    fn resolve(&self, catalog: &TableCatalog, alias: TableAlias) -> Option<ColumnExpr> {
        let terms = self
            .columns
            .iter()
            .map(|name| {
                catalog
                    .find(name)
                    .map(|column| ColumnExpr::column(alias, column.name.clone()))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(ColumnExpr::Sum(terms))
    }
}

/// Matches the first candidate name present in the catalog.
pub struct FirstPresent {
    candidates: &'static [&'static str],
}

impl FirstPresent {
    pub fn new(candidates: &'static [&'static str]) -> Self {
        FirstPresent { candidates }
    }
}

impl ColumnRule for FirstPresent {
    fn name(&self) -> String {
        format!("first of {}", self.candidates.join(", "))
    }

    fn resolve(&self, catalog: &TableCatalog, alias: TableAlias) -> Option<ColumnExpr> {
        self.candidates.iter().find_map(|candidate| {
            catalog
                .find(candidate)
                .map(|column| ColumnExpr::column(alias, column.name.clone()))
        })
    }
}

pub const DATE_TYPE_MARKERS: &[&str] = &["DATE", "TIMESTAMP"];
pub const PAYMENT_TOTAL: &str = "payment_total";
pub const ITEM_PRICE: &str = "item_price";
pub const ITEM_PRICE_WITH_FREIGHT: &[&str] = &["item_price", "freight_value"];
pub const CATEGORY_CANDIDATES: &[&str] = &[
    "category_en",
    "product_category_name_english",
    "product_category_name",
    "product_category",
    "category",
    "category_name",
];

/// The outcome of a successful chain evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub expr: ColumnExpr,
    /// Name of the rule that matched
    pub rule: String,
}

/// Ordered rules for one subject (date axis, revenue measure, category).
pub struct RuleChain {
    subject: &'static str,
    alias: TableAlias,
    rules: Vec<Box<dyn ColumnRule>>,
}

impl RuleChain {
    pub fn new(subject: &'static str, alias: TableAlias) -> Self {
        RuleChain {
            subject,
            alias,
            rules: Vec::new(),
        }
    }

    pub fn with_rule<R: ColumnRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Surrogate key first, then the first date-typed column.
    pub fn date_axis(date_key: &str) -> Self {
        RuleChain::new("date", TableAlias::Date)
            .with_rule(ExactColumn::new(date_key))
            .with_rule(FirstOfType::new(DATE_TYPE_MARKERS))
    }

    /// Payment total, then price plus freight, then price alone.
    pub fn revenue_measure() -> Self {
        RuleChain::new("revenue", TableAlias::Fact)
            .with_rule(ExactColumn::new(PAYMENT_TOTAL))
            .with_rule(SumOfColumns::new(ITEM_PRICE_WITH_FREIGHT))
            .with_rule(ExactColumn::new(ITEM_PRICE))
    }

    pub fn category_dimension() -> Self {
        RuleChain::new("category", TableAlias::Product)
            .with_rule(FirstPresent::new(CATEGORY_CANDIDATES))
    }

    pub fn subject(&self) -> &'static str {
        self.subject
    }

    /// Returns the first matching rule's expression.
    ///
    /// # Errors
    /// Returns `SchemaResolution` listing every column of the catalog when no
    /// rule matches.
    pub fn evaluate(&self, catalog: &TableCatalog) -> Result<Resolution, AnalyticsError> {
        self.rules
            .iter()
            .find_map(|rule| {
                rule.resolve(catalog, self.alias).map(|expr| Resolution {
                    expr,
                    rule: rule.name(),
                })
            })
            .ok_or_else(|| AnalyticsError::SchemaResolution {
                table: catalog.table().to_string(),
                subject: self.subject,
                found: catalog.column_names(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(table: &str, columns: &[(&str, &str)]) -> TableCatalog {
        TableCatalog::new(
            table,
            columns
                .iter()
                .map(|(name, ty)| ColumnInfo::new(*name, *ty))
                .collect(),
        )
    }

    #[test]
    fn test_price_and_freight_are_summed() {
        let catalog = TableCatalog::from_names("mart.fact_order_item", &["item_price", "freight_value"]);
        let resolution = RuleChain::revenue_measure().evaluate(&catalog).unwrap();
        assert_eq!(
            resolution.expr.to_sql(),
            "(f.\"item_price\" + f.\"freight_value\")"
        );
    }

    #[test]
    fn test_payment_total_wins_over_price_and_freight() {
        let catalog = TableCatalog::from_names(
            "mart.fact_order_item",
            &["item_price", "freight_value", "payment_total"],
        );
        let resolution = RuleChain::revenue_measure().evaluate(&catalog).unwrap();
        assert_eq!(resolution.expr, ColumnExpr::column(TableAlias::Fact, "payment_total"));
        assert_eq!(resolution.rule, "payment_total");
    }

    #[test]
    fn test_price_alone_is_last_resort() {
        let catalog = TableCatalog::from_names("mart.fact_order_item", &["order_id", "item_price"]);
        let resolution = RuleChain::revenue_measure().evaluate(&catalog).unwrap();
        assert_eq!(resolution.expr.to_sql(), "f.\"item_price\"");
    }

    #[test]
    fn test_revenue_failure_lists_actual_columns() {
        let catalog = TableCatalog::from_names(
            "mart.fact_order_item",
            &["order_id", "customer_id", "freight_value"],
        );
        match RuleChain::revenue_measure().evaluate(&catalog) {
            Err(AnalyticsError::SchemaResolution {
                table,
                subject,
                found,
            }) => {
                assert_eq!(table, "mart.fact_order_item");
                assert_eq!(subject, "revenue");
                assert_eq!(found, vec!["order_id", "customer_id", "freight_value"]);
            }
            other => panic!("expected SchemaResolution, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_ignores_case_but_keeps_identifier() {
        let catalog = TableCatalog::from_names("mart.fact_order_item", &["Item_Price", "FREIGHT_VALUE"]);
        let resolution = RuleChain::revenue_measure().evaluate(&catalog).unwrap();
        assert_eq!(
            resolution.expr.to_sql(),
            "(f.\"Item_Price\" + f.\"FREIGHT_VALUE\")"
        );
    }

    #[test]
    fn test_date_key_preferred_over_calendar_column() {
        let catalog = typed(
            "mart.dim_date",
            &[("full_date", "DATE"), ("date_key", "INTEGER"), ("year_month", "TEXT")],
        );
        let resolution = RuleChain::date_axis("date_key").evaluate(&catalog).unwrap();
        assert_eq!(resolution.expr.to_sql(), "d.\"date_key\"");
    }

    #[test]
    fn test_first_date_typed_column_in_catalog_order() {
        let catalog = typed(
            "mart.dim_date",
            &[
                ("id", "INTEGER"),
                ("year_month", "TEXT"),
                ("loaded_at", "TIMESTAMP"),
                ("calendar_date", "date"),
            ],
        );
        let resolution = RuleChain::date_axis("date_key").evaluate(&catalog).unwrap();
        assert_eq!(resolution.expr.to_sql(), "d.\"loaded_at\"");
    }

    #[test]
    fn test_date_failure_names_table() {
        let catalog = typed("mart.dim_date", &[("id", "INTEGER"), ("year_month", "TEXT")]);
        let err = RuleChain::date_axis("date_key").evaluate(&catalog).unwrap_err();
        assert!(err.to_string().contains("mart.dim_date"));
    }

    #[test]
    fn test_category_candidate_priority() {
        let catalog = TableCatalog::from_names(
            "mart.dim_product",
            &["product_id", "category", "product_category_name", "category_en"],
        );
        let resolution = RuleChain::category_dimension().evaluate(&catalog).unwrap();
        assert_eq!(resolution.expr.to_sql(), "p.\"category_en\"");

        let legacy = TableCatalog::from_names("mart.dim_product", &["product_id", "Category_Name"]);
        let resolution = RuleChain::category_dimension().evaluate(&legacy).unwrap();
        assert_eq!(resolution.expr.to_sql(), "p.\"Category_Name\"");
    }

    #[test]
    fn test_category_missing() {
        let catalog = TableCatalog::from_names("mart.dim_product", &["product_id", "weight_g"]);
        let err = RuleChain::category_dimension().evaluate(&catalog).unwrap_err();
        assert!(matches!(err, AnalyticsError::SchemaResolution { subject: "category", .. }));
    }

    #[test]
    fn test_custom_chain() {
        let chain = RuleChain::new("revenue", TableAlias::Fact)
            .with_rule(SumOfColumns::new(&["gross", "tax"]))
            .with_rule(ExactColumn::new("net"));
        let catalog = TableCatalog::from_names("sales", &["net", "gross"]);
        assert_eq!(chain.subject(), "revenue");
        assert_eq!(chain.evaluate(&catalog).unwrap().rule, "net");
    }
}
