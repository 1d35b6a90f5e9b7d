//! Test fixtures: an in-memory order star schema filled row by row.

use crate::config::StarSchema;
use crate::resolver::{ResolvedExpressions, SchemaResolver};
use crate::store::StarSchemaStore;

/// Current-generation star: date keys are ISO dates, revenue is price + freight.
pub(crate) const STAR_DDL: &str = "
    CREATE TABLE mart.dim_date (
        date_key DATE PRIMARY KEY,
        year_month TEXT NOT NULL
    );
    CREATE TABLE mart.dim_product (
        product_id TEXT PRIMARY KEY,
        category_en TEXT
    );
    CREATE TABLE mart.fact_order_item (
        order_id TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        product_id TEXT NOT NULL,
        purchase_date_key DATE NOT NULL,
        item_price REAL,
        freight_value REAL
    );
";

pub(crate) struct StarFixture {
    pub store: StarSchemaStore,
    next_order: u32,
}

impl StarFixture {
    pub fn new() -> Self {
        let store = StarSchemaStore::new_in_memory(StarSchema::default()).unwrap();
        store.connection().execute_batch(STAR_DDL).unwrap();
        StarFixture {
            store,
            next_order: 0,
        }
    }

    pub fn product(&mut self, product_id: &str, category: Option<&str>) {
        self.store
            .connection()
            .execute(
                "INSERT INTO mart.dim_product (product_id, category_en) VALUES (?1, ?2)",
                rusqlite::params![product_id, category],
            )
            .unwrap();
    }

    /// Adds one order line, creating its date dimension row if needed.
    pub fn sale(&mut self, customer_id: &str, product_id: &str, date: &str, price: f64, freight: f64) {
        self.next_order += 1;
        let conn = self.store.connection();
        conn.execute(
            "INSERT OR IGNORE INTO mart.dim_date (date_key, year_month) VALUES (?1, substr(?1, 1, 7))",
            [date],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mart.fact_order_item
               (order_id, customer_id, product_id, purchase_date_key, item_price, freight_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                format!("o{}", self.next_order),
                customer_id,
                product_id,
                date,
                price,
                freight
            ],
        )
        .unwrap();
    }

    pub fn expressions(&self) -> ResolvedExpressions {
        SchemaResolver::new(&self.store).resolve_all().unwrap()
    }
}
