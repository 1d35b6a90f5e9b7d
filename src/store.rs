use crate::calendar::MonthKey;
use crate::config::{Identifier, StarSchema};
use crate::error::AnalyticsError;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

/// A column as reported by the store catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name with its original case
    pub name: String,
    /// Declared type, as written in the table definition (may be empty)
    pub declared_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        ColumnInfo {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// Read-only handle on the SQLite file holding the order star schema.
///
/// The file is attached under the configured schema alias so every table is
/// addressed as `schema.table`. The connection is released when the store is
/// closed or dropped.
#[derive(Debug)]
pub struct StarSchemaStore {
    conn: Connection,
    star: StarSchema,
}

impl StarSchemaStore {
    /// Opens the store file read-only.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` if the file is missing or is not a SQLite
    /// database.
    pub fn open<P: AsRef<Path>>(db_path: P, star: StarSchema) -> Result<Self, AnalyticsError> {
        let path = db_path.as_ref();
        let unavailable = |reason: String| AnalyticsError::StoreUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(unavailable("file does not exist".to_string()));
        }
        if !path.is_file() {
            return Err(unavailable("not a regular file".to_string()));
        }

        let conn = if is_main_schema(&star) {
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| unavailable(e.to_string()))?
        } else {
            let conn = Connection::open_in_memory().map_err(|e| unavailable(e.to_string()))?;
            let path_str = path.to_string_lossy().into_owned();
            conn.execute(
                &format!("ATTACH DATABASE ?1 AS {}", star.schema.quoted()),
                [&path_str],
            )
            .map_err(|e| unavailable(e.to_string()))?;
            conn
        };

        // ATTACH is lazy; touching the catalog surfaces "file is not a database".
        conn.query_row(
            &format!("SELECT count(*) FROM {}.sqlite_master", star.schema.quoted()),
            [],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|e| unavailable(e.to_string()))?;

        conn.execute_batch("PRAGMA query_only = ON")?;
        register_month_functions(&conn)?;

        debug!("Opened analytic store {} as schema {}", path.display(), star.schema);
        Ok(StarSchemaStore { conn, star })
    }

    /// Creates a writable in-memory store with an empty schema.
    ///
    /// Useful for testing and for building fixtures.
    pub fn new_in_memory(star: StarSchema) -> Result<Self, AnalyticsError> {
        let conn = Connection::open_in_memory()?;
        if !is_main_schema(&star) {
            conn.execute(
                &format!("ATTACH DATABASE ':memory:' AS {}", star.schema.quoted()),
                [],
            )?;
        }
        register_month_functions(&conn)?;
        Ok(StarSchemaStore { conn, star })
    }

    pub fn star(&self) -> &StarSchema {
        &self.star
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Reads the column catalog of `table`, in declaration order.
    ///
    /// A missing table yields an empty catalog.
    pub fn table_columns(&self, table: &Identifier) -> Result<Vec<ColumnInfo>, AnalyticsError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
        let rows = stmt.query_map([table.as_str(), self.star.schema.as_str()], |row| {
            Ok(ColumnInfo::new(
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        Ok(columns)
    }

    /// Checks if a table exists in the star schema.
    pub fn table_exists(&self, table: &Identifier) -> Result<bool, AnalyticsError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name FROM {}.sqlite_master WHERE type='table' AND name=?1",
            self.star.schema.quoted()
        ))?;
        Ok(stmt.exists([table.as_str()])?)
    }

    /// Releases the connection, reporting any error raised while closing.
    pub fn close(self) -> Result<(), AnalyticsError> {
        debug!("Closing analytic store");
        self.conn
            .close()
            .map_err(|(_, err)| AnalyticsError::QueryExecution(err))
    }
}

fn is_main_schema(star: &StarSchema) -> bool {
    star.schema.as_str().eq_ignore_ascii_case("main")
}

/// Registers `month_start(value)` and `month_diff(from, to)` on `conn`.
///
/// Both follow [`MonthKey`] truncation; NULL inputs give NULL.
fn register_month_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("month_start", 1, flags, |ctx| {
        Ok(month_arg(ctx, 0)?.map(|month| month.first_day().format("%Y-%m-%d").to_string()))
    })?;

    conn.create_scalar_function("month_diff", 2, flags, |ctx| {
        let from = month_arg(ctx, 0)?;
        let to = month_arg(ctx, 1)?;
        Ok(match (from, to) {
            (Some(from), Some(to)) => Some(from.months_until(&to)),
            _ => None,
        })
    })?;

    Ok(())
}

fn month_arg(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<MonthKey>> {
    match ctx.get_raw(idx) {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(key) => MonthKey::from_date_key(key)
            .map(Some)
            .ok_or_else(|| user_error(format!("{} is not a yyyymmdd date key", key))),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            MonthKey::parse(text)
                .map(Some)
                .ok_or_else(|| user_error(format!("{:?} is not a recognizable date", text)))
        }
        other => Err(user_error(format!(
            "cannot truncate a {} value to a month",
            other.data_type()
        ))),
    }
}

fn user_error(message: String) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(message.into())
}
