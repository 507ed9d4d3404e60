#![allow(clippy::missing_errors_doc)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use stationery_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, InventoryError, NameJoinLookup, Product,
    ProductInput, SaleEvent, SaleInput,
};
use tracing::{debug, info};

mod seed;

pub use seed::{default_seed_catalog, SEED_STOCK};

const INVENTORY_MIGRATION_VERSION: i64 = 1;

/// How long a handle waits on another connection's write lock by default.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const SCHEMA_INVENTORY_V1: &str = r"
CREATE TABLE IF NOT EXISTS products (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  category TEXT NOT NULL,
  price REAL NOT NULL CHECK (price >= 0.0),
  stock INTEGER NOT NULL CHECK (stock >= 0)
);

CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);

CREATE TABLE IF NOT EXISTS sales (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  product_name TEXT NOT NULL,
  category TEXT NOT NULL,
  quantity_sold INTEGER NOT NULL CHECK (quantity_sold >= 1),
  price REAL NOT NULL CHECK (price >= 0.0),
  total_amount REAL,
  profit REAL,
  sale_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sales_product_name ON sales(product_name);
CREATE INDEX IF NOT EXISTS idx_sales_sale_date ON sales(sale_date);

CREATE TRIGGER IF NOT EXISTS trg_sales_no_update
BEFORE UPDATE ON sales
BEGIN
  SELECT RAISE(FAIL, 'sales is append-only');
END;
";

/// Catalog and sales ledger over a single `SQLite` connection.
///
/// A handle is meant to live for one unit of work; concurrent writers each
/// open their own handle and rely on `busy_timeout` for serialization.
pub struct SqliteInventoryStore {
    conn: Connection,
}

/// Catalog and ledger read inside one transaction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct InventorySnapshot {
    pub products: Vec<Product>,
    pub sales: Vec<SaleEvent>,
}

impl InventorySnapshot {
    #[must_use]
    pub fn sold_quantity_lookup(&self) -> NameJoinLookup {
        NameJoinLookup::from_sales(&self.sales)
    }
}

impl SqliteInventoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a handle whose lock waits give up after `busy_timeout`.
    ///
    /// A write that cannot take the lock in time fails with `database is
    /// locked` and leaves the database untouched.
    pub fn open_with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.busy_timeout(busy_timeout)
            .context("failed to configure sqlite busy timeout")?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_INVENTORY_V1)
            .context("failed to apply inventory schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![INVENTORY_MIGRATION_VERSION, now],
            )
            .context("failed to register inventory schema migration")?;

        Ok(())
    }

    pub fn create_product(&self, input: &ProductInput) -> Result<Product> {
        input.validate()?;

        self.conn
            .execute(
                "INSERT INTO products(name, category, price, stock) VALUES (?1, ?2, ?3, ?4)",
                params![input.name, input.category, input.price, input.stock],
            )
            .context("failed to insert product")?;

        let product = Product {
            id: self.conn.last_insert_rowid(),
            name: input.name.clone(),
            category: input.category.clone(),
            price: input.price,
            stock: input.stock,
        };
        info!(product_id = product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, category, price, stock
             FROM products
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], parse_product_row)?;
        collect_rows(rows)
    }

    pub fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, category, price, stock
             FROM products
             WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![product_id], parse_product_row)
            .optional()?;
        Ok(row)
    }

    /// Atomically removes `amount` units from a product's stock.
    ///
    /// Returns the remaining stock. Fails with [`InventoryError::NotFound`]
    /// for an unknown id and [`InventoryError::InsufficientStock`] when the
    /// product holds fewer than `amount` units; neither case writes.
    pub fn decrement_stock(&mut self, product_id: i64, amount: i64) -> Result<i64> {
        if amount < 1 {
            return Err(InventoryError::Validation("quantity MUST be >= 1".to_string()).into());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start stock transaction")?;

        let remaining: Option<i64> = tx
            .query_row(
                "UPDATE products
                 SET stock = stock - ?2
                 WHERE id = ?1 AND stock >= ?2
                 RETURNING stock",
                params![product_id, amount],
                |row| row.get(0),
            )
            .optional()
            .context("failed to decrement product stock")?;

        let Some(remaining) = remaining else {
            let available: Option<i64> = tx
                .query_row(
                    "SELECT stock FROM products WHERE id = ?1",
                    params![product_id],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to read product stock")?;
            drop(tx);

            debug!(product_id, amount, ?available, "stock decrement rejected");
            return Err(match available {
                None => InventoryError::NotFound(format!("product {product_id}")),
                Some(available) => InventoryError::InsufficientStock {
                    product_id,
                    requested: amount,
                    available,
                },
            }
            .into());
        };

        tx.commit().context("failed to commit stock transaction")?;
        debug!(product_id, amount, remaining, "stock decremented");
        Ok(remaining)
    }

    pub fn clear_products(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM products", [])
            .context("failed to clear products")?;
        info!(removed, "catalog cleared");
        Ok(removed)
    }

    /// Replaces the whole catalog with `inputs` in one transaction.
    pub fn seed_catalog(&mut self, inputs: &[ProductInput]) -> Result<usize> {
        for input in inputs {
            input
                .validate()
                .with_context(|| format!("invalid seed product {}", input.name))?;
        }

        let tx = self
            .conn
            .transaction()
            .context("failed to start seed transaction")?;
        tx.execute("DELETE FROM products", [])
            .context("failed to clear products before seeding")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO products(name, category, price, stock) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for input in inputs {
                stmt.execute(params![input.name, input.category, input.price, input.stock])
                    .with_context(|| format!("failed to insert seed product {}", input.name))?;
            }
        }
        tx.commit().context("failed to commit seed transaction")?;

        info!(inserted = inputs.len(), "catalog seeded");
        Ok(inputs.len())
    }

    pub fn append_sale(&self, input: &SaleInput) -> Result<SaleEvent> {
        input.validate()?;

        let sale_date = input.sale_date.unwrap_or_else(now_utc);
        self.conn
            .execute(
                "INSERT INTO sales(
                    product_name, category, quantity_sold, price,
                    total_amount, profit, sale_date
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    input.product_name,
                    input.category,
                    input.quantity_sold,
                    input.price,
                    input.total_amount,
                    input.profit,
                    format_rfc3339(sale_date).map_err(|err| anyhow!(err.to_string()))?,
                ],
            )
            .context("failed to append sale")?;

        let sale = SaleEvent {
            id: self.conn.last_insert_rowid(),
            product_name: input.product_name.clone(),
            category: input.category.clone(),
            quantity_sold: input.quantity_sold,
            price: input.price,
            total_amount: input.total_amount,
            profit: input.profit,
            sale_date,
        };
        info!(
            sale_id = sale.id,
            product_name = %sale.product_name,
            quantity = sale.quantity_sold,
            "sale recorded"
        );
        Ok(sale)
    }

    pub fn list_sales(&self) -> Result<Vec<SaleEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                id, product_name, category, quantity_sold, price,
                total_amount, profit, sale_date
             FROM sales
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], parse_sale_row)?;
        collect_rows(rows)
    }

    pub fn count_sales(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM sales", [], |row| row.get::<_, i64>(0))
            .context("failed to count sales")?;
        Ok(count)
    }

    pub fn clear_sales(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM sales", [])
            .context("failed to clear sales")?;
        info!(removed, "sales ledger cleared");
        Ok(removed)
    }

    /// Reads catalog and ledger under one read transaction.
    pub fn snapshot(&mut self) -> Result<InventorySnapshot> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start snapshot transaction")?;

        let products = {
            let mut stmt = tx.prepare(
                "SELECT id, name, category, price, stock
                 FROM products
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], parse_product_row)?;
            collect_rows(rows)?
        };

        let sales = {
            let mut stmt = tx.prepare(
                "SELECT
                    id, product_name, category, quantity_sold, price,
                    total_amount, profit, sale_date
                 FROM sales
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], parse_sale_row)?;
            collect_rows(rows)?
        };

        tx.commit().context("failed to close snapshot transaction")?;
        Ok(InventorySnapshot { products, sales })
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn parse_product_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        price: row.get(3)?,
        stock: row.get(4)?,
    })
}

fn parse_sale_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SaleEvent> {
    let sale_date_raw: String = row.get(7)?;
    let sale_date = parse_rfc3339_utc(&sale_date_raw).map_err(to_sql_error)?;

    Ok(SaleEvent {
        id: row.get(0)?,
        product_name: row.get(1)?,
        category: row.get(2)?,
        quantity_sold: row.get(3)?,
        price: row.get(4)?,
        total_amount: row.get(5)?,
        profit: row.get(6)?,
        sale_date,
    })
}

#[allow(clippy::needless_pass_by_value)]
fn to_sql_error(err: InventoryError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        7,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

/// Where a `DATABASE_URL` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    InMemory,
}

impl DatabaseLocation {
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::InMemory => PathBuf::from(":memory:"),
        }
    }
}

/// Normalizes a store connection string.
///
/// Accepts a plain path, `sqlite://<path>`, `sqlite:<path>` or
/// `sqlite::memory:`. Any other URL scheme is rejected.
pub fn parse_database_url(raw: &str) -> Result<DatabaseLocation> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InventoryError::Configuration("DATABASE_URL is empty".to_string()).into());
    }

    let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if trimmed.contains("://") {
        return Err(InventoryError::Configuration(format!(
            "unsupported database url scheme: {trimmed}"
        ))
        .into());
    } else {
        trimmed
    };

    // Connection options after `?` do not apply to a file path.
    let path = path.split('?').next().unwrap_or_default();

    match path {
        "" => Err(InventoryError::Configuration(format!(
            "database url has no path: {trimmed}"
        ))
        .into()),
        ":memory:" => Ok(DatabaseLocation::InMemory),
        other => Ok(DatabaseLocation::File(PathBuf::from(other))),
    }
}
