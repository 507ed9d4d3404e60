//! Domain types and read-side derivations for the StationeryAI inventory backend.
//!
//! Everything in this crate is pure: the catalog and ledger snapshots come in
//! as slices and the derived views come out as plain values. Persistence lives
//! in `stationery-store-sqlite`, transport in `stationery-service`.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

pub mod recommend;
pub mod reports;

pub use recommend::{recommend, ProductSummary, FALLBACK_RECOMMENDATION_COUNT};
pub use reports::{
    monthly_report, predict_demand, stock_alert, stock_report, DemandForecast, MonthlyRollup,
    NameJoinLookup, Report, SoldQuantityLookup, StockAlert, StockLevel, DEMAND_PROJECTION_OFFSET,
    LOW_STOCK_THRESHOLD,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum InventoryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("payment signature verification failed")]
    VerificationFailed,
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductInput {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
}

impl ProductInput {
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: f64, stock: i64) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price,
            stock,
        }
    }

    /// Validates a catalog row before insert.
    ///
    /// # Errors
    /// Returns [`InventoryError::Validation`] when the name or category is
    /// blank, the price is negative or not finite, or the stock is negative.
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.name.trim().is_empty() {
            return Err(InventoryError::Validation(
                "product name MUST be provided".to_string(),
            ));
        }

        if self.category.trim().is_empty() {
            return Err(InventoryError::Validation(
                "product category MUST be provided".to_string(),
            ));
        }

        validate_money("price", self.price)?;

        if self.stock < 0 {
            return Err(InventoryError::Validation(
                "stock MUST be >= 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleEvent {
    pub id: i64,
    pub product_name: String,
    pub category: String,
    pub quantity_sold: i64,
    pub price: f64,
    pub total_amount: Option<f64>,
    pub profit: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub sale_date: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleInput {
    pub product_name: String,
    pub category: String,
    pub quantity_sold: i64,
    pub price: f64,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub sale_date: Option<OffsetDateTime>,
}

impl SaleInput {
    /// Validates a ledger entry before append.
    ///
    /// # Errors
    /// Returns [`InventoryError::Validation`] when the product name is blank,
    /// the quantity is not positive, a money field is negative or not finite,
    /// or an explicit sale date is not UTC.
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.product_name.trim().is_empty() {
            return Err(InventoryError::Validation(
                "product_name MUST be provided for every sale".to_string(),
            ));
        }

        if self.quantity_sold < 1 {
            return Err(InventoryError::Validation(
                "quantity_sold MUST be >= 1".to_string(),
            ));
        }

        validate_money("price", self.price)?;

        // Totals and profit are free-form ledger figures; a loss is a negative profit.
        for (name, value) in [("total_amount", self.total_amount), ("profit", self.profit)] {
            if value.is_some_and(|amount| !amount.is_finite()) {
                return Err(InventoryError::Validation(format!(
                    "{name} MUST be a finite number"
                )));
            }
        }

        if let Some(sale_date) = self.sale_date {
            if sale_date.offset() != UtcOffset::UTC {
                return Err(InventoryError::Validation(
                    "sale_date MUST be UTC (offset Z)".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_money(name: &str, value: f64) -> Result<(), InventoryError> {
    if !value.is_finite() || value < 0.0 {
        return Err(InventoryError::Validation(format!(
            "{name} MUST be a finite number >= 0"
        )));
    }
    Ok(())
}

/// Rounds a monetary sum to two decimal places, half away from zero.
#[must_use]
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`InventoryError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, InventoryError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| InventoryError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(InventoryError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`InventoryError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, InventoryError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            InventoryError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Calendar month bucket (`YYYY-MM`) of a timestamp, taken in UTC.
#[must_use]
pub fn month_key(value: OffsetDateTime) -> String {
    let utc = value.to_offset(UtcOffset::UTC);
    format!("{:04}-{:02}", utc.year(), u8::from(utc.month()))
}
