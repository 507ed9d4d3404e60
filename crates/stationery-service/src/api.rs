use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stationery_core::{
    monthly_report, predict_demand, recommend, stock_alert, stock_report, DemandForecast,
    MonthlyRollup, Product, ProductInput, ProductSummary, Report, SaleEvent, SaleInput,
    StockAlert, StockLevel,
};
use stationery_gateway::{amount_in_minor_units, GatewayOrder, PaymentGateway};
use stationery_store_sqlite::{SqliteInventoryStore, DEFAULT_BUSY_TIMEOUT};
use tracing::info;

pub const SALE_RECORDED_MESSAGE: &str = "Sales added successfully";
pub const SALE_RECORD_ADDED_MESSAGE: &str = "Sales record added successfully";
pub const STOCK_UPDATED_MESSAGE: &str = "Stock updated successfully";
pub const PAYMENT_VERIFIED_MESSAGE: &str = "Payment Verified Successfully";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    pub purpose: String,
    pub budget: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStockRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerified {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleRecorded {
    pub message: &'static str,
    pub sale: SaleEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockUpdated {
    pub message: &'static str,
    pub remaining_stock: i64,
}

/// Per-call facade over the store and payment gateway.
///
/// Every operation opens its own store handle and drops it on return, so the
/// facade itself is cheap to clone into blocking tasks. Handles give up on a
/// held write lock after `busy_timeout`.
#[derive(Clone)]
pub struct InventoryApi {
    db_path: PathBuf,
    gateway: Arc<dyn PaymentGateway>,
    busy_timeout: Duration,
}

impl fmt::Debug for InventoryApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryApi")
            .field("db_path", &self.db_path)
            .field("gateway", &self.gateway.gateway_name())
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

impl InventoryApi {
    #[must_use]
    pub fn new(db_path: PathBuf, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            db_path,
            gateway,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    fn open_store(&self) -> Result<SqliteInventoryStore> {
        SqliteInventoryStore::open_with_busy_timeout(&self.db_path, self.busy_timeout)
    }

    pub fn migrate(&self) -> Result<()> {
        let store = self.open_store()?;
        store.migrate().context("failed to migrate inventory schema")?;
        info!(db = %self.db_path.display(), "inventory schema ready");
        Ok(())
    }

    pub fn add_product(&self, input: &ProductInput) -> Result<Product> {
        self.open_store()?.create_product(input)
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        self.open_store()?.list_products()
    }

    pub fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder> {
        let amount_minor = amount_in_minor_units(request.amount)?;
        Ok(self.gateway.create_order(amount_minor)?)
    }

    pub fn verify_payment(&self, request: &VerifyPaymentRequest) -> Result<PaymentVerified> {
        self.gateway.verify_signature(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )?;
        info!(order_id = %request.razorpay_order_id, "payment verified");
        Ok(PaymentVerified {
            status: "success",
            message: PAYMENT_VERIFIED_MESSAGE,
        })
    }

    pub fn recommend(&self, request: &RecommendRequest) -> Result<Vec<ProductSummary>> {
        let products = self.open_store()?.list_products()?;
        Ok(recommend(&products, &request.purpose, request.budget))
    }

    pub fn add_sale(&self, input: &SaleInput) -> Result<SaleEvent> {
        self.open_store()?.append_sale(input)
    }

    pub fn list_sales(&self) -> Result<Vec<SaleEvent>> {
        self.open_store()?.list_sales()
    }

    pub fn predict_demand(&self) -> Result<Report<DemandForecast>> {
        let sales = self.open_store()?.list_sales()?;
        Ok(predict_demand(&sales))
    }

    pub fn monthly_report(&self) -> Result<Report<MonthlyRollup>> {
        let sales = self.open_store()?.list_sales()?;
        Ok(monthly_report(&sales))
    }

    pub fn stock_report(&self) -> Result<Report<StockLevel>> {
        let snapshot = self.open_store()?.snapshot()?;
        Ok(stock_report(
            &snapshot.products,
            &snapshot.sold_quantity_lookup(),
        ))
    }

    pub fn stock_alert(&self) -> Result<Report<StockAlert>> {
        let snapshot = self.open_store()?.snapshot()?;
        Ok(stock_alert(
            &snapshot.products,
            &snapshot.sold_quantity_lookup(),
        ))
    }

    pub fn update_stock(&self, request: &UpdateStockRequest) -> Result<StockUpdated> {
        let remaining_stock = self
            .open_store()?
            .decrement_stock(request.product_id, request.quantity)?;
        Ok(StockUpdated {
            message: STOCK_UPDATED_MESSAGE,
            remaining_stock,
        })
    }
}
