use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use stationery_core::{
    DemandForecast, InventoryError, MonthlyRollup, Product, ProductInput, ProductSummary, Report,
    SaleEvent, SaleInput, StockAlert, StockLevel,
};
use stationery_gateway::{
    GatewayOrder, RazorpayConfig, RazorpayGateway, DEFAULT_RAZORPAY_BASE_URL,
};
use stationery_store_sqlite::{parse_database_url, DatabaseLocation};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;

use api::{
    CreateOrderRequest, InventoryApi, PaymentVerified, RecommendRequest, SaleRecorded,
    StockUpdated, UpdateStockRequest, VerifyPaymentRequest, SALE_RECORDED_MESSAGE,
    SALE_RECORD_ADDED_MESSAGE,
};

const ROOT_MESSAGE: &str = "StationeryAI Backend Running Successfully";

#[derive(Debug, Clone)]
struct ServiceState {
    api: InventoryApi,
    operation_timeout: Duration,
    telemetry: Arc<ServiceTelemetry>,
}

/// Failure body; the frontend reads `detail`.
#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
struct ServiceFailure {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    timeout_ms: u64,
    telemetry: ServiceTelemetrySnapshot,
}

#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
struct ServiceTelemetry {
    requests_total: AtomicU64,
    requests_success_total: AtomicU64,
    requests_failure_total: AtomicU64,
    timeout_total: AtomicU64,
    invalid_json_total: AtomicU64,
    validation_error_total: AtomicU64,
    product_not_found_total: AtomicU64,
    insufficient_stock_total: AtomicU64,
    verification_failed_total: AtomicU64,
    gateway_error_total: AtomicU64,
    store_unavailable_total: AtomicU64,
    internal_error_total: AtomicU64,
    other_error_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[allow(clippy::struct_field_names)]
struct ServiceTelemetrySnapshot {
    requests_total: u64,
    requests_success_total: u64,
    requests_failure_total: u64,
    timeout_total: u64,
    invalid_json_total: u64,
    validation_error_total: u64,
    product_not_found_total: u64,
    insufficient_stock_total: u64,
    verification_failed_total: u64,
    gateway_error_total: u64,
    store_unavailable_total: u64,
    internal_error_total: u64,
    other_error_total: u64,
}

#[derive(Debug, Parser)]
#[command(name = "stationery-service")]
#[command(about = "HTTP backend for the StationeryAI inventory and sales frontend")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "RAZORPAY_KEY_ID")]
    razorpay_key_id: String,
    #[arg(long, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    razorpay_key_secret: String,
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,
    #[arg(long, env = "OPERATION_TIMEOUT_MS", default_value_t = 2500)]
    operation_timeout_ms: u64,
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:5173")]
    cors_origin: String,
    #[arg(long, env = "RAZORPAY_BASE_URL", default_value = DEFAULT_RAZORPAY_BASE_URL)]
    gateway_base_url: String,
}

impl IntoResponse for ServiceFailure {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            detail: self.message,
            code: self.code,
            details: self.details,
        };
        (self.status, Json(payload)).into_response()
    }
}

impl ServiceState {
    fn failure(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> ServiceFailure {
        ServiceFailure {
            status,
            code,
            message: message.into(),
            details,
        }
    }

    fn invalid_json(rejection: &JsonRejection) -> ServiceFailure {
        Self::failure(
            rejection.status(),
            "invalid_json",
            rejection.body_text(),
            Some(json!({"rejection": rejection.to_string()})),
        )
    }

    fn invalid_json_with_telemetry(&self, rejection: &JsonRejection) -> ServiceFailure {
        self.telemetry.record_failure("invalid_json", false);
        Self::invalid_json(rejection)
    }

    fn classify_inventory_error(err: &InventoryError) -> ServiceFailure {
        match err {
            InventoryError::NotFound(what) => Self::failure(
                StatusCode::NOT_FOUND,
                "product_not_found",
                "Product not found",
                Some(json!({ "product": what })),
            ),
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::failure(
                StatusCode::BAD_REQUEST,
                "insufficient_stock",
                "Not enough stock",
                Some(json!({
                    "product_id": product_id,
                    "requested": requested,
                    "available": available,
                })),
            ),
            InventoryError::VerificationFailed => Self::failure(
                StatusCode::BAD_REQUEST,
                "verification_failed",
                "Payment Verification Failed",
                None,
            ),
            InventoryError::Gateway(text) => Self::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "gateway_error",
                text.clone(),
                None,
            ),
            InventoryError::Validation(text) => {
                Self::failure(StatusCode::BAD_REQUEST, "validation_error", text.clone(), None)
            }
            InventoryError::Configuration(text) => Self::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                text.clone(),
                None,
            ),
        }
    }

    fn classify_api_error(
        err: &anyhow::Error,
        default_status: StatusCode,
        default_code: &'static str,
    ) -> ServiceFailure {
        if let Some(inventory_error) = err.downcast_ref::<InventoryError>() {
            return Self::classify_inventory_error(inventory_error);
        }

        let message = err.to_string();
        let diagnostic = format!("{err:#}");
        let normalized = diagnostic.to_ascii_lowercase();

        if normalized.contains("sqlite")
            || normalized.contains("database")
            || normalized.contains("schema")
        {
            return Self::failure(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                message,
                Some(json!({ "diagnostic": diagnostic })),
            );
        }

        Self::failure(default_status, default_code, message, None)
    }

    /// Runs a read-only operation, abandoning it after `operation_timeout`.
    async fn run_blocking<T, F>(
        &self,
        default_status: StatusCode,
        default_code: &'static str,
        operation_label: &'static str,
        op: F,
    ) -> Result<T, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce(InventoryApi) -> anyhow::Result<T> + Send + 'static,
    {
        self.execute(
            default_status,
            default_code,
            operation_label,
            Some(self.operation_timeout),
            op,
        )
        .await
    }

    /// Runs a mutating operation to completion.
    ///
    /// The store busy timeout and the gateway request timeout bound these, so
    /// an error response never hides a committed write or a created order.
    async fn run_write<T, F>(
        &self,
        default_status: StatusCode,
        default_code: &'static str,
        operation_label: &'static str,
        op: F,
    ) -> Result<T, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce(InventoryApi) -> anyhow::Result<T> + Send + 'static,
    {
        self.execute(default_status, default_code, operation_label, None, op)
            .await
    }

    async fn execute<T, F>(
        &self,
        default_status: StatusCode,
        default_code: &'static str,
        operation_label: &'static str,
        deadline: Option<Duration>,
        op: F,
    ) -> Result<T, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce(InventoryApi) -> anyhow::Result<T> + Send + 'static,
    {
        self.telemetry.requests_total.fetch_add(1, Ordering::Relaxed);
        let api = self.api.clone();
        let handle = tokio::task::spawn_blocking(move || op(api));
        let join_result = match deadline {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                self.telemetry.record_failure(default_code, true);
                warn!(operation = operation_label, "operation timed out");
                Self::failure(
                    default_status,
                    default_code,
                    format!("{operation_label} timed out after {} ms", limit.as_millis()),
                    Some(json!({ "timeout_ms": limit.as_millis() })),
                )
            })?,
            None => handle.await,
        };

        let op_result = join_result.map_err(|err| {
            self.telemetry.record_failure("internal_error", false);
            Self::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                format!("{operation_label} join failure: {err}"),
                None,
            )
        })?;

        match op_result {
            Ok(value) => {
                self.telemetry
                    .requests_success_total
                    .fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                let failure = Self::classify_api_error(&err, default_status, default_code);
                self.telemetry.record_failure(failure.code, false);
                warn!(
                    operation = operation_label,
                    code = failure.code,
                    error = %format!("{err:#}"),
                    "operation failed"
                );
                Err(failure)
            }
        }
    }
}

impl ServiceTelemetry {
    fn record_failure(&self, code: &str, timeout: bool) {
        self.requests_failure_total.fetch_add(1, Ordering::Relaxed);
        if timeout {
            self.timeout_total.fetch_add(1, Ordering::Relaxed);
        }
        let counter = match code {
            "invalid_json" => &self.invalid_json_total,
            "validation_error" => &self.validation_error_total,
            "product_not_found" => &self.product_not_found_total,
            "insufficient_stock" => &self.insufficient_stock_total,
            "verification_failed" => &self.verification_failed_total,
            "gateway_error" => &self.gateway_error_total,
            "store_unavailable" => &self.store_unavailable_total,
            "internal_error" => &self.internal_error_total,
            _ => &self.other_error_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServiceTelemetrySnapshot {
        ServiceTelemetrySnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success_total: self.requests_success_total.load(Ordering::Relaxed),
            requests_failure_total: self.requests_failure_total.load(Ordering::Relaxed),
            timeout_total: self.timeout_total.load(Ordering::Relaxed),
            invalid_json_total: self.invalid_json_total.load(Ordering::Relaxed),
            validation_error_total: self.validation_error_total.load(Ordering::Relaxed),
            product_not_found_total: self.product_not_found_total.load(Ordering::Relaxed),
            insufficient_stock_total: self.insufficient_stock_total.load(Ordering::Relaxed),
            verification_failed_total: self.verification_failed_total.load(Ordering::Relaxed),
            gateway_error_total: self.gateway_error_total.load(Ordering::Relaxed),
            store_unavailable_total: self.store_unavailable_total.load(Ordering::Relaxed),
            internal_error_total: self.internal_error_total.load(Ordering::Relaxed),
            other_error_total: self.other_error_total.load(Ordering::Relaxed),
        }
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/products", post(add_product).get(list_products))
        .route("/create-order", post(create_order))
        .route("/verify-payment", post(verify_payment))
        .route("/recommend", post(recommend_products))
        .route("/add-sales", post(add_sales))
        .route("/sales", post(record_sale).get(list_sales))
        .route("/predict-demand", get(predict_demand))
        .route("/monthly-report", get(monthly_report))
        .route("/stock-report", get(stock_report))
        .route("/stock-alert", get(stock_alert))
        .route("/update-stock", put(update_stock))
        .with_state(state)
}

/// Cross-origin policy for the single configured frontend origin.
fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("invalid CORS origin: {origin}"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db_path = match parse_database_url(&args.database_url)? {
        DatabaseLocation::File(path) => path,
        DatabaseLocation::InMemory => {
            bail!("DATABASE_URL must point at a database file; each request opens its own connection")
        }
    };

    let operation_timeout = Duration::from_millis(args.operation_timeout_ms);
    let gateway = RazorpayGateway::new(
        RazorpayConfig::new(args.razorpay_key_id, args.razorpay_key_secret)
            .with_base_url(args.gateway_base_url)
            .with_timeout_ms(args.operation_timeout_ms),
    )?;

    let api = InventoryApi::new(db_path, Arc::new(gateway)).with_busy_timeout(operation_timeout);
    api.migrate().context("startup migration failed")?;

    let state = ServiceState {
        api,
        operation_timeout,
        telemetry: Arc::new(ServiceTelemetry::default()),
    };

    let router = app(state)
        .layer(cors_layer(&args.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, cors_origin = %args.cors_origin, "stationery service listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: ROOT_MESSAGE,
    })
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    let timeout_ms = u64::try_from(state.operation_timeout.as_millis()).unwrap_or(u64::MAX);
    Json(HealthResponse {
        status: "ok",
        timeout_ms,
        telemetry: state.telemetry.snapshot(),
    })
}

async fn add_product(
    State(state): State<ServiceState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Json<Product>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let product = state
        .run_write(
            StatusCode::INTERNAL_SERVER_ERROR,
            "write_failed",
            "add_product",
            move |api| api.add_product(&request),
        )
        .await?;
    Ok(Json(product))
}

async fn list_products(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<Product>>, ServiceFailure> {
    let products = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "query_failed",
            "list_products",
            |api| api.list_products(),
        )
        .await?;
    Ok(Json(products))
}

async fn create_order(
    State(state): State<ServiceState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<GatewayOrder>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let order = state
        .run_write(
            StatusCode::INTERNAL_SERVER_ERROR,
            "gateway_error",
            "create_order",
            move |api| api.create_order(&request),
        )
        .await?;
    Ok(Json(order))
}

async fn verify_payment(
    State(state): State<ServiceState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentVerified>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let verified = state
        .run_blocking(
            StatusCode::BAD_REQUEST,
            "verification_failed",
            "verify_payment",
            move |api| api.verify_payment(&request),
        )
        .await?;
    Ok(Json(verified))
}

async fn recommend_products(
    State(state): State<ServiceState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<Vec<ProductSummary>>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let picks = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "query_failed",
            "recommend",
            move |api| api.recommend(&request),
        )
        .await?;
    Ok(Json(picks))
}

async fn add_sales(
    State(state): State<ServiceState>,
    payload: Result<Json<SaleInput>, JsonRejection>,
) -> Result<Json<SaleRecorded>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let sale = append_sale(&state, request).await?;
    Ok(Json(SaleRecorded {
        message: SALE_RECORDED_MESSAGE,
        sale,
    }))
}

/// Older frontend path for recording a sale.
async fn record_sale(
    State(state): State<ServiceState>,
    payload: Result<Json<SaleInput>, JsonRejection>,
) -> Result<Json<SaleRecorded>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let sale = append_sale(&state, request).await?;
    Ok(Json(SaleRecorded {
        message: SALE_RECORD_ADDED_MESSAGE,
        sale,
    }))
}

async fn append_sale(state: &ServiceState, request: SaleInput) -> Result<SaleEvent, ServiceFailure> {
    state
        .run_write(
            StatusCode::INTERNAL_SERVER_ERROR,
            "write_failed",
            "add_sale",
            move |api| api.add_sale(&request),
        )
        .await
}

async fn list_sales(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<SaleEvent>>, ServiceFailure> {
    let sales = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "query_failed",
            "list_sales",
            |api| api.list_sales(),
        )
        .await?;
    Ok(Json(sales))
}

async fn predict_demand(
    State(state): State<ServiceState>,
) -> Result<Json<Report<DemandForecast>>, ServiceFailure> {
    let report = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "report_failed",
            "predict_demand",
            |api| api.predict_demand(),
        )
        .await?;
    Ok(Json(report))
}

async fn monthly_report(
    State(state): State<ServiceState>,
) -> Result<Json<Report<MonthlyRollup>>, ServiceFailure> {
    let report = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "report_failed",
            "monthly_report",
            |api| api.monthly_report(),
        )
        .await?;
    Ok(Json(report))
}

async fn stock_report(
    State(state): State<ServiceState>,
) -> Result<Json<Report<StockLevel>>, ServiceFailure> {
    let report = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "report_failed",
            "stock_report",
            |api| api.stock_report(),
        )
        .await?;
    Ok(Json(report))
}

async fn stock_alert(
    State(state): State<ServiceState>,
) -> Result<Json<Report<StockAlert>>, ServiceFailure> {
    let report = state
        .run_blocking(
            StatusCode::INTERNAL_SERVER_ERROR,
            "report_failed",
            "stock_alert",
            |api| api.stock_alert(),
        )
        .await?;
    Ok(Json(report))
}

async fn update_stock(
    State(state): State<ServiceState>,
    payload: Result<Json<UpdateStockRequest>, JsonRejection>,
) -> Result<Json<StockUpdated>, ServiceFailure> {
    let Json(request) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let updated = state
        .run_write(
            StatusCode::INTERNAL_SERVER_ERROR,
            "write_failed",
            "update_stock",
            move |api| api.update_stock(&request),
        )
        .await?;
    Ok(Json(updated))
}
