use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use stationery_core::InventoryError;
use tracing::{info, warn};
use ulid::Ulid;

type HmacSha256 = Hmac<Sha256>;

pub const ORDER_CURRENCY: &str = "INR";
pub const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";
pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;

/// Order as handed back to the frontend checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key: String,
}

pub trait PaymentGateway: Send + Sync {
    fn gateway_name(&self) -> &'static str;

    /// Creates an order for `amount_minor` paise.
    ///
    /// # Errors
    /// Returns [`InventoryError::Gateway`] carrying the provider's text when
    /// the provider rejects the order or cannot be reached.
    fn create_order(&self, amount_minor: i64) -> Result<GatewayOrder, InventoryError>;

    /// Checks a checkout callback signature.
    ///
    /// # Errors
    /// Returns [`InventoryError::VerificationFailed`] on any mismatch.
    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), InventoryError>;
}

/// Converts whole rupees to paise.
///
/// Non-positive amounts pass through; the provider decides whether an order
/// amount is acceptable.
///
/// # Errors
/// Returns [`InventoryError::Validation`] when the converted amount overflows.
pub fn amount_in_minor_units(amount: i64) -> Result<i64, InventoryError> {
    amount
        .checked_mul(100)
        .ok_or_else(|| InventoryError::Validation("amount is too large".to_string()))
}

/// Hex HMAC-SHA256 of `order_id|payment_id` under `key_secret`.
#[must_use]
pub fn sign_payment(key_secret: &str, order_id: &str, payment_id: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail here.
    match HmacSha256::new_from_slice(key_secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(signing_payload(order_id, payment_id).as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

fn signing_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

fn verify_payment_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<(), InventoryError> {
    let expected =
        hex::decode(signature.trim()).map_err(|_| InventoryError::VerificationFailed)?;
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .map_err(|_| InventoryError::VerificationFailed)?;
    mac.update(signing_payload(order_id, payment_id).as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| InventoryError::VerificationFailed)
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl RazorpayConfig {
    #[must_use]
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: DEFAULT_RAZORPAY_BASE_URL.to_string(),
            timeout_ms: DEFAULT_GATEWAY_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    agent: ureq::Agent,
}

impl RazorpayGateway {
    /// Builds the adapter.
    ///
    /// # Errors
    /// Returns [`InventoryError::Configuration`] when the key pair is blank.
    pub fn new(config: RazorpayConfig) -> Result<Self, InventoryError> {
        if config.key_id.trim().is_empty() || config.key_secret.trim().is_empty() {
            return Err(InventoryError::Configuration(
                "razorpay key id and secret MUST be provided".to_string(),
            ));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Ok(Self { config, agent })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.config.key_id, self.config.key_secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

impl PaymentGateway for RazorpayGateway {
    fn gateway_name(&self) -> &'static str {
        "razorpay"
    }

    fn create_order(&self, amount_minor: i64) -> Result<GatewayOrder, InventoryError> {
        let outbound = json!({
            "amount": amount_minor,
            "currency": ORDER_CURRENCY,
            "payment_capture": 1,
            "receipt": format!("rcpt_{}", Ulid::new()),
        });

        let response = self
            .agent
            .post(&self.orders_url())
            .set("content-type", "application/json")
            .set("authorization", &self.authorization())
            .send_json(&outbound);

        let body: RazorpayOrderResponse = match response {
            Ok(response) => response
                .into_json()
                .map_err(|err| InventoryError::Gateway(format!("invalid order response: {err}")))?,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_json::<Value>().unwrap_or(Value::Null);
                let text = provider_error_text(&body).unwrap_or_else(|| format!("http status {code}"));
                warn!(status = code, error = %text, "razorpay rejected order");
                return Err(InventoryError::Gateway(text));
            }
            Err(ureq::Error::Transport(err)) => {
                warn!(error = %err, "razorpay transport failure");
                return Err(InventoryError::Gateway(format!("http transport failure: {err}")));
            }
        };

        info!(order_id = %body.id, amount = body.amount, "razorpay order created");
        Ok(GatewayOrder {
            order_id: body.id,
            amount: body.amount,
            currency: body.currency,
            key: self.config.key_id.clone(),
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), InventoryError> {
        verify_payment_signature(&self.config.key_secret, order_id, payment_id, signature)
    }
}

fn provider_error_text(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|error| error.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Offline gateway with deterministic order ids.
#[derive(Debug)]
pub struct MockGateway {
    key_id: String,
    key_secret: String,
    counter: AtomicU64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new("rzp_test_mock", "mock_secret")
    }
}

impl MockGateway {
    #[must_use]
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn key_secret(&self) -> &str {
        &self.key_secret
    }

    fn deterministic_order_id(&self, amount_minor: i64, sequence: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(amount_minor.to_be_bytes());
        hasher.update(sequence.to_be_bytes());
        hasher.update(self.key_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("order_{}", &digest[..14])
    }
}

impl PaymentGateway for MockGateway {
    fn gateway_name(&self) -> &'static str {
        "mock"
    }

    fn create_order(&self, amount_minor: i64) -> Result<GatewayOrder, InventoryError> {
        if amount_minor <= 0 {
            return Err(InventoryError::Gateway(
                "The amount must be atleast INR 1.00".to_string(),
            ));
        }

        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayOrder {
            order_id: self.deterministic_order_id(amount_minor, sequence),
            amount: amount_minor,
            currency: ORDER_CURRENCY.to_string(),
            key: self.key_id.clone(),
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<(), InventoryError> {
        verify_payment_signature(&self.key_secret, order_id, payment_id, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    /// Serves exactly one HTTP response and hands back the raw request.
    fn one_shot_server(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = must_ok(TcpListener::bind("127.0.0.1:0"));
        let base_url = format!("http://{}", must_ok(listener.local_addr()));
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = std::thread::spawn(move || {
            let (mut stream, _) = must_ok(listener.accept());
            let mut request = Vec::new();
            let mut chunk = [0_u8; 1024];
            loop {
                let read = must_ok(stream.read(&mut chunk));
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
                if request_complete(&request) {
                    break;
                }
            }
            must_ok(stream.write_all(response.as_bytes()));
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    fn fixture_gateway(base_url: &str) -> RazorpayGateway {
        must_ok(RazorpayGateway::new(
            RazorpayConfig::new("rzp_test_key", "secret").with_base_url(base_url),
        ))
    }

    #[test]
    fn amount_conversion_multiplies_by_hundred() {
        assert_eq!(amount_in_minor_units(499), Ok(49_900));
        assert_eq!(amount_in_minor_units(0), Ok(0));
        assert_eq!(amount_in_minor_units(-3), Ok(-300));
        assert!(matches!(
            amount_in_minor_units(i64::MAX),
            Err(InventoryError::Validation(_))
        ));
    }

    #[test]
    fn signature_round_trip_and_tampering() {
        let gateway = MockGateway::new("rzp_test_key", "secret");
        let signature = sign_payment("secret", "order_abc", "pay_123");
        assert_eq!(signature.len(), 64);

        assert_eq!(
            gateway.verify_signature("order_abc", "pay_123", &signature),
            Ok(())
        );
        assert_eq!(
            gateway.verify_signature("order_abc", "pay_124", &signature),
            Err(InventoryError::VerificationFailed)
        );
        assert_eq!(
            gateway.verify_signature("order_abc", "pay_123", "not-hex"),
            Err(InventoryError::VerificationFailed)
        );
        assert_eq!(
            gateway.verify_signature("order_abc", "pay_123", ""),
            Err(InventoryError::VerificationFailed)
        );
    }

    #[test]
    fn signature_covers_order_and_payment_joined_by_pipe() {
        let signature = sign_payment("key", "order_1", "pay_2");
        let expected = {
            let mut mac = must_ok(HmacSha256::new_from_slice(b"key"));
            mac.update(b"order_1|pay_2");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(signature, expected);
        assert_ne!(signature, sign_payment("key", "order_1|pay", "_2"));
    }

    #[test]
    fn mock_orders_are_deterministic_per_sequence() {
        let first = MockGateway::default();
        let second = MockGateway::default();

        let a = must_ok(first.create_order(49_900));
        let b = must_ok(second.create_order(49_900));
        assert_eq!(a, b);
        assert_eq!(a.currency, ORDER_CURRENCY);
        assert_eq!(a.key, "rzp_test_mock");
        assert!(a.order_id.starts_with("order_"));

        let next = must_ok(first.create_order(49_900));
        assert_ne!(a.order_id, next.order_id);
        assert!(first.create_order(0).is_err());
    }

    #[test]
    fn razorpay_order_request_shape_and_response_mapping() {
        let (base_url, server) = one_shot_server(
            "200 OK",
            r#"{"id":"order_Live123","entity":"order","amount":49900,"currency":"INR","status":"created"}"#,
        );
        let gateway = fixture_gateway(&base_url);

        let order = must_ok(gateway.create_order(49_900));
        assert_eq!(
            order,
            GatewayOrder {
                order_id: "order_Live123".to_string(),
                amount: 49_900,
                currency: "INR".to_string(),
                key: "rzp_test_key".to_string(),
            }
        );

        let request = match server.join() {
            Ok(raw) => raw,
            Err(err) => panic!("server thread panicked: {err:?}"),
        };
        assert!(request.starts_with("POST /v1/orders "));
        let expected_auth = format!("Basic {}", STANDARD.encode("rzp_test_key:secret"));
        assert!(request
            .to_ascii_lowercase()
            .contains(&format!("authorization: {}", expected_auth.to_ascii_lowercase())));

        let body_start = request.find("\r\n\r\n").map_or(0, |idx| idx + 4);
        let body: Value = must_ok(serde_json::from_str(&request[body_start..]));
        assert_eq!(body["amount"], 49_900);
        assert_eq!(body["currency"], "INR");
        assert_eq!(body["payment_capture"], 1);
        assert!(body["receipt"]
            .as_str()
            .is_some_and(|receipt| receipt.starts_with("rcpt_")));
    }

    #[test]
    fn razorpay_error_description_is_surfaced() {
        let (base_url, server) = one_shot_server(
            "400 Bad Request",
            r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The amount must be atleast INR 1.00"}}"#,
        );
        let gateway = fixture_gateway(&base_url);

        assert_eq!(
            gateway.create_order(50),
            Err(InventoryError::Gateway(
                "The amount must be atleast INR 1.00".to_string()
            ))
        );
        let _ = server.join();
    }

    #[test]
    fn razorpay_transport_failure_is_gateway_error() {
        let closed_port = {
            let listener = must_ok(TcpListener::bind("127.0.0.1:0"));
            must_ok(listener.local_addr()).port()
        };
        let gateway = must_ok(RazorpayGateway::new(
            RazorpayConfig::new("rzp_test_key", "secret")
                .with_base_url(format!("http://127.0.0.1:{closed_port}"))
                .with_timeout_ms(500),
        ));

        assert!(matches!(
            gateway.create_order(100),
            Err(InventoryError::Gateway(_))
        ));
    }

    #[test]
    fn razorpay_requires_credentials() {
        assert!(matches!(
            RazorpayGateway::new(RazorpayConfig::new("", "secret")),
            Err(InventoryError::Configuration(_))
        ));
    }
}
