use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use cartkeeper_core::config::CommerceConfig;
use cartkeeper_core::{CartId, Catalog};

use crate::endpoint::{
    CartAllocator, CatalogService, EndpointError, OrderAcknowledgment, OrderEndpoint,
    OrderRequest,
};

const PUBLISHABLE_KEY_HEADER: &str = "x-publishable-api-key";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Clone, Debug, Default)]
pub struct CommerceUrls {
    pub catalog_url: Option<String>,
    pub cart_init_url: Option<String>,
    pub order_url: Option<String>,
}

/// `reqwest` adapter for the catalog, cart allocation and order endpoints.
#[derive(Clone)]
pub struct HttpCommerceClient {
    client: Client,
    urls: CommerceUrls,
    publishable_api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpCommerceClient {
    pub fn new(
        urls: CommerceUrls,
        publishable_api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| EndpointError::Transport(error.to_string()))?;
        Ok(Self { client, urls, publishable_api_key, timeout })
    }

    pub fn from_config(config: &CommerceConfig) -> Result<Self, EndpointError> {
        Self::new(
            CommerceUrls {
                catalog_url: config.catalog_url.clone(),
                cart_init_url: config.cart_init_url.clone(),
                order_url: config.order_url.clone(),
            },
            config.publishable_api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn with_publishable_key(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.publishable_api_key {
            Some(key) => request.header(PUBLISHABLE_KEY_HEADER, key.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, EndpointError> {
        let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        match tokio::time::timeout(self.timeout, request.send()).await {
            Err(_) => Err(EndpointError::Timeout { after_ms }),
            Ok(Err(error)) if error.is_timeout() => Err(EndpointError::Timeout { after_ms }),
            Ok(Err(error)) => Err(EndpointError::Transport(error.to_string())),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Reads the body of a 2xx response or turns anything else into `Status`.
    async fn success_body(&self, response: Response) -> Result<(u16, String), EndpointError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            if error.is_timeout() {
                EndpointError::Timeout {
                    after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                EndpointError::Transport(error.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        Ok((status.as_u16(), body))
    }
}

fn required<'a>(url: &'a Option<String>, key: &str) -> Result<&'a str, EndpointError> {
    url.as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| EndpointError::NotConfigured(key.to_owned()))
}

fn parse_cart_id(payload: &Value) -> Option<CartId> {
    payload
        .get("cart_id")
        .and_then(Value::as_str)
        .or_else(|| payload.get("cart").and_then(|cart| cart.get("id")).and_then(Value::as_str))
        .filter(|id| !id.trim().is_empty())
        .map(CartId::from)
}

#[async_trait]
impl CartAllocator for HttpCommerceClient {
    async fn allocate(&self) -> Result<CartId, EndpointError> {
        let url = required(&self.urls.cart_init_url, "commerce.cart_init_url")?;
        let request = self.with_publishable_key(self.client.post(url).json(&serde_json::json!({})));
        let response = self.send(request).await?;
        let (_, body) = self.success_body(response).await?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|error| EndpointError::Decode(format!("cart allocation response: {error}")))?;
        parse_cart_id(&payload).ok_or_else(|| {
            EndpointError::Decode("cart allocation response carried no cart id".to_owned())
        })
    }
}

#[async_trait]
impl CatalogService for HttpCommerceClient {
    async fn fetch_catalog(&self) -> Result<Catalog, EndpointError> {
        let url = required(&self.urls.catalog_url, "commerce.catalog_url")?;
        let response = self.send(self.with_publishable_key(self.client.get(url))).await?;
        let (_, body) = self.success_body(response).await?;

        let payload: Value = serde_json::from_str(&body)
            .map_err(|error| EndpointError::Decode(format!("catalog response: {error}")))?;
        let catalog = Catalog::from_payload(payload)
            .map_err(|error| EndpointError::Decode(error.to_string()))?;
        debug!(products = catalog.products().len(), "catalog fetched");
        Ok(catalog)
    }
}

#[async_trait]
impl OrderEndpoint for HttpCommerceClient {
    async fn submit(&self, request: &OrderRequest) -> Result<OrderAcknowledgment, EndpointError> {
        let url = required(&self.urls.order_url, "commerce.order_url")?;
        let builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, request.idempotency_key.as_str())
            .body(request.body.clone());
        let response = self.send(builder).await?;
        let (status_code, body) = self.success_body(response).await?;

        // Any 2xx means the order was accepted. A body that is not JSON is kept
        // as text rather than reported as a failed upload, since a failure
        // here would invite a resubmission of an order that already exists.
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or_else(|error| {
                warn!(error = %error, "order acknowledgment is not JSON; keeping raw text");
                Value::String(body)
            })
        };
        Ok(OrderAcknowledgment { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use cartkeeper_core::{CartId, VariantId};

    use super::{CommerceUrls, HttpCommerceClient};
    use crate::endpoint::{
        CartAllocator, CatalogService, EndpointError, OrderEndpoint, OrderRequest,
    };

    fn client_for(server: &MockServer, timeout: Duration) -> HttpCommerceClient {
        HttpCommerceClient::new(
            CommerceUrls {
                catalog_url: Some(format!("{}/catalog", server.uri())),
                cart_init_url: Some(format!("{}/cart-init", server.uri())),
                order_url: Some(format!("{}/orders", server.uri())),
            },
            Some("pk_test_123".to_owned().into()),
            timeout,
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn allocation_sends_publishable_key_and_reads_cart_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart-init"))
            .and(header("x-publishable-api-key", "pk_test_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cart_id": "cart_01"})))
            .expect(1)
            .mount(&server)
            .await;

        let cart_id = client_for(&server, Duration::from_secs(5)).allocate().await.expect("allocate");
        assert_eq!(cart_id, CartId::from("cart_01"));
    }

    #[tokio::test]
    async fn allocation_accepts_nested_cart_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart-init"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"cart": {"id": "cart_nested"}})),
            )
            .mount(&server)
            .await;

        let cart_id = client_for(&server, Duration::from_secs(5)).allocate().await.expect("allocate");
        assert_eq!(cart_id, CartId::from("cart_nested"));
    }

    #[tokio::test]
    async fn allocation_without_id_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cart-init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let error = client_for(&server, Duration::from_secs(5)).allocate().await.expect_err("no id");
        assert!(matches!(error, EndpointError::Decode(_)));
    }

    #[tokio::test]
    async fn order_submission_posts_snapshot_with_idempotency_key() {
        let server = MockServer::start().await;
        let snapshot = json!({"cart_id": "cart_01", "items": []});
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("Idempotency-Key", "abc123"))
            .and(header("content-type", "application/json"))
            .and(body_json(snapshot.clone()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"order_id": "ord_9", "ok": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server, Duration::from_secs(5))
            .submit(&OrderRequest {
                body: serde_json::to_vec(&snapshot).expect("serialize"),
                idempotency_key: "abc123".to_owned(),
            })
            .await
            .expect("submit");

        assert_eq!(ack.status_code, 200);
        assert_eq!(ack.body, json!({"order_id": "ord_9", "ok": true}));
    }

    #[tokio::test]
    async fn non_json_acknowledgment_counts_as_accepted_not_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let ack = client_for(&server, Duration::from_secs(5))
            .submit(&OrderRequest { body: b"{}".to_vec(), idempotency_key: "k".to_owned() })
            .await
            .expect("submit");

        assert_eq!(ack.status_code, 202);
        assert_eq!(ack.body, json!("queued"));
    }

    #[tokio::test]
    async fn server_errors_surface_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let error = client_for(&server, Duration::from_secs(5))
            .submit(&OrderRequest { body: b"{}".to_vec(), idempotency_key: "k".to_owned() })
            .await
            .expect_err("503 is a failure");

        assert_eq!(error, EndpointError::Status { status: 503, body: "maintenance".to_owned() });
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let error = client_for(&server, Duration::from_millis(100))
            .submit(&OrderRequest { body: b"{}".to_vec(), idempotency_key: "k".to_owned() })
            .await
            .expect_err("must time out");

        assert!(matches!(error, EndpointError::Timeout { .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn catalog_fetch_unwraps_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "data": [
                    {"variant_id": "v1", "product_name": "Brown bread", "price": 45, "category": "Bakery"}
                ]
            }])))
            .mount(&server)
            .await;

        let catalog =
            client_for(&server, Duration::from_secs(5)).fetch_catalog().await.expect("catalog");
        assert!(catalog.find(&VariantId::from("v1")).is_some());
    }

    #[tokio::test]
    async fn missing_endpoint_is_reported_without_a_request() {
        let client = HttpCommerceClient::new(CommerceUrls::default(), None, Duration::from_secs(1))
            .expect("client builds");

        let error = client.allocate().await.expect_err("not configured");
        assert_eq!(error, EndpointError::NotConfigured("commerce.cart_init_url".to_owned()));
    }
}
