//! HTTP client for the Tebex headless API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{
    api::{BasketApi, CatalogApi},
    error::{ApiError, TebexError},
    models::{
        Basket, Category, Envelope, NewBasket, NewBasketItem, Package, PackageId, Promotion,
        Webstore,
    },
};

/// Default Tebex headless API URL
pub const DEFAULT_BASE_URL: &str = "https://headless.tebex.io/api";

/// User agent sent unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("tebex-headless-rust/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Public webstore token.
    pub token: String,

    /// API root, without trailing slash.
    pub base_url: String,

    /// Per-request timeout; none leaves it to the transport.
    pub timeout: Option<Duration>,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl ClientConfig {
    /// Settings for `token` against the public API.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// HTTP implementation of [`BasketApi`] and [`CatalogApi`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    token: String,
    base_url: String,
    http: Client,
}

impl HttpClient {
    /// Create a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a `CONFIG_INVALID` error when the token is blank or the
    /// transport cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, TebexError> {
        if config.token.trim().is_empty() {
            return Err(TebexError::config("webstore token is required"));
        }

        let mut builder = Client::builder().user_agent(config.user_agent);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|error| TebexError::config(format!("failed to build http client: {error}")))?;

        Ok(Self {
            token: config.token,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}{path}", self.base_url, self.token)
    }

    fn basket_url(&self, ident: &str, path: &str) -> String {
        format!("{}/baskets/{ident}{path}", self.base_url)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = error_for_status(request.send().await?).await?;
        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)?;

        Ok(envelope.data)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), ApiError> {
        error_for_status(request.send().await?).await?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    title: Option<String>,
    detail: Option<String>,
    error_message: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        match (self.title, self.detail.or(self.error_message)) {
            (Some(title), Some(detail)) if title != detail => Some(format!("{title}: {detail}")),
            (_, Some(detail)) => Some(detail),
            (Some(title), None) => Some(title),
            (None, None) => None,
        }
    }
}

async fn error_for_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                text
            }
        });

    debug!(status = status.as_u16(), "tebex request failed: {message}");

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

fn add_item_body(item: &NewBasketItem) -> Value {
    let mut body = Map::new();
    body.insert("package_id".to_string(), json!(item.package_id));
    body.insert("quantity".to_string(), json!(item.quantity));

    if let Some(package_type) = item.package_type {
        body.insert("type".to_string(), json!(package_type));
    }

    if let Some(variable_data) = &item.variable_data {
        body.insert("variable_data".to_string(), json!(variable_data));
    }

    Value::Object(body)
}

#[async_trait]
impl BasketApi for HttpClient {
    async fn create_basket(&self, basket: &NewBasket) -> Result<Basket, ApiError> {
        let request = self.http.post(self.account_url("/baskets")).json(&json!({
            "username": basket.username,
            "complete_url": basket.complete_url,
            "cancel_url": basket.cancel_url,
            "complete_auto_redirect": true,
        }));

        self.fetch(request).await
    }

    async fn get_basket(&self, ident: &str) -> Result<Basket, ApiError> {
        let request = self
            .http
            .get(self.account_url(&format!("/baskets/{ident}")));

        self.fetch(request).await
    }

    async fn add_item(&self, ident: &str, item: &NewBasketItem) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.basket_url(ident, "/packages"))
            .json(&add_item_body(item));

        self.execute(request).await
    }

    async fn remove_item(
        &self,
        ident: &str,
        package_id: PackageId,
        previous_quantity: u32,
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.basket_url(ident, "/packages/remove"))
            .json(&json!({ "package_id": package_id, "quantity": previous_quantity }));

        self.execute(request).await
    }

    async fn update_item_quantity(
        &self,
        ident: &str,
        package_id: PackageId,
        quantity: u32,
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .put(self.basket_url(ident, &format!("/packages/{package_id}")))
            .json(&json!({ "quantity": quantity }));

        self.execute(request).await
    }

    async fn apply_promotion(&self, ident: &str, promotion: &Promotion) -> Result<(), ApiError> {
        let path = format!("/baskets/{ident}/{}", promotion.kind().path_segment());
        let request = self
            .http
            .post(self.account_url(&path))
            .json(&promotion.payload());

        self.execute(request).await
    }

    async fn remove_promotion(
        &self,
        ident: &str,
        promotion: &Promotion,
    ) -> Result<(), ApiError> {
        let path = format!("/baskets/{ident}/{}/remove", promotion.kind().path_segment());
        let request = self
            .http
            .post(self.account_url(&path))
            .json(&promotion.payload());

        self.execute(request).await
    }
}

#[async_trait]
impl CatalogApi for HttpClient {
    async fn get_webstore(&self) -> Result<Webstore, ApiError> {
        self.fetch(self.http.get(self.account_url(""))).await
    }

    async fn get_categories(&self, include_packages: bool) -> Result<Vec<Category>, ApiError> {
        let mut request = self.http.get(self.account_url("/categories"));

        if include_packages {
            request = request.query(&[("includePackages", "1")]);
        }

        self.fetch(request).await
    }

    async fn get_category(&self, id: u64) -> Result<Category, ApiError> {
        let request = self
            .http
            .get(self.account_url(&format!("/categories/{id}")))
            .query(&[("includePackages", "1")]);

        self.fetch(request).await
    }

    async fn get_packages(&self) -> Result<Vec<Package>, ApiError> {
        self.fetch(self.http.get(self.account_url("/packages")))
            .await
    }

    async fn get_package(&self, id: PackageId) -> Result<Package, ApiError> {
        self.fetch(self.http.get(self.account_url(&format!("/packages/{id}"))))
            .await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;
    use testresult::TestResult;

    use crate::error::{ErrorCode, classify};

    use super::*;

    fn client(server: &MockServer) -> Result<HttpClient, TebexError> {
        HttpClient::new(ClientConfig {
            base_url: server.base_url(),
            ..ClientConfig::new("store-token")
        })
    }

    fn basket_json(ident: &str) -> Value {
        json!({
            "data": {
                "ident": ident,
                "complete": false,
                "username": "steve",
                "packages": [],
                "coupons": [],
                "giftcards": [],
                "total_price": 0,
                "currency": "GBP",
                "links": { "checkout": format!("https://pay.tebex.io/{ident}") }
            }
        })
    }

    #[test]
    fn blank_token_is_a_config_error() {
        let result = HttpClient::new(ClientConfig::new("  "));

        assert!(
            matches!(&result, Err(error) if error.code == ErrorCode::ConfigInvalid),
            "expected ConfigInvalid, got {result:?}"
        );
    }

    #[tokio::test]
    async fn create_basket_posts_to_account_and_unwraps_data() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/accounts/store-token/baskets")
                .json_body(json!({
                    "username": "steve",
                    "complete_url": "https://example.com/done",
                    "cancel_url": "https://example.com/cancel",
                    "complete_auto_redirect": true
                }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(basket_json("abc"));
        });

        let basket = client(&server)?
            .create_basket(&NewBasket {
                username: "steve".to_string(),
                complete_url: "https://example.com/done".to_string(),
                cancel_url: "https://example.com/cancel".to_string(),
            })
            .await?;

        mock.assert();
        assert_eq!(basket.ident, "abc");
        assert_eq!(basket.username.as_deref(), Some("steve"));

        Ok(())
    }

    #[tokio::test]
    async fn add_item_posts_package_body() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/baskets/abc/packages")
                .json_body(json!({ "package_id": 101, "quantity": 2, "type": "single" }));
            then.status(200).json_body(json!({}));
        });

        client(&server)?
            .add_item(
                "abc",
                &NewBasketItem::new(101)
                    .with_quantity(2)
                    .with_type(crate::models::PackageType::Single),
            )
            .await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn update_quantity_puts_exact_value() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/baskets/abc/packages/101")
                .json_body(json!({ "quantity": 0 }));
            then.status(200).json_body(json!({}));
        });

        client(&server)?.update_item_quantity("abc", 101, 0).await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn coupon_is_applied_under_account_basket() -> TestResult {
        let server = MockServer::start();

        let apply = server.mock(|when, then| {
            when.method(POST)
                .path("/accounts/store-token/baskets/abc/coupons")
                .json_body(json!({ "coupon_code": "TEST10" }));
            then.status(200).json_body(json!({}));
        });

        let remove = server.mock(|when, then| {
            when.method(POST)
                .path("/accounts/store-token/baskets/abc/coupons/remove")
                .json_body(json!({ "coupon_code": "TEST10" }));
            then.status(200).json_body(json!({}));
        });

        let client = client(&server)?;
        let coupon = Promotion::Coupon("TEST10".to_string());

        client.apply_promotion("abc", &coupon).await?;
        client.remove_promotion("abc", &coupon).await?;

        apply.assert();
        remove.assert();

        Ok(())
    }

    #[tokio::test]
    async fn remove_item_posts_previous_quantity() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/baskets/abc/packages/remove")
                .json_body(json!({ "package_id": 101, "quantity": 3 }));
            then.status(200).json_body(json!({}));
        });

        client(&server)?.remove_item("abc", 101, 3).await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn gift_card_and_creator_code_send_their_fields() -> TestResult {
        let server = MockServer::start();

        let gift_card = server.mock(|when, then| {
            when.method(POST)
                .path("/accounts/store-token/baskets/abc/giftcards")
                .json_body(json!({ "card_number": "1234" }));
            then.status(200).json_body(json!({}));
        });

        let creator_code = server.mock(|when, then| {
            when.method(POST)
                .path("/accounts/store-token/baskets/abc/creator-codes/remove")
                .json_body(json!({ "creator_code": "steve" }));
            then.status(200).json_body(json!({}));
        });

        let client = client(&server)?;

        client
            .apply_promotion("abc", &Promotion::GiftCard("1234".to_string()))
            .await?;
        client
            .remove_promotion("abc", &Promotion::CreatorCode("steve".to_string()))
            .await?;

        gift_card.assert();
        creator_code.assert();

        Ok(())
    }

    #[tokio::test]
    async fn error_body_detail_feeds_classification() -> TestResult {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/accounts/store-token/baskets/gone");
            then.status(404).json_body(json!({
                "type": "https://httpstatuses.com/404",
                "title": "Not Found",
                "status": 404,
                "detail": "Basket not found"
            }));
        });

        let result = client(&server)?.get_basket("gone").await;

        let Err(error) = result else {
            return Err("expected the request to fail".into());
        };

        assert!(
            matches!(&error, ApiError::Status { status: 404, .. }),
            "expected a 404 status error, got {error:?}"
        );
        assert_eq!(classify(error).code, ErrorCode::BasketNotFound);

        Ok(())
    }

    #[tokio::test]
    async fn categories_request_packages_when_asked() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/accounts/store-token/categories")
                .query_param("includePackages", "1");
            then.status(200).json_body(json!({
                "data": [{
                    "id": 1,
                    "name": "Ranks",
                    "packages": [{ "id": 101, "name": "VIP", "total_price": 9.99 }]
                }]
            }));
        });

        let categories = client(&server)?.get_categories(true).await?;

        mock.assert();
        assert_eq!(categories.len(), 1);
        assert_eq!(
            categories
                .first()
                .and_then(|category| category.packages.first())
                .map(|package| package.id),
            Some(101)
        );

        Ok(())
    }

    #[tokio::test]
    async fn unreadable_body_is_a_decode_error() -> TestResult {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/accounts/store-token");
            then.status(200).body("not json");
        });

        let result = client(&server)?.get_webstore().await;

        assert!(
            matches!(result, Err(ApiError::Decode(_))),
            "expected a decode error, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn configured_user_agent_is_sent() -> TestResult {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/accounts/store-token")
                .header("user-agent", "shop-frontend/2.0");
            then.status(200).json_body(json!({
                "data": { "id": 1, "name": "Shop", "currency": "GBP" }
            }));
        });

        let webstore = HttpClient::new(ClientConfig {
            base_url: server.base_url(),
            user_agent: "shop-frontend/2.0".to_string(),
            ..ClientConfig::new("store-token")
        })?
        .get_webstore()
        .await?;

        mock.assert();
        assert_eq!(webstore.name, "Shop");

        Ok(())
    }
}
