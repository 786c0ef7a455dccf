//! HTTP client for the provisioning/commerce API
//!
//! Every call returns an [`ApiResponse`] whatever the status code: the
//! scenarios decide which codes are acceptable. Only transport failures
//! surface as errors.

use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::E2eConfig;
use crate::domain::{
    CancelSubscriptionRequest, CheckoutRequest, CreateSubscriptionRequest, DeleteServerRequest,
    ProvisionRequest, ServerPatch,
};
use crate::envelope;
use crate::error::{E2eError, E2eResult};
use crate::status::StatusSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    Start,
    Stop,
    Restart,
    Backup,
}

impl ServerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerAction::Start => "start",
            ServerAction::Stop => "stop",
            ServerAction::Restart => "restart",
            ServerAction::Backup => "backup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Cancel,
    Pause,
    Resume,
}

impl SubscriptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionAction::Cancel => "cancel",
            SubscriptionAction::Pause => "pause",
            SubscriptionAction::Resume => "resume",
        }
    }
}

/// Status and decoded body of one API call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// `METHOD /path`, for messages
    pub endpoint: String,
    pub status: u16,
    /// `Value::Null` when the body was empty or not JSON
    pub body: Value,
    pub raw: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail unless the status is in `accepted`
    pub fn expect_status(&self, accepted: &StatusSet) -> E2eResult<&Self> {
        if accepted.contains(self.status) {
            Ok(self)
        } else {
            Err(E2eError::UnexpectedStatus {
                endpoint: self.endpoint.clone(),
                expected: accepted.clone(),
                actual: self.status,
            })
        }
    }

    pub fn field(&self, paths: &[&str]) -> Option<&Value> {
        envelope::pick(&self.body, paths)
    }

    pub fn require_field(&self, paths: &[&str]) -> E2eResult<&Value> {
        self.field(paths).ok_or_else(|| self.missing(paths))
    }

    pub fn require_str(&self, paths: &[&str]) -> E2eResult<&str> {
        envelope::pick_str(&self.body, paths).ok_or_else(|| self.missing(paths))
    }

    /// The `success` flag of the standard envelope
    pub fn success_flag(&self) -> Option<bool> {
        self.body.get("success").and_then(Value::as_bool)
    }

    /// Error message of a failed call, wherever the API put it
    pub fn message(&self) -> Option<&str> {
        envelope::pick_str(&self.body, &["message", "error.message", "error"])
    }

    fn missing(&self, paths: &[&str]) -> E2eError {
        E2eError::MissingField {
            endpoint: self.endpoint.clone(),
            paths: paths.join(", "),
        }
    }
}

/// Client for the functions API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: E2eConfig,
}

impl ApiClient {
    pub fn new(config: &E2eConfig) -> E2eResult<Self> {
        let client = Client::builder()
            .timeout(config.timeouts.navigation())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.functions_url
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> E2eResult<ApiResponse> {
        self.send_as(None, method, path, query, body).await
    }

    /// Like `send`, with an optional `Authorization: Bearer` token
    async fn send_as<B: Serialize + ?Sized>(
        &self,
        token: Option<&str>,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> E2eResult<ApiResponse> {
        let endpoint = format!("{} {}", method, path);
        let mut request = self.client.request(method, self.config.api_url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let raw = response.text().await?;
        let body = serde_json::from_str(&raw).unwrap_or(Value::Null);

        debug!("{} -> {}", endpoint, status);
        Ok(ApiResponse {
            endpoint,
            status,
            body,
            raw,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> E2eResult<ApiResponse> {
        self.send::<Value>(Method::GET, path, query, None).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> E2eResult<ApiResponse> {
        self.send(Method::POST, path, &[], body).await
    }

    /// POST an arbitrary JSON body, for payloads the typed requests can't express
    pub async fn post_json(&self, path: &str, body: &Value) -> E2eResult<ApiResponse> {
        self.post(path, Some(body)).await
    }

    pub async fn health(&self) -> E2eResult<ApiResponse> {
        self.get("/api/health", &[]).await
    }

    // Checkout

    pub async fn create_checkout(&self, request: &CheckoutRequest) -> E2eResult<ApiResponse> {
        self.post("/api/checkout/create", Some(request)).await
    }

    // Game servers

    pub async fn provision_server(&self, request: &ProvisionRequest) -> E2eResult<ApiResponse> {
        self.post("/api/game-servers/provision", Some(request)).await
    }

    pub async fn list_servers(&self, user_id: &str) -> E2eResult<ApiResponse> {
        self.get("/api/game-servers", &[("userId", user_id)]).await
    }

    pub async fn get_server(&self, server_id: &str) -> E2eResult<ApiResponse> {
        self.get(&format!("/api/game-servers/{}", server_id), &[]).await
    }

    pub async fn server_status(&self, server_id: &str) -> E2eResult<ApiResponse> {
        self.get(&format!("/api/game-servers/{}/status", server_id), &[]).await
    }

    pub async fn update_server(&self, server_id: &str, patch: &ServerPatch) -> E2eResult<ApiResponse> {
        self.send(
            Method::PATCH,
            &format!("/api/game-servers/{}", server_id),
            &[],
            Some(patch),
        )
        .await
    }

    pub async fn server_action(&self, server_id: &str, action: ServerAction) -> E2eResult<ApiResponse> {
        self.post::<Value>(
            &format!("/api/game-servers/{}/{}", server_id, action.as_str()),
            None,
        )
        .await
    }

    pub async fn delete_server(&self, server_id: &str, keep_data: bool) -> E2eResult<ApiResponse> {
        self.send(
            Method::DELETE,
            &format!("/api/game-servers/{}", server_id),
            &[],
            Some(&DeleteServerRequest { keep_data }),
        )
        .await
    }

    /// DELETE without a body, as teardown does
    pub async fn delete_server_plain(&self, server_id: &str) -> E2eResult<ApiResponse> {
        self.send::<Value>(Method::DELETE, &format!("/api/game-servers/{}", server_id), &[], None)
            .await
    }

    // Subscriptions

    pub async fn list_subscriptions(&self, user_id: &str) -> E2eResult<ApiResponse> {
        self.get("/api/subscriptions", &[("userId", user_id)]).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> E2eResult<ApiResponse> {
        self.get(&format!("/api/subscriptions/{}", subscription_id), &[]).await
    }

    pub async fn create_subscription(&self, request: &CreateSubscriptionRequest) -> E2eResult<ApiResponse> {
        self.post("/api/subscriptions", Some(request)).await
    }

    pub async fn delete_subscription(&self, subscription_id: &str) -> E2eResult<ApiResponse> {
        self.send::<Value>(
            Method::DELETE,
            &format!("/api/subscriptions/{}", subscription_id),
            &[],
            None,
        )
        .await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        request: &CancelSubscriptionRequest,
    ) -> E2eResult<ApiResponse> {
        self.post(
            &format!("/api/subscriptions/{}/cancel", subscription_id),
            Some(request),
        )
        .await
    }

    pub async fn subscription_action(
        &self,
        subscription_id: &str,
        action: SubscriptionAction,
    ) -> E2eResult<ApiResponse> {
        self.post::<Value>(
            &format!("/api/subscriptions/{}/{}", subscription_id, action.as_str()),
            None,
        )
        .await
    }

    pub async fn pause_subscription(&self, subscription_id: &str) -> E2eResult<ApiResponse> {
        self.subscription_action(subscription_id, SubscriptionAction::Pause).await
    }

    pub async fn resume_subscription(&self, subscription_id: &str) -> E2eResult<ApiResponse> {
        self.subscription_action(subscription_id, SubscriptionAction::Resume).await
    }

    // Auth

    /// `GET /api/auth/me`, anonymously when `token` is `None`
    pub async fn auth_me(&self, token: Option<&str>) -> E2eResult<ApiResponse> {
        self.send_as::<Value>(token, Method::GET, "/api/auth/me", &[], None)
            .await
    }

    /// `GET /api/auth/logout`, redirecting back to `redirect`
    pub async fn logout(&self, token: &str, redirect: &str) -> E2eResult<ApiResponse> {
        self.send_as::<Value>(
            Some(token),
            Method::GET,
            "/api/auth/logout",
            &[("post_login_redirect_uri", redirect)],
            None,
        )
        .await
    }

    // Teardown

    /// Delete a server, logging instead of failing
    pub async fn cleanup_server(&self, server_id: &str) {
        match self.delete_server_plain(server_id).await {
            Ok(resp) if resp.is_success() || resp.status == 404 => {
                debug!("Cleanup: server {} -> {}", server_id, resp.status)
            }
            Ok(resp) => warn!("Cleanup: deleting server {} returned {}", server_id, resp.status),
            Err(e) => warn!("Cleanup: deleting server {} failed: {}", server_id, e),
        }
    }

    /// Delete a subscription, logging instead of failing
    pub async fn cleanup_subscription(&self, subscription_id: &str) {
        match self.delete_subscription(subscription_id).await {
            Ok(resp) if resp.is_success() || resp.status == 404 => {
                debug!("Cleanup: subscription {} -> {}", subscription_id, resp.status)
            }
            Ok(resp) => warn!(
                "Cleanup: deleting subscription {} returned {}",
                subscription_id, resp.status
            ),
            Err(e) => warn!("Cleanup: deleting subscription {} failed: {}", subscription_id, e),
        }
    }
}

/// Classify a failed checkout-create response.
///
/// A missing payment-provider key shows up as an auth error from the
/// provider; reword it so an operator sees a configuration problem rather
/// than a regression.
pub fn checkout_error(response: &ApiResponse) -> E2eError {
    let message = response.message().unwrap_or_default();
    if message.contains("Bearer") || message.contains("API key") {
        return E2eError::Misconfigured(
            "MOLLIE_API_KEY is not configured in the Function App. Add it to Application Settings."
                .to_string(),
        );
    }
    if message.is_empty() {
        E2eError::AssertionFailed(format!("Checkout failed: {}", response.status))
    } else {
        E2eError::AssertionFailed(format!("Checkout failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse {
            endpoint: "POST /api/checkout/create".to_string(),
            status,
            raw: body.to_string(),
            body,
        }
    }

    #[test]
    fn missing_provider_key_is_a_configuration_failure() {
        let resp = response(500, json!({ "message": "Missing authentication: Bearer token required" }));
        assert!(matches!(checkout_error(&resp), E2eError::Misconfigured(_)));

        let resp = response(401, json!({ "error": { "message": "Invalid API key" } }));
        assert!(matches!(checkout_error(&resp), E2eError::Misconfigured(_)));
    }

    #[test]
    fn other_checkout_failures_keep_their_message() {
        let resp = response(400, json!({ "message": "tier is invalid" }));
        let err = checkout_error(&resp);
        assert_eq!(err.to_string(), "Assertion failed: Checkout failed: tier is invalid");

        let resp = response(502, Value::Null);
        assert_eq!(checkout_error(&resp).to_string(), "Assertion failed: Checkout failed: 502");
    }

    #[test]
    fn expect_status_reports_endpoint_and_set() {
        let resp = response(500, Value::Null);
        let err = resp.expect_status(&StatusSet::of(&[200, 400])).unwrap_err();
        assert!(err.to_string().contains("POST /api/checkout/create returned 500"));
        assert!(response(400, Value::Null).expect_status(&StatusSet::of(&[200, 400])).is_ok());
    }

    #[test]
    fn require_str_names_all_paths() {
        let resp = response(200, json!({ "data": {} }));
        let err = resp.require_str(&["data.checkoutUrl", "checkoutUrl"]).unwrap_err();
        assert!(err.to_string().contains("data.checkoutUrl, checkoutUrl"));
    }
}
