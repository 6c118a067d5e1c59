//! Remote gateway for the freight catalog's GraphQL API.
//!
//! Every operation is a `POST {query, variables}` against a single
//! endpoint, authorized by a JWT obtained through a login exchange. The
//! login runs fresh for every logical call (no token cache), and both the
//! login and the operation itself sit behind a bounded fixed-delay retry.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use freightlink_core::{PoUpdatePayload, SnUpdatePayload, TargetKind};

const LOGIN_MUTATION: &str = "\
mutation Login($authProfileUuid: String!, $username: String!, $password: String!) {
  login(authProfileUuid: $authProfileUuid, username: $username, password: $password) {
    jwtToken
    refreshToken
  }
}";

const ACTION_MUTATION: &str = "mutation { action(id: $action_id input: $input) }";

/// Terminal gateway failure, after the retry budget is spent. The three
/// shapes stay distinguishable so callers can report them separately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote application error: {0}")]
    Application(String),
}

/// Fixed retry budget: `max_attempts` total attempts with a constant
/// inter-attempt delay. No backoff, no jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_millis(2000) }
    }
}

/// The four opaque action identifiers the remote exposes for create and
/// update mutations. Deployment configuration, never constructed
/// dynamically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionIds {
    pub add_purchase_order: String,
    pub update_purchase_order: String,
    pub add_style_number: String,
    pub update_style_number: String,
}

impl Default for ActionIds {
    fn default() -> Self {
        Self {
            add_purchase_order: "2ac1f7de7e134ec4943ac985a2f7f2d3".to_string(),
            update_purchase_order: "62ca74f99d3543d98fcb14fec2fee600".to_string(),
            add_style_number: "6144dee3fbca4f77a0b8c2487e825e0b".to_string(),
            update_style_number: "7eb7dcd49e34457585f64b455d363621".to_string(),
        }
    }
}

/// Everything the gateway needs at construction time: endpoint, login
/// credentials, action identifiers, and the retry budget.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub auth_profile_uuid: String,
    pub username: String,
    pub password: String,
    pub actions: ActionIds,
    pub retry: RetryPolicy,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        auth_profile_uuid: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_profile_uuid: auth_profile_uuid.into(),
            username: username.into(),
            password: password.into(),
            actions: ActionIds::default(),
            retry: RetryPolicy::default(),
            timeout_secs: 30,
        }
    }
}

/// Existence-check result: the remote's `results` page plus `totalCount`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExistenceCheck<T> {
    #[serde(rename = "totalCount")]
    pub total_count: i64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> ExistenceCheck<T> {
    #[must_use]
    pub fn found(&self) -> bool {
        self.total_count > 0 && !self.results.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PoMatch {
    pub id: i64,
    #[serde(rename = "orderNumbers")]
    pub order_numbers: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SnMatch {
    pub id: i64,
    #[serde(rename = "styleNumber")]
    pub style_number: String,
}

/// Minimal create payload for a purchase order, attached to its owning
/// shipment.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewPurchaseOrder {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: i64,
    #[serde(rename = "orderNumber")]
    pub order_number: String,
}

/// Minimal create payload for a style number under a purchase order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewStyleNumber {
    #[serde(rename = "styleNumber")]
    pub style_number: String,
    #[serde(rename = "poId")]
    pub po_id: i64,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: i64,
}

/// The typed operations the reconciliation engine needs from the remote
/// catalog. Implemented by [`HttpGateway`] and by scripted mocks in tests.
pub trait CatalogGateway {
    fn check_purchase_order(
        &self,
        order_number: &str,
        shipper_id: i64,
        customer_id: i64,
    ) -> impl Future<Output = Result<ExistenceCheck<PoMatch>, GatewayError>> + Send;

    fn check_style_number(
        &self,
        style_number: &str,
        order_number: &str,
        shipment_id: i64,
    ) -> impl Future<Output = Result<ExistenceCheck<SnMatch>, GatewayError>> + Send;

    fn add_purchase_order(
        &self,
        input: &NewPurchaseOrder,
    ) -> impl Future<Output = Result<i64, GatewayError>> + Send;

    fn add_style_number(
        &self,
        input: &NewStyleNumber,
    ) -> impl Future<Output = Result<i64, GatewayError>> + Send;

    fn update_purchase_orders(
        &self,
        payload: &PoUpdatePayload,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn update_style_numbers(
        &self,
        payload: &SnUpdatePayload,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl GraphQlEnvelope {
    fn into_data(self) -> Result<Value, GatewayError> {
        if let Some(first) = self.errors.first() {
            return Err(GatewayError::Application(first.message.clone()));
        }
        self.data
            .filter(|data| !data.is_null())
            .ok_or_else(|| GatewayError::Application("response carried no data".to_string()))
    }
}

/// Run `call` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between attempts. Any error is eligible for retry; the last error is
/// returned once the budget is spent.
async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = GatewayError::Transport("no attempts were made".to_string());
    for attempt in 1..=attempts {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt < attempts {
                    tracing::warn!(
                        "{operation} attempt {attempt} failed ({err}); retrying in {}ms",
                        policy.delay.as_millis()
                    );
                    tokio::time::sleep(policy.delay).await;
                } else {
                    tracing::error!("{operation} failed after {attempt} attempts: {err}");
                }
                last_error = err;
            }
        }
    }
    Err(last_error)
}

fn po_existence_query(order_number: &str, shipper_id: i64, customer_id: i64) -> String {
    format!(
        "{{
  allPurchaseOrder(
    where: {{
      _and: [
        {{ orderNumbers: {{ eq: \"{order_number}\" }} }},
        {{ bookings: {{ shipper: {{ id: {{ eq: {shipper_id} }} }} }} }},
        {{ bookings: {{ customer: {{ id: {{ eq: {customer_id} }} }} }} }}
      ]
    }}
    take: 200
    skip: 0
  ) {{
    results {{ id orderNumbers }}
    totalCount
  }}
}}"
    )
}

fn sn_existence_query(style_number: &str, order_number: &str, shipment_id: i64) -> String {
    format!(
        "{{
  allStyleNumber(
    where: {{
      _and: [
        {{ styleNumber: {{ eq: \"{style_number}\" }} }},
        {{ pos: {{ orderNumbers: {{ eq: \"{order_number}\" }} }} }},
        {{ shipments: {{ id: {{ eq: {shipment_id} }} }} }}
      ]
    }}
    take: 200
    skip: 0
  ) {{
    results {{ id styleNumber }}
    totalCount
  }}
}}"
    )
}

/// GraphQL client over reqwest. One instance per process; cheap to share
/// behind the engine since every call re-authenticates.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    /// Build a gateway from its configuration.
    ///
    /// # Errors
    /// Returns `GatewayError::Transport` when the HTTP client cannot be
    /// constructed.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post_envelope(&self, body: &Value, token: Option<&str>) -> Result<Value, GatewayError> {
        let mut request = self.client.post(&self.config.endpoint).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(GatewayError::Transport(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        let envelope: GraphQlEnvelope = response
            .json()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        envelope.into_data()
    }

    async fn try_login(&self) -> Result<String, GatewayError> {
        let body = json!({
            "query": LOGIN_MUTATION,
            "variables": {
                "authProfileUuid": self.config.auth_profile_uuid,
                "username": self.config.username,
                "password": self.config.password,
            },
        });
        let data = self.post_envelope(&body, None).await?;
        data.get("login")
            .and_then(|login| login.get("jwtToken"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| GatewayError::Application("login response carried no jwtToken".to_string()))
    }

    async fn obtain_token(&self) -> Result<String, GatewayError> {
        with_retry(&self.config.retry, "login exchange", || self.try_login())
            .await
            .map_err(|err| GatewayError::Auth(err.to_string()))
    }

    /// Execute one named query or mutation: fresh login, then the
    /// operation under the retry policy.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, GatewayError> {
        let token = self.obtain_token().await?;
        let body = json!({ "query": query, "variables": variables });
        with_retry(&self.config.retry, "graphql request", || {
            self.post_envelope(&body, Some(&token))
        })
        .await
    }

    async fn run_action(&self, action_id: &str, payload: Value) -> Result<Value, GatewayError> {
        let variables = json!({ "action_id": action_id, "input": { "payload": payload } });
        let data = self.execute(ACTION_MUTATION, variables).await?;
        data.get("action")
            .and_then(|action| action.get("results"))
            .cloned()
            .ok_or_else(|| GatewayError::Application("action response carried no results".to_string()))
    }

    fn decode_section<T>(data: &Value, section: &str) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
    {
        let value = data
            .get(section)
            .cloned()
            .ok_or_else(|| GatewayError::Application(format!("response carried no {section}")))?;
        serde_json::from_value(value)
            .map_err(|err| GatewayError::Application(format!("malformed {section} payload: {err}")))
    }

    fn issued_id(results: &Value) -> Result<i64, GatewayError> {
        results
            .as_i64()
            .ok_or_else(|| GatewayError::Application("action did not return a numeric id".to_string()))
    }
}

impl CatalogGateway for HttpGateway {
    async fn check_purchase_order(
        &self,
        order_number: &str,
        shipper_id: i64,
        customer_id: i64,
    ) -> Result<ExistenceCheck<PoMatch>, GatewayError> {
        let query = po_existence_query(order_number, shipper_id, customer_id);
        let data = self.execute(&query, json!({})).await?;
        Self::decode_section(&data, "allPurchaseOrder")
    }

    async fn check_style_number(
        &self,
        style_number: &str,
        order_number: &str,
        shipment_id: i64,
    ) -> Result<ExistenceCheck<SnMatch>, GatewayError> {
        let query = sn_existence_query(style_number, order_number, shipment_id);
        let data = self.execute(&query, json!({})).await?;
        Self::decode_section(&data, "allStyleNumber")
    }

    async fn add_purchase_order(&self, input: &NewPurchaseOrder) -> Result<i64, GatewayError> {
        let payload = serde_json::to_value(input)
            .map_err(|err| GatewayError::Application(err.to_string()))?;
        let results = self.run_action(&self.config.actions.add_purchase_order, payload).await?;
        Self::issued_id(&results)
    }

    async fn add_style_number(&self, input: &NewStyleNumber) -> Result<i64, GatewayError> {
        let payload = serde_json::to_value(input)
            .map_err(|err| GatewayError::Application(err.to_string()))?;
        let results = self.run_action(&self.config.actions.add_style_number, payload).await?;
        Self::issued_id(&results)
    }

    async fn update_purchase_orders(&self, payload: &PoUpdatePayload) -> Result<(), GatewayError> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| GatewayError::Application(err.to_string()))?;
        self.run_action(&self.config.actions.update_purchase_order, payload)
            .await
            .map(|_| ())
    }

    async fn update_style_numbers(&self, payload: &SnUpdatePayload) -> Result<(), GatewayError> {
        let payload = serde_json::to_value(payload)
            .map_err(|err| GatewayError::Application(err.to_string()))?;
        self.run_action(&self.config.actions.update_style_number, payload)
            .await
            .map(|_| ())
    }
}
