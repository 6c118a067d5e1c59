use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use freightlink_core::ShipmentRecord;
use freightlink_engine::{Orchestrator, RecordReport};
use freightlink_gateway::{CatalogGateway, GatewayConfig, HttpGateway};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct WebhookResponse {
    message: &'static str,
    processed: usize,
    skipped: usize,
    records: Vec<RecordReport>,
}

struct ServiceState<G> {
    orchestrator: Arc<Orchestrator<G>>,
}

impl<G> Clone for ServiceState<G> {
    fn clone(&self) -> Self {
        Self { orchestrator: Arc::clone(&self.orchestrator) }
    }
}

#[derive(Debug, Parser)]
#[command(name = "freightlink-service")]
#[command(about = "Webhook ingestion service for shipment/booking reconciliation")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    /// Remote catalog GraphQL endpoint.
    #[arg(long)]
    endpoint: String,
    /// Auth profile UUID for the login exchange.
    #[arg(long)]
    auth_profile: String,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    /// Override the add-purchase-order action id.
    #[arg(long)]
    add_po_action: Option<String>,
    /// Override the update-purchase-order action id.
    #[arg(long)]
    update_po_action: Option<String>,
    /// Override the add-style-number action id.
    #[arg(long)]
    add_sn_action: Option<String>,
    /// Override the update-style-number action id.
    #[arg(long)]
    update_sn_action: Option<String>,
}

impl Args {
    /// Gateway configuration with any action-id overrides applied. Ids
    /// that were not overridden keep their deployment defaults.
    fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(
            self.endpoint.clone(),
            self.auth_profile.clone(),
            self.username.clone(),
            self.password.clone(),
        );
        if let Some(id) = self.add_po_action.clone() {
            config.actions.add_purchase_order = id;
        }
        if let Some(id) = self.update_po_action.clone() {
            config.actions.update_purchase_order = id;
        }
        if let Some(id) = self.add_sn_action.clone() {
            config.actions.add_style_number = id;
        }
        if let Some(id) = self.update_sn_action.clone() {
            config.actions.update_style_number = id;
        }
        config
    }
}

fn app<G>(state: ServiceState<G>) -> Router
where
    G: CatalogGateway + Send + Sync + 'static,
{
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/webhook", post(webhook::<G>))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let gateway = HttpGateway::new(args.gateway_config())?;
    let state = ServiceState { orchestrator: Arc::new(Orchestrator::new(gateway)) };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!("webhook listening on {}", args.bind);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Accepts a JSON array of shipment records and processes them as one
/// batch. Per-record failures are reported in the body, never as a
/// non-200 status; the batch always runs to completion.
async fn webhook<G>(
    State(state): State<ServiceState<G>>,
    Json(records): Json<Vec<ShipmentRecord>>,
) -> Json<WebhookResponse>
where
    G: CatalogGateway + Send + Sync + 'static,
{
    tracing::info!("webhook received {} record(s)", records.len());
    let report = state.orchestrator.process_batch(&records).await;
    Json(WebhookResponse {
        message: "payload processed",
        processed: report.processed(),
        skipped: report.skipped(),
        records: report.records,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::Response;
    use freightlink_core::{PoUpdatePayload, SnUpdatePayload};
    use freightlink_gateway::{
        ExistenceCheck, GatewayError, NewPurchaseOrder, NewStyleNumber, PoMatch, SnMatch,
    };
    use http::Request;
    use tower::ServiceExt;

    use super::*;

    /// Gateway where nothing exists yet: every check is empty, every
    /// create issues the next id, every update succeeds.
    struct EmptyCatalog {
        next_id: AtomicI64,
    }

    impl EmptyCatalog {
        fn new() -> Self {
            Self { next_id: AtomicI64::new(1) }
        }
    }

    impl CatalogGateway for EmptyCatalog {
        async fn check_purchase_order(
            &self,
            _order_number: &str,
            _shipper_id: i64,
            _customer_id: i64,
        ) -> Result<ExistenceCheck<PoMatch>, GatewayError> {
            Ok(ExistenceCheck { total_count: 0, results: Vec::new() })
        }

        async fn check_style_number(
            &self,
            _style_number: &str,
            _order_number: &str,
            _shipment_id: i64,
        ) -> Result<ExistenceCheck<SnMatch>, GatewayError> {
            Ok(ExistenceCheck { total_count: 0, results: Vec::new() })
        }

        async fn add_purchase_order(
            &self,
            _input: &NewPurchaseOrder,
        ) -> Result<i64, GatewayError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn add_style_number(&self, _input: &NewStyleNumber) -> Result<i64, GatewayError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn update_purchase_orders(
            &self,
            _payload: &PoUpdatePayload,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn update_style_numbers(
            &self,
            _payload: &SnUpdatePayload,
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn test_app() -> Router {
        let state = ServiceState {
            orchestrator: Arc::new(Orchestrator::new(EmptyCatalog::new())),
        };
        app(state)
    }

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}"),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let response = match test_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .method("GET")
                    .body(axum::body::Body::empty())
                    .unwrap_or_else(|err| panic!("failed to build request: {err}")),
            )
            .await
        {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        };
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(value.get("status").and_then(serde_json::Value::as_str), Some("ok"));
    }

    #[tokio::test]
    async fn webhook_processes_batch_and_reports_per_record_outcomes() {
        let payload = serde_json::json!([
            {
                "shipmentID": 10,
                "shipper_id": "1",
                "customer_id": "2",
                "purchase_orders_and_styles": "PO100-SN1,SN2"
            },
            {
                "shipmentID": 11,
                "shipper_id": "not-a-number",
                "customer_id": "2",
                "purchase_orders_and_styles": "PO200-SN3"
            }
        ]);

        let response = match test_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/webhook")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(payload.to_string()))
                    .unwrap_or_else(|err| panic!("failed to build request: {err}")),
            )
            .await
        {
            Ok(response) => response,
            Err(err) => panic!("webhook request failed: {err}"),
        };
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(value["message"], "payload processed");
        assert_eq!(value["processed"], 1);
        assert_eq!(value["skipped"], 1);
        assert_eq!(value["records"][0]["resolved_purchase_orders"], 1);
        assert_eq!(value["records"][1]["skip_reason"], "non_numeric_shipper_id");
    }

    #[tokio::test]
    async fn webhook_rejects_malformed_bodies() {
        let response = match test_app()
            .oneshot(
                Request::builder()
                    .uri("/v1/webhook")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("{\"not\": \"an array\"}"))
                    .unwrap_or_else(|err| panic!("failed to build request: {err}")),
            )
            .await
        {
            Ok(response) => response,
            Err(err) => panic!("webhook request failed: {err}"),
        };
        assert!(response.status().is_client_error());
    }

    #[test]
    fn service_args_are_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn action_id_overrides_reach_the_gateway_config() {
        let args = match Args::try_parse_from([
            "freightlink-service",
            "--endpoint",
            "http://localhost:4000/graphql",
            "--auth-profile",
            "profile-uuid",
            "--username",
            "svc",
            "--password",
            "secret",
            "--add-po-action",
            "11111111111111111111111111111111",
            "--update-sn-action",
            "22222222222222222222222222222222",
        ]) {
            Ok(args) => args,
            Err(err) => panic!("args failed to parse: {err}"),
        };
        let config = args.gateway_config();
        assert_eq!(config.actions.add_purchase_order, "11111111111111111111111111111111");
        assert_eq!(config.actions.update_style_number, "22222222222222222222222222222222");
        // Untouched ids keep their defaults.
        let defaults = freightlink_gateway::ActionIds::default();
        assert_eq!(config.actions.update_purchase_order, defaults.update_purchase_order);
        assert_eq!(config.actions.add_style_number, defaults.add_style_number);
    }
}
