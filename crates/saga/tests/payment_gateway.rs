//! HTTP payment gateway against a local stand-in server.

use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use common::{ClientId, ProductId};
use saga::{AuthorizationRequest, HttpPaymentGateway, PaymentError, PaymentGateway, Verdict};
use serde_json::{Value, json};

async fn webhook(Json(body): Json<Value>) -> Json<Value> {
    // Approves odd quantities, declines even ones.
    let verdict = if body["quantity"].as_u64().unwrap_or(0) % 2 == 1 {
        "approved"
    } else {
        "declined"
    };
    Json(json!({
        "transaction_id": body["transaction_id"],
        "status": verdict,
    }))
}

async fn serve() -> String {
    let app = Router::new()
        .route("/webhook/payment", post(webhook))
        .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/garbled", post(|| async { Json(json!({"status": "maybe"})) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(quantity: u32) -> AuthorizationRequest {
    AuthorizationRequest {
        transaction_id: "pgto_1".to_string(),
        client_id: ClientId::new(1),
        product_id: ProductId::new(42),
        product_name: "Widget".to_string(),
        quantity,
    }
}

fn gateway(url: String) -> HttpPaymentGateway {
    HttpPaymentGateway::new(url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn parses_gateway_verdicts() {
    let base = serve().await;
    let gateway = gateway(format!("{base}/webhook/payment"));

    assert_eq!(gateway.authorize(&request(1)).await.unwrap(), Verdict::Approved);
    assert_eq!(gateway.authorize(&request(2)).await.unwrap(), Verdict::Declined);
}

#[tokio::test]
async fn error_status_is_rejected() {
    let base = serve().await;
    let err = gateway(format!("{base}/broken"))
        .authorize(&request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Rejected { status: 500 }));
}

#[tokio::test]
async fn unknown_verdict_is_unexpected() {
    let base = serve().await;
    let err = gateway(format!("{base}/garbled"))
        .authorize(&request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn unreachable_gateway_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(format!("http://{addr}/webhook/payment"))
        .authorize(&request(1))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Transport(_)));
}
