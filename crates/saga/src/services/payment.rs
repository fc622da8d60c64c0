//! Payment authority: asks the external gateway for a verdict on each order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ClientId, OrderId, OrderPayload, OrderStatus, ProductId, Topic};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::PaymentError;

/// The gateway's answer for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Declined,
}

impl Verdict {
    /// Topic announcing this verdict.
    pub fn topic(&self) -> Topic {
        match self {
            Verdict::Approved => Topic::PaymentApproved,
            Verdict::Declined => Topic::PaymentDeclined,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.topic().status()
    }
}

/// Body sent to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub transaction_id: String,
    pub client_id: ClientId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    status: Verdict,
}

/// Transaction reference for an order. The same order always maps to the
/// same reference.
pub fn transaction_reference(order_id: OrderId) -> String {
    format!("pgto_{order_id}")
}

/// External payment collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Verdict, PaymentError>;
}

/// Gateway reached over HTTP with a JSON `POST`.
///
/// The response body must be `{"status": "approved" | "declined"}`.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpPaymentGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip_all, fields(transaction_id = %request.transaction_id, url = %self.url))]
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Verdict, PaymentError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        let body: GatewayResponse = response.json().await?;
        Ok(body.status)
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    scripted: HashMap<String, Verdict>,
    requests: Vec<AuthorizationRequest>,
    unavailable: bool,
}

/// Gateway with scripted verdicts, for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    default: Verdict,
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::approving()
    }
}

impl InMemoryPaymentGateway {
    pub fn approving() -> Self {
        Self::with_default(Verdict::Approved)
    }

    pub fn declining() -> Self {
        Self::with_default(Verdict::Declined)
    }

    pub fn with_default(default: Verdict) -> Self {
        Self {
            default,
            state: Arc::default(),
        }
    }

    /// Fixes the verdict for one transaction reference.
    pub async fn script(&self, transaction_id: impl Into<String>, verdict: Verdict) {
        self.state
            .write()
            .await
            .scripted
            .insert(transaction_id.into(), verdict);
    }

    /// Makes every call fail as if the gateway were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    pub async fn requests(&self) -> Vec<AuthorizationRequest> {
        self.state.read().await.requests.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Verdict, PaymentError> {
        let mut state = self.state.write().await;
        state.requests.push(request.clone());
        if state.unavailable {
            return Err(PaymentError::Transport("gateway unavailable".to_string()));
        }
        Ok(state
            .scripted
            .get(&request.transaction_id)
            .copied()
            .unwrap_or(self.default))
    }
}

/// Gateway that approves or declines at random, for local runs without a
/// real payment service.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPaymentGateway {
    approval_rate: f64,
}

impl SimulatedPaymentGateway {
    /// `approval_rate` is clamped to `0.0..=1.0`.
    pub fn new(approval_rate: f64) -> Self {
        let approval_rate = if approval_rate.is_nan() {
            0.0
        } else {
            approval_rate.clamp(0.0, 1.0)
        };
        Self { approval_rate }
    }

    pub fn approval_rate(&self) -> f64 {
        self.approval_rate
    }
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn authorize(&self, request: &AuthorizationRequest) -> Result<Verdict, PaymentError> {
        let approved = rand::thread_rng().gen_bool(self.approval_rate);
        let verdict = if approved {
            Verdict::Approved
        } else {
            Verdict::Declined
        };
        tracing::debug!(transaction_id = %request.transaction_id, ?verdict, "Simulated verdict");
        Ok(verdict)
    }
}

/// Number of verdicts [`PaymentAuthority::new`] remembers.
pub const DEFAULT_VERDICT_CAPACITY: usize = 10_000;

/// Most recent verdicts by transaction reference. The oldest is forgotten
/// once `capacity` is exceeded.
#[derive(Debug, Default)]
struct VerdictCache {
    capacity: usize,
    verdicts: HashMap<String, Verdict>,
    arrival: VecDeque<String>,
}

impl VerdictCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn get(&self, transaction_id: &str) -> Option<Verdict> {
        self.verdicts.get(transaction_id).copied()
    }

    /// Records `verdict` unless one is already known; returns the one kept.
    fn settle(&mut self, transaction_id: String, verdict: Verdict) -> Verdict {
        if let Some(known) = self.get(&transaction_id) {
            return known;
        }
        self.verdicts.insert(transaction_id.clone(), verdict);
        self.arrival.push_back(transaction_id);
        while self.arrival.len() > self.capacity {
            if let Some(oldest) = self.arrival.pop_front() {
                self.verdicts.remove(&oldest);
            }
        }
        verdict
    }
}

/// Turns orders into payment verdicts.
///
/// Recent verdicts are remembered per transaction reference, so a
/// redelivered order gets the verdict it got the first time.
#[derive(Clone)]
pub struct PaymentAuthority {
    gateway: Arc<dyn PaymentGateway>,
    verdicts: Arc<RwLock<VerdictCache>>,
}

impl PaymentAuthority {
    pub fn new(gateway: impl PaymentGateway + 'static) -> Self {
        Self::with_capacity(gateway, DEFAULT_VERDICT_CAPACITY)
    }

    /// Remembers at most `capacity` verdicts.
    pub fn with_capacity(gateway: impl PaymentGateway + 'static, capacity: usize) -> Self {
        Self {
            gateway: Arc::new(gateway),
            verdicts: Arc::new(RwLock::new(VerdictCache::with_capacity(capacity))),
        }
    }

    /// Returns the verdict for an order. Gateway failures count as a
    /// decline.
    #[tracing::instrument(skip_all, fields(order_id = %order.id))]
    pub async fn authorize(&self, order: &OrderPayload) -> Verdict {
        let transaction_id = transaction_reference(order.id);
        if let Some(verdict) = self.verdicts.read().await.get(&transaction_id) {
            return verdict;
        }

        let request = AuthorizationRequest {
            transaction_id: transaction_id.clone(),
            client_id: order.client_id,
            product_id: order.product_id,
            product_name: order.product_name.clone(),
            quantity: order.quantity,
        };
        let verdict = match self.gateway.authorize(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(%transaction_id, error = %e, "Payment gateway failed, declining");
                Verdict::Declined
            }
        };

        // First verdict recorded wins if two deliveries raced.
        let verdict = self
            .verdicts
            .write()
            .await
            .settle(transaction_id.clone(), verdict);

        match verdict {
            Verdict::Approved => metrics::counter!("payments_approved").increment(1),
            Verdict::Declined => metrics::counter!("payments_declined").increment(1),
        }
        info!(%transaction_id, ?verdict, "Payment settled");
        verdict
    }
}
