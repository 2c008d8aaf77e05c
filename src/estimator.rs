//! Cost estimation against the external estimator collaborator.
//!
//! The registry itself never performs I/O; after a change to the box set the
//! API layer hands an [`EstimateRequest`] to the [`EstimateScheduler`], which
//! owns the asynchronous interaction:
//!
//! - triggers are debounced: repeated triggers within the configured window
//!   collapse into a single outstanding request
//! - each outgoing request carries a monotonically increasing sequence
//!   number; a response whose number is no longer the latest is discarded
//!   on arrival ("latest request wins" - the estimator receives no
//!   cancellation signal)
//! - a failed estimate degrades to [`EstimateStatus::Unavailable`] carrying
//!   the last known amount as stale context, never blocking allocation
//!
//! No timeout is enforced on the estimate call itself.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::types::Money;

/// Shipment priority forwarded to the estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShippingPriority {
    #[default]
    Standard,
    Express,
}

/// Request shape expected by the cost-estimation collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EstimateRequest {
    pub box_count: usize,
    pub total_weight_kg: f64,
    pub declared_value: Money,
    pub priority: ShippingPriority,
}

/// Response shape returned by the cost-estimation collaborator.
#[derive(Debug, Deserialize)]
struct EstimateResponse {
    amount: Money,
}

/// Error from one estimate attempt.
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("Estimator request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Current state of the shipping-cost estimate for one session.
///
/// `Unavailable` and `Pending` carry the previously known amount so the
/// caller can keep showing it, flagged as stale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EstimateStatus {
    /// No estimator endpoint is configured.
    Disabled,
    /// No trigger has happened yet.
    Idle,
    /// A request is debouncing or in flight.
    Pending { last_known: Option<Money> },
    /// The latest issued request answered.
    Ready { amount: Money },
    /// The latest issued request failed; the estimate is stale or unknown.
    Unavailable { last_known: Option<Money> },
}

impl EstimateStatus {
    /// The most recent successfully estimated amount, if any.
    pub fn last_known(&self) -> Option<Money> {
        match self {
            EstimateStatus::Ready { amount } => Some(*amount),
            EstimateStatus::Pending { last_known } | EstimateStatus::Unavailable { last_known } => {
                *last_known
            }
            EstimateStatus::Disabled | EstimateStatus::Idle => None,
        }
    }
}

/// A collaborator that can turn an [`EstimateRequest`] into an amount.
///
/// Implemented by the HTTP client below and by in-memory fakes in tests.
pub trait CostEstimateSource: Clone + Send + Sync + 'static {
    fn estimate(
        &self,
        request: EstimateRequest,
    ) -> impl Future<Output = Result<Money, EstimateError>> + Send;
}

/// HTTP client for the external estimator endpoint.
#[derive(Clone, Debug)]
pub struct HttpCostEstimator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCostEstimator {
    /// Builds a client for the given endpoint.
    ///
    /// Deliberately no request timeout: a slow estimator degrades to a stale
    /// estimate at the scheduler level instead of a spurious failure here.
    pub fn new(endpoint: String) -> Result<Self, EstimateError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()?;
        Ok(Self { client, endpoint })
    }
}

impl CostEstimateSource for HttpCostEstimator {
    async fn estimate(&self, request: EstimateRequest) -> Result<Money, EstimateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: EstimateResponse = response.json().await?;
        Ok(body.amount)
    }
}

fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("boxwise/{version}")
}

/// Debounced, sequence-numbered scheduler for estimate requests.
///
/// One scheduler exists per shipment session. Status transitions are
/// published through a `watch` channel; subscribe to observe them (this
/// also feeds the SSE endpoint).
pub struct EstimateScheduler<S> {
    source: Option<S>,
    seq: Arc<AtomicU64>,
    debounce: Duration,
    tx: watch::Sender<EstimateStatus>,
}

impl<S: CostEstimateSource> EstimateScheduler<S> {
    /// Creates a scheduler; `source: None` means estimation is disabled and
    /// every trigger is a no-op.
    pub fn new(source: Option<S>, debounce: Duration) -> Self {
        let initial = if source.is_some() {
            EstimateStatus::Idle
        } else {
            EstimateStatus::Disabled
        };
        let (tx, _) = watch::channel(initial);
        Self {
            source,
            seq: Arc::new(AtomicU64::new(0)),
            debounce,
            tx,
        }
    }

    /// Current status.
    pub fn status(&self) -> EstimateStatus {
        *self.tx.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<EstimateStatus> {
        self.tx.subscribe()
    }

    /// Schedules an estimate for the given request.
    ///
    /// Returns immediately. The request is sent after the debounce window
    /// unless a newer trigger supersedes it first; a superseded in-flight
    /// response is discarded when it arrives.
    pub fn trigger(&self, request: EstimateRequest) {
        let Some(source) = self.source.clone() else {
            return;
        };

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let last_known = self.tx.borrow().last_known();
        let _ = self.tx.send(EstimateStatus::Pending { last_known });

        let seq_counter = Arc::clone(&self.seq);
        let tx = self.tx.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if seq_counter.load(Ordering::SeqCst) != seq {
                // Collapsed into a newer trigger before the request went out.
                return;
            }

            let outcome = source.estimate(request).await;
            if seq_counter.load(Ordering::SeqCst) != seq {
                // A newer request was issued while this one was in flight.
                return;
            }

            let status = match outcome {
                Ok(amount) => EstimateStatus::Ready { amount },
                Err(err) => {
                    eprintln!("⚠️ Cost estimate failed: {err}");
                    EstimateStatus::Unavailable { last_known }
                }
            };
            let _ = tx.send(status);
        });
    }
}
