//! Execution gateway.
//!
//! Orders leave the engine through either a live brokerage connector or a
//! simulation substitute that fills at the last monitored price. The two
//! behave identically to every other component.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{price_to_decimal, Order};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of an order submission.
#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Filled {
        gateway_order_id: String,
        price: Decimal,
        quantity: u32,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    symbol: &'a str,
    side: &'a str,
    quantity: u32,
    price: Decimal,
    price_type: &'a str,
    client_order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    order_id: String,
    status: String,
    #[serde(default)]
    filled_price: Option<Decimal>,
    #[serde(default)]
    filled_quantity: Option<u32>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayPosition {
    pub symbol: String,
    pub quantity: u32,
    pub average_price: Decimal,
}

/// Live brokerage connector.
pub struct BrokerClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl BrokerClient {
    pub fn new(base_url: String, api_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Create from environment variables BROKER_BASE_URL and BROKER_API_TOKEN.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BROKER_BASE_URL").context("BROKER_BASE_URL not set")?;
        let api_token = std::env::var("BROKER_API_TOKEN").context("BROKER_API_TOKEN not set")?;
        Self::new(base_url, api_token)
    }

    fn classify(e: reqwest::Error) -> EngineError {
        if e.is_timeout() || e.is_connect() {
            EngineError::GatewayTimeout(e.to_string())
        } else {
            EngineError::GatewayFatal(e.to_string())
        }
    }

    async fn submit(&self, order: &Order) -> Result<OrderOutcome, EngineError> {
        let request = SubmitRequest {
            symbol: &order.symbol,
            side: order.side.as_str(),
            quantity: order.quantity,
            price: order.price,
            price_type: order.price_type.as_str(),
            client_order_id: &order.id,
        };

        debug!(order_id = %order.id, symbol = %order.symbol, "submitting order");

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .map_err(Self::classify)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EngineError::GatewayFatal(format!(
                    "authentication rejected: {}",
                    response.status()
                )));
            }
            status if status.is_server_error() => {
                return Err(EngineError::GatewayTimeout(format!(
                    "gateway error: {}",
                    status
                )));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Ok(OrderOutcome::Rejected {
                    reason: format!("{} - {}", status, body),
                });
            }
            _ => {}
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| EngineError::GatewayFatal(e.to_string()))?;

        match parsed.status.as_str() {
            "filled" => Ok(OrderOutcome::Filled {
                gateway_order_id: parsed.order_id,
                price: parsed.filled_price.unwrap_or(order.price),
                quantity: parsed.filled_quantity.unwrap_or(order.quantity),
            }),
            _ => Ok(OrderOutcome::Rejected {
                reason: if parsed.message.is_empty() {
                    parsed.status
                } else {
                    parsed.message
                },
            }),
        }
    }

    async fn positions(&self) -> Result<Vec<GatewayPosition>, EngineError> {
        let response = self
            .client
            .get(format!("{}/positions", self.base_url))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(EngineError::GatewayFatal("authentication rejected".into()));
        }
        if !response.status().is_success() {
            return Err(EngineError::GatewayTimeout(format!(
                "positions request failed: {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::GatewayFatal(e.to_string()))
    }

}

/// Behavior-preserving substitute used when no brokerage credentials are
/// configured. Every approved order fills at the last monitored price.
#[derive(Debug, Default)]
pub struct SimulatedGateway;

impl SimulatedGateway {
    fn submit(&self, order: &Order, last_price: f64) -> OrderOutcome {
        let price = if last_price > 0.0 {
            price_to_decimal(last_price)
        } else {
            order.price
        };
        let gateway_order_id = format!("SIM_{}", Uuid::new_v4().simple());
        info!(order_id = %order.id, %gateway_order_id, %price, "simulated fill");
        OrderOutcome::Filled {
            gateway_order_id,
            price,
            quantity: order.quantity,
        }
    }
}

/// The engine's single execution surface.
pub enum ExecutionGateway {
    Live(BrokerClient),
    Simulated(SimulatedGateway),
}

impl ExecutionGateway {
    /// Live when brokerage credentials are present in the environment,
    /// simulated otherwise.
    pub fn from_env() -> Self {
        match BrokerClient::from_env() {
            Ok(client) => {
                info!("execution gateway: live brokerage");
                ExecutionGateway::Live(client)
            }
            Err(e) => {
                warn!(error = %e, "no brokerage credentials, running in simulation mode");
                ExecutionGateway::Simulated(SimulatedGateway)
            }
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ExecutionGateway::Simulated(_))
    }

    /// Submit an order. `last_price` is the monitor's most recent observed
    /// price, used for synthetic fills in simulation mode.
    pub async fn submit_order(
        &self,
        order: &Order,
        last_price: f64,
    ) -> Result<OrderOutcome, EngineError> {
        match self {
            ExecutionGateway::Live(client) => client.submit(order).await,
            ExecutionGateway::Simulated(sim) => Ok(sim.submit(order, last_price)),
        }
    }

    /// Current broker-side positions. Also serves as the pre-market
    /// reachability probe; simulation always reports none.
    pub async fn get_positions(&self) -> Result<Vec<GatewayPosition>, EngineError> {
        match self {
            ExecutionGateway::Live(client) => client.positions().await,
            ExecutionGateway::Simulated(_) => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_simulated_fill_uses_last_price() {
        let gateway = ExecutionGateway::Simulated(SimulatedGateway);
        let order = Order::new("2330", OrderSide::Buy, 1000, dec!(525), None);

        match gateway.submit_order(&order, 524.5).await.unwrap() {
            OrderOutcome::Filled {
                gateway_order_id,
                price,
                quantity,
            } => {
                assert!(gateway_order_id.starts_with("SIM_"));
                assert_eq!(price, dec!(524.5));
                assert_eq!(quantity, 1000);
            }
            OrderOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[tokio::test]
    async fn test_simulated_fill_falls_back_to_limit_price() {
        let gateway = ExecutionGateway::Simulated(SimulatedGateway);
        let order = Order::new("2330", OrderSide::Buy, 1000, dec!(525), None);

        match gateway.submit_order(&order, 0.0).await.unwrap() {
            OrderOutcome::Filled { price, .. } => assert_eq!(price, dec!(525)),
            OrderOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }
}
