//! External collaborators: market data provider and execution gateway.

mod gateway;
mod quote_client;

pub use gateway::{BrokerClient, ExecutionGateway, GatewayPosition, OrderOutcome, SimulatedGateway};
pub use quote_client::{Quote, QuoteClient};
