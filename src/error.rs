//! Error taxonomy for the signal engine.
//!
//! Per-symbol and per-signal failures are isolated by the orchestrator and
//! never abort a phase; `GatewayFatal` and `ConfigInvalid` are the only
//! variants that stop anything larger than the current unit of work.

use thiserror::Error;

/// Engine-level errors with a stable kind for daily-report counting.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Not enough price history to compute all configured averages.
    #[error("insufficient data for {symbol}: {have} bars, need {need}")]
    InsufficientData {
        symbol: String,
        have: usize,
        need: usize,
    },

    /// Market data provider unreachable and no cached quote to fall back on.
    #[error("market data provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Expected business outcome, recorded but never retried.
    #[error("order rejected by risk manager: {reason}")]
    RiskRejected { reason: String },

    /// Transient gateway failure; retried with backoff before escalating.
    #[error("execution gateway timed out: {0}")]
    GatewayTimeout(String),

    /// Authentication or connectivity loss; halts the monitoring phase.
    #[error("execution gateway fatal: {0}")]
    GatewayFatal(String),

    /// Rejected at startup, before any phase begins.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// Coarse error classification used in the post-close report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InsufficientData,
    ProviderUnavailable,
    RiskRejected,
    GatewayTimeout,
    GatewayFatal,
    ConfigInvalid,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::InsufficientData,
        ErrorKind::ProviderUnavailable,
        ErrorKind::RiskRejected,
        ErrorKind::GatewayTimeout,
        ErrorKind::GatewayFatal,
        ErrorKind::ConfigInvalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientData => "insufficient-data",
            ErrorKind::ProviderUnavailable => "provider-unavailable",
            ErrorKind::RiskRejected => "risk-rejected",
            ErrorKind::GatewayTimeout => "gateway-timeout",
            ErrorKind::GatewayFatal => "gateway-fatal",
            ErrorKind::ConfigInvalid => "config-invalid",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InsufficientData { .. } => ErrorKind::InsufficientData,
            EngineError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            EngineError::RiskRejected { .. } => ErrorKind::RiskRejected,
            EngineError::GatewayTimeout(_) => ErrorKind::GatewayTimeout,
            EngineError::GatewayFatal(_) => ErrorKind::GatewayFatal,
            EngineError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
        }
    }

    /// Transient errors are retried; fatal ones escalate.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ProviderUnavailable(_) | EngineError::GatewayTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = EngineError::InsufficientData {
            symbol: "2330".to_string(),
            have: 10,
            need: 120,
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert_eq!(err.kind().as_str(), "insufficient-data");
        assert!(!err.is_transient());

        let err = EngineError::GatewayTimeout("order submit".to_string());
        assert!(err.is_transient());
        assert_eq!(err.kind().as_str(), "gateway-timeout");
    }
}
