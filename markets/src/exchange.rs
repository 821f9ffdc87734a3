//! Exchange abstractions and identifiers for the Escada trading engine.
//!
//! This module provides the [`ExchangeId`] enum used throughout the system to
//! identify the supported derivatives venues.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifies the derivatives venues supported by Escada.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum ExchangeId {
    /// Binance USD-M perpetual futures
    BinanceFutures,
    /// Bybit linear perpetuals
    Bybit,
    /// BitGet USDT-M perpetuals
    Bitget,
    /// KuCoin futures
    Kucoin,
    /// Kraken futures
    Kraken,
}

impl ExchangeId {
    /// Returns the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::BinanceFutures => "BINANCE",
            ExchangeId::Bybit => "BYBIT",
            ExchangeId::Bitget => "BITGET",
            ExchangeId::Kucoin => "KUCOIN",
            ExchangeId::Kraken => "KRAKEN",
        }
    }

    /// Returns true if the venue supports hedge mode (simultaneous long and
    /// short positions on the same contract, keyed by `symbol:direction`).
    pub fn supports_hedge_mode(&self) -> bool {
        matches!(
            self,
            ExchangeId::BinanceFutures | ExchangeId::Bybit | ExchangeId::Bitget
        )
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = crate::error::MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BINANCE" | "BINANCE_FUTURES" => Ok(ExchangeId::BinanceFutures),
            "BYBIT" => Ok(ExchangeId::Bybit),
            "BITGET" => Ok(ExchangeId::Bitget),
            "KUCOIN" => Ok(ExchangeId::Kucoin),
            "KRAKEN" => Ok(ExchangeId::Kraken),
            other => Err(crate::error::MarketError::UnknownExchange(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_id_round_trips_through_str() {
        for id in [
            ExchangeId::BinanceFutures,
            ExchangeId::Bybit,
            ExchangeId::Bitget,
            ExchangeId::Kucoin,
            ExchangeId::Kraken,
        ] {
            assert_eq!(ExchangeId::from_str(id.as_str()).unwrap(), id);
        }
    }

    #[test]
    fn unknown_exchange_is_rejected() {
        assert!(ExchangeId::from_str("NASDAQ").is_err());
    }
}
