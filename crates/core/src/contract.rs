//! Contract identity and option contract description.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default routing venue for contracts that arrive without an exchange.
pub const SMART_EXCHANGE: &str = "SMART";

/// Exchange-assigned contract identifier (IB `conId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub i64);

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(alias = "C", alias = "call")]
    Call,
    #[serde(alias = "P", alias = "put")]
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// Security type of a contract held at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Option {
        expiry: NaiveDate,
        strike: Decimal,
        right: OptionRight,
    },
    Stock,
    Other(String),
}

/// A tradable contract as the broker reports it.
///
/// `id` is `None` until the contract has been qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Option<ContractId>,
    pub symbol: String,
    pub kind: ContractKind,
    /// Exchange routing (e.g., "SMART", "CBOE"). Empty when unset.
    pub exchange: String,
    pub local_symbol: Option<String>,
}

impl Contract {
    /// Create an unqualified, SMART-routed option contract.
    pub fn option(symbol: &str, expiry: NaiveDate, strike: Decimal, right: OptionRight) -> Self {
        Self {
            id: None,
            symbol: symbol.to_uppercase(),
            kind: ContractKind::Option {
                expiry,
                strike,
                right,
            },
            exchange: SMART_EXCHANGE.to_string(),
            local_symbol: None,
        }
    }

    pub fn stock(symbol: &str) -> Self {
        Self {
            id: None,
            symbol: symbol.to_uppercase(),
            kind: ContractKind::Stock,
            exchange: SMART_EXCHANGE.to_string(),
            local_symbol: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: ContractId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn is_option(&self) -> bool {
        matches!(self.kind, ContractKind::Option { .. })
    }

    /// Fill in the SMART venue when the broker left the exchange blank.
    pub fn ensure_exchange(&mut self) {
        if self.exchange.trim().is_empty() {
            self.exchange = SMART_EXCHANGE.to_string();
        }
    }

    /// Human-readable contract description (e.g., "NVDA 140C 2026-03-20").
    pub fn display_name(&self) -> String {
        if let Some(local) = &self.local_symbol {
            return local.clone();
        }
        match &self.kind {
            ContractKind::Option {
                expiry,
                strike,
                right,
            } => format!("{} {}{} {}", self.symbol, strike.normalize(), right, expiry),
            ContractKind::Stock => self.symbol.clone(),
            ContractKind::Other(kind) => format!("{} ({kind})", self.symbol),
        }
    }

    /// True when this contract describes the same option series as `target`.
    #[must_use]
    pub fn matches_target(&self, target: &TargetContract) -> bool {
        match &self.kind {
            ContractKind::Option {
                expiry,
                strike,
                right,
            } => {
                self.symbol.eq_ignore_ascii_case(&target.symbol)
                    && *expiry == target.expiry
                    && *strike == target.strike
                    && *right == target.right
            }
            _ => false,
        }
    }
}

/// The single option series a stop is configured for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetContract {
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
}

impl TargetContract {
    pub fn to_contract(&self) -> Contract {
        Contract::option(&self.symbol, self.expiry, self.strike, self.right)
    }
}
