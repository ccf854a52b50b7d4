use alloy::primitives::U256;
use alloy::primitives::utils::{format_units, parse_units};

use crate::error::TxError;

/// An amount as callers hand it to the preflight checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amount {
    /// Already in the token's smallest unit.
    Raw(U256),
    /// Human readable decimal, scaled by the token's precision before use.
    Decimal(String),
}

impl Amount {
    pub fn to_base_units(&self, decimals: u8) -> Result<U256, TxError> {
        match self {
            Amount::Raw(v) => Ok(*v),
            Amount::Decimal(s) => {
                let s = s.trim();
                if s.is_empty() || s.starts_with('-') {
                    return Err(TxError::InvalidAmount(format!("'{s}'")));
                }
                let fraction_digits = s.split_once('.').map_or(0, |(_, frac)| frac.len());
                if fraction_digits > usize::from(decimals) {
                    return Err(TxError::InvalidAmount(format!(
                        "'{s}' has more than {decimals} decimal places"
                    )));
                }
                let parsed = parse_units(s, decimals)
                    .map_err(|e| TxError::InvalidAmount(format!("'{s}': {e}")))?;
                Ok(parsed.into())
            }
        }
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount::Raw(value)
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Amount::Decimal(value.to_string())
    }
}

impl From<String> for Amount {
    fn from(value: String) -> Self {
        Amount::Decimal(value)
    }
}

/// Whole units, e.g. `Amount::from(100u64)` is one hundred tokens.
impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount::Decimal(value.to_string())
    }
}

/// Render a smallest-unit value as a decimal string.
pub fn format_amount(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}
