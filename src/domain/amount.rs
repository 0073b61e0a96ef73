use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary value expressed in the minor units of an asset.
///
/// `value` is kept as the decimal string the wire format uses; `1000` with
/// `asset_scale = 2` is `10.00` of `asset_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub asset_code: String,
    pub asset_scale: u8,
    pub value: String,
}

impl Amount {
    /// Builds an amount, rejecting values that are not non-negative integers.
    pub fn new(
        asset_code: impl Into<String>,
        asset_scale: u8,
        value: impl Into<String>,
    ) -> Result<Self> {
        let amount = Self {
            asset_code: asset_code.into(),
            asset_scale,
            value: value.into(),
        };
        amount.minor_units()?;
        Ok(amount)
    }

    /// Parses `value` as an integer count of minor units.
    pub fn minor_units(&self) -> Result<u128> {
        if self.value.is_empty() || !self.value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TransferError::InvalidAmount(format!(
                "'{}' is not a non-negative integer",
                self.value
            )));
        }
        self.value
            .parse::<u128>()
            .map_err(|e| TransferError::InvalidAmount(format!("'{}': {}", self.value, e)))
    }

    pub fn same_asset(&self, other: &Amount) -> bool {
        self.asset_code == other.asset_code && self.asset_scale == other.asset_scale
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (scale {})", self.value, self.asset_code, self.asset_scale)
    }
}
