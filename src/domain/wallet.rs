use super::amount::Amount;
use serde::{Deserialize, Serialize};

/// Public description of a wallet address, as served at the wallet URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_name: Option<String>,
    pub asset_code: String,
    pub asset_scale: u8,
    pub auth_server: String,
    pub resource_server: String,
}

impl WalletDescriptor {
    /// An amount of `minor_units` in this wallet's asset.
    pub fn amount(&self, minor_units: u128) -> Amount {
        Amount {
            asset_code: self.asset_code.clone(),
            asset_scale: self.asset_scale,
            value: minor_units.to_string(),
        }
    }
}
