use anyhow::{Context, Result};
use bitcoin::{Amount, OutPoint, Txid};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Unspent entry exactly as the listing endpoint reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUnspent {
    pub address: String,
    pub tx_hash: String,
    pub tx_output_n: u32,
    pub value: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(
        rename = "blockHeight",
        default,
        deserialize_with = "deserialize_block_height"
    )]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Normalized unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub address: String,
    pub outpoint: OutPoint,
    pub value_sat: u64,
    pub confirmations: u64,
    pub block_height: Option<u64>,
    pub script: String,
    pub date: Option<String>,
}

impl Utxo {
    pub fn txid(&self) -> Txid {
        self.outpoint.txid
    }

    pub fn vout(&self) -> u32 {
        self.outpoint.vout
    }

    pub fn amount(&self) -> Amount {
        Amount::from_sat(self.value_sat)
    }
}

impl TryFrom<RawUnspent> for Utxo {
    type Error = anyhow::Error;

    fn try_from(raw: RawUnspent) -> Result<Self> {
        let txid = Txid::from_str(raw.tx_hash.trim())
            .with_context(|| format!("invalid tx_hash '{}'", raw.tx_hash))?;

        Ok(Self {
            address: raw.address,
            outpoint: OutPoint::new(txid, raw.tx_output_n),
            value_sat: raw.value,
            confirmations: raw.confirmations,
            block_height: raw.block_height,
            script: raw.script,
            date: raw.date,
        })
    }
}

/// Sum of the values of `utxos`, saturating instead of overflowing.
pub fn total_value(utxos: &[Utxo]) -> Amount {
    let sats = utxos
        .iter()
        .fold(0u64, |acc, utxo| acc.saturating_add(utxo.value_sat));
    Amount::from_sat(sats)
}

// The listing API reports heights as numbers, numeric strings or null; 0 marks an
// unconfirmed output.
fn deserialize_block_height<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let height = match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => Some(
            number
                .as_u64()
                .ok_or_else(|| D::Error::custom(format!("invalid blockHeight {number}")))?,
        ),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(
                    text.parse::<u64>()
                        .map_err(|err| D::Error::custom(format!("invalid blockHeight: {err}")))?,
                )
            }
        }
        Some(other) => {
            return Err(D::Error::custom(format!(
                "unexpected blockHeight value {other}"
            )))
        }
    };

    Ok(height.filter(|height| *height > 0))
}
