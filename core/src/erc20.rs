//! ERC20 token metadata lookups (`symbol()`, `name()`, `decimals()`) with a
//! per-token cache so a busy token costs one round of calls.

use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{keccak256, Address, Bytes, U256};
use tokio::sync::RwLock;
use tracing::warn;

use crate::provider::MultiNodeProvider;

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Scale a raw token amount by the token's decimals.
pub fn format_units(value: U256, decimals: u8) -> f64 {
    u256_to_f64(value) / 10f64.powi(decimals as i32)
}

pub(crate) fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::MAX)
}

fn selector(signature: &str) -> Bytes {
    Bytes::copy_from_slice(&keccak256(signature.as_bytes())[..4])
}

/// Decode an ABI-encoded `string` return value. Legacy tokens that declare
/// `bytes32` symbols are handled by trimming the zero padding.
fn decode_abi_string(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }

    if data.len() == 32 {
        let trimmed: Vec<u8> = data.iter().copied().take_while(|b| *b != 0).collect();
        let text = String::from_utf8(trimmed).ok()?;
        return if text.is_empty() { None } else { Some(text) };
    }

    if data.len() < 64 {
        return None;
    }
    let offset = usize::try_from(U256::from_be_slice(&data[..32])).ok()?;
    if data.len() < offset + 32 {
        return None;
    }
    let length = usize::try_from(U256::from_be_slice(&data[offset..offset + 32])).ok()?;
    let start = offset + 32;
    if data.len() < start + length {
        return None;
    }
    String::from_utf8(data[start..start + length].to_vec()).ok()
}

fn decode_abi_u8(data: &[u8]) -> Option<u8> {
    if data.is_empty() || data.len() > 32 {
        return None;
    }
    u8::try_from(U256::from_be_slice(data)).ok()
}

#[derive(Debug, Default)]
pub struct Erc20MetadataReader {
    cache: RwLock<HashMap<Address, Arc<TokenMetadata>>>,
}

impl Erc20MetadataReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or serve from cache) the metadata for a token contract.
    ///
    /// A token that does not answer `symbol()`/`name()` still resolves, with
    /// placeholder values; unknown decimals fall back to 18 with a warning.
    pub async fn metadata(
        &self,
        provider: &MultiNodeProvider,
        address: Address,
    ) -> Arc<TokenMetadata> {
        if let Some(cached) = self.cache.read().await.get(&address) {
            return Arc::clone(cached);
        }

        let symbol = match provider.eth_call(address, selector("symbol()")).await {
            Ok(data) => decode_abi_string(&data),
            Err(e) => {
                warn!("Failed to read symbol() for token {address}: {e}");
                None
            }
        }
        .unwrap_or_else(|| "UNKNOWN".to_string());

        let name = match provider.eth_call(address, selector("name()")).await {
            Ok(data) => decode_abi_string(&data),
            Err(e) => {
                warn!("Failed to read name() for token {address}: {e}");
                None
            }
        }
        .unwrap_or_else(|| symbol.clone());

        let decimals = match provider.eth_call(address, selector("decimals()")).await {
            Ok(data) => decode_abi_u8(&data),
            Err(e) => {
                warn!("Failed to read decimals() for token {address}: {e}");
                None
            }
        }
        .unwrap_or_else(|| {
            warn!("Unknown decimals for token {address}, defaulting to 18");
            18
        });

        let metadata = Arc::new(TokenMetadata { address, name, symbol, decimals });
        self.cache.write().await.insert(address, Arc::clone(&metadata));
        metadata
    }

    pub async fn cached(&self, address: Address) -> Option<Arc<TokenMetadata>> {
        self.cache.read().await.get(&address).map(Arc::clone)
    }
}
