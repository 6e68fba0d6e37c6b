//! Static chain metadata used across collectors and the analytic engine:
//! block times, native token info, stablecoin and DEX router tables.

use std::collections::HashMap;

use alloy::primitives::Address;
use once_cell::sync::Lazy;

/// Average block times in seconds. Chains not listed fall back to
/// [`DEFAULT_BLOCK_TIME`].
pub const DEFAULT_BLOCK_TIME: f64 = 15.0;

pub fn block_time_secs(chain_id: u64) -> f64 {
    match chain_id {
        1 => 15.0,       // Ethereum
        56 => 3.0,       // BSC
        137 => 2.0,      // Polygon
        10 => 2.0,       // Optimism
        42161 => 0.25,   // Arbitrum
        43114 => 2.0,    // Avalanche
        250 => 1.0,      // Fantom
        25 => 6.0,       // Cronos
        100 => 5.0,      // Gnosis
        _ => DEFAULT_BLOCK_TIME,
    }
}

/// Estimate how many blocks a time window covers on a chain. Never below 1.
pub fn blocks_from_secs(chain_id: u64, seconds: f64) -> u64 {
    let blocks = (seconds / block_time_secs(chain_id)) as u64;
    blocks.max(1)
}

/// Estimate the wall time a number of blocks spans on a chain.
pub fn secs_from_blocks(chain_id: u64, blocks: f64) -> f64 {
    blocks * block_time_secs(chain_id)
}

pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum".to_string(),
        56 => "Binance Smart Chain".to_string(),
        137 => "Polygon".to_string(),
        10 => "Optimism".to_string(),
        42161 => "Arbitrum".to_string(),
        43114 => "Avalanche".to_string(),
        250 => "Fantom".to_string(),
        25 => "Cronos".to_string(),
        100 => "Gnosis Chain".to_string(),
        other => format!("Chain {other}"),
    }
}

pub fn native_symbol(chain_id: u64) -> &'static str {
    match chain_id {
        56 => "BNB",
        137 => "MATIC",
        43114 => "AVAX",
        250 => "FTM",
        _ => "ETH",
    }
}

pub fn native_decimals(_chain_id: u64) -> u8 {
    18
}

const STABLECOIN_SYMBOLS: &[&str] =
    &["USDT", "USDC", "DAI", "BUSD", "TUSD", "UST", "GUSD", "USDP", "FRAX"];

static STABLECOIN_ADDRESSES: Lazy<HashMap<u64, Vec<Address>>> = Lazy::new(|| {
    HashMap::from([
        (
            1u64,
            vec![
                "0xdac17f958d2ee523a2206206994597c13d831ec7".parse().unwrap(), // USDT
                "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap(), // USDC
                "0x6b175474e89094c44da98b954eedeac495271d0f".parse().unwrap(), // DAI
                "0x4fabb145d64652a948d72533023f6e7a623c7c53".parse().unwrap(), // BUSD
                "0x0000000000085d4780b73119b644ae5ecd22b376".parse().unwrap(), // TUSD
                "0x853d955acef822db058eb8505911ed77f175b99e".parse().unwrap(), // FRAX
            ],
        ),
        (
            56u64,
            vec![
                "0x55d398326f99059ff775485246999027b3197955".parse().unwrap(), // BSC-USDT
                "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d".parse().unwrap(), // BSC-USDC
                "0xe9e7cea3dedca5984780bafc599bd69add087d56".parse().unwrap(), // BUSD
            ],
        ),
        (
            137u64,
            vec![
                "0xc2132d05d31c914a87c6611c10748aeb04b58e8f".parse().unwrap(), // USDT
                "0x2791bca1f2de4661ed88a30c99a7a9449aa84174".parse().unwrap(), // USDC
                "0x8f3cf7ad23cd3cadbd9735aff958023239c6a063".parse().unwrap(), // DAI
            ],
        ),
        (
            10u64,
            vec![
                "0x94b008aa00579c1307b0ef2c499ad98a8ce58e58".parse().unwrap(), // USDT
                "0x7f5c764cbc14f9669b88837ca1490cca17c31607".parse().unwrap(), // USDC
                "0xda10009cbd5d07dd0cecc66161fc93d7c9000da1".parse().unwrap(), // DAI
            ],
        ),
        (
            42161u64,
            vec![
                "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9".parse().unwrap(), // USDT
                "0xff970a61a04b1ca14834a43f5de4533ebddb5cc8".parse().unwrap(), // USDC
                "0xda10009cbd5d07dd0cecc66161fc93d7c9000da1".parse().unwrap(), // DAI
            ],
        ),
    ])
});

/// A token is a stablecoin if its symbol matches or its address is in the
/// per-chain table.
pub fn is_stablecoin(chain_id: u64, token_address: Option<Address>, token_symbol: &str) -> bool {
    if STABLECOIN_SYMBOLS.contains(&token_symbol) {
        return true;
    }
    match (token_address, STABLECOIN_ADDRESSES.get(&chain_id)) {
        (Some(address), Some(known)) => known.contains(&address),
        _ => false,
    }
}

static KNOWN_DEX_ROUTERS: Lazy<HashMap<u64, Vec<Address>>> = Lazy::new(|| {
    HashMap::from([
        (
            1u64,
            vec![
                "0x7a250d5630b4cf539739df2c5dacb4c659f2488d".parse().unwrap(), // Uniswap V2 Router
                "0xe592427a0aece92de3edee1f18e0157c05861564".parse().unwrap(), // Uniswap V3 Router
                "0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f".parse().unwrap(), // SushiSwap Router
                "0x1111111254fb6c44bac0bed2854e76f90643097d".parse().unwrap(), // 1inch Router
                "0x7d2768de32b0b80b7a3454c06bdac94a69ddc7a9".parse().unwrap(), // Aave v2
                "0x3d9819210a31b4961b30ef54be2aed79b9c9cd3b".parse().unwrap(), // Compound
            ],
        ),
        (
            56u64,
            vec![
                "0x05ff2b0db69458a0750badebc4f9e13add608c7f".parse().unwrap(), // PancakeSwap Router
                "0x1111111254fb6c44bac0bed2854e76f90643097d".parse().unwrap(), // 1inch Router
            ],
        ),
        (
            137u64,
            vec![
                "0xa5e0829caced8ffdd4de3c43696c57f7d7a678ff".parse().unwrap(), // QuickSwap Router
                "0x1111111254fb6c44bac0bed2854e76f90643097d".parse().unwrap(), // 1inch Router
            ],
        ),
        (
            10u64,
            vec![
                "0x1111111254fb6c44bac0bed2854e76f90643097d".parse().unwrap(), // 1inch Router
                "0xe592427a0aece92de3edee1f18e0157c05861564".parse().unwrap(), // Uniswap V3 Router
            ],
        ),
        (
            42161u64,
            vec![
                "0x1111111254fb6c44bac0bed2854e76f90643097d".parse().unwrap(), // 1inch Router
                "0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f".parse().unwrap(), // SushiSwap Router
            ],
        ),
    ])
});

pub fn is_known_dex(chain_id: u64, address: Address) -> bool {
    KNOWN_DEX_ROUTERS.get(&chain_id).is_some_and(|routers| routers.contains(&address))
}

/// Hex prefixes of widely deployed router contracts. A stand-in for an
/// on-chain `eth_getCode` lookup where no provider is available.
const CONTRACT_PREFIXES: &[&str] = &[
    "0x7a250d5", // Uniswap Router
    "0xe592427", // Uniswap V3
    "0x111111",  // 1inch
    "0xa5e0829", // QuickSwap
    "0x68b3465", // Uniswap V3 Router 2
    "0xd9e1ce1", // SushiSwap
    "0x05ff2b0", // PancakeSwap
];

/// Cheap contract heuristic for components without an RPC handle: prefix
/// table plus the known router list on any chain.
pub fn is_likely_contract(address: Address) -> bool {
    let hex = format!("{address:#x}");
    if CONTRACT_PREFIXES.iter().any(|prefix| hex.starts_with(prefix)) {
        return true;
    }
    KNOWN_DEX_ROUTERS.values().any(|routers| routers.contains(&address))
}

const COMMON_DEX_TOKENS: &[&str] = &[
    // Base assets and wrapped versions
    "ETH", "WETH", "BTC", "WBTC", "BNB", "WBNB", "MATIC", "WMATIC", "AVAX", "WAVAX",
    // Stablecoins
    "USDT", "USDC", "DAI", "BUSD", "TUSD", "FRAX", "USDP", "GUSD", "LUSD", "MIM",
    // Common DeFi tokens
    "UNI", "SUSHI", "AAVE", "CRV", "BAL", "COMP", "MKR", "SNX", "YFI", "1INCH",
    // Liquid staking tokens
    "STETH", "WSTETH", "RETH", "CBETH", "SFRXETH", "STMATIC",
];

pub fn is_common_dex_token(token_symbol: &str) -> bool {
    COMMON_DEX_TOKENS.contains(&token_symbol)
}

static HIGH_INTEREST_TOKENS: Lazy<HashMap<u64, Vec<Address>>> = Lazy::new(|| {
    HashMap::from([(
        1u64,
        vec![
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".parse().unwrap(), // WETH
            "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599".parse().unwrap(), // WBTC
            "0x7f39c581f595b53c5cb19bd0b3f8da6c935e2ca0".parse().unwrap(), // wstETH
            "0xae7ab96520de3a18e5e111b5eaab095312d7fe84".parse().unwrap(), // stETH
            "0xae78736cd615f374d3085123a210448e74fc6393".parse().unwrap(), // rETH
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".parse().unwrap(), // USDC
            "0xdac17f958d2ee523a2206206994597c13d831ec7".parse().unwrap(), // USDT
            "0x6b175474e89094c44da98b954eedeac495271d0f".parse().unwrap(), // DAI
            "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984".parse().unwrap(), // UNI
            "0xd533a949740bb3306d119cc777fa900ba034cd52".parse().unwrap(), // CRV
        ],
    )])
});

pub fn is_high_interest_token(chain_id: u64, token_address: Option<Address>) -> bool {
    match (token_address, HIGH_INTEREST_TOKENS.get(&chain_id)) {
        (Some(address), Some(tokens)) => tokens.contains(&address),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_window_estimates() {
        // 30 minutes on Ethereum is 120 blocks, on Arbitrum 7200.
        assert_eq!(blocks_from_secs(1, 1800.0), 120);
        assert_eq!(blocks_from_secs(42161, 1800.0), 7200);
        // Never rounds below one block.
        assert_eq!(blocks_from_secs(1, 0.5), 1);
        // Unknown chains use the default block time.
        assert_eq!(blocks_from_secs(999_999, 30.0), 2);
    }

    #[test]
    fn native_symbols_default_to_eth() {
        assert_eq!(native_symbol(1), "ETH");
        assert_eq!(native_symbol(56), "BNB");
        assert_eq!(native_symbol(137), "MATIC");
        assert_eq!(native_symbol(43114), "AVAX");
        assert_eq!(native_symbol(123456), "ETH");
    }

    #[test]
    fn stablecoin_by_symbol_and_address() {
        let usdt: Address = "0xdac17f958d2ee523a2206206994597c13d831ec7".parse().unwrap();
        assert!(is_stablecoin(1, Some(usdt), "WEIRD"));
        assert!(is_stablecoin(1, None, "USDC"));
        assert!(!is_stablecoin(1, Some(Address::repeat_byte(1)), "PEPE"));
    }

    #[test]
    fn contract_prefix_heuristic() {
        let uniswap: Address = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d".parse().unwrap();
        assert!(is_likely_contract(uniswap));
        assert!(is_known_dex(1, uniswap));
        assert!(!is_likely_contract(Address::repeat_byte(0x42)));
    }
}
