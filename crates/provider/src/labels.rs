//! Static label registry for well-known Ethereum mainnet addresses.
//!
//! Lets the report name the usual suspects (stablecoins, WETH, DEX routers)
//! without an external API call.

use alloy_primitives::{address, Address};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Protocol name and human label for an address.
#[derive(Debug, Clone)]
pub struct AddressLabel {
    pub protocol: &'static str,
    pub name: &'static str,
}

impl AddressLabel {
    const fn new(protocol: &'static str, name: &'static str) -> Self {
        Self { protocol, name }
    }
}

/// Returns the label for a known address, if any.
pub fn lookup(address: &Address) -> Option<&'static AddressLabel> {
    KNOWN_LABELS.get(address)
}

/// `"Protocol / Name"` for known addresses, the checksummed address otherwise.
pub fn display_name(address: &Address) -> String {
    match lookup(address) {
        Some(l) => format!("{} / {}", l.protocol, l.name),
        None => address.to_string(),
    }
}

static KNOWN_LABELS: LazyLock<HashMap<Address, AddressLabel>> = LazyLock::new(|| {
    let entries = [
        // ── Tokens ───────────────────────────────────────────────
        (
            address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            AddressLabel::new("WETH", "Wrapped Ether"),
        ),
        (
            address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            AddressLabel::new("USDC", "USD Coin"),
        ),
        (
            address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            AddressLabel::new("USDT", "Tether USD"),
        ),
        (
            address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
            AddressLabel::new("DAI", "Dai Stablecoin"),
        ),
        (
            address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
            AddressLabel::new("WBTC", "Wrapped BTC"),
        ),
        (
            address!("514910771AF9Ca656af840dff83E8264EcF986CA"),
            AddressLabel::new("LINK", "Chainlink Token"),
        ),
        (
            address!("1f9840a85d5aF5bf1D1762F925BDADdC4201F984"),
            AddressLabel::new("UNI", "Uniswap Token"),
        ),
        (
            address!("95aD61b0a150d79219dCF64E1E6Cc01f0B64C4cE"),
            AddressLabel::new("SHIB", "Shiba Inu"),
        ),
        (
            address!("6982508145454Ce325dDbE47a25d4ec3d2311933"),
            AddressLabel::new("PEPE", "Pepe"),
        ),
        (
            address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
            AddressLabel::new("Lido", "stETH"),
        ),
        (
            address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"),
            AddressLabel::new("Lido", "wstETH"),
        ),
        // ── Routers that move tokens on behalf of users ──────────
        (
            address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
            AddressLabel::new("Uniswap", "V2 Router"),
        ),
        (
            address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45"),
            AddressLabel::new("Uniswap", "V3 SwapRouter02"),
        ),
        (
            address!("3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD"),
            AddressLabel::new("Uniswap", "Universal Router"),
        ),
        (
            address!("111111125421cA6dc452d289314280a0f8842A65"),
            AddressLabel::new("1inch", "V6 Router"),
        ),
        (
            address!("881D40237659C251811CEC9c364ef91dC08D300C"),
            AddressLabel::new("MetaMask", "Swap Router"),
        ),
    ];

    entries.into_iter().collect()
});
