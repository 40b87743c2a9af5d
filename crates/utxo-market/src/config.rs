//! Market configuration.

use serde::{Deserialize, Serialize};
use utxo_core::{Amount, SchemeVersion};
use utxo_tx::{AssemblerConfig, DEFAULT_DUST_THRESHOLD, DEFAULT_FEE};

/// Four weeks of one-minute blocks.
pub const DEFAULT_EXPIRY_BLOCKS: u32 = 40_320;

/// Configuration for [`OrderBook`](crate::OrderBook).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Blocks an order stays fillable when no expiry is given.
    pub default_expiry_blocks: u32,
    /// Fee paid by every market transaction.
    pub fee: Amount,
    /// Plain change below this is added to the fee.
    pub dust_threshold: Amount,
    /// Scheme new orders and their outputs are written under.
    pub scheme: SchemeVersion,
    /// Reject fills priced worse for the resting order than posted.
    pub enforce_price_guard: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_expiry_blocks: DEFAULT_EXPIRY_BLOCKS,
            fee: DEFAULT_FEE,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            scheme: SchemeVersion::V2,
            enforce_price_guard: true,
        }
    }
}

impl MarketConfig {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> MarketConfigBuilder {
        MarketConfigBuilder::default()
    }

    /// Assembler settings for market transactions.
    #[must_use]
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig::builder()
            .default_fee(self.fee)
            .dust_threshold(self.dust_threshold)
            .output_scheme(self.scheme)
            .build()
    }
}

/// Builder for [`MarketConfig`].
#[derive(Debug, Clone, Default)]
pub struct MarketConfigBuilder {
    config: MarketConfig,
}

impl MarketConfigBuilder {
    /// Sets the default expiry window.
    #[must_use]
    pub const fn default_expiry_blocks(mut self, blocks: u32) -> Self {
        self.config.default_expiry_blocks = blocks;
        self
    }

    /// Sets the transaction fee.
    #[must_use]
    pub const fn fee(mut self, fee: Amount) -> Self {
        self.config.fee = fee;
        self
    }

    /// Sets the dust threshold.
    #[must_use]
    pub const fn dust_threshold(mut self, threshold: Amount) -> Self {
        self.config.dust_threshold = threshold;
        self
    }

    /// Sets the scheme for new orders.
    #[must_use]
    pub const fn scheme(mut self, scheme: SchemeVersion) -> Self {
        self.config.scheme = scheme;
        self
    }

    /// Enables or disables the fill price guard.
    #[must_use]
    pub const fn enforce_price_guard(mut self, enforce: bool) -> Self {
        self.config.enforce_price_guard = enforce;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> MarketConfig {
        self.config
    }
}
