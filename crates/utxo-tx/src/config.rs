//! Assembler configuration.

use serde::{Deserialize, Serialize};
use utxo_core::{Amount, SchemeVersion};

/// Default network fee in minimal units.
pub const DEFAULT_FEE: Amount = Amount::from_units(10_000);

/// Plain change below this is folded into the fee.
pub const DEFAULT_DUST_THRESHOLD: Amount = Amount::from_units(10_000);

/// Default cap on inputs per transaction.
pub const DEFAULT_MAX_INPUTS: usize = 1_000;

/// Configuration for [`TxAssembler`](crate::TxAssembler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Fee used when `begin` is given no reserve.
    pub default_fee: Amount,
    /// Plain change below this is added to the fee instead of paid out.
    pub dust_threshold: Amount,
    /// Maximum inputs a staged transaction may select.
    pub max_inputs: usize,
    /// Scheme used for new outputs.
    pub output_scheme: SchemeVersion,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            default_fee: DEFAULT_FEE,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            max_inputs: DEFAULT_MAX_INPUTS,
            output_scheme: SchemeVersion::V2,
        }
    }
}

impl AssemblerConfig {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> AssemblerConfigBuilder {
        AssemblerConfigBuilder::default()
    }
}

/// Builder for [`AssemblerConfig`].
#[derive(Debug, Clone, Default)]
pub struct AssemblerConfigBuilder {
    config: AssemblerConfig,
}

impl AssemblerConfigBuilder {
    /// Sets the default fee.
    #[must_use]
    pub const fn default_fee(mut self, fee: Amount) -> Self {
        self.config.default_fee = fee;
        self
    }

    /// Sets the dust threshold.
    #[must_use]
    pub const fn dust_threshold(mut self, threshold: Amount) -> Self {
        self.config.dust_threshold = threshold;
        self
    }

    /// Sets the input cap.
    #[must_use]
    pub const fn max_inputs(mut self, max: usize) -> Self {
        self.config.max_inputs = max;
        self
    }

    /// Sets the scheme for new outputs.
    #[must_use]
    pub const fn output_scheme(mut self, scheme: SchemeVersion) -> Self {
        self.config.output_scheme = scheme;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> AssemblerConfig {
        self.config
    }
}
