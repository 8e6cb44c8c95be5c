//! Per-network consensus parameters.
//!
//! Parameters are fixed for the life of the process. They come either from a
//! preset (`mainnet()`, `testnet()`, `regtest()`) or from a TOML file, where
//! any field left out falls back to the preset named by `network`.

use crate::compact::decode_compact;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating parameters.
#[derive(Error, Debug)]
pub enum ParamsError {
    /// Config file could not be read.
    #[error("Failed to read params file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("Failed to parse params: {0}")]
    Parse(#[from] toml::de::Error),

    /// A parameter is out of range.
    #[error("Invalid parameter {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Network selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

/// Consensus parameters for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Network these parameters belong to.
    pub network: Network,
    /// Maximum money supply, in whole coins.
    pub max_money: i64,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: u32,
    /// Target duration of one retarget window, in seconds.
    pub pow_target_timespan: i64,
    /// Blocks per retarget window.
    pub pow_retarget_interval: u32,
    /// Compact encoding of the easiest allowed target.
    pub pow_limit_bits: u32,
    /// Header timestamp from which P2SH evaluation is enforced.
    pub p2sh_activation_time: u32,
    /// Maximum signature operations per block.
    pub max_block_sigops: u32,
    /// Confirmations before a coinbase output may be spent.
    pub coinbase_maturity: u32,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Partially specified parameters as read from a config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamsConfig {
    #[serde(default)]
    network: Network,
    max_money: Option<i64>,
    subsidy_halving_interval: Option<u32>,
    pow_target_timespan: Option<i64>,
    pow_retarget_interval: Option<u32>,
    pow_limit_bits: Option<u32>,
    p2sh_activation_time: Option<u32>,
    max_block_sigops: Option<u32>,
    coinbase_maturity: Option<u32>,
}

impl ConsensusParams {
    /// Main network.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            max_money: 21_000_000,
            subsidy_halving_interval: 210_000,
            pow_target_timespan: 14 * 24 * 60 * 60,
            pow_retarget_interval: 2016,
            pow_limit_bits: 0x1d00ffff,
            p2sh_activation_time: 1_333_238_400,
            max_block_sigops: 20_000,
            coinbase_maturity: 100,
        }
    }

    /// Public test network.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            p2sh_activation_time: 1_329_264_000,
            ..Self::mainnet()
        }
    }

    /// Local regression-test network: trivial work, fast halvings, P2SH always on.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            subsidy_halving_interval: 150,
            pow_limit_bits: 0x207fffff,
            p2sh_activation_time: 0,
            ..Self::mainnet()
        }
    }

    /// Preset for a network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Parse parameters from TOML text and validate them.
    pub fn from_toml_str(content: &str) -> Result<Self, ParamsError> {
        let config: ParamsConfig = toml::from_str(content)?;
        let base = Self::for_network(config.network);
        let params = Self {
            network: config.network,
            max_money: config.max_money.unwrap_or(base.max_money),
            subsidy_halving_interval: config
                .subsidy_halving_interval
                .unwrap_or(base.subsidy_halving_interval),
            pow_target_timespan: config
                .pow_target_timespan
                .unwrap_or(base.pow_target_timespan),
            pow_retarget_interval: config
                .pow_retarget_interval
                .unwrap_or(base.pow_retarget_interval),
            pow_limit_bits: config.pow_limit_bits.unwrap_or(base.pow_limit_bits),
            p2sh_activation_time: config
                .p2sh_activation_time
                .unwrap_or(base.p2sh_activation_time),
            max_block_sigops: config.max_block_sigops.unwrap_or(base.max_block_sigops),
            coinbase_maturity: config.coinbase_maturity.unwrap_or(base.coinbase_maturity),
        };
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ParamsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.max_money <= 0 {
            return Err(ParamsError::Invalid {
                field: "max_money",
                reason: format!("must be positive, got {}", self.max_money),
            });
        }
        if self.subsidy_halving_interval == 0 {
            return Err(ParamsError::Invalid {
                field: "subsidy_halving_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.pow_retarget_interval == 0 {
            return Err(ParamsError::Invalid {
                field: "pow_retarget_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.pow_target_timespan < 4 {
            return Err(ParamsError::Invalid {
                field: "pow_target_timespan",
                reason: format!("must be at least 4 seconds, got {}", self.pow_target_timespan),
            });
        }
        let limit = decode_compact(self.pow_limit_bits);
        if limit.negative || limit.overflow || limit.value == num_bigint::BigUint::from(0u32) {
            return Err(ParamsError::Invalid {
                field: "pow_limit_bits",
                reason: format!("{:#010x} is not a usable target", self.pow_limit_bits),
            });
        }
        Ok(())
    }
}
