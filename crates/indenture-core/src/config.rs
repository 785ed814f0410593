//! Genesis configuration for the ledger engine.
//!
//! # Configuration Sources
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with `INDENTURE_`)
//! - Configuration files (JSON, via serde)
//! - Programmatic defaults and the builder
//!
//! Everything is validated before the engine is constructed; an invalid
//! bundle never reaches `IndentureLedger::new`.

use serde::{Deserialize, Serialize};

use crate::bounds::RuntimeBounds;
use crate::oracle::QuoteValidation;
use crate::types::{AccountId, Bps, Params, Timestamp, Tokens};
use crate::{IndentureError, Result};

/// Complete genesis configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Token identity and supply.
    pub token: TokenConfig,

    /// Governed and policy-set ledger parameters.
    pub params: ParamsConfig,

    /// Runtime safety bounds.
    pub bounds: BoundsConfig,

    /// Price quote acceptance policy.
    pub oracle: QuoteValidation,
}

/// Token identity and supply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Display label only; carries no semantics.
    pub token_symbol: String,
    /// Display label only; carries no semantics.
    pub stablecoin_symbol: String,
    /// Minor-unit decimals (both assets).
    pub decimals: u8,
    /// Fixed genesis supply, minted to the manager's free balance.
    pub total_supply: u64,
    /// Hex-encoded 32-byte manager (creator/treasury) account id.
    pub manager_hex: String,
    /// Unix seconds of genesis; the first distribution period starts here.
    pub genesis_at: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            token_symbol: "BOND".into(),
            stablecoin_symbol: "USDS".into(),
            decimals: 6,
            total_supply: 1_000_000_000,
            manager_hex: hex::encode([0u8; 32]),
            genesis_at: 0,
        }
    }
}

/// Plain-integer mirror of [`Params`], for serde and env loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsConfig {
    pub collateral_ratio_bps: u16,
    pub interest_rate_bps: u16,
    pub distribution_rate_bps: u16,
    pub distribution_period_secs: u64,
    pub early_withdrawal_penalty_bps: u16,
    pub min_investment: u64,
    pub quorum_bps: u16,
    pub voting_period_secs: u64,
    pub execution_delay_secs: u64,
    pub execution_window_secs: u64,
    pub proposal_threshold: u64,
}

impl ParamsConfig {
    /// Converts into the validated [`Params`] bundle.
    pub fn to_params(&self) -> Result<Params> {
        Params::new(
            Bps::new(self.collateral_ratio_bps)?,
            Bps::new(self.interest_rate_bps)?,
            Bps::new(self.distribution_rate_bps)?,
            self.distribution_period_secs,
            Bps::new(self.early_withdrawal_penalty_bps)?,
            Tokens::new(self.min_investment),
            Bps::new(self.quorum_bps)?,
            self.voting_period_secs,
            self.execution_delay_secs,
            self.execution_window_secs,
            Tokens::new(self.proposal_threshold),
        )
    }

    /// Plain-integer record of a live [`Params`] bundle.
    pub fn from_params(p: &Params) -> Self {
        Self {
            collateral_ratio_bps: p.collateral_ratio().get(),
            interest_rate_bps: p.interest_rate().get(),
            distribution_rate_bps: p.distribution_rate().get(),
            distribution_period_secs: p.distribution_period_secs(),
            early_withdrawal_penalty_bps: p.early_withdrawal_penalty().get(),
            min_investment: p.min_investment().get(),
            quorum_bps: p.quorum().get(),
            voting_period_secs: p.voting_period_secs(),
            execution_delay_secs: p.execution_delay_secs(),
            execution_window_secs: p.execution_window_secs(),
            proposal_threshold: p.proposal_threshold().get(),
        }
    }
}

impl Default for ParamsConfig {
    fn default() -> Self {
        Self {
            collateral_ratio_bps: 3_000,
            interest_rate_bps: 500,
            distribution_rate_bps: 500,
            distribution_period_secs: 30 * 86_400,
            early_withdrawal_penalty_bps: 500,
            min_investment: 1_000,
            quorum_bps: 5_100,
            voting_period_secs: 7 * 86_400,
            execution_delay_secs: 2 * 86_400,
            execution_window_secs: 14 * 86_400,
            proposal_threshold: 10_000,
        }
    }
}

/// Plain-integer mirror of [`RuntimeBounds`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsConfig {
    pub max_accounts: usize,
    pub max_bonds: usize,
    pub max_bonds_per_account: usize,
    pub max_proposals: usize,
    pub max_votes_per_proposal: usize,
}

impl BoundsConfig {
    /// Converts into validated [`RuntimeBounds`].
    pub fn to_bounds(&self) -> Result<RuntimeBounds> {
        RuntimeBounds::new(
            self.max_accounts,
            self.max_bonds,
            self.max_bonds_per_account,
            self.max_proposals,
            self.max_votes_per_proposal,
        )
    }

    pub fn from_bounds(b: RuntimeBounds) -> Self {
        Self {
            max_accounts: b.max_accounts,
            max_bonds: b.max_bonds,
            max_bonds_per_account: b.max_bonds_per_account,
            max_proposals: b.max_proposals,
            max_votes_per_proposal: b.max_votes_per_proposal,
        }
    }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        let b = RuntimeBounds::default();
        Self {
            max_accounts: b.max_accounts,
            max_bonds: b.max_bonds,
            max_bonds_per_account: b.max_bonds_per_account,
            max_proposals: b.max_proposals,
            max_votes_per_proposal: b.max_votes_per_proposal,
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            params: ParamsConfig::default(),
            bounds: BoundsConfig::default(),
            oracle: QuoteValidation {
                max_age_secs: 300,
                min_confidence_bps: 8_000,
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|e| IndentureError::ConfigError(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

impl GenesisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GenesisConfigBuilder {
        GenesisConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `INDENTURE_`:
    /// - `INDENTURE_TOTAL_SUPPLY` - genesis token supply in minor units
    /// - `INDENTURE_MANAGER_HEX` - 64-hex-char manager account id
    /// - `INDENTURE_GENESIS_AT` - genesis time (unix seconds)
    /// - `INDENTURE_COLLATERAL_RATIO_BPS` - required collateral ratio
    /// - `INDENTURE_INTEREST_RATE_BPS` - annual bond coupon rate
    /// - `INDENTURE_DISTRIBUTION_RATE_BPS` - annual yield rate
    /// - `INDENTURE_DISTRIBUTION_PERIOD_SECS` - distribution period length
    /// - `INDENTURE_MAX_QUOTE_AGE_SECS` - oracle freshness window
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = parse_env("INDENTURE_TOTAL_SUPPLY")? {
            config.token.total_supply = v;
        }
        if let Ok(v) = std::env::var("INDENTURE_MANAGER_HEX") {
            config.token.manager_hex = v;
        }
        if let Some(v) = parse_env("INDENTURE_GENESIS_AT")? {
            config.token.genesis_at = v;
        }
        if let Some(v) = parse_env("INDENTURE_COLLATERAL_RATIO_BPS")? {
            config.params.collateral_ratio_bps = v;
        }
        if let Some(v) = parse_env("INDENTURE_INTEREST_RATE_BPS")? {
            config.params.interest_rate_bps = v;
        }
        if let Some(v) = parse_env("INDENTURE_DISTRIBUTION_RATE_BPS")? {
            config.params.distribution_rate_bps = v;
        }
        if let Some(v) = parse_env("INDENTURE_DISTRIBUTION_PERIOD_SECS")? {
            config.params.distribution_period_secs = v;
        }
        if let Some(v) = parse_env("INDENTURE_MAX_QUOTE_AGE_SECS")? {
            config.oracle.max_age_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the whole bundle by constructing every typed view.
    pub fn validate(&self) -> Result<()> {
        if self.token.total_supply == 0 {
            return Err(IndentureError::ConfigError(
                "total_supply must be > 0".into(),
            ));
        }
        if self.token.decimals > 12 {
            return Err(IndentureError::ConfigError(
                "decimals must be <= 12".into(),
            ));
        }
        self.manager()?;
        self.typed_params()?;
        self.runtime_bounds()?;
        QuoteValidation::new(self.oracle.max_age_secs, self.oracle.min_confidence_bps)?;
        Ok(())
    }

    pub fn manager(&self) -> Result<AccountId> {
        AccountId::from_hex(&self.token.manager_hex)
            .map_err(|e| IndentureError::ConfigError(format!("manager_hex: {e}")))
    }

    pub fn genesis_at(&self) -> Timestamp {
        Timestamp(self.token.genesis_at)
    }

    pub fn typed_params(&self) -> Result<Params> {
        self.params
            .to_params()
            .map_err(|e| IndentureError::ConfigError(format!("params: {e}")))
    }

    pub fn runtime_bounds(&self) -> Result<RuntimeBounds> {
        self.bounds
            .to_bounds()
            .map_err(|e| IndentureError::ConfigError(format!("bounds: {e}")))
    }
}

/// Builder for `GenesisConfig`.
#[derive(Default)]
pub struct GenesisConfigBuilder {
    config: GenesisConfig,
}

impl GenesisConfigBuilder {
    pub fn total_supply(mut self, supply: u64) -> Self {
        self.config.token.total_supply = supply;
        self
    }

    pub fn manager_hex(mut self, hex: impl Into<String>) -> Self {
        self.config.token.manager_hex = hex.into();
        self
    }

    pub fn genesis_at(mut self, at: i64) -> Self {
        self.config.token.genesis_at = at;
        self
    }

    pub fn collateral_ratio_bps(mut self, bps: u16) -> Self {
        self.config.params.collateral_ratio_bps = bps;
        self
    }

    pub fn interest_rate_bps(mut self, bps: u16) -> Self {
        self.config.params.interest_rate_bps = bps;
        self
    }

    pub fn distribution_rate_bps(mut self, bps: u16) -> Self {
        self.config.params.distribution_rate_bps = bps;
        self
    }

    pub fn distribution_period_secs(mut self, secs: u64) -> Self {
        self.config.params.distribution_period_secs = secs;
        self
    }

    pub fn early_withdrawal_penalty_bps(mut self, bps: u16) -> Self {
        self.config.params.early_withdrawal_penalty_bps = bps;
        self
    }

    pub fn min_investment(mut self, amount: u64) -> Self {
        self.config.params.min_investment = amount;
        self
    }

    pub fn quorum_bps(mut self, bps: u16) -> Self {
        self.config.params.quorum_bps = bps;
        self
    }

    pub fn voting_period_secs(mut self, secs: u64) -> Self {
        self.config.params.voting_period_secs = secs;
        self
    }

    pub fn execution_delay_secs(mut self, secs: u64) -> Self {
        self.config.params.execution_delay_secs = secs;
        self
    }

    pub fn execution_window_secs(mut self, secs: u64) -> Self {
        self.config.params.execution_window_secs = secs;
        self
    }

    pub fn proposal_threshold(mut self, amount: u64) -> Self {
        self.config.params.proposal_threshold = amount;
        self
    }

    pub fn bounds(mut self, bounds: RuntimeBounds) -> Self {
        self.config.bounds = BoundsConfig::from_bounds(bounds);
        self
    }

    pub fn max_quote_age_secs(mut self, secs: i64) -> Self {
        self.config.oracle.max_age_secs = secs;
        self
    }

    pub fn min_quote_confidence_bps(mut self, bps: u16) -> Self {
        self.config.oracle.min_confidence_bps = bps;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<GenesisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GenesisConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = GenesisConfig::builder()
            .total_supply(1_000_000)
            .manager_hex(hex::encode([7u8; 32]))
            .collateral_ratio_bps(4_000)
            .quorum_bps(6_000)
            .build()
            .expect("should build");

        assert_eq!(config.token.total_supply, 1_000_000);
        assert_eq!(config.params.collateral_ratio_bps, 4_000);
        assert_eq!(config.typed_params().unwrap().unlocked_fraction().get(), 6_000);
    }

    #[test]
    fn invalid_manager_hex_rejected() {
        assert!(GenesisConfig::builder().manager_hex("zz").build().is_err());
        assert!(GenesisConfig::builder().manager_hex("abcd").build().is_err());
    }

    #[test]
    fn zero_supply_rejected() {
        assert!(GenesisConfig::builder().total_supply(0).build().is_err());
    }

    #[test]
    fn rate_above_cap_rejected() {
        assert!(GenesisConfig::builder()
            .interest_rate_bps(1_001)
            .build()
            .is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = GenesisConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GenesisConfig = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.token.total_supply, config.token.total_supply);
    }
}
