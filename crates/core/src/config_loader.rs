use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

/// Default location of the TOML config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Environment variable prefix; nested keys use `__` (e.g. `STOPGUARD_EXIT__POLICY`).
pub const ENV_PREFIX: &str = "STOPGUARD_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the default TOML file plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration by layering built-in defaults, the TOML file at `path`
    /// and `STOPGUARD_`-prefixed environment variables, in that order.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {path}"))?;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExitPolicy, QuantitySource};
    use crate::contract::OptionRight;
    use figment::Jail;
    use rust_decimal_macros::dec;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::load_from("nope/Config.toml").expect("defaults");
            assert_eq!(config.stop_loss.stop_loss_pct, dec!(10));
            assert_eq!(config.quote.retries, 3);
            Ok(())
        });
    }

    #[test]
    fn toml_and_env_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "Config.toml",
                r#"
                [account]
                account_id = "DUN086112"

                [stop_loss]
                stop_loss_pct = 25
                entry_price = "11.40"

                [stop_loss.target]
                symbol = "TSLA"
                expiry = "2025-07-25"
                strike = 330
                right = "P"

                [exit]
                policy = "market_only"
                "#,
            )?;
            jail.set_env("STOPGUARD_EXIT__QUANTITY_SOURCE", "snapshot");
            jail.set_env("STOPGUARD_QUOTE__RETRIES", "5");

            let config = ConfigLoader::load_from("Config.toml").expect("config");
            assert_eq!(config.account.account_id.as_deref(), Some("DUN086112"));
            assert_eq!(config.stop_loss.stop_loss_pct, dec!(25));
            assert_eq!(config.stop_loss.entry_price, Some(dec!(11.40)));
            let target = config.stop_loss.target.expect("target");
            assert_eq!(target.symbol, "TSLA");
            assert_eq!(target.right, OptionRight::Put);
            assert_eq!(config.exit.policy, ExitPolicy::MarketOnly);
            assert_eq!(config.exit.quantity_source, QuantitySource::Snapshot);
            assert_eq!(config.quote.retries, 5);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_to_load() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", "[stop_loss]\nstop_loss_pct = -5\n")?;
            assert!(ConfigLoader::load_from("Config.toml").is_err());
            Ok(())
        });
    }
}
