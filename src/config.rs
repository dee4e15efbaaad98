//! Command-line and environment configuration.

use crate::application::coordinator::SettlementSettings;
use crate::application::retry::RetryPolicy;
use crate::domain::pricing::{FeeSchedule, GOVERNMENT_TAX_RATE, PLATFORM_FEE_RATE};
use crate::error::{CheckoutError, Result};
use clap::Args;
use rust_decimal::Decimal;
use std::time::Duration;

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Pricing and settlement settings.
#[derive(Debug, Clone, Args)]
pub struct CheckoutConfig {
    /// Government tax rate applied to the subtotal.
    #[arg(long, global = true, env = "CHECKOUT_GOVERNMENT_TAX_RATE", default_value_t = GOVERNMENT_TAX_RATE)]
    pub government_tax_rate: Decimal,

    /// Platform fee rate applied to the subtotal.
    #[arg(long, global = true, env = "CHECKOUT_PLATFORM_FEE_RATE", default_value_t = PLATFORM_FEE_RATE)]
    pub platform_fee_rate: Decimal,

    /// Largest accepted difference between the local and the authority total.
    #[arg(long, global = true, env = "CHECKOUT_DESYNC_TOLERANCE", default_value = "0.01")]
    pub desync_tolerance: Decimal,

    /// Attempts per authority request before giving up.
    #[arg(long, global = true, env = "CHECKOUT_RETRY_MAX_ATTEMPTS", default_value_t = 4)]
    pub retry_max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds.
    #[arg(long, global = true, env = "CHECKOUT_RETRY_INITIAL_BACKOFF_MS", default_value_t = 200)]
    pub retry_initial_backoff_ms: u64,

    /// Upper bound for the backoff, in milliseconds.
    #[arg(long, global = true, env = "CHECKOUT_RETRY_MAX_BACKOFF_MS", default_value_t = 2000)]
    pub retry_max_backoff_ms: u64,

    /// Timeout of a single authority request, in milliseconds.
    #[arg(long, global = true, env = "CHECKOUT_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,
}

impl CheckoutConfig {
    pub fn fee_schedule(&self) -> Result<FeeSchedule> {
        FeeSchedule::new(self.government_tax_rate, self.platform_fee_rate)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn settlement_settings(&self) -> Result<SettlementSettings> {
        if self.desync_tolerance < Decimal::ZERO {
            return Err(CheckoutError::InvalidCartState(format!(
                "desync tolerance {} must not be negative",
                self.desync_tolerance
            )));
        }
        Ok(SettlementSettings {
            fees: self.fee_schedule()?,
            retry: self.retry_policy(),
            desync_tolerance: self.desync_tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rust_decimal_macros::dec;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        checkout: CheckoutConfig,

        #[command(flatten)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_defaults_match_built_in_settings() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();

        assert_eq!(
            cli.checkout.settlement_settings().unwrap(),
            SettlementSettings::default()
        );
        assert_eq!(cli.logging.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--government-tax-rate",
            "0.1",
            "--retry-max-attempts",
            "2",
            "--log-format",
            "json",
        ])
        .unwrap();

        let settings = cli.checkout.settlement_settings().unwrap();
        assert_eq!(settings.fees.government_tax_rate(), dec!(0.1));
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(cli.logging.log_format, LogFormat::Json);
    }

    #[test]
    fn test_negative_rate_is_rejected() {
        let cli = TestCli::try_parse_from(["test", "--platform-fee-rate=-0.01"]).unwrap();

        assert!(matches!(
            cli.checkout.fee_schedule(),
            Err(CheckoutError::InvalidCartState(_))
        ));
    }
}
