//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATA_DIR`: directory holding `orders.json`, `cart.json`, `stock.json` (default: `./data`)
/// - `BUS_URL`: NATS server, e.g. `nats://127.0.0.1:4222` (default: none, in-process broker)
/// - `BUS_EXCHANGE`: topic exchange name (default: `"default"`)
/// - `PAYMENT_MODE`: `http` or `simulated` (default: `http`)
/// - `PAYMENT_APPROVAL_RATE`: share of simulated payments approved (default: `0.5`)
/// - `PAYMENT_GATEWAY_URL`: payment webhook (default: `http://127.0.0.1:8090/webhook/payment`)
/// - `PAYMENT_TIMEOUT_MS`: gateway request timeout (default: `5000`)
/// - `FULFILLMENT_DELAY_MS`: simulated shipping delay (default: `5000`)
/// - `RETRY_MAX_ATTEMPTS`: deliveries per message before dead-lettering (default: `3`)
/// - `RETRY_BACKOFF_MS`: wait before a redelivery (default: `200`)
/// - `WARMUP_URLS`: comma-separated URLs pinged after each order (default: none)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub bus_url: Option<String>,
    pub bus_exchange: String,
    pub payment_mode: PaymentMode,
    pub payment_gateway_url: String,
    pub payment_timeout: Duration,
    pub fulfillment_delay: Duration,
    pub retry_max_attempts: u32,
    pub retry_backoff: Duration,
    pub warmup_urls: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup. Unparseable values
    /// fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bus_url: lookup("BUS_URL")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .or(defaults.bus_url),
            bus_exchange: lookup("BUS_EXCHANGE").unwrap_or(defaults.bus_exchange),
            payment_mode: payment_mode(
                lookup("PAYMENT_MODE").as_deref(),
                lookup("PAYMENT_APPROVAL_RATE").and_then(|r| r.trim().parse().ok()),
            )
            .unwrap_or(defaults.payment_mode),
            payment_gateway_url: lookup("PAYMENT_GATEWAY_URL")
                .unwrap_or(defaults.payment_gateway_url),
            payment_timeout: millis("PAYMENT_TIMEOUT_MS", defaults.payment_timeout),
            fulfillment_delay: millis("FULFILLMENT_DELAY_MS", defaults.fulfillment_delay),
            retry_max_attempts: parsed("RETRY_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.retry_max_attempts),
            retry_backoff: millis("RETRY_BACKOFF_MS", defaults.retry_backoff),
            warmup_urls: lookup("WARMUP_URLS")
                .map(|urls| split_urls(&urls))
                .unwrap_or(defaults.warmup_urls),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which payment gateway orders are authorized against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaymentMode {
    /// `POST` to `PAYMENT_GATEWAY_URL`.
    Http,
    /// Approve at random with the given probability.
    Simulated { approval_rate: f64 },
}

fn payment_mode(mode: Option<&str>, approval_rate: Option<f64>) -> Option<PaymentMode> {
    match mode?.trim().to_ascii_lowercase().as_str() {
        "http" => Some(PaymentMode::Http),
        "simulated" | "random" => Some(PaymentMode::Simulated {
            approval_rate: approval_rate.unwrap_or(0.5),
        }),
        _ => None,
    }
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            data_dir: PathBuf::from("./data"),
            bus_url: None,
            bus_exchange: "default".to_string(),
            payment_mode: PaymentMode::Http,
            payment_gateway_url: "http://127.0.0.1:8090/webhook/payment".to_string(),
            payment_timeout: Duration::from_millis(5000),
            fulfillment_delay: Duration::from_millis(5000),
            retry_max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            warmup_urls: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.bus_exchange, "default");
        assert_eq!(config.bus_url, None);
        assert_eq!(config.payment_mode, PaymentMode::Http);
        assert_eq!(config.fulfillment_delay, Duration::from_secs(5));
        assert_eq!(config.retry_max_attempts, 3);
        assert!(config.warmup_urls.is_empty());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "9000"),
            ("DATA_DIR", "/tmp/saga"),
            ("FULFILLMENT_DELAY_MS", "10"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("WARMUP_URLS", "http://a/, ,http://b/"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/saga"));
        assert_eq!(config.fulfillment_delay, Duration::from_millis(10));
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.warmup_urls, vec!["http://a/", "http://b/"]);
    }

    #[test]
    fn test_bus_url_selects_nats() {
        let config = from_pairs(&[("BUS_URL", " nats://bus:4222 ")]);
        assert_eq!(config.bus_url.as_deref(), Some("nats://bus:4222"));

        let config = from_pairs(&[("BUS_URL", "")]);
        assert_eq!(config.bus_url, None);
    }

    #[test]
    fn test_payment_mode() {
        let config = from_pairs(&[("PAYMENT_MODE", "Simulated"), ("PAYMENT_APPROVAL_RATE", "0.8")]);
        assert_eq!(
            config.payment_mode,
            PaymentMode::Simulated { approval_rate: 0.8 }
        );

        let config = from_pairs(&[("PAYMENT_MODE", "random")]);
        assert_eq!(
            config.payment_mode,
            PaymentMode::Simulated { approval_rate: 0.5 }
        );

        let config = from_pairs(&[("PAYMENT_MODE", "paypal")]);
        assert_eq!(config.payment_mode, PaymentMode::Http);
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = from_pairs(&[("PORT", "http"), ("RETRY_BACKOFF_MS", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.retry_backoff, Duration::from_millis(200));
    }
}
