#![forbid(unsafe_code)]

use std::time::Duration;

use gaspump_network::PollPolicy;
use url::Url;

mod gateway;

pub use gateway::Gateway;

pub const DEFAULT_NETWORK_ENDPOINT: &str = "grpcs://st01.testnet.fs.neo.org:8082";
const DEFAULT_TOKEN_LIFETIME_EPOCHS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_POLL_ATTEMPTS: u32 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub network_endpoint: Url,
    /// Epochs ahead of the current one that issued tokens stay valid.
    pub token_lifetime_epochs: u64,
    pub request_timeout: Duration,
    pub poll_policy: PollPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(
            std::env::var("NETWORK_ENDPOINT").ok(),
            std::env::var("TOKEN_LIFETIME_EPOCHS").ok(),
            std::env::var("REQUEST_TIMEOUT_SECS").ok(),
            std::env::var("EACL_POLL_ATTEMPTS").ok(),
            std::env::var("EACL_POLL_INTERVAL_MS").ok(),
        )
    }

    fn from_values(
        network_endpoint: Option<String>,
        token_lifetime_epochs: Option<String>,
        request_timeout_secs: Option<String>,
        poll_attempts: Option<String>,
        poll_interval_ms: Option<String>,
    ) -> anyhow::Result<Self> {
        let network_endpoint = parse_endpoint(
            network_endpoint
                .as_deref()
                .unwrap_or(DEFAULT_NETWORK_ENDPOINT),
        )?;
        let token_lifetime_epochs = parse_positive(
            token_lifetime_epochs,
            "TOKEN_LIFETIME_EPOCHS",
            DEFAULT_TOKEN_LIFETIME_EPOCHS,
        )?;
        let request_timeout = Duration::from_secs(parse_positive(
            request_timeout_secs,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        let attempts = parse_positive(
            poll_attempts,
            "EACL_POLL_ATTEMPTS",
            u64::from(DEFAULT_POLL_ATTEMPTS),
        )?;
        let attempts = u32::try_from(attempts)
            .map_err(|_| anyhow::anyhow!("EACL_POLL_ATTEMPTS is out of range: {attempts}"))?;
        let interval = Duration::from_millis(parse_positive(
            poll_interval_ms,
            "EACL_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);

        Ok(Self {
            network_endpoint,
            token_lifetime_epochs,
            request_timeout,
            poll_policy: PollPolicy { attempts, interval },
        })
    }
}

fn parse_endpoint(raw: &str) -> anyhow::Result<Url> {
    let parsed = Url::parse(raw.trim())
        .map_err(|error| anyhow::anyhow!("invalid NETWORK_ENDPOINT URL {raw:?}: {error}"))?;
    if parsed.scheme() != "grpc" && parsed.scheme() != "grpcs" {
        return Err(anyhow::anyhow!(
            "invalid NETWORK_ENDPOINT URL {raw:?}: must use grpc or grpcs"
        ));
    }
    if parsed.host_str().is_none() {
        return Err(anyhow::anyhow!(
            "invalid NETWORK_ENDPOINT URL {raw:?}: missing host"
        ));
    }
    Ok(parsed)
}

fn parse_positive(value: Option<String>, name: &str, default: u64) -> anyhow::Result<u64> {
    let Some(raw) = value.map(|value| value.trim().to_owned()) else {
        return Ok(default);
    };
    let parsed: u64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid {name} {raw:?}: expected a positive integer"))?;
    if parsed == 0 {
        return Err(anyhow::anyhow!("invalid {name} {raw:?}: must be positive"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::AppConfig;

    #[test]
    fn from_values_uses_defaults() {
        let config =
            AppConfig::from_values(None, None, None, None, None).expect("parse config");

        assert_eq!(
            config.network_endpoint.as_str(),
            "grpcs://st01.testnet.fs.neo.org:8082"
        );
        assert_eq!(config.token_lifetime_epochs, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.poll_policy.attempts, 30);
        assert_eq!(config.poll_policy.interval, Duration::from_secs(1));
    }

    #[test]
    fn from_values_parses_overrides() {
        let config = AppConfig::from_values(
            Some("grpc://localhost:8080".to_owned()),
            Some(" 25 ".to_owned()),
            Some("3".to_owned()),
            Some("5".to_owned()),
            Some("250".to_owned()),
        )
        .expect("parse config");

        assert_eq!(config.network_endpoint.host_str(), Some("localhost"));
        assert_eq!(config.network_endpoint.port(), Some(8080));
        assert_eq!(config.token_lifetime_epochs, 25);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.poll_policy.attempts, 5);
        assert_eq!(config.poll_policy.interval, Duration::from_millis(250));
    }

    #[test]
    fn from_values_rejects_non_grpc_endpoint() {
        let error = AppConfig::from_values(
            Some("https://st01.testnet.fs.neo.org".to_owned()),
            None,
            None,
            None,
            None,
        )
        .expect_err("https endpoint should fail");
        assert!(error.to_string().contains("grpc or grpcs"));

        let error = AppConfig::from_values(Some("not a url".to_owned()), None, None, None, None)
            .expect_err("invalid endpoint should fail");
        assert!(error.to_string().contains("invalid NETWORK_ENDPOINT URL"));
    }

    #[test]
    fn from_values_rejects_zero_and_garbage_numbers() {
        let error = AppConfig::from_values(None, Some("0".to_owned()), None, None, None)
            .expect_err("zero lifetime should fail");
        assert!(error.to_string().contains("TOKEN_LIFETIME_EPOCHS"));

        let error = AppConfig::from_values(None, None, Some("soon".to_owned()), None, None)
            .expect_err("garbage timeout should fail");
        assert!(error.to_string().contains("REQUEST_TIMEOUT_SECS"));

        let error = AppConfig::from_values(None, None, None, Some("-1".to_owned()), None)
            .expect_err("negative attempts should fail");
        assert!(error.to_string().contains("EACL_POLL_ATTEMPTS"));
    }

    #[test]
    fn from_values_rejects_attempts_beyond_u32() {
        let error = AppConfig::from_values(
            None,
            None,
            None,
            Some("4294967296".to_owned()),
            None,
        )
        .expect_err("attempts overflow should fail");
        assert!(error.to_string().contains("out of range"));
    }
}
