use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::payments::types::{Account, Bank, Lang, SecurityModel};

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub endpoints: BankEndpoints,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Garanti sends `TEST` instead of `PROD` in its mode field
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankEndpoints {
    /// API endpoint for transactions and queries
    pub api_url: String,
    /// 3D gateway the redirect form posts to, or the enrollment endpoint
    #[serde(default)]
    pub gateway_3d_url: String,
    /// Hosted payment page, for accounts on the 3D host model
    #[serde(default)]
    pub gateway_3d_host_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoints: BankEndpoints::default(),
            transport: TransportConfig::default(),
            test_mode: false,
        }
    }
}

fn env_prefix(bank: Bank) -> String {
    format!("VPOS_{}", bank.to_string().to_uppercase())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl GatewayConfig {
    pub fn new(api_url: impl Into<String>, gateway_3d_url: impl Into<String>) -> Self {
        Self {
            endpoints: BankEndpoints {
                api_url: api_url.into(),
                gateway_3d_url: gateway_3d_url.into(),
                gateway_3d_host_url: None,
            },
            ..Self::default()
        }
    }

    pub fn with_3d_host_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.gateway_3d_host_url = Some(url.into());
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn from_env(bank: Bank) -> Result<Self> {
        let prefix = env_prefix(bank);

        let endpoints = BankEndpoints {
            api_url: env::var(format!("{}_API_URL", prefix))
                .with_context(|| format!("{}_API_URL not set", prefix))?,
            gateway_3d_url: env::var(format!("{}_GATEWAY_3D_URL", prefix)).unwrap_or_default(),
            gateway_3d_host_url: optional_var(&format!("{}_GATEWAY_3D_HOST_URL", prefix)),
        };

        let transport = TransportConfig {
            timeout_secs: env::var("VPOS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("VPOS_TIMEOUT_SECS must be a valid number")?,
        };

        let test_mode = env::var("VPOS_TEST_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("VPOS_TEST_MODE must be true or false")?;

        let config = Self {
            endpoints,
            transport,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML/YAML/JSON file, with `VPOS__` environment variables
    /// overriding it (`VPOS__ENDPOINTS__API_URL`, ...).
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("VPOS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read {}", path.display()))?
            .try_deserialize()
            .context("invalid gateway configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.endpoints.api_url) {
            return Err(anyhow!("api_url must be an http(s) URL"));
        }

        if !self.endpoints.gateway_3d_url.is_empty() && !is_http_url(&self.endpoints.gateway_3d_url)
        {
            return Err(anyhow!("gateway_3d_url must be an http(s) URL"));
        }

        if let Some(url) = &self.endpoints.gateway_3d_host_url {
            if !is_http_url(url) {
                return Err(anyhow!("gateway_3d_host_url must be an http(s) URL"));
            }
        }

        if self.transport.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than 0"));
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

impl Account {
    /// Merchant account from `VPOS_<BANK>_*` variables.
    pub fn from_env(bank: Bank) -> Result<Self> {
        let prefix = env_prefix(bank);
        let var = |name: &str| {
            env::var(format!("{}_{}", prefix, name))
                .with_context(|| format!("{}_{} not set", prefix, name))
        };

        let model: SecurityModel = var("MODEL")
            .unwrap_or_else(|_| "3d_secure".to_string())
            .parse()
            .with_context(|| format!("{}_MODEL is not a known security model", prefix))?;

        let mut account = Account::new(
            bank,
            var("CLIENT_ID")?,
            var("USERNAME")?,
            var("PASSWORD")?,
            var("STORE_KEY")?,
            model,
        );

        if let Some(terminal_id) = optional_var(&format!("{}_TERMINAL_ID", prefix)) {
            account = account.with_terminal_id(terminal_id);
        }

        if let (Some(username), Some(password)) = (
            optional_var(&format!("{}_REFUND_USERNAME", prefix)),
            optional_var(&format!("{}_REFUND_PASSWORD", prefix)),
        ) {
            account = account.with_refund_credentials(username, password);
        }

        if let Some(lang) = optional_var(&format!("{}_LANG", prefix)) {
            let lang: Lang = lang
                .parse()
                .with_context(|| format!("{}_LANG must be tr or en", prefix))?;
            account = account.with_lang(lang);
        }

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = GatewayConfig::new("ftp://bank.example", "");
        assert!(config.validate().is_err());

        let config = GatewayConfig::new("https://bank.example/api", "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = GatewayConfig::new("https://bank.example/api", "https://bank.example/3d");
        config.transport.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_bank_prefix() {
        env::set_var("VPOS_GARANTI_API_URL", "https://sanalposprov.example/VPServlet");
        env::set_var("VPOS_GARANTI_GATEWAY_3D_URL", "https://sanalposprov.example/3D");

        let config = GatewayConfig::from_env(Bank::Garanti).unwrap();
        assert_eq!(config.endpoints.api_url, "https://sanalposprov.example/VPServlet");
        assert_eq!(config.endpoints.gateway_3d_url, "https://sanalposprov.example/3D");
        assert_eq!(config.endpoints.gateway_3d_host_url, None);
        assert_eq!(config.transport.timeout_secs, 30);
    }

    #[test]
    fn test_account_from_env() {
        env::set_var("VPOS_INTER_CLIENT_ID", "3123");
        env::set_var("VPOS_INTER_USERNAME", "InterTestApi");
        env::set_var("VPOS_INTER_PASSWORD", "3");
        env::set_var("VPOS_INTER_STORE_KEY", "gDg1N");
        env::set_var("VPOS_INTER_MODEL", "3d_pay");

        let account = Account::from_env(Bank::Inter).unwrap();
        assert_eq!(account.client_id, "3123");
        assert_eq!(account.model, SecurityModel::ThreeDPay);
        assert_eq!(account.terminal_id, None);
    }
}
