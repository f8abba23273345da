//! Configuration module for office-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const DEFAULT_AUTHORITIES: &[&str] = &[
    "Ministry of Commerce",
    "Ministry of Labour",
    "Royal Oman Police",
    "Ministry of Health",
];

const DEV_JWT_SECRET: &str = "office-service-dev-secret";

#[derive(Debug, Clone)]
pub struct OfficeConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub pricing: PricingConfig,
    pub catalog: CatalogConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// VAT as a fraction, e.g. `0.05`.
    pub vat_rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub authorities: Vec<String>,
}

impl CatalogConfig {
    pub fn is_known_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

/// Initial admin account, created when no user exists yet.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: Option<String>,
}

impl OfficeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let is_prod = get("ENVIRONMENT").as_deref() == Some("prod");

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET is required in production"
                )));
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let vat_rate = match get("VAT_RATE") {
            Some(raw) => Decimal::from_str(raw.trim()).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid VAT_RATE '{}': {}", raw, e))
            })?,
            None => Decimal::new(5, 2),
        };
        if vat_rate < Decimal::ZERO {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "VAT_RATE cannot be negative"
            )));
        }

        let authorities = match get("CATALOG_AUTHORITIES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_AUTHORITIES.iter().map(|a| a.to_string()).collect(),
        };

        Ok(Self {
            common,
            service_name: get("SERVICE_NAME").unwrap_or_else(|| "office-service".to_string()),
            service_version: get("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: get("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://office.db".to_string()),
                max_connections: get("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: get("DATABASE_MIN_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            },
            auth: AuthConfig {
                jwt_secret,
                token_expiry_minutes: get("JWT_EXPIRY_MINUTES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(480),
            },
            pricing: PricingConfig { vat_rate },
            catalog: CatalogConfig { authorities },
            bootstrap: BootstrapConfig {
                admin_username: get("BOOTSTRAP_ADMIN_USERNAME")
                    .unwrap_or_else(|| "admin".to_string()),
                admin_email: get("BOOTSTRAP_ADMIN_EMAIL")
                    .unwrap_or_else(|| "admin@localhost".to_string()),
                admin_password: get("BOOTSTRAP_ADMIN_PASSWORD"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<OfficeConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OfficeConfig::from_lookup(core_config::Config::default(), |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = load(&[]).unwrap();

        assert_eq!(config.service_name, "office-service");
        assert_eq!(config.database.url, "sqlite://office.db");
        assert_eq!(config.pricing.vat_rate.to_string(), "0.05");
        assert_eq!(config.catalog.authorities.len(), 4);
        assert!(config.bootstrap.admin_password.is_none());
    }

    #[test]
    fn authorities_are_split_and_trimmed() {
        let config = load(&[("CATALOG_AUTHORITIES", " Police , Health,,Labour ")]).unwrap();

        assert_eq!(config.catalog.authorities, vec!["Police", "Health", "Labour"]);
        assert!(config.catalog.is_known_authority("Health"));
        assert!(!config.catalog.is_known_authority("Commerce"));
    }

    #[test]
    fn production_requires_jwt_secret() {
        assert!(load(&[("ENVIRONMENT", "prod")]).is_err());
        let config = load(&[("ENVIRONMENT", "prod"), ("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.auth.jwt_secret, "s3cret");
    }

    #[test]
    fn vat_rate_is_validated() {
        assert!(load(&[("VAT_RATE", "abc")]).is_err());
        assert!(load(&[("VAT_RATE", "-0.05")]).is_err());
        assert_eq!(
            load(&[("VAT_RATE", "0.15")]).unwrap().pricing.vat_rate.to_string(),
            "0.15"
        );
    }
}
