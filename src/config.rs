use crate::error::Error;
use axum::http::HeaderValue;
use std::net::SocketAddr;

/// Settings for the Mailgun HTTP API
#[derive(Clone, Debug)]
pub struct MailgunConfig {
    pub url: String,
    pub api_user: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Hosted invoices are served at `{public_base_url}/view/{id}`
    pub public_base_url: String,
    /// In-memory storage is used when this is not set
    pub database_url: Option<String>,
    /// Prefer `X-Forwarded-For` / `X-Real-IP` over the socket address
    pub trust_forwarded_headers: bool,
    pub cors_origins: Vec<HeaderValue>,
    pub mailgun: Option<MailgunConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            public_base_url: String::from("http://localhost:3000"),
            database_url: None,
            trust_forwarded_headers: false,
            cors_origins: vec![HeaderValue::from_static("http://localhost:3000")],
            mailgun: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| Error::ConfigError(format!("BIND_ADDR is not an address: {addr}")))?;
        }

        if let Some(url) = var("PUBLIC_BASE_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::ConfigError(format!(
                    "PUBLIC_BASE_URL must be an http(s) URL: {url}"
                )));
            }
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        config.database_url = var("DATABASE_URL");

        if let Some(flag) = var("TRUST_FORWARDED_HEADERS") {
            config.trust_forwarded_headers = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(Error::ConfigError(format!(
                        "TRUST_FORWARDED_HEADERS is not a boolean: {flag}"
                    )))
                }
            };
        }

        if let Some(origins) = var("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(|origin| {
                    origin.parse::<HeaderValue>().map_err(|_| {
                        Error::ConfigError(format!("CORS_ORIGINS has an invalid origin: {origin}"))
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        let mailgun = [
            "MAILGUN_URL",
            "MAILGUN_USER",
            "MAILGUN_PASSWORD",
            "MAILGUN_FROM",
        ]
        .map(var);
        config.mailgun = match mailgun {
            [Some(url), Some(api_user), Some(api_key), Some(from)] => Some(MailgunConfig {
                url,
                api_user,
                api_key,
                from,
            }),
            [None, None, None, None] => None,
            _ => {
                return Err(Error::ConfigError(String::from(
                    "MAILGUN_URL, MAILGUN_USER, MAILGUN_PASSWORD and MAILGUN_FROM must be set together",
                )))
            }
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
        assert_eq!(config.public_base_url, "http://localhost:3000");
        assert!(config.database_url.is_none());
        assert!(!config.trust_forwarded_headers);
        assert!(config.mailgun.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("BIND_ADDR", "0.0.0.0:8080"),
            ("PUBLIC_BASE_URL", "https://invoices.example.com/"),
            ("TRUST_FORWARDED_HEADERS", "true"),
            ("CORS_ORIGINS", "https://a.example.com, https://b.example.com"),
            ("MAILGUN_URL", "https://api.mailgun.net/v3/example.com/messages"),
            ("MAILGUN_USER", "api"),
            ("MAILGUN_PASSWORD", "key"),
            ("MAILGUN_FROM", "billing@example.com"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.public_base_url, "https://invoices.example.com");
        assert!(config.trust_forwarded_headers);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.mailgun.unwrap().from, "billing@example.com");
    }

    #[test]
    fn rejects_partial_mailgun_settings() {
        let result = load(&[("MAILGUN_URL", "https://api.mailgun.net")]);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(load(&[("BIND_ADDR", "localhost")]).is_err());
        assert!(load(&[("TRUST_FORWARDED_HEADERS", "maybe")]).is_err());
        assert!(load(&[("PUBLIC_BASE_URL", "invoices.example.com")]).is_err());
    }
}
