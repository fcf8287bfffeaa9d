use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/analytics_db";
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub groq_api_key: Option<String>,
    pub model: String,
    pub chat_base_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub max_pool_size: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    nlq_listen_addr: Option<String>,
    #[serde(default)]
    nlq_listen_host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    groq_api_key: Option<String>,
    #[serde(default)]
    nlq_model: Option<String>,
    #[serde(default)]
    nlq_chat_base_url: Option<String>,
    #[serde(default)]
    cors_origins: Option<String>,
    #[serde(default = "default_pool_size")]
    nlq_max_pool_size: u32,
    #[serde(default = "default_connect_timeout_secs")]
    nlq_connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    nlq_request_timeout_secs: u64,
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse NLQ_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(raw.nlq_listen_addr, raw.nlq_listen_host, raw.port)?;

        let database_url = raw
            .database_url
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let groq_api_key = raw
            .groq_api_key
            .and_then(|key| {
                let trimmed = key.trim().to_string();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed)
                }
            });

        let cors_origins = parse_origins(raw.cors_origins.as_deref());

        Ok(Self {
            listen_addr,
            database_url,
            groq_api_key,
            model: raw.nlq_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            chat_base_url: raw.nlq_chat_base_url,
            cors_origins,
            max_pool_size: raw.nlq_max_pool_size.max(1),
            connect_timeout: Duration::from_secs(raw.nlq_connect_timeout_secs.max(1)),
            request_timeout: Duration::from_secs(raw.nlq_request_timeout_secs.max(1)),
        })
    }
}

fn parse_origins(csv: Option<&str>) -> Vec<String> {
    let parsed: Vec<String> = csv
        .unwrap_or_default()
        .split(',')
        .filter_map(|part| {
            let entry = part.trim();
            if entry.is_empty() {
                None
            } else {
                Some(entry.to_string())
            }
        })
        .collect();

    if parsed.is_empty() {
        vec![DEFAULT_CORS_ORIGIN.to_string()]
    } else {
        parsed
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid NLQ_LISTEN_ADDR value")?
            .next()
            .context("NLQ_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8000);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawConfig {
        RawConfig {
            nlq_listen_addr: None,
            nlq_listen_host: None,
            port: None,
            database_url: None,
            groq_api_key: None,
            nlq_model: None,
            nlq_chat_base_url: None,
            cors_origins: None,
            nlq_max_pool_size: default_pool_size(),
            nlq_connect_timeout_secs: default_connect_timeout_secs(),
            nlq_request_timeout_secs: default_timeout_secs(),
        }
    }

    #[test]
    fn defaults_fill_every_field() {
        let config = AppConfig::from_raw(raw()).unwrap();
        assert_eq!(config.listen_addr.port(), 8000);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.cors_origins, vec![DEFAULT_CORS_ORIGIN.to_string()]);
        assert!(config.groq_api_key.is_none());
        assert!(config.chat_base_url.is_none());
    }

    #[test]
    fn port_overrides_listen_port() {
        let mut input = raw();
        input.port = Some(9100);
        let config = AppConfig::from_raw(input).unwrap();
        assert_eq!(config.listen_addr.port(), 9100);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let parsed = parse_origins(Some(
            "http://localhost:3000, https://dash.example.com ,,  ",
        ));
        assert_eq!(
            parsed,
            vec![
                "http://localhost:3000".to_string(),
                "https://dash.example.com".to_string(),
            ]
        );
    }

    #[test]
    fn empty_origin_list_falls_back_to_default() {
        assert_eq!(parse_origins(Some(" , ,")), vec![DEFAULT_CORS_ORIGIN]);
        assert_eq!(parse_origins(None), vec![DEFAULT_CORS_ORIGIN]);
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let mut input = raw();
        input.groq_api_key = Some("   ".to_string());
        let config = AppConfig::from_raw(input).unwrap();
        assert!(config.groq_api_key.is_none());
    }
}
