use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

pub const DEFAULT_BIND: &str = "0.0.0.0:8087";
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";
pub const DEFAULT_REASONING_URL: &str = "http://127.0.0.1:8001/agent/process-message";
pub const DEFAULT_COUNTRY_CODE: &str = "506";
pub const DEFAULT_FOOTER: &str = "Shaymee";

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub app_secret: String,
    pub verify_token: String,
    pub phone_id: String,
    pub user_token: String,
    pub api_base: String,
    pub delivery_timeout: Duration,
    pub probe_every: Duration,
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Extra attempts after the first failure; 0 means fallback-only.
    pub max_retries: u8,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_idle: time::Duration,
    pub sweep_every: Duration,
    /// How long a handled provider message id is remembered.
    pub dedupe_ttl: time::Duration,
}

#[derive(Debug, Clone)]
pub struct ReplyConfig {
    pub default_country_code: String,
    pub local_number_len: usize,
    pub footer: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: SocketAddr,
    pub request_timeout: Duration,
    pub api_token: Option<String>,
    pub channel: ChannelConfig,
    pub reasoning: ReasoningConfig,
    pub sessions: SessionConfig,
    pub reply: ReplyConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{key} must be set"));

        let addr = var("BIND")
            .unwrap_or_else(|| DEFAULT_BIND.into())
            .parse::<SocketAddr>()
            .context("invalid BIND address")?;

        let channel = ChannelConfig {
            app_secret: required("WA_APP_SECRET")?,
            verify_token: var("WA_VERIFY_TOKEN").unwrap_or_default(),
            phone_id: required("WA_PHONE_ID")?,
            user_token: required("WA_USER_TOKEN")?,
            api_base: var("WA_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.into())
                .trim_end_matches('/')
                .to_string(),
            delivery_timeout: millis(&var, "DELIVERY_TIMEOUT_MS", 15_000)?,
            probe_every: secs(&var, "TRANSPORT_PROBE_SECS", 300)?,
        };

        let reasoning = ReasoningConfig {
            url: var("REASONING_URL").unwrap_or_else(|| DEFAULT_REASONING_URL.into()),
            token: var("REASONING_TOKEN"),
            timeout: millis(&var, "REASONING_TIMEOUT_MS", 30_000)?,
            max_retries: parse(&var, "REASONING_RETRIES", 0u8)?,
        };

        let max_idle_secs: i64 = parse(&var, "SESSION_MAX_IDLE_SECS", 86_400)?;
        let dedupe_ttl_secs: i64 = parse(&var, "DEDUPE_TTL_SECS", 86_400)?;
        let sessions = SessionConfig {
            max_idle: time::Duration::seconds(max_idle_secs),
            sweep_every: secs(&var, "SESSION_SWEEP_INTERVAL_SECS", 3_600)?,
            dedupe_ttl: time::Duration::seconds(dedupe_ttl_secs),
        };

        let reply = ReplyConfig {
            default_country_code: var("DEFAULT_COUNTRY_CODE")
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.into()),
            local_number_len: parse(&var, "LOCAL_NUMBER_LEN", 8usize)?,
            footer: var("REPLY_FOOTER").unwrap_or_else(|| DEFAULT_FOOTER.into()),
        };

        let request_timeout = millis(&var, "REQUEST_TIMEOUT_MS", 45_000)?;
        if request_timeout <= reasoning.timeout {
            tracing::warn!(
                request_timeout_ms = request_timeout.as_millis() as u64,
                reasoning_timeout_ms = reasoning.timeout.as_millis() as u64,
                "request timeout does not exceed reasoning timeout; turns may be cut before fallback"
            );
        }

        Ok(Self {
            addr,
            request_timeout,
            api_token: var("API_TOKEN"),
            channel,
            reasoning,
            sessions,
            reply,
        })
    }
}

fn parse<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

fn millis<V: Fn(&str) -> Option<String>>(var: &V, key: &str, default: u64) -> Result<Duration> {
    parse(var, key, default).map(Duration::from_millis)
}

fn secs<V: Fn(&str) -> Option<String>>(var: &V, key: &str, default: u64) -> Result<Duration> {
    parse(var, key, default).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("WA_APP_SECRET", "secret"),
        ("WA_PHONE_ID", "123"),
        ("WA_USER_TOKEN", "token"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = GatewayConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.addr.to_string(), DEFAULT_BIND);
        assert_eq!(cfg.channel.api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.reasoning.max_retries, 0);
        assert_eq!(cfg.reasoning.timeout, Duration::from_secs(30));
        assert_eq!(cfg.sessions.max_idle, time::Duration::hours(24));
        assert_eq!(cfg.sessions.sweep_every, Duration::from_secs(3600));
        assert_eq!(cfg.sessions.dedupe_ttl, time::Duration::hours(24));
        assert_eq!(cfg.reply.default_country_code, "506");
        assert_eq!(cfg.reply.local_number_len, 8);
        assert_eq!(cfg.reply.footer, "Shaymee");
        assert!(cfg.api_token.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = GatewayConfig::from_lookup(lookup(&[("WA_PHONE_ID", "1")])).unwrap_err();
        assert!(err.to_string().contains("WA_APP_SECRET"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("BIND", "127.0.0.1:9000"),
            ("WA_API_BASE", "mock://wa/"),
            ("REASONING_RETRIES", "2"),
            ("REASONING_TIMEOUT_MS", "1500"),
            ("SESSION_MAX_IDLE_SECS", "60"),
            ("DEDUPE_TTL_SECS", "600"),
            ("API_TOKEN", "ops"),
        ]);
        let cfg = GatewayConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.addr.port(), 9000);
        assert_eq!(cfg.channel.api_base, "mock://wa");
        assert_eq!(cfg.reasoning.max_retries, 2);
        assert_eq!(cfg.reasoning.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.sessions.max_idle, time::Duration::minutes(1));
        assert_eq!(cfg.sessions.dedupe_ttl, time::Duration::minutes(10));
        assert_eq!(cfg.api_token.as_deref(), Some("ops"));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("REASONING_RETRIES", "many"));
        let err = GatewayConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("REASONING_RETRIES"));
    }
}
