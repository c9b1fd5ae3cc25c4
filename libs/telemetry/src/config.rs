use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub format: LogFormat,
    pub filter: String,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name =
            lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version = lookup("OTEL_SERVICE_VERSION")
            .unwrap_or_else(|| default_service_version.to_string());
        let environment = lookup("DEPLOYMENT_ENV").unwrap_or_else(|| "dev".into());
        let format = lookup("LOG_FORMAT")
            .map(|v| match v.to_lowercase().as_str() {
                "text" | "pretty" | "plain" => LogFormat::Text,
                _ => LogFormat::Json,
            })
            .unwrap_or(LogFormat::Json);
        let filter = lookup("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".into());

        Self {
            service_name,
            service_version,
            environment,
            format,
            filter,
        }
    }
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

    #[test]
    fn defaults_to_json_info() {
        let cfg = TelemetryConfig::from_lookup("gateway", "0.1.0", lookup(&[]));
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.filter, "info");
        assert_eq!(cfg.service_name, "gateway");
        assert_eq!(cfg.environment, "dev");
    }

    #[test]
    fn honours_overrides() {
        let cfg = TelemetryConfig::from_lookup(
            "gateway",
            "0.1.0",
            lookup(&[
                ("LOG_FORMAT", "Pretty"),
                ("RUST_LOG", "ccg_gateway=debug"),
                ("OTEL_SERVICE_NAME", "shop-bot"),
                ("DEPLOYMENT_ENV", "prod"),
            ]),
        );
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.filter, "ccg_gateway=debug");
        assert_eq!(cfg.service_name, "shop-bot");
        assert_eq!(cfg.environment, "prod");
    }
}
