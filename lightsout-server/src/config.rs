/// Server settings, read from `LIGHTSOUT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Prefix of every route, without a trailing slash. Empty mounts at `/`.
    pub base_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("LIGHTSOUT_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://lightsout.db".to_string());
        let host = lookup("LIGHTSOUT_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = lookup("LIGHTSOUT_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let base_path = normalize_base_path(
            &lookup("LIGHTSOUT_BASE_PATH").unwrap_or_else(|| "/store".to_string()),
        );

        ServerConfig {
            database_url,
            host,
            port,
            base_path,
        }
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            config(&[]),
            ServerConfig {
                database_url: "sqlite://lightsout.db".into(),
                host: "127.0.0.1".into(),
                port: 8080,
                base_path: "/store".into(),
            }
        );
    }

    #[test]
    fn test_overrides_and_bad_port() {
        let cfg = config(&[
            ("LIGHTSOUT_DATABASE_URL", ":memory:"),
            ("LIGHTSOUT_PORT", "not-a-port"),
            ("LIGHTSOUT_BASE_PATH", "catalog/"),
        ]);
        assert_eq!(cfg.database_url, ":memory:");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.base_path, "/catalog");
        assert_eq!(config(&[("LIGHTSOUT_BASE_PATH", "/")]).base_path, "");
    }
}
