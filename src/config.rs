use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_DOWNLOAD_PATH: &str = "./downloads";
pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Debug, Clone)]
pub struct Config {
    /// `DOWNLOAD_PATH` exactly as configured, echoed back by `/health` and
    /// `/download`.
    pub download_path: String,
    pub download_dir: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let download_path = lookup("DOWNLOAD_PATH")
            .and_then(|value| non_empty(&value).map(ToString::to_string))
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_PATH.to_string());
        let ytdlp_bin = lookup("YT_DLP_BIN")
            .and_then(|value| non_empty(&value).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP_BIN));

        Self {
            download_dir: PathBuf::from(&download_path),
            download_path,
            ytdlp_bin,
            bind_addr: resolve_bind_addr(&lookup),
            allowed_origins: resolve_allowed_origins(&lookup),
        }
    }
}

fn resolve_bind_addr(lookup: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(configured) =
        lookup("APP_ADDR").and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = lookup("PORT").and_then(|value| value.trim().parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn resolve_allowed_origins(lookup: &impl Fn(&str) -> Option<String>) -> Vec<String> {
    let configured = lookup("ALLOWED_ORIGINS")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set, falling back to the local development origins");
        DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        configured
    }
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.download_path, DEFAULT_DOWNLOAD_PATH);
        assert_eq!(config.download_dir, PathBuf::from("./downloads"));
        assert_eq!(config.ytdlp_bin, PathBuf::from("yt-dlp"));
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "http://127.0.0.1:3000"]
        );
    }

    #[test]
    fn download_path_is_read_from_environment() {
        let config = config_from(&[("DOWNLOAD_PATH", "/srv/media")]);
        assert_eq!(config.download_path, "/srv/media");
        assert_eq!(config.download_dir, PathBuf::from("/srv/media"));
    }

    #[test]
    fn blank_download_path_falls_back_to_default() {
        let config = config_from(&[("DOWNLOAD_PATH", "   ")]);
        assert_eq!(config.download_path, DEFAULT_DOWNLOAD_PATH);
    }

    #[test]
    fn app_addr_wins_over_port() {
        let config = config_from(&[("APP_ADDR", "127.0.0.1:9000"), ("PORT", "7000")]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn port_binds_all_interfaces() {
        let config = config_from(&[("PORT", " 7000 ")]);
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
    }

    #[test]
    fn invalid_port_is_ignored() {
        let config = config_from(&[("PORT", "not-a-port")]);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let config = config_from(&[(
            "ALLOWED_ORIGINS",
            " https://a.example , ,https://b.example:8443",
        )]);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example:8443"]
        );
    }
}
