//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for docgate-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set. The configuration is immutable
/// once built and is shared through [`crate::state::AppState`].
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`, port taken from `PORT`).
    pub bind_address: String,

    /// Shared bearer secret. When `None` every guarded route answers 401.
    pub auth_token: Option<String>,

    /// Converter executable, resolved through `PATH` when not absolute.
    pub converter_program: String,

    /// Arguments placed before the conversion arguments, e.g. a
    /// `-env:UserInstallation=...` profile override.
    pub converter_args: Vec<String>,

    /// Wall-clock limit for a single converter run.
    pub convert_timeout: Duration,

    /// Upload ceiling in bytes.
    pub max_upload_bytes: usize,

    /// Directory holding in-flight input and output files.
    pub scratch_dir: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS origins; wildcard when unset.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", 3000);
        let max_upload_mb: usize = parse_or(&lookup, "DOCGATE_MAX_UPLOAD_MB", 50);

        Self {
            bind_address: lookup("DOCGATE_BIND").unwrap_or_else(|| format!("0.0.0.0:{port}")),
            auth_token: lookup("AUTH_TOKEN")
                .or_else(|| lookup("DOCGATE_AUTH_TOKEN"))
                .filter(|t| !t.is_empty()),
            converter_program: lookup("DOCGATE_CONVERTER")
                .unwrap_or_else(|| "libreoffice".to_owned()),
            converter_args: lookup("DOCGATE_CONVERTER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            convert_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DOCGATE_CONVERT_TIMEOUT_SECS",
                60,
            )),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            scratch_dir: lookup("DOCGATE_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("docgate")),
            log_level: lookup("DOCGATE_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: lookup("DOCGATE_LOG_JSON").is_some_and(|v| is_truthy(&v)),
            cors_allowed_origins: lookup("DOCGATE_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            enable_swagger: lookup("DOCGATE_ENABLE_SWAGGER").is_some_and(|v| is_truthy(&v)),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert!(cfg.auth_token.is_none());
        assert_eq!(cfg.converter_program, "libreoffice");
        assert!(cfg.converter_args.is_empty());
        assert_eq!(cfg.convert_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
        assert!(cfg.scratch_dir.ends_with("docgate"));
        assert!(!cfg.log_json);
        assert!(!cfg.enable_swagger);
    }

    #[test]
    fn port_feeds_bind_address() {
        let cfg = config_from(&[("PORT", "8080")]);
        assert_eq!(cfg.bind_address, "0.0.0.0:8080");

        let cfg = config_from(&[("PORT", "8080"), ("DOCGATE_BIND", "127.0.0.1:9000")]);
        assert_eq!(cfg.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let cfg = config_from(&[("PORT", "http"), ("DOCGATE_MAX_UPLOAD_MB", "-1")]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn huge_upload_ceiling_saturates() {
        let cfg = config_from(&[("DOCGATE_MAX_UPLOAD_MB", &usize::MAX.to_string())]);
        assert_eq!(cfg.max_upload_bytes, usize::MAX);
    }

    #[test]
    fn empty_token_counts_as_unset() {
        assert!(config_from(&[("AUTH_TOKEN", "")]).auth_token.is_none());
        assert_eq!(
            config_from(&[("DOCGATE_AUTH_TOKEN", "s3cret")]).auth_token.as_deref(),
            Some("s3cret")
        );
    }

    #[test]
    fn converter_args_split_on_whitespace() {
        let cfg = config_from(&[
            ("DOCGATE_CONVERTER", "/opt/soffice"),
            ("DOCGATE_CONVERTER_ARGS", "  -env:UserInstallation=file:///tmp/lo   --norestore "),
        ]);
        assert_eq!(cfg.converter_program, "/opt/soffice");
        assert_eq!(
            cfg.converter_args,
            vec!["-env:UserInstallation=file:///tmp/lo", "--norestore"]
        );
    }
}
