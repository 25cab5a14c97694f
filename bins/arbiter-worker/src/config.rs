// Worker configuration, resolved once at startup.
//
// Everything comes from the environment. Missing required keys are fatal:
// the process refuses to start rather than silently evaluating the wrong
// language or calling back to the wrong place.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use arbiter_common::types::Language;

/// Hard ceilings applied to every per-case limit.
#[derive(Debug, Clone, Copy)]
pub struct GlobalLimits {
    pub max_time_sec: u64,
    pub max_memory_mb: u64,
}

/// Where test-case blobs are fetched from.
#[derive(Debug, Clone)]
pub enum BlobBackend {
    /// Keys are paths relative to a local root directory.
    Filesystem(PathBuf),
    /// Keys are appended to a base URL; 404 means not found.
    Http(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// The one language this worker instance evaluates.
    pub language: Language,
    /// Root under which each batch gets its own scratch subdirectory.
    pub sandbox_root: PathBuf,
    pub limits: GlobalLimits,
    pub orchestrator_address: String,
    pub api_header_name: String,
    pub api_key: String,
    pub blob: BlobBackend,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Env-shaped lookup, injectable for tests.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let language_raw = get("WORKER_LANGUAGE")
            .context("WORKER_LANGUAGE is required (c | python | java | rust | go)")?;
        let language = Language::from_str(&language_raw).with_context(|| {
            format!(
                "WORKER_LANGUAGE '{language_raw}' is not supported; valid options: {}",
                Language::all_variants()
                    .iter()
                    .map(|l| l.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;

        let sandbox_root =
            PathBuf::from(get("SANDBOX_ROOT").unwrap_or_else(|| "/var/arbiter/sandbox".into()));

        let limits = GlobalLimits {
            max_time_sec: parse_or(&get, "GLOBAL_MAX_TIME_SEC", 15)?,
            max_memory_mb: parse_or(&get, "GLOBAL_MAX_MEMORY_MB", 512)?,
        };
        if limits.max_time_sec == 0 || limits.max_memory_mb == 0 {
            bail!("global limits must be positive");
        }

        let orchestrator_address =
            get("ORCHESTRATOR_ADDRESS").context("ORCHESTRATOR_ADDRESS is required")?;
        let api_header_name = get("API_HEADER_NAME").unwrap_or_else(|| "X-Api-Key".into());
        let api_key = get("API_KEY").context("API_KEY is required")?;

        let blob = match (get("BLOB_ROOT"), get("BLOB_BASE_URL")) {
            (Some(root), None) => BlobBackend::Filesystem(PathBuf::from(root)),
            (None, Some(url)) => BlobBackend::Http(url),
            (Some(_), Some(_)) => bail!("set either BLOB_ROOT or BLOB_BASE_URL, not both"),
            (None, None) => bail!("one of BLOB_ROOT or BLOB_BASE_URL is required"),
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into());

        Ok(Settings {
            language,
            sandbox_root,
            limits,
            orchestrator_address,
            api_header_name,
            api_key,
            blob,
            bind_addr,
        })
    }
}

fn parse_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match get(key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be an integer, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("WORKER_LANGUAGE", "c"),
            ("ORCHESTRATOR_ADDRESS", "http://orchestrator:9000"),
            ("API_KEY", "secret"),
            ("BLOB_ROOT", "/blobs"),
        ])
    }

    fn load(env: &HashMap<&str, &str>) -> Result<Settings> {
        Settings::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn minimal_env_loads_with_defaults() {
        let settings = load(&base_env()).unwrap();
        assert_eq!(settings.language, Language::C);
        assert_eq!(settings.api_header_name, "X-Api-Key");
        assert_eq!(settings.limits.max_time_sec, 15);
        assert_eq!(settings.limits.max_memory_mb, 512);
        assert!(matches!(settings.blob, BlobBackend::Filesystem(_)));
    }

    #[test]
    fn missing_language_refuses_to_start() {
        let mut env = base_env();
        env.remove("WORKER_LANGUAGE");
        assert!(load(&env).is_err());
    }

    #[test]
    fn unknown_language_refuses_to_start() {
        let mut env = base_env();
        env.insert("WORKER_LANGUAGE", "fortran");
        let err = load(&env).unwrap_err();
        assert!(format!("{err:#}").contains("fortran"));
    }

    #[test]
    fn missing_api_key_refuses_to_start() {
        let mut env = base_env();
        env.remove("API_KEY");
        assert!(load(&env).is_err());
    }

    #[test]
    fn blob_backend_requires_exactly_one_source() {
        let mut env = base_env();
        env.insert("BLOB_BASE_URL", "http://blobs:7000");
        assert!(load(&env).is_err());

        env.remove("BLOB_ROOT");
        let settings = load(&env).unwrap();
        assert!(matches!(settings.blob, BlobBackend::Http(_)));

        env.remove("BLOB_BASE_URL");
        assert!(load(&env).is_err());
    }

    #[test]
    fn limit_overrides_are_parsed() {
        let mut env = base_env();
        env.insert("GLOBAL_MAX_TIME_SEC", "5");
        env.insert("GLOBAL_MAX_MEMORY_MB", "256");
        let settings = load(&env).unwrap();
        assert_eq!(settings.limits.max_time_sec, 5);
        assert_eq!(settings.limits.max_memory_mb, 256);
    }

    #[test]
    fn garbage_limit_is_rejected() {
        let mut env = base_env();
        env.insert("GLOBAL_MAX_TIME_SEC", "fast");
        assert!(load(&env).is_err());
    }
}
