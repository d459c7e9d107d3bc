use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Backend
    pub api_base_url: String,
    pub request_timeout_secs: u64,

    // Token refresh
    pub refresh_max_attempts: u32,
    pub refresh_base_delay_ms: u64,

    // Translations
    pub languages: Vec<String>,
    pub namespaces: Vec<String>,
    pub cache_max_age_days: u64,
    pub sync_interval_secs: u64,
    pub missing_debounce_ms: u64,

    // Storage
    pub storage_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file (ignored in production)
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_base_url: std::env::var("REPSET_API_BASE_URL")
                .context("REPSET_API_BASE_URL not set")?,
            request_timeout_secs: std::env::var("REPSET_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),

            refresh_max_attempts: std::env::var("REPSET_REFRESH_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            refresh_base_delay_ms: std::env::var("REPSET_REFRESH_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),

            languages: csv_var("REPSET_I18N_LANGUAGES", &["en", "es"]),
            namespaces: csv_var("REPSET_I18N_NAMESPACES", &["common"]),
            cache_max_age_days: std::env::var("REPSET_I18N_CACHE_MAX_AGE_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            sync_interval_secs: std::env::var("REPSET_I18N_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900),
            missing_debounce_ms: std::env::var("REPSET_I18N_MISSING_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),

            storage_dir: std::env::var("REPSET_STORAGE_DIR")
                .unwrap_or_else(|_| "./repset-data".to_string()),
        })
    }
}

fn csv_var(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => {
            let parsed: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                default.iter().map(|s| s.to_string()).collect()
            } else {
                parsed
            }
        }
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "REPSET_API_BASE_URL",
            "REPSET_REQUEST_TIMEOUT_SECS",
            "REPSET_REFRESH_MAX_ATTEMPTS",
            "REPSET_REFRESH_BASE_DELAY_MS",
            "REPSET_I18N_LANGUAGES",
            "REPSET_I18N_NAMESPACES",
            "REPSET_I18N_CACHE_MAX_AGE_DAYS",
            "REPSET_I18N_SYNC_INTERVAL_SECS",
            "REPSET_I18N_MISSING_DEBOUNCE_MS",
            "REPSET_STORAGE_DIR",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_base_url() {
        clear_env();
        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("REPSET_API_BASE_URL"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("REPSET_API_BASE_URL", "https://api.repset.test");

        let config = Config::from_env().expect("should load");
        assert_eq!(config.api_base_url, "https://api.repset.test");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.refresh_max_attempts, 2);
        assert_eq!(config.refresh_base_delay_ms, 500);
        assert_eq!(config.languages, vec!["en", "es"]);
        assert_eq!(config.namespaces, vec!["common"]);
        assert_eq!(config.cache_max_age_days, 7);
        assert_eq!(config.sync_interval_secs, 900);
        assert_eq!(config.missing_debounce_ms, 1000);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_parses_csv_lists() {
        clear_env();
        std::env::set_var("REPSET_API_BASE_URL", "https://api.repset.test");
        std::env::set_var("REPSET_I18N_LANGUAGES", "en, fr ,de");
        std::env::set_var("REPSET_I18N_NAMESPACES", "common,workouts");

        let config = Config::from_env().expect("should load");
        assert_eq!(config.languages, vec!["en", "fr", "de"]);
        assert_eq!(config.namespaces, vec!["common", "workouts"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_numbers_fall_back_to_defaults() {
        clear_env();
        std::env::set_var("REPSET_API_BASE_URL", "https://api.repset.test");
        std::env::set_var("REPSET_REQUEST_TIMEOUT_SECS", "not-a-number");

        let config = Config::from_env().expect("should load");
        assert_eq!(config.request_timeout_secs, 15);
        clear_env();
    }
}
