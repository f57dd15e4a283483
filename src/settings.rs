use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

const ENV_PREFIX: &str = "GHETL";
const DEFAULT_ORG_URL: &str = "https://github.com/orgs/Scytale-exercise";

/// Runtime settings: serde defaults, overridden by `GHETL_*` env vars, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Organization URLs, e.g. `https://github.com/orgs/<org>`.
    pub org_urls: Vec<String>,
    /// Prefixed to the root-relative `href` of each repository anchor.
    pub site_origin: String,
    pub staging_dir: PathBuf,
    /// Glob (relative to `staging_dir`) selecting batches for compaction.
    pub staging_pattern: String,
    pub table_path: PathBuf,
    /// Compact the existing staging area even when a listing fetch returned non-200.
    pub compact_on_fetch_failure: bool,
    /// Worker threads for the parse/stage map; 0 lets rayon decide.
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            org_urls: vec![DEFAULT_ORG_URL.to_string()],
            site_origin: "https://github.com".to_string(),
            staging_dir: PathBuf::from("extracted_data"),
            staging_pattern: "*.json".to_string(),
            table_path: PathBuf::from("transformed_data.parquet"),
            compact_on_fetch_failure: true,
            workers: 0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(environment())
    }

    fn from_env(source: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .context("Failed to load settings from environment")
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("org_urls")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_layout() {
        let s = Settings::default();
        assert_eq!(s.org_urls, vec![DEFAULT_ORG_URL.to_string()]);
        assert_eq!(s.staging_dir, PathBuf::from("extracted_data"));
        assert_eq!(s.table_path, PathBuf::from("transformed_data.parquet"));
        assert!(s.compact_on_fetch_failure);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn env_splits_org_list_and_parses_flags() {
        let s = Settings::from_env(env(&[
            ("GHETL_ORG_URLS", "https://github.com/orgs/a,https://github.com/orgs/b"),
            ("GHETL_COMPACT_ON_FETCH_FAILURE", "false"),
            ("GHETL_WORKERS", "3"),
            ("GHETL_STAGING_DIR", "/tmp/staged"),
        ]))
        .unwrap();

        assert_eq!(
            s.org_urls,
            ["https://github.com/orgs/a", "https://github.com/orgs/b"]
        );
        assert!(!s.compact_on_fetch_failure);
        assert_eq!(s.workers, 3);
        assert_eq!(s.staging_dir, PathBuf::from("/tmp/staged"));
        assert_eq!(s.table_path, PathBuf::from("transformed_data.parquet"));
    }

    #[test]
    fn env_single_org_is_still_a_list() {
        let s = Settings::from_env(env(&[("GHETL_ORG_URLS", "https://github.com/orgs/solo")]))
            .unwrap();
        assert_eq!(s.org_urls, ["https://github.com/orgs/solo"]);
    }

    #[test]
    fn unprefixed_vars_are_ignored() {
        let s = Settings::from_env(env(&[("ORG_URLS", "https://github.com/orgs/x")])).unwrap();
        assert_eq!(s.org_urls, [DEFAULT_ORG_URL]);
    }

    #[test]
    fn empty_source_deserializes_to_defaults() {
        let s: Settings = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.site_origin, "https://github.com");
        assert_eq!(s.workers, 0);
    }
}
