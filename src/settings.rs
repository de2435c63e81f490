use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::fields::DateMode;
use crate::parser::segment::{HeadingPattern, DEFAULT_SERIES_LABEL};

const SETTINGS_FILE: &str = "swp";
const ENV_PREFIX: &str = "SWP";

/// Run settings: defaults, then `swp.toml` if present, then `SWP_*` env vars.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub index_url: String,
    pub base_url: String,
    pub lookup_csv: PathBuf,
    pub text_dir: PathBuf,
    pub output_csv: PathBuf,
    pub series_label: String,
    pub date_mode: DateMode,
    pub concurrency: usize,
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/swp.sqlite"),
            index_url: "https://salem.lib.virginia.edu/category/swp.html".to_string(),
            base_url: "https://salem.lib.virginia.edu".to_string(),
            lookup_csv: PathBuf::from("data/metadata/trials_index.csv"),
            text_dir: PathBuf::from("data/final_sub_swps"),
            output_csv: PathBuf::from("data/trials_summary.csv"),
            series_label: DEFAULT_SERIES_LABEL.to_string(),
            date_mode: DateMode::First,
            concurrency: 10,
            max_retries: 3,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn heading_pattern(&self) -> Result<HeadingPattern> {
        HeadingPattern::new(&self.series_label)
            .with_context(|| format!("Invalid series label {:?}", self.series_label))
    }
}
