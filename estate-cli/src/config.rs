use anyhow::{Context, Result, bail};
use estate_sheets::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::ensure_estate_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub time: TimeSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Csv,
    Sheets,
    /// Dry run: a fresh empty table per command, discarded on exit.
    Memory,
}

impl BackendKind {
    /// Whether changes survive the command that made them.
    pub fn is_persistent(self) -> bool {
        !matches!(self, BackendKind::Memory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    pub backend: BackendKind,

    /// For backend = "csv": table file (default: ~/.estate/tasks.csv)
    pub path: Option<String>,

    /// For backend = "sheets": spreadsheet id from the sheet URL
    pub spreadsheet_id: Option<String>,
    /// Worksheet title (default: Sheet1)
    #[serde(default = "default_sheet")]
    pub sheet: String,
    /// Environment variable holding the OAuth access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Override for the Sheets API root (testing / proxies)
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSection {
    /// Emails that sign in as Admin; everyone else is a Viewer.
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSection {
    /// IANA zone used to stamp "Last Updated".
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    pub level: String,
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

fn default_token_env() -> String {
    "ESTATE_SHEETS_TOKEN".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Csv,
            path: None,
            spreadsheet_id: None,
            sheet: default_sheet(),
            token_env: default_token_env(),
            base_url: None,
        }
    }
}

impl Default for TimeSection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StoreSection {
    pub fn csv_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(ensure_estate_home()?.join("tasks.csv")),
        }
    }

    /// Resolve into a backend description. Missing credentials are left for
    /// the connection attempt to report.
    pub fn backend(&self) -> Result<Backend> {
        Ok(match self.backend {
            BackendKind::Memory => Backend::Memory,
            BackendKind::Csv => Backend::Csv {
                path: self.csv_path()?,
            },
            BackendKind::Sheets => {
                let Some(id) = self.spreadsheet_id.clone() else {
                    bail!("store.spreadsheet_id is not set in config.toml");
                };
                Backend::Sheets {
                    spreadsheet_id: id,
                    sheet: self.sheet.clone(),
                    token: std::env::var(&self.token_env).unwrap_or_default(),
                    base_url: self.base_url.clone(),
                }
            }
        })
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_estate_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
    } else {
        save_config(&Config::default())?;
        println!("Wrote {}", p.display());
    }

    let cfg = load_config()?;
    if cfg.store.backend == BackendKind::Csv {
        let table = cfg.store.csv_path()?;
        if estate_sheets::CsvTable::create_if_missing(&table)
            .with_context(|| format!("create {}", table.display()))?
        {
            println!("Wrote {}", table.display());
        }
    }
    Ok(())
}
