use anyhow::Context;
use sensorcore::processing::{FilterConfig, DEFAULT_MAX_STAGED};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no access token is configured.
pub const ACCESS_TOKEN_ENV: &str = "UPLINK_ACCESS_TOKEN";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub sink: SinkConfig,
    /// Directory of per-device snapshots; unset keeps state in memory only.
    pub cache_dir: Option<PathBuf>,
    pub filter: FilterConfig,
    /// Port for the `/status` endpoint while streaming.
    pub status_port: Option<u16>,
    /// Readings held for retry while the sink is unreachable in stream mode.
    pub max_staged: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            cache_dir: None,
            filter: FilterConfig::default(),
            status_port: None,
            max_staged: DEFAULT_MAX_STAGED,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Sheets(SheetsConfig),
    /// Dry run: rows are logged instead of sent.
    #[default]
    Log,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub endpoint: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            range: "Data!A2:G".into(),
            endpoint: "https://sheets.googleapis.com".into(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

/// Sink settings given on the command line.
#[derive(Clone, Debug, Default)]
pub struct SinkOverrides {
    pub spreadsheet_id: Option<String>,
    pub access_token: Option<String>,
    pub range: Option<String>,
    pub endpoint: Option<String>,
    pub dry_run: bool,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Applies command-line sink settings. A spreadsheet id switches a
    /// dry-run config to the sheets sink; `dry_run` always wins.
    pub fn apply_overrides(&mut self, overrides: SinkOverrides) {
        if overrides.dry_run {
            self.sink = SinkConfig::Log;
            return;
        }

        let touches_sheets = overrides.spreadsheet_id.is_some()
            || overrides.access_token.is_some()
            || overrides.range.is_some()
            || overrides.endpoint.is_some();
        if !touches_sheets {
            return;
        }

        let mut sheets = match std::mem::take(&mut self.sink) {
            SinkConfig::Sheets(sheets) => sheets,
            SinkConfig::Log => SheetsConfig::default(),
        };
        if let Some(id) = overrides.spreadsheet_id {
            sheets.spreadsheet_id = id;
        }
        if let Some(token) = overrides.access_token {
            sheets.access_token = Some(token);
        }
        if let Some(range) = overrides.range {
            sheets.range = range;
        }
        if let Some(endpoint) = overrides.endpoint {
            sheets.endpoint = endpoint;
        }
        self.sink = SinkConfig::Sheets(sheets);
    }
}

impl SheetsConfig {
    /// Configured token, falling back to [`ACCESS_TOKEN_ENV`].
    pub fn resolve_token(&self) -> anyhow::Result<String> {
        if let Some(token) = self.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        std::env::var(ACCESS_TOKEN_ENV)
            .with_context(|| format!("no access token configured and {} is unset", ACCESS_TOKEN_ENV))
    }
}
