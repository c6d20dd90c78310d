use crate::workflow::config::SheetsConfig;
use anyhow::{bail, Context};
use reqwest::StatusCode;
use sensorcore::prelude::{AppendReport, ReadingSink, SinkError};
use sensorcore::protocol::{to_rows, Reading};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::runtime::{Builder as TokioBuilder, Runtime};

/// Appends rows to a spreadsheet through the Sheets `values:append` API.
pub struct SheetsSink {
    client: reqwest::Client,
    runtime: Runtime,
    url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AppendUpdates {
    updated_cells: u64,
    updated_rows: u64,
}

impl SheetsSink {
    pub fn new(config: &SheetsConfig) -> anyhow::Result<Self> {
        if config.spreadsheet_id.is_empty() {
            bail!("sheets sink needs a spreadsheet id");
        }
        let token = config.resolve_token()?;
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for the sheets client")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("building sheets http client")?;
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}:append?valueInputOption=USER_ENTERED",
            config.endpoint.trim_end_matches('/'),
            config.spreadsheet_id,
            config.range
        );
        Ok(Self {
            client,
            runtime,
            url,
            token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReadingSink for SheetsSink {
    fn append(&mut self, readings: &[Reading]) -> Result<AppendReport, SinkError> {
        let body = json!({ "values": to_rows(readings) });
        let request = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body);

        self.runtime.block_on(async move {
            let response = request
                .send()
                .await
                .map_err(|err| SinkError::Transport(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let text = response.text().await.unwrap_or_default();
                return Err(SinkError::Auth(format!("{}: {}", status, text)));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(SinkError::Rejected {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let parsed: AppendResponse = response
                .json()
                .await
                .map_err(|err| SinkError::Malformed(err.to_string()))?;
            Ok(AppendReport {
                updated_cells: parsed.updates.updated_cells,
                updated_rows: parsed.updates.updated_rows,
            })
        })
    }
}
