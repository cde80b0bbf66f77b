//! Client for the Copernicus Climate Data Store retrieve API.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::archive::ArchiveService;
use crate::error::{classify_status, ProcessingError, Result};
use crate::utils::constants::{DEFAULT_CDS_URL, DEFAULT_POLL_INTERVAL_SECS};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const RC_FILE: &str = ".cdsapirc";

#[derive(Clone, PartialEq, Eq)]
pub struct CdsCredentials {
    pub url: String,
    pub key: String,
}

impl std::fmt::Debug for CdsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdsCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CdsCredentials {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
        }
    }

    /// Parse the `url:` / `key:` lines of a `.cdsapirc` file
    pub fn parse_rc(text: &str) -> Option<Self> {
        let mut url = None;
        let mut key = None;
        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            match name.trim() {
                "url" => url = Some(value.trim().to_string()),
                "key" => key = Some(value.trim().to_string()),
                _ => {}
            }
        }
        key.filter(|k| !k.is_empty()).map(|key| {
            Self::new(url.unwrap_or_else(|| DEFAULT_CDS_URL.to_string()), key)
        })
    }

    /// Configured values first, then `CDSAPI_URL`/`CDSAPI_KEY`, then `~/.cdsapirc`.
    pub fn resolve(url: Option<String>, key: Option<String>) -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let url = url.or_else(|| env("CDSAPI_URL"));

        if let Some(key) = key.or_else(|| env("CDSAPI_KEY")) {
            return Ok(Self::new(
                url.unwrap_or_else(|| DEFAULT_CDS_URL.to_string()),
                key,
            ));
        }

        let rc = dirs::home_dir()
            .map(|home| home.join(RC_FILE))
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|text| Self::parse_rc(&text));
        match rc {
            Some(mut credentials) => {
                if let Some(url) = url {
                    credentials.url = url.trim_end_matches('/').to_string();
                }
                Ok(credentials)
            }
            None => Err(ProcessingError::Config(
                "no CDS API key: set cds.key, CDSAPI_KEY or ~/.cdsapirc".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
}

/// Body of an error response, when the service sends one
#[derive(Debug, Deserialize)]
struct ServiceError {
    title: Option<String>,
    detail: Option<String>,
}

pub struct CdsClient {
    http: Client,
    credentials: CdsCredentials,
    poll_interval: Duration,
}

impl CdsClient {
    pub fn new(credentials: CdsCredentials) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("era5-metprep/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            credentials,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/retrieve/v1/{}", self.credentials.url, path)
    }

    async fn submit(&self, dataset: &str, request: &Value) -> Result<JobStatus> {
        let response = self
            .http
            .post(self.endpoint(&format!("processes/{}/execution", dataset)))
            .header(TOKEN_HEADER, &self.credentials.key)
            .json(&json!({ "inputs": request }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{}", job_id)))
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn results(&self, job_id: &str) -> Result<JobResults> {
        let response = self
            .http
            .get(self.endpoint(&format!("jobs/{}/results", job_id)))
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Poll until the job leaves the queue; only `successful` is Ok.
    async fn wait(&self, mut job: JobStatus) -> Result<()> {
        loop {
            match job.status.as_str() {
                "successful" => return Ok(()),
                "failed" | "rejected" | "dismissed" | "deleted" => {
                    let reason = match self.results(&job.job_id).await {
                        Err(e) => e.to_string(),
                        Ok(_) => "no reason given".to_string(),
                    };
                    return Err(ProcessingError::network(
                        format!("CDS job {} {}: {}", job.job_id, job.status, reason),
                        false,
                    ));
                }
                other => {
                    debug!("CDS job {} is {}", job.job_id, other);
                    tokio::time::sleep(self.poll_interval).await;
                    job = self.status(&job.job_id).await?;
                }
            }
        }
    }

    async fn download(&self, href: &str, dest: &Path) -> Result<u64> {
        let response = check(self.http.get(href).send().await?).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl ArchiveService for CdsClient {
    fn name(&self) -> &str {
        "CDS"
    }

    async fn retrieve(&self, dataset: &str, request: &Value, dest: &Path) -> Result<u64> {
        let job = self.submit(dataset, request).await?;
        info!("Submitted CDS job {} for {}", job.job_id, dataset);
        let job_id = job.job_id.clone();

        self.wait(job).await?;
        let results = self.results(&job_id).await?;
        self.download(&results.asset.value.href, dest).await
    }
}

/// Pass successful responses through; turn the rest into classified errors.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ServiceError>(&body) {
        Ok(ServiceError { title, detail }) => [title, detail]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(": "),
        Err(_) => body.chars().take(200).collect(),
    };
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        message
    };
    Err(classify_status(status.as_u16(), &message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rc() {
        let text = "url: https://cds.example.org/api/\nkey: abcd-1234\n";
        let credentials = CdsCredentials::parse_rc(text).unwrap();
        assert_eq!(credentials.url, "https://cds.example.org/api");
        assert_eq!(credentials.key, "abcd-1234");
    }

    #[test]
    fn test_parse_rc_defaults_url() {
        let credentials = CdsCredentials::parse_rc("key: k\n").unwrap();
        assert_eq!(credentials.url, DEFAULT_CDS_URL);
        assert!(CdsCredentials::parse_rc("url: https://x\n").is_none());
    }

    #[test]
    fn test_explicit_key_wins() {
        let credentials =
            CdsCredentials::resolve(Some("https://cds.example.org/api".into()), Some("k".into()))
                .unwrap();
        assert_eq!(credentials.key, "k");
        assert!(!format!("{:?}", credentials).contains("\"k\""));
    }

    #[test]
    fn test_endpoints() {
        let client = CdsClient::new(CdsCredentials::new("https://cds.example.org/api/", "k")).unwrap();
        assert_eq!(
            client.endpoint("jobs/42/results"),
            "https://cds.example.org/api/retrieve/v1/jobs/42/results"
        );
    }
}
