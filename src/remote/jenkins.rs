use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::common::error::{FleetError, Result};
use crate::traits::agent::{AgentConnector, AgentSession, BuildInfo, JobInfo, JobSummary};

const VERSION_HEADER: &str = "X-Jenkins";

#[derive(Clone)]
pub struct JenkinsConnector {
    client: reqwest::Client,
}

impl JenkinsConnector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FleetError::Unreachable(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AgentConnector for JenkinsConnector {
    async fn open(
        &self,
        host: &str,
        port: u16,
        username: &str,
        secret: &str,
    ) -> Result<Arc<dyn AgentSession>> {
        log::debug!("Opening Jenkins session to {}:{} as {}", host, port, username);
        let base_url = Url::parse(&format!("http://{}:{}/", host, port))
            .map_err(|e| FleetError::InvalidState(format!("bad agent address {}:{}: {}", host, port, e)))?;
        Ok(Arc::new(JenkinsSession {
            client: self.client.clone(),
            base_url,
            username: username.to_string(),
            secret: secret.to_string(),
        }))
    }
}

/// Authenticated view of one Jenkins instance. Every request carries the
/// session's credential, so a rotated secret invalidates the session.
pub struct JenkinsSession {
    client: reqwest::Client,
    base_url: Url,
    username: String,
    secret: String,
}

#[derive(Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

impl JenkinsSession {
    /// Each segment is percent-encoded, so a name can never leave its path position.
    fn url(&self, segments: &[&str], query: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FleetError::InvalidState(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        url.set_query(query);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.secret))
            .send()
            .await?;
        Ok(response.error_for_status()?)
    }

    async fn post(&self, url: Url, body: Option<&Value>) -> Result<Response> {
        let mut request = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.secret));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Ok(response.error_for_status()?)
    }
}

#[async_trait]
impl AgentSession for JenkinsSession {
    async fn get_version(&self) -> Result<String> {
        let response = self.get(self.url(&[], None)?).await?;
        response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| FleetError::Unreachable(format!("{} sent no version header", self.base_url)))
    }

    async fn job_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&["job", name, "api", "json"], Some("tree=name"))?)
            .basic_auth(&self.username, Some(&self.secret))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(FleetError::Unreachable(format!(
                "HTTP {} checking job {} on {}",
                status, name, self.base_url
            ))),
        }
    }

    async fn get_job_info(&self, name: &str) -> Result<JobInfo> {
        let response = self
            .get(self.url(&["job", name, "api", "json"], Some("tree=builds[number]"))?)
            .await?;
        Ok(response.json::<JobInfo>().await?)
    }

    async fn get_build_info(&self, name: &str, number: u64) -> Result<BuildInfo> {
        let response = self
            .get(self.url(
                &["job", name, number.to_string().as_str(), "api", "json"],
                Some("tree=number,timestamp,result"),
            )?)
            .await?;
        Ok(response.json::<BuildInfo>().await?)
    }

    async fn get_build_console_output(&self, name: &str, number: u64) -> Result<String> {
        let response = self
            .get(self.url(&["job", name, number.to_string().as_str(), "consoleText"], None)?)
            .await?;
        Ok(response.text().await?)
    }

    async fn get_jobs(&self) -> Result<Vec<JobSummary>> {
        let response = self.get(self.url(&["api", "json"], Some("tree=jobs[name]"))?).await?;
        Ok(response.json::<JobList>().await?.jobs)
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        self.post(self.url(&["job", name, "doDelete"], None)?, None).await?;
        log::info!("Deleted job {} on {}", name, self.base_url);
        Ok(())
    }

    async fn update_jobs(&self, definitions: &[Value]) -> Result<()> {
        let body = Value::Array(definitions.to_vec());
        self.post(self.url(&["jobBuilder", "update"], None)?, Some(&body)).await?;
        log::debug!("Pushed {} job definition(s) to {}", definitions.len(), self.base_url);
        Ok(())
    }
}
