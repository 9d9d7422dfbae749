use anyhow::{Context, Result};
use async_trait::async_trait;
use forge_common::{RunnerIdentity, RunnerStatus};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const PER_PAGE: usize = 100;

/// Seam to the CI coordination service. The orchestrator only consumes three
/// calls: runner listing (for name lookup), registration-token creation and
/// runner removal.
#[async_trait]
pub trait RunnerRegistry: Send + Sync {
    /// Looks a runner up by its registration name. The service has no direct
    /// name lookup, so this lists all runners and filters client-side.
    ///
    /// Returns `None` both when no runner matches and when the listing call
    /// fails transiently; callers poll, so the two cases are deliberately
    /// indistinguishable.
    async fn find_runner(&self, name: &str) -> Option<RunnerIdentity>;

    /// One-time token a new runner uses to self-register. Failure here is
    /// fatal to the run and propagates immediately.
    async fn create_registration_token(&self) -> Result<String>;

    async fn remove_runner(&self, id: i64) -> Result<()>;
}

pub struct GithubRegistry {
    client: Client,
    token: String,
    owner: String,
    repo: String,
}

#[derive(Deserialize)]
struct RunnerRow {
    id: i64,
    name: String,
    status: String,
}

#[derive(Deserialize)]
struct RunnerPage {
    runners: Vec<RunnerRow>,
}

#[derive(Deserialize)]
struct RegistrationToken {
    token: String,
}

impl GithubRegistry {
    pub fn new(token: String, owner: String, repo: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap();
        Self {
            client,
            token,
            owner,
            repo,
        }
    }

    fn runners_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/actions/runners",
            self.owner, self.repo
        )
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token)).unwrap(),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("forge-runner"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        headers
    }

    async fn list_runners(&self) -> Result<Vec<RunnerRow>> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let resp = self
                .client
                .get(self.runners_url())
                .headers(self.headers())
                .query(&[
                    ("per_page", PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!(
                    "GitHub list runners failed: status={} body={}",
                    status.as_u16(),
                    text
                );
            }
            let parsed: RunnerPage = resp.json().await?;
            let count = parsed.runners.len();
            all.extend(parsed.runners);
            if count < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl RunnerRegistry for GithubRegistry {
    async fn find_runner(&self, name: &str) -> Option<RunnerIdentity> {
        let runners = match self.list_runners().await {
            Ok(runners) => runners,
            Err(e) => {
                debug!("runner listing failed, treating as not found: {:#}", e);
                return None;
            }
        };
        runners
            .into_iter()
            .find(|r| r.name == name)
            .map(|r| RunnerIdentity {
                id: r.id,
                name: r.name,
                status: RunnerStatus::parse(&r.status),
            })
    }

    async fn create_registration_token(&self) -> Result<String> {
        let url = format!("{}/registration-token", self.runners_url());
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .send()
            .await
            .context("requesting registration token")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "GitHub registration token request failed: status={} body={}",
                status.as_u16(),
                text
            );
        }
        let parsed: RegistrationToken = resp
            .json()
            .await
            .context("parsing registration token response")?;
        info!("GitHub registration token received");
        Ok(parsed.token)
    }

    async fn remove_runner(&self, id: i64) -> Result<()> {
        let url = format!("{}/{}", self.runners_url(), id);
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "GitHub runner removal failed for {}: status={} body={}",
                id,
                status.as_u16(),
                text
            );
        }
        Ok(())
    }
}
