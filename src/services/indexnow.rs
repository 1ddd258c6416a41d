//! IndexNow URL submission (Naver Search Advisor and the shared endpoint).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};
use url::Url;

use super::{SearchNotifier, check_status};
use crate::error::ServiceError;
use crate::utils::collect_best_effort;

pub const DEFAULT_ENDPOINTS: [(&str, &str); 2] = [
    ("naver", "https://searchadvisor.naver.com/indexnow"),
    ("indexnow", "https://api.indexnow.org/indexnow"),
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Submission<'a> {
    host: &'a str,
    key: &'a str,
    key_location: String,
    url_list: &'a [String],
}

pub struct IndexNow {
    client: Client,
    site_url: String,
    host: String,
    key: String,
    endpoints: Vec<(String, String)>,
}

impl IndexNow {
    pub fn new(client: Client, site_url: &str, key: &str) -> Result<Self, ServiceError> {
        let endpoints = DEFAULT_ENDPOINTS
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect();
        Self::with_endpoints(client, site_url, key, endpoints)
    }

    pub fn with_endpoints(
        client: Client,
        site_url: &str,
        key: &str,
        endpoints: Vec<(String, String)>,
    ) -> Result<Self, ServiceError> {
        let host = Url::parse(site_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| ServiceError::Malformed {
                service: "indexnow",
                detail: format!("site URL has no host: {site_url}"),
            })?;
        Ok(Self {
            client,
            site_url: site_url.trim_end_matches('/').to_string(),
            host,
            key: key.to_string(),
            endpoints,
        })
    }
}

#[async_trait(?Send)]
impl SearchNotifier for IndexNow {
    /// Submit `urls` to every endpoint. Fails only when no endpoint accepted them.
    #[instrument(level = "info", skip_all, fields(urls = urls.len()))]
    async fn notify(&self, urls: &[String]) -> Result<(), ServiceError> {
        if urls.is_empty() {
            return Ok(());
        }
        let submission = Submission {
            host: &self.host,
            key: &self.key,
            key_location: format!("{}/{}.txt", self.site_url, self.key),
            url_list: urls,
        };
        let submission = &submission;

        let accepted = collect_best_effort("indexnow endpoint", &self.endpoints, |_, (name, endpoint)| async move {
            let resp = self.client.post(endpoint).json(submission).send().await?;
            let status = check_status(resp).await?.status();
            info!(endpoint = %name, %status, "Search engine notified");
            Ok::<_, ServiceError>(Some(name.as_str()))
        })
        .await;

        if accepted.is_empty() {
            return Err(ServiceError::Rejected {
                service: "indexnow",
                detail: "no endpoint accepted the submission".to_string(),
            });
        }
        Ok(())
    }
}
