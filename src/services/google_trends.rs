//! Google Trends client.
//!
//! Trends has no public API. The web UI first calls `explore`, which hands
//! back one widget per panel (time series, related topics, related queries)
//! with a signed token; each panel's data is then fetched from
//! `widgetdata/<kind>` using that token. Every response body is prefixed
//! with the `)]}'` anti-JSON-hijacking guard.
//!
//! The client owns a [`RateLimiter`]: Trends answers bursts with 429s, so
//! lookups are kept at least [`DEFAULT_MIN_INTERVAL`] apart.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use super::{TrendSource, check_status};
use crate::error::ServiceError;
use crate::models::{RankedQuery, RelatedQueries};
use crate::retry::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://trends.google.com";
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(2500);

const TIME_RANGE: &str = "today 12-m";
const MAX_TOPICS: usize = 10;

#[derive(Debug, Clone, Copy)]
enum WidgetKind {
    TimeSeries,
    RelatedTopics,
    RelatedQueries,
}

impl WidgetKind {
    fn id(self) -> &'static str {
        match self {
            WidgetKind::TimeSeries => "TIMESERIES",
            WidgetKind::RelatedTopics => "RELATED_TOPICS",
            WidgetKind::RelatedQueries => "RELATED_QUERIES",
        }
    }

    fn data_path(self) -> &'static str {
        match self {
            WidgetKind::TimeSeries => "trends/api/widgetdata/multiline",
            WidgetKind::RelatedTopics | WidgetKind::RelatedQueries => {
                "trends/api/widgetdata/relatedsearches"
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    widgets: Vec<Widget>,
}

#[derive(Debug, Deserialize)]
struct Widget {
    id: String,
    token: String,
    request: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WidgetData<T> {
    default: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timeline {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    #[serde(default)]
    value: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankedLists {
    #[serde(default)]
    ranked_list: Vec<RankedList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankedList {
    #[serde(default)]
    ranked_keyword: Vec<RankedKeyword>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankedKeyword {
    query: Option<String>,
    topic: Option<Topic>,
    #[serde(default)]
    value: u64,
    #[serde(default)]
    formatted_value: String,
}

#[derive(Debug, Deserialize)]
struct Topic {
    title: String,
}

impl RankedKeyword {
    fn into_query(self) -> Option<RankedQuery> {
        let query = self.query?.trim().to_string();
        (!query.is_empty()).then(|| RankedQuery {
            query,
            value: self.value,
            formatted_value: self.formatted_value,
        })
    }
}

pub struct GoogleTrends {
    client: Client,
    base_url: Url,
    geo: String,
    limiter: RateLimiter,
}

impl GoogleTrends {
    pub fn new(client: Client, geo: &str) -> Result<Self, ServiceError> {
        Self::with_base_url(client, geo, DEFAULT_BASE_URL, DEFAULT_MIN_INTERVAL)
    }

    /// Point the client at another host (wiremock in tests).
    pub fn with_base_url(
        client: Client,
        geo: &str,
        base_url: &str,
        min_interval: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|e| {
            ServiceError::Malformed {
                service: "google-trends",
                detail: format!("invalid base URL '{base_url}': {e}"),
            }
        })?;
        Ok(Self {
            client,
            base_url,
            geo: geo.to_string(),
            limiter: RateLimiter::new(min_interval),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url.join(path).map_err(|e| ServiceError::Malformed {
            service: "google-trends",
            detail: e.to_string(),
        })
    }

    async fn get_guarded<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let resp = self
            .client
            .get(self.endpoint(path)?)
            .query(&[("hl", "en-US"), ("tz", "0")])
            .query(query)
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        Ok(serde_json::from_str(strip_guard(&body))?)
    }

    async fn widget(&self, term: &str, kind: WidgetKind) -> Result<Widget, ServiceError> {
        let req = json!({
            "comparisonItem": [{ "keyword": term, "geo": self.geo, "time": TIME_RANGE }],
            "category": 0,
            "property": "",
        })
        .to_string();
        let explore: ExploreResponse = self
            .get_guarded("trends/api/explore", &[("req", req.as_str())])
            .await?;
        explore
            .widgets
            .into_iter()
            .find(|w| w.id == kind.id())
            .ok_or_else(|| ServiceError::Malformed {
                service: "google-trends",
                detail: format!("explore response has no {} widget", kind.id()),
            })
    }

    /// One lookup: explore handshake plus the widget's data request.
    async fn widget_data<T: DeserializeOwned>(&self, term: &str, kind: WidgetKind) -> Result<T, ServiceError> {
        self.limiter.wait().await;
        let widget = self.widget(term, kind).await?;
        let req = widget.request.to_string();
        let data: WidgetData<T> = self
            .get_guarded(
                kind.data_path(),
                &[("req", req.as_str()), ("token", widget.token.as_str())],
            )
            .await?;
        Ok(data.default)
    }
}

/// Remove the `)]}'` prefix (optionally followed by a comma) Google puts in
/// front of its JSON.
fn strip_guard(body: &str) -> &str {
    let body = body.trim_start();
    match body.strip_prefix(")]}'") {
        Some(rest) => rest.trim_start_matches(',').trim_start(),
        None => body,
    }
}

#[async_trait(?Send)]
impl TrendSource for GoogleTrends {
    #[instrument(level = "debug", skip(self))]
    async fn interest_over_time(&self, term: &str) -> Result<Vec<u32>, ServiceError> {
        let timeline: Timeline = self.widget_data(term, WidgetKind::TimeSeries).await?;
        let series: Vec<u32> = timeline
            .timeline_data
            .into_iter()
            .map(|point| point.value.first().copied().unwrap_or(0))
            .collect();
        debug!(points = series.len(), "Fetched interest over time");
        Ok(series)
    }

    #[instrument(level = "debug", skip(self))]
    async fn related_queries(&self, term: &str) -> Result<RelatedQueries, ServiceError> {
        let lists: RankedLists = self.widget_data(term, WidgetKind::RelatedQueries).await?;
        let mut lists = lists.ranked_list.into_iter().map(|list| {
            list.ranked_keyword
                .into_iter()
                .filter_map(RankedKeyword::into_query)
                .collect::<Vec<_>>()
        });
        // Google returns top first, rising second.
        let top = lists.next().unwrap_or_default();
        let rising = lists.next().unwrap_or_default();
        debug!(top = top.len(), rising = rising.len(), "Fetched related queries");
        Ok(RelatedQueries { top, rising })
    }

    #[instrument(level = "debug", skip(self))]
    async fn related_topics(&self, term: &str) -> Result<Vec<String>, ServiceError> {
        let lists: RankedLists = self.widget_data(term, WidgetKind::RelatedTopics).await?;
        let topics: Vec<String> = lists
            .ranked_list
            .into_iter()
            .next()
            .map(|list| list.ranked_keyword)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|kw| kw.topic.map(|t| t.title))
            .filter(|title| !title.trim().is_empty())
            .take(MAX_TOPICS)
            .collect();
        debug!(topics = topics.len(), "Fetched related topics");
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EXPLORE: &str = r#")]}'
{"widgets":[
 {"id":"TIMESERIES","token":"tok-ts","request":{"time":"today 12-m"}},
 {"id":"RELATED_TOPICS","token":"tok-rt","request":{"restriction":{}}},
 {"id":"RELATED_QUERIES","token":"tok-rq","request":{"restriction":{}}}
]}"#;

    async fn server_with_explore() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EXPLORE))
            .mount(&server)
            .await;
        server
    }

    fn trends(server: &MockServer) -> GoogleTrends {
        GoogleTrends::with_base_url(Client::new(), "US", &server.uri(), Duration::ZERO).unwrap()
    }

    #[test]
    fn strip_guard_handles_both_prefixes() {
        assert_eq!(strip_guard(")]}'\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_guard(")]}',\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_guard("{\"a\":1}"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn interest_over_time_reads_first_value_per_point() {
        let server = server_with_explore().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/widgetdata/multiline"))
            .and(query_param("token", "tok-ts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#")]}',
{"default":{"timelineData":[{"value":[40]},{"value":[55]},{"value":[]}]}}"#,
            ))
            .mount(&server)
            .await;

        let series = trends(&server).interest_over_time("recipes").await.unwrap();
        assert_eq!(series, vec![40, 55, 0]);
    }

    #[tokio::test]
    async fn related_queries_splits_top_and_rising() {
        let server = server_with_explore().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/widgetdata/relatedsearches"))
            .and(query_param("token", "tok-rq"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#")]}',
{"default":{"rankedList":[
 {"rankedKeyword":[{"query":"chicken recipes","value":100,"formattedValue":"100"}]},
 {"rankedKeyword":[{"query":"air fryer tofu","value":6500,"formattedValue":"Breakout"},{"query":" ","value":1,"formattedValue":"+1%"}]}
]}}"#,
            ))
            .mount(&server)
            .await;

        let queries = trends(&server).related_queries("recipes").await.unwrap();
        assert_eq!(queries.top.len(), 1);
        assert_eq!(queries.top[0].query, "chicken recipes");
        assert_eq!(queries.rising.len(), 1);
        assert_eq!(queries.rising[0].formatted_value, "Breakout");
        assert_eq!(queries.rising[0].value, 6500);
    }

    #[tokio::test]
    async fn related_topics_uses_topic_titles() {
        let server = server_with_explore().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/widgetdata/relatedsearches"))
            .and(query_param("token", "tok-rt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#")]}',
{"default":{"rankedList":[{"rankedKeyword":[{"topic":{"title":"Chicken","type":"Food"},"value":100},{"topic":{"title":"Oven","type":"Appliance"},"value":40}]}]}}"#,
            ))
            .mount(&server)
            .await;

        let topics = trends(&server).related_topics("recipes").await.unwrap();
        assert_eq!(topics, vec!["Chicken", "Oven"]);
    }

    #[tokio::test]
    async fn rate_limited_response_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let err = trends(&server).related_topics("recipes").await.unwrap_err();
        assert_eq!(err.to_string(), "429 Too Many Requests Too Many Requests");
    }

    #[tokio::test]
    async fn missing_widget_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trends/api/explore"))
            .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n{\"widgets\":[]}"))
            .mount(&server)
            .await;

        let err = trends(&server).interest_over_time("recipes").await.unwrap_err();
        assert!(matches!(err, ServiceError::Malformed { .. }));
    }
}
