use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::modules::notifications::{Notification, NotificationPreferences, NotificationType};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("response missing data")]
    MissingData,
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Common `{success, data, error}` wrapper of every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub has_new_notifications: bool,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    pub last_update_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: usize,
}

#[derive(Debug, Serialize)]
struct TestRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub context: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorBatch<'a> {
    errors: &'a [ErrorReport],
}

/// Server-side collaborator of the notification pipeline.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self, limit: usize) -> ApiResult<Vec<Notification>>;
    async fn unread_count(&self) -> ApiResult<usize>;
    async fn preferences(&self) -> ApiResult<NotificationPreferences>;
    async fn update_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> ApiResult<NotificationPreferences>;
    async fn poll(&self, since: DateTime<Utc>) -> ApiResult<PollResponse>;
    async fn mark_read(&self, id: &str) -> ApiResult<()>;
    async fn mark_all_read(&self) -> ApiResult<()>;
    async fn send_test(&self, kind: NotificationType) -> ApiResult<()>;
    async fn report_errors(&self, batch: &[ErrorReport]) -> ApiResult<()>;
}

pub fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct HttpNotificationApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpNotificationApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ApiResult<Self> {
        // A trailing slash makes `join` append instead of replacing the last segment.
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notifdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base, token })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<Option<T>> {
        let res = self.authorize(req).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        let envelope: Envelope<T> = res.json().await?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(envelope.data)
    }

    async fn send_data<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        self.send(req).await?.ok_or(ApiError::MissingData)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, limit: usize) -> ApiResult<Vec<Notification>> {
        let req = self
            .client
            .get(self.endpoint("notifications")?)
            .query(&[("limit", limit)]);
        self.send_data(req).await
    }

    async fn unread_count(&self) -> ApiResult<usize> {
        let req = self.client.get(self.endpoint("notifications/unread-count")?);
        let count: UnreadCount = self.send_data(req).await?;
        Ok(count.count)
    }

    async fn preferences(&self) -> ApiResult<NotificationPreferences> {
        let req = self.client.get(self.endpoint("notifications/preferences")?);
        self.send_data(req).await
    }

    async fn update_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> ApiResult<NotificationPreferences> {
        let req = self
            .client
            .put(self.endpoint("notifications/preferences")?)
            .json(prefs);
        self.send_data(req).await
    }

    async fn poll(&self, since: DateTime<Utc>) -> ApiResult<PollResponse> {
        let req = self
            .client
            .get(self.endpoint("notifications/poll")?)
            .query(&[("since", format_cursor(since))]);
        self.send_data(req).await
    }

    async fn mark_read(&self, id: &str) -> ApiResult<()> {
        let mut url = self.endpoint("notifications/")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(id)
            .push("read");
        let _: Option<serde_json::Value> = self.send(self.client.post(url)).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> ApiResult<()> {
        let req = self.client.post(self.endpoint("notifications/read-all")?);
        let _: Option<serde_json::Value> = self.send(req).await?;
        Ok(())
    }

    async fn send_test(&self, kind: NotificationType) -> ApiResult<()> {
        let req = self
            .client
            .post(self.endpoint("notifications/test")?)
            .json(&TestRequest { kind: kind.as_str() });
        let _: Option<serde_json::Value> = self.send(req).await?;
        Ok(())
    }

    async fn report_errors(&self, batch: &[ErrorReport]) -> ApiResult<()> {
        let req = self
            .client
            .post(self.endpoint("errors")?)
            .json(&ErrorBatch { errors: batch });
        let _: Option<serde_json::Value> = self.send(req).await?;
        Ok(())
    }
}
