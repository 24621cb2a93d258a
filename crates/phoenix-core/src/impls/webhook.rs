//! HttpWebhookExecutor - webhook 呼び出しの実装
//!
//! `POST target_url` に payload を body として送ります。下流で重複排除できるよう、
//! idempotency key を `Idempotency-Key` ヘッダで渡します（at-least-once のため）。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::domain::{ExecutionError, Job};
use crate::ports::JobExecutor;

pub const JOB_ID_HEADER: &str = "X-Phoenix-Job-Id";
pub const ATTEMPT_HEADER: &str = "X-Phoenix-Attempt";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

pub struct HttpWebhookExecutor {
    client: reqwest::Client,
    content_type: String,
}

impl HttpWebhookExecutor {
    pub fn new(request_timeout: Duration) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExecutionError::permanent(format!("http client: {e}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            content_type: "application/json".to_string(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Map an HTTP response status to an execution result.
///
/// 2xx succeeds; 408 and 429 are worth retrying; any other 4xx means the
/// request itself is wrong; everything else is presumed transient.
pub fn classify_status(status: StatusCode) -> Result<(), ExecutionError> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("target responded with HTTP {}", status.as_u16());
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExecutionError::transient(message));
    }
    if status.is_client_error() {
        return Err(ExecutionError::permanent(message));
    }
    Err(ExecutionError::transient(message))
}

fn classify_transport_error(err: &reqwest::Error) -> ExecutionError {
    if err.is_builder() {
        // malformed URL etc.: retrying cannot help
        ExecutionError::permanent(format!("invalid request: {err}"))
    } else if err.is_timeout() {
        ExecutionError::transient(format!("request timed out: {err}"))
    } else {
        ExecutionError::transient(format!("request failed: {err}"))
    }
}

#[async_trait]
impl JobExecutor for HttpWebhookExecutor {
    async fn execute(&self, job: &Job) -> Result<(), ExecutionError> {
        let response = self
            .client
            .post(&job.target_url)
            .header(CONTENT_TYPE, &self.content_type)
            .header(IDEMPOTENCY_KEY_HEADER, &job.idempotency_key)
            .header(JOB_ID_HEADER, job.id.to_string())
            .header(ATTEMPT_HEADER, (job.attempt_count + 1).to_string())
            .body(job.payload.clone())
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        debug!(job_id = %job.id, status = status.as_u16(), "webhook responded");
        classify_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, JobId, NewJob};
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    #[rstest]
    #[case::ok(200)]
    #[case::created(201)]
    #[case::accepted(202)]
    #[case::no_content(204)]
    fn success_statuses(#[case] code: u16) {
        assert!(classify_status(StatusCode::from_u16(code).unwrap()).is_ok());
    }

    #[rstest]
    #[case::bad_request(400, ErrorKind::Permanent)]
    #[case::not_found(404, ErrorKind::Permanent)]
    #[case::unprocessable(422, ErrorKind::Permanent)]
    #[case::request_timeout(408, ErrorKind::Transient)]
    #[case::rate_limited(429, ErrorKind::Transient)]
    #[case::server_error(500, ErrorKind::Transient)]
    #[case::unavailable(503, ErrorKind::Transient)]
    #[case::redirect(302, ErrorKind::Transient)]
    fn failure_statuses(#[case] code: u16, #[case] kind: ErrorKind) {
        let err = classify_status(StatusCode::from_u16(code).unwrap()).unwrap_err();
        assert_eq!(err.kind(), kind);
        assert!(err.message().contains(&code.to_string()));
    }

    #[tokio::test]
    async fn malformed_url_is_permanent() {
        let executor = HttpWebhookExecutor::new(Duration::from_secs(1)).unwrap();
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob::new("not a url", "{}", "k"),
            Utc::now(),
        );

        let err = executor.execute(&job).await.unwrap_err();

        assert!(err.is_permanent(), "{err}");
    }
}
