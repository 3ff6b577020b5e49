use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::types::{
    AnalysisMode, AnalyzeRequest, AnswersRequest, JobId, JobResponse, JobTicket, MealDetail,
    MealId, MealUpload,
};

pub const DEFAULT_API_URL: &str = "https://nutrivision-api-dcr0.onrender.com";

/// The job-facing subset of the backend, as seen by the poller.
///
/// [`ApiClient`] is the real implementation; tests drive the poller with an
/// in-memory fake.
pub trait JobApi: Send + Sync + 'static {
    fn get_job(&self, job_id: JobId) -> impl Future<Output = Result<JobResponse, ApiError>> + Send;

    fn analyze(
        &self,
        meal_id: MealId,
        mode: AnalysisMode,
    ) -> impl Future<Output = Result<JobTicket, ApiError>> + Send;

    fn submit_answers(
        &self,
        meal_id: MealId,
        answers: &AnswersRequest,
    ) -> impl Future<Output = Result<JobTicket, ApiError>> + Send;
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ApiError> {
        Self::with_timeouts(
            base_url,
            token,
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }

    /// Build a client with explicit connect and whole-request timeouts.
    pub fn with_timeouts(
        base_url: impl Into<String>,
        token: Option<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Upload a meal photo; the returned meal id is what `analyze` expects.
    pub async fn upload_image(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        meal_type: &str,
    ) -> Result<MealUpload, ApiError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))?;
        let form = Form::new()
            .part("file", part)
            .text("meal_type", meal_type.to_string());

        tracing::debug!(file_name, meal_type, "uploading meal image");
        let response = self
            .request(Method::POST, "/meals/upload-image")
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_meal(&self, meal_id: MealId) -> Result<MealDetail, ApiError> {
        let response = self
            .request(Method::GET, &format!("/meals/{meal_id}"))
            .send()
            .await?;
        decode(response).await
    }
}

impl JobApi for ApiClient {
    async fn get_job(&self, job_id: JobId) -> Result<JobResponse, ApiError> {
        let response = self
            .request(Method::GET, &format!("/jobs/{job_id}"))
            .send()
            .await?;
        decode(response).await
    }

    async fn analyze(&self, meal_id: MealId, mode: AnalysisMode) -> Result<JobTicket, ApiError> {
        tracing::debug!(%meal_id, %mode, "requesting analysis");
        let response = self
            .request(Method::POST, &format!("/meals/{meal_id}/analyze"))
            .json(&AnalyzeRequest { mode })
            .send()
            .await?;
        decode(response).await
    }

    async fn submit_answers(
        &self,
        meal_id: MealId,
        answers: &AnswersRequest,
    ) -> Result<JobTicket, ApiError> {
        tracing::debug!(%meal_id, count = answers.answers.len(), "submitting answers");
        let response = self
            .request(Method::POST, &format!("/meals/{meal_id}/answers"))
            .json(answers)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::SessionExpired);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            detail: ApiError::detail_from_body(&body),
        });
    }

    Ok(response.json::<T>().await?)
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "image/jpeg",
    }
}
