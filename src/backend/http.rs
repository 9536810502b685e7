use super::{AnalysisResult, AudioSubmission, SkipBackend, TimingCorrection};
use crate::config::ServerConfig;
use crate::segments::{SegmentId, SkipSegment};
use crate::{Result, SkipError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// reqwest-backed client for the skip backend
#[derive(Debug, Clone)]
pub struct HttpSkipBackend {
    base: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

impl HttpSkipBackend {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| SkipError::Config(format!("invalid server url {}: {}", config.url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve an API path (without leading slash) against the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| SkipError::Config(format!("cannot build url for {}: {}", path, e)))
    }

    fn lookup_url(&self, media_id: &str) -> Result<Url> {
        self.endpoint(&format!("api/skip/{}", urlencoding::encode(media_id)))
    }

    fn segment_url(&self, id: &SegmentId) -> Result<Url> {
        self.endpoint(&format!("api/skip/{}", urlencoding::encode(&id.to_string())))
    }

    async fn error_from(response: reqwest::Response) -> SkipError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or(text);
        SkipError::Backend { status, message }
    }
}

#[async_trait]
impl SkipBackend for HttpSkipBackend {
    async fn ping(&self) -> Result<bool> {
        let response = self.client.get(self.endpoint("api/ping")?).send().await?;
        let body: PingResponse = response.json().await?;
        Ok(body.message.as_deref() == Some("pong"))
    }

    async fn lookup(&self, media_id: &str) -> Result<Option<Vec<SkipSegment>>> {
        let url = self.lookup_url(media_id)?;
        debug!("Looking up skips at {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            info!("Lookup for {} returned {}", media_id, response.status());
            return Ok(None);
        }

        let segments: Vec<SkipSegment> = response.json().await?;
        Ok(Some(segments))
    }

    async fn analyze_audio(&self, submission: AudioSubmission) -> Result<AnalysisResult> {
        info!(
            "📤 Sending {:.2} KB for fingerprint analysis ({} @ {}s)",
            submission.audio.len() as f64 / 1024.0,
            submission.media_id,
            submission.start_time
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "audio",
                reqwest::multipart::Part::bytes(submission.audio)
                    .file_name("audio.webm")
                    .mime_str("audio/webm")?,
            )
            .text("media_id", submission.media_id)
            .text("start_time", submission.start_time.to_string());

        let response = self
            .client
            .post(self.endpoint("api/skip/analyze-audio")?)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        Ok(response.json().await?)
    }

    async fn update_segment(&self, id: &SegmentId, correction: TimingCorrection) -> Result<SkipSegment> {
        let response = self
            .client
            .patch(self.segment_url(id)?)
            .json(&correction)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> HttpSkipBackend {
        HttpSkipBackend::new(&ServerConfig {
            url: url.to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoints_resolve_against_base() {
        let backend = backend("http://localhost:3000");
        assert_eq!(backend.endpoint("api/ping").unwrap().as_str(), "http://localhost:3000/api/ping");
        assert_eq!(
            backend.lookup_url("tt123_1_2").unwrap().as_str(),
            "http://localhost:3000/api/skip/tt123_1_2"
        );
        assert_eq!(
            backend.segment_url(&SegmentId::Number(42)).unwrap().as_str(),
            "http://localhost:3000/api/skip/42"
        );
    }

    #[test]
    fn test_base_with_path_prefix_is_kept() {
        let backend = backend("https://skips.example.com/v1");
        assert_eq!(
            backend.endpoint("api/skip/analyze-audio").unwrap().as_str(),
            "https://skips.example.com/v1/api/skip/analyze-audio"
        );
    }

    #[test]
    fn test_rejects_invalid_base() {
        let result = HttpSkipBackend::new(&ServerConfig {
            url: "::nope".to_string(),
            timeout_seconds: 5,
        });
        assert!(matches!(result, Err(SkipError::Config(_))));
    }

    #[test]
    fn test_correction_body_shape() {
        let body = serde_json::to_value(TimingCorrection { start_sec: 5.0, end_sec: 70.0 }).unwrap();
        assert_eq!(body, serde_json::json!({"start_sec": 5.0, "end_sec": 70.0}));
    }
}
