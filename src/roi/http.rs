use crate::error::AppError;
use crate::roi::{CommitRequest, ReferenceFrame, RoiClient, RoiError};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Error body returned by the service when it cannot produce a frame.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// ROI client speaking the service's HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpRoiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRoiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn frame_url(&self) -> String {
        format!("{}/get-frame", self.base_url)
    }

    pub fn roi_url(&self, lane: u8) -> String {
        format!("{}/roi/{lane}", self.base_url)
    }
}

impl RoiClient for HttpRoiClient {
    async fn fetch_reference_frame(&self) -> Result<ReferenceFrame, RoiError> {
        let url = self.frame_url();
        debug!(url = %url, "Fetching reference frame");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RoiError::Fetch(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| RoiError::Fetch(err.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|body| body.message)
                .unwrap_or_else(|_| format!("http status {}", status.as_u16()));
            return Err(RoiError::Fetch(message));
        }

        ReferenceFrame::decode(body.to_vec())
    }

    async fn commit_roi(&self, request: CommitRequest) -> Result<(), RoiError> {
        let url = self.roi_url(request.lane);
        debug!(url = %url, lane = request.lane, "Posting lane polygon");
        let response = self
            .client
            .post(&url)
            .json(&request.points)
            .send()
            .await
            .map_err(|err| RoiError::Commit {
                lane: request.lane,
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RoiError::Commit {
                lane: request.lane,
                reason: format!("http status {} ({})", status.as_u16(), body.trim()),
            })
        }
    }
}
