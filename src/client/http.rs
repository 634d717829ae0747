use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Body shape the backend uses for 4xx/5xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))
}

/// Check the status and decode a JSON body, normalizing non-2xx responses
/// into `AppError::Server { status, code, message }`.
pub(crate) async fn parse_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|err| AppError::Network(format!("failed to decode response body: {err}")))
}

/// Check the status of a response whose body we do not care about.
pub(crate) async fn check_ok(response: reqwest::Response) -> Result<(), AppError> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let (message, code) = match serde_json::from_str::<ErrorBody>(&raw) {
        Ok(body) => (
            body.message.unwrap_or_else(|| raw.clone()),
            body.code,
        ),
        Err(_) => (raw, None),
    };

    Err(AppError::Server {
        status: status.as_u16(),
        code,
        message,
    })
}
