use std::future::Future;
use std::time::Duration;

use ai_provider_core::CoreError;
use tokio_util::sync::CancellationToken;

/// Races a request future against `ctx` cancellation and a per-attempt
/// timeout, classifying whatever comes back into the error taxonomy
/// (spec §4.A "honours ctx", §5 "innermost bound wins").
pub async fn race<F>(ctx: &CancellationToken, timeout: Duration, fut: F) -> Result<reqwest::Response, CoreError>
where
    F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    tokio::select! {
        _ = ctx.cancelled() => Err(CoreError::canceled()),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(err)) => {
                let classified = classify_reqwest_error(&err);
                tracing::debug!(kind = classified.kind.as_str(), %err, "upstream request failed");
                Err(classified)
            }
            Err(_) => {
                tracing::debug!(?timeout, "upstream request timed out");
                Err(CoreError::timeout(format!("no response within {timeout:?}")))
            }
        },
    }
}

/// Reads the body and folds a non-2xx status into the taxonomy (spec §4.A
/// error conditions, §7 status table).
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(300).collect();
    tracing::debug!(status = status.as_u16(), %snippet, "upstream returned a non-success status");
    Err(CoreError::from_http_status(
        status.as_u16(),
        format!("upstream returned {status}: {snippet}"),
    ))
}

fn classify_reqwest_error(err: &reqwest::Error) -> CoreError {
    if err.is_timeout() {
        return CoreError::timeout(err.to_string());
    }
    if err.is_connect() {
        return CoreError::transport(err.to_string());
    }
    if err.is_decode() || err.is_body() {
        return CoreError::bad_response(err.to_string());
    }
    if let Some(status) = err.status() {
        return CoreError::from_http_status(status.as_u16(), err.to_string());
    }
    CoreError::transport(err.to_string())
}
