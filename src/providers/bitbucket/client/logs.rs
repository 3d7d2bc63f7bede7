use log::debug;
use reqwest::header::RANGE;
use reqwest::StatusCode;

use super::core::BitbucketClient;
use crate::diagnostics::StepLog;
use crate::error::Result;

/// Upper bound on the log text kept by a one-shot fetch; only the tail is
/// retained.
pub const MAX_LOG_BYTES: usize = 8 * 1024 * 1024;

impl BitbucketClient {
    /// Fetches the tail of a step log.
    ///
    /// A missing log (404) is [`StepLog::Unavailable`], not an error.
    pub async fn get_step_log(&self, pipeline_id: &str, step_id: &str) -> Result<StepLog> {
        let url = self.endpoint(&[pipeline_id, "steps", step_id, "log"])?;
        let request = self
            .request(url)
            .header(RANGE, format!("bytes=-{MAX_LOG_BYTES}"));
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Ok(StepLog::Unavailable(format!(
                    "log for step {step_id} is not available"
                )))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => return Ok(StepLog::Available(String::new())),
            _ => {}
        }

        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        debug!("Fetched {} log bytes for step {step_id}", bytes.len());

        Ok(StepLog::Available(tail_text(&bytes, MAX_LOG_BYTES)))
    }

    /// Log bytes from `offset` onwards, or `None` when nothing new is there
    /// yet (or the log does not exist yet).
    pub async fn get_log_from(
        &self,
        pipeline_id: &str,
        step_id: &str,
        offset: usize,
    ) -> Result<Option<Vec<u8>>> {
        let url = self.endpoint(&[pipeline_id, "steps", step_id, "log"])?;
        let request = self.request(url).header(RANGE, format!("bytes={offset}-"));
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::RANGE_NOT_SATISFIABLE => return Ok(None),
            StatusCode::PARTIAL_CONTENT => {
                let bytes = response.bytes().await?;
                return Ok((!bytes.is_empty()).then(|| bytes.to_vec()));
            }
            _ => {}
        }

        // Range ignored: the whole log came back.
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(bytes
            .get(offset..)
            .filter(|rest| !rest.is_empty())
            .map(<[u8]>::to_vec))
    }
}

/// Lossy text of the last `limit` bytes. When the log was cut, the first
/// (partial) line is dropped.
fn tail_text(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let tail = &bytes[bytes.len() - limit..];
    let start = tail
        .iter()
        .position(|&b| b == b'\n')
        .map_or(0, |newline| newline + 1);
    String::from_utf8_lossy(&tail[start..]).into_owned()
}
