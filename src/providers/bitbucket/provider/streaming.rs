use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;

use crate::diagnostics::LogStreamSender;
use crate::error::Result;
use crate::providers::bitbucket::client::BitbucketClient;

/// Producer task behind a live step log: forwards lines until the step is
/// finished and its log fully read, then reports how it ended.
pub(super) async fn produce(
    client: Arc<BitbucketClient>,
    pipeline_id: String,
    step_id: String,
    interval: Duration,
    sender: LogStreamSender,
) {
    let LogStreamSender { lines, done } = sender;
    let result = follow_log(&client, &pipeline_id, &step_id, interval, &lines).await;
    drop(lines);
    let _ = done.send(result);
}

async fn follow_log(
    client: &BitbucketClient,
    pipeline_id: &str,
    step_id: &str,
    interval: Duration,
    lines: &mpsc::Sender<String>,
) -> Result<()> {
    let mut offset = 0;
    let mut splitter = LineSplitter::default();

    loop {
        if lines.is_closed() {
            debug!("Log consumer for step {step_id} went away");
            return Ok(());
        }

        // State first: bytes read after a terminal state are the final ones.
        let step = client.get_step(pipeline_id, step_id).await?;
        let finished = step.state.to_status().state.is_terminal();

        let chunk = client.get_log_from(pipeline_id, step_id, offset).await?;
        let received = chunk.is_some();

        if let Some(bytes) = chunk {
            offset += bytes.len();
            for line in splitter.push(&bytes) {
                if lines.send(line).await.is_err() {
                    debug!("Log consumer for step {step_id} went away");
                    return Ok(());
                }
            }
        }

        if finished && !received {
            if let Some(rest) = splitter.finish() {
                let _ = lines.send(rest).await;
            }
            return Ok(());
        }

        if !received {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = lines.closed() => {
                    debug!("Log consumer for step {step_id} went away");
                    return Ok(());
                }
            }
        }
    }
}

/// Cuts a byte stream into lines. Bytes are only decoded once a line is
/// complete, so multi-byte characters split across reads survive.
#[derive(Default)]
struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    fn finish(self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.partial).into_owned())
        }
    }
}
