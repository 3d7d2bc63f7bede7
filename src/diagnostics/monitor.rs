use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PipeLensError, Result};

use super::analyzer::{AnalyzerOptions, LogAnalysisResult, LogAnalyzer, DEFAULT_CONTEXT_LINES};
use super::model::{Pipeline, PipelineState, Step, StepState};
use super::patterns::{Category, PatternTable, Severity};
use super::source::{LogStream, PipelineSource};
use super::step_filter::filter_steps;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const STREAM_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Stream and analyze step logs as steps start running.
    pub follow: bool,
    pub step: Option<String>,
    pub failed_only: bool,
    pub context_lines: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            follow: false,
            step: None,
            failed_only: false,
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

/// Incremental status line rendered on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchUpdate {
    /// Monotonic poll sequence number, starting at 1.
    pub poll: u64,
    pub ordinal: u64,
    pub state: PipelineState,
    pub elapsed_seconds: u64,
    pub active_steps: Vec<String>,
    pub completed_steps: usize,
    pub total_steps: usize,
}

impl WatchUpdate {
    fn new(poll: u64, pipeline: &Pipeline, steps: &[Step]) -> Self {
        Self {
            poll,
            ordinal: pipeline.ordinal,
            state: pipeline.state(),
            elapsed_seconds: pipeline.timing.elapsed_seconds(Utc::now()),
            active_steps: steps
                .iter()
                .filter(|step| step.state() == PipelineState::InProgress)
                .map(|step| step.name.clone())
                .collect(),
            completed_steps: steps
                .iter()
                .filter(|step| step.state().is_terminal())
                .count(),
            total_steps: steps.len(),
        }
    }
}

/// Records produced by a watch session, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    /// The pipeline was already finished; nothing was polled.
    Final {
        ordinal: u64,
        state: PipelineState,
        elapsed_seconds: u64,
    },
    Update(WatchUpdate),
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    StepObserved {
        step: String,
        state: StepState,
    },
    /// Error or critical line seen while a step log is streaming.
    StepFlagged {
        step: String,
        line_number: usize,
        category: Category,
        severity: Severity,
        content: String,
    },
    /// Categorized analysis of a step log once its stream has closed.
    StepSummary {
        step: String,
        analysis: LogAnalysisResult,
    },
    StreamFailed {
        step: String,
        message: String,
    },
    Completed {
        ordinal: u64,
        state: PipelineState,
        elapsed_seconds: u64,
        polls: u64,
    },
}

/// Receives watch records as they happen. Each call must render one
/// complete record.
pub trait WatchSink {
    fn emit(&mut self, event: &WatchEvent);
}

impl WatchSink for Vec<WatchEvent> {
    fn emit(&mut self, event: &WatchEvent) {
        self.push(event.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Completed(PipelineState),
    Cancelled,
}

/// Per-invocation state of the monitor.
struct WatchSession {
    last_state: PipelineState,
    seen: HashSet<(String, StepState)>,
    streamed: HashSet<String>,
    polls: u64,
}

impl WatchSession {
    fn new(state: PipelineState) -> Self {
        Self {
            last_state: state,
            seen: HashSet::new(),
            streamed: HashSet::new(),
            polls: 0,
        }
    }
}

#[derive(Debug)]
enum StreamEvent {
    Line { step_id: String, line: String },
    Closed { step_id: String },
    Failed { step_id: String, message: String },
}

struct OpenStream {
    name: String,
    lines: Vec<String>,
    task: JoinHandle<()>,
}

/// Streams being followed; forwarding tasks are aborted when dropped.
#[derive(Default)]
struct OpenStreams(HashMap<String, OpenStream>);

impl Drop for OpenStreams {
    fn drop(&mut self) {
        for stream in self.0.values() {
            stream.task.abort();
        }
    }
}

/// Polling state machine behind `watch` and `watch --follow`.
///
/// `Initializing` fetches the pipeline once and stops there when it is
/// already terminal. Otherwise the loop polls on a fixed interval until the
/// pipeline reaches a terminal state, the cancel future resolves, or a fetch
/// fails. Fetch errors are returned as-is, without retrying.
pub struct MonitorLoop<'a, S: PipelineSource + ?Sized> {
    source: &'a S,
    table: &'a PatternTable,
    options: WatchOptions,
}

impl<'a, S: PipelineSource + ?Sized> MonitorLoop<'a, S> {
    pub fn new(source: &'a S, table: &'a PatternTable, options: WatchOptions) -> Self {
        Self {
            source,
            table,
            options,
        }
    }

    /// Runs one watch session against `pipeline_id`.
    ///
    /// # Errors
    ///
    /// Returns the first pipeline or step fetch error.
    pub async fn run<K, F>(&self, pipeline_id: &str, sink: &mut K, cancel: F) -> Result<WatchOutcome>
    where
        K: WatchSink + ?Sized,
        F: Future<Output = ()>,
    {
        let pipeline = self.source.get_pipeline(pipeline_id).await?;

        if pipeline.state().is_terminal() {
            info!(
                "Pipeline #{} already finished ({})",
                pipeline.ordinal,
                pipeline.state()
            );
            sink.emit(&WatchEvent::Final {
                ordinal: pipeline.ordinal,
                state: pipeline.state(),
                elapsed_seconds: pipeline.timing.elapsed_seconds(Utc::now()),
            });
            return Ok(WatchOutcome::Completed(pipeline.state()));
        }

        tokio::pin!(cancel);

        let mut session = WatchSession::new(pipeline.state());
        let mut streams = OpenStreams::default();
        let (event_tx, mut event_rx) = mpsc::channel(STREAM_EVENT_CAPACITY);

        let steps = self.source.list_steps(pipeline_id).await?;
        self.observe(pipeline_id, &pipeline, &steps, &mut session, &mut streams, &event_tx, sink)
            .await;

        let mut current = pipeline;

        while !current.state().is_terminal() {
            let tick = tokio::time::sleep(self.options.poll_interval);
            tokio::pin!(tick);

            loop {
                tokio::select! {
                    biased;
                    () = &mut cancel => {
                        info!("Watch cancelled");
                        return Ok(WatchOutcome::Cancelled);
                    }
                    () = &mut tick => break,
                    Some(event) = event_rx.recv() => {
                        self.handle_stream_event(event, &mut streams, sink);
                    }
                }
            }

            let pipeline = self.source.get_pipeline(pipeline_id).await?;
            let steps = self.source.list_steps(pipeline_id).await?;

            self.observe(pipeline_id, &pipeline, &steps, &mut session, &mut streams, &event_tx, sink)
                .await;

            if pipeline.state() != session.last_state {
                sink.emit(&WatchEvent::StateChanged {
                    from: session.last_state,
                    to: pipeline.state(),
                });
                session.last_state = pipeline.state();
            }

            current = pipeline;
        }

        while !streams.0.is_empty() {
            tokio::select! {
                biased;
                () = &mut cancel => {
                    info!("Watch cancelled while draining log streams");
                    return Ok(WatchOutcome::Cancelled);
                }
                Some(event) = event_rx.recv() => {
                    self.handle_stream_event(event, &mut streams, sink);
                }
            }
        }

        sink.emit(&WatchEvent::Completed {
            ordinal: current.ordinal,
            state: current.state(),
            elapsed_seconds: current.timing.elapsed_seconds(Utc::now()),
            polls: session.polls,
        });

        Ok(WatchOutcome::Completed(current.state()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn observe<K: WatchSink + ?Sized>(
        &self,
        pipeline_id: &str,
        pipeline: &Pipeline,
        steps: &[Step],
        session: &mut WatchSession,
        streams: &mut OpenStreams,
        event_tx: &mpsc::Sender<StreamEvent>,
        sink: &mut K,
    ) {
        session.polls += 1;
        sink.emit(&WatchEvent::Update(WatchUpdate::new(
            session.polls,
            pipeline,
            steps,
        )));

        for step in filter_steps(steps, self.options.step.as_deref(), false) {
            let fingerprint = (step.id.clone(), step.state());
            if !session.seen.insert(fingerprint) {
                continue;
            }

            if step.state() != PipelineState::Pending {
                sink.emit(&WatchEvent::StepObserved {
                    step: step.name.clone(),
                    state: step.state(),
                });
            }

            if self.should_stream(step, session) {
                session.streamed.insert(step.id.clone());
                self.open_stream(pipeline_id, step, streams, event_tx, sink)
                    .await;
            }
        }
    }

    fn should_stream(&self, step: &Step, session: &WatchSession) -> bool {
        if !self.options.follow || session.streamed.contains(&step.id) {
            return false;
        }
        match step.state() {
            PipelineState::Pending => false,
            state if self.options.failed_only => state.is_failure(),
            _ => true,
        }
    }

    async fn open_stream<K: WatchSink + ?Sized>(
        &self,
        pipeline_id: &str,
        step: &Step,
        streams: &mut OpenStreams,
        event_tx: &mpsc::Sender<StreamEvent>,
        sink: &mut K,
    ) {
        match self.source.stream_step_log(pipeline_id, &step.id).await {
            Ok(stream) => {
                debug!("Following log of step '{}'", step.name);
                let task = tokio::spawn(forward_stream(
                    step.id.clone(),
                    stream,
                    event_tx.clone(),
                ));
                streams.0.insert(
                    step.id.clone(),
                    OpenStream {
                        name: step.name.clone(),
                        lines: Vec::new(),
                        task,
                    },
                );
            }
            Err(e) => {
                warn!("Could not open log stream for step '{}': {e}", step.name);
                sink.emit(&WatchEvent::StreamFailed {
                    step: step.name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn handle_stream_event<K: WatchSink + ?Sized>(
        &self,
        event: StreamEvent,
        streams: &mut OpenStreams,
        sink: &mut K,
    ) {
        match event {
            StreamEvent::Line { step_id, line } => {
                let Some(stream) = streams.0.get_mut(&step_id) else {
                    return;
                };
                stream.lines.push(line);
                let line = stream.lines.last().map_or("", String::as_str);
                if let Some(pattern) = self.table.classify(line) {
                    if pattern.severity.is_error() {
                        sink.emit(&WatchEvent::StepFlagged {
                            step: stream.name.clone(),
                            line_number: stream.lines.len(),
                            category: pattern.category,
                            severity: pattern.severity,
                            content: line.to_string(),
                        });
                    }
                }
            }
            StreamEvent::Closed { step_id } => {
                if let Some(stream) = streams.0.remove(&step_id) {
                    self.summarize(stream, sink);
                }
            }
            StreamEvent::Failed { step_id, message } => {
                if let Some(stream) = streams.0.remove(&step_id) {
                    warn!("Log stream for step '{}' failed: {message}", stream.name);
                    sink.emit(&WatchEvent::StreamFailed {
                        step: stream.name.clone(),
                        message,
                    });
                    if !stream.lines.is_empty() {
                        self.summarize(stream, sink);
                    }
                }
            }
        }
    }

    fn summarize<K: WatchSink + ?Sized>(&self, stream: OpenStream, sink: &mut K) {
        let options = AnalyzerOptions {
            context_lines: self.options.context_lines,
            record_warnings: false,
        };
        let analysis = LogAnalyzer::analyze_lines(self.table, &stream.lines, options);
        sink.emit(&WatchEvent::StepSummary {
            step: stream.name,
            analysis,
        });
    }
}

/// Relays one producer's line and completion channels into the monitor's
/// single event channel.
///
/// Lines already buffered when the producer reports completion are still
/// delivered; nothing waits on the line channel after that.
async fn forward_stream(step_id: String, mut stream: LogStream, tx: mpsc::Sender<StreamEvent>) {
    let mut lines_open = true;

    let result = loop {
        tokio::select! {
            biased;
            line = stream.lines.recv(), if lines_open => match line {
                Some(line) => {
                    let event = StreamEvent::Line { step_id: step_id.clone(), line };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                None => lines_open = false,
            },
            result = &mut stream.done => {
                while let Ok(line) = stream.lines.try_recv() {
                    let event = StreamEvent::Line { step_id: step_id.clone(), line };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                break result.unwrap_or_else(|_| {
                    Err(PipeLensError::Stream("log producer exited without a status".into()))
                });
            }
        }
    };

    let event = match result {
        Ok(()) => StreamEvent::Closed { step_id },
        Err(e) => StreamEvent::Failed {
            step_id,
            message: e.to_string(),
        },
    };
    let _ = tx.send(event).await;
}
