//! Run lifecycle controller.
//!
//! Drives one run from frame extraction to downloaded outputs and emits
//! events for presentation layers. Every state change is written to the run
//! record so an interrupted or failed run can be inspected on disk.

use super::poll::{wait_for_completion, PollPolicy};
use super::post_process::{copy_summary_outputs, save_console_log};
use crate::error::{self, PipelineError, RunError};
use crate::extract::FrameExtractor;
use crate::model::{RunConfig, RunEvent, RunState};
use crate::node::hosts::HostSelector;
use crate::node::{NodeConnector, TaskApi};
use crate::paths::{self, RunPaths};
use crate::run_id;
use crate::storage::{save_record, RunRecord};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// What to process. A missing `run_id` is generated from the video.
#[derive(Debug, Clone)]
pub(crate) struct RunRequest {
    pub video: PathBuf,
    pub run_id: Option<String>,
}

pub(crate) struct Orchestrator<X, N> {
    cfg: RunConfig,
    runs_dir: PathBuf,
    data_dir: PathBuf,
    extractor: X,
    connector: N,
    selector: HostSelector,
    events: UnboundedSender<RunEvent>,
}

/// Mutable state of the run being driven.
struct ActiveRun {
    record: RunRecord,
    paths: RunPaths,
    /// Step currently being executed; reported as the failing stage.
    step: RunState,
    events: UnboundedSender<RunEvent>,
}

impl ActiveRun {
    fn save(&self) -> Result<(), PipelineError> {
        save_record(&self.paths.record, &self.record).map_err(|e| {
            PipelineError::io(
                "write run record",
                &self.paths.record,
                std::io::Error::other(format!("{e:#}")),
            )
        })
    }

    /// Start working towards `next` without entering it yet.
    fn attempt(&mut self, next: RunState) {
        self.step = next;
    }

    fn advance(&mut self, next: RunState) -> Result<(), PipelineError> {
        debug_assert!(
            self.record.state.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.record.state
        );
        info!(run_id = %self.record.run_id, from = %self.record.state, state = %next, "run state changed");
        self.record.state = next;
        self.step = next;
        let _ = self.events.send(RunEvent::StateChanged {
            run_id: self.record.run_id.clone(),
            state: next,
        });
        self.save()
    }

    fn fail(mut self, source: PipelineError) -> RunError {
        error!(run_id = %self.record.run_id, stage = %self.step, error = %error::chain(&source), "run failed");
        self.record.state = RunState::Failed;
        self.record.failed_stage = Some(self.step);
        self.record.error = Some(error::chain(&source));
        if let Err(e) = self.save() {
            warn!(run_id = %self.record.run_id, error = %error::chain(&e), "could not record failure");
        }
        let _ = self.events.send(RunEvent::StateChanged {
            run_id: self.record.run_id.clone(),
            state: RunState::Failed,
        });
        RunError {
            run_id: Some(self.record.run_id),
            stage: self.step,
            source,
        }
    }
}

impl<X: FrameExtractor, N: NodeConnector> Orchestrator<X, N> {
    pub fn new(
        cfg: RunConfig,
        runs_dir: PathBuf,
        data_dir: PathBuf,
        extractor: X,
        connector: N,
        events: UnboundedSender<RunEvent>,
    ) -> Self {
        let selector = HostSelector::new(cfg.hosts.clone());
        Self {
            cfg,
            runs_dir,
            data_dir,
            extractor,
            connector,
            selector,
            events,
        }
    }

    /// Execute one run to `Done`, or to `Failed` with the failing stage.
    pub async fn run(&self, req: RunRequest) -> Result<RunRecord, RunError> {
        let mut active = self.start(req)?;
        match self.drive(&mut active).await {
            Ok(()) => Ok(active.record),
            Err(e) => Err(active.fail(e)),
        }
    }

    /// Assign the run id and claim the run directory.
    fn start(&self, req: RunRequest) -> Result<ActiveRun, RunError> {
        let init_err = |run_id: Option<&str>, source| RunError {
            run_id: run_id.map(str::to_string),
            stage: RunState::Init,
            source,
        };
        let video =
            paths::resolve_video(&req.video, &self.data_dir).map_err(|e| init_err(None, e))?;
        let now = run_id::now();
        let run_id = match req.run_id {
            Some(id) => {
                run_id::validate(&id).map_err(|e| init_err(None, e))?;
                id
            }
            None => run_id::generate(&video, now).map_err(|e| init_err(None, e))?,
        };
        let paths = RunPaths::new(&self.runs_dir, &self.data_dir, &run_id);
        paths.claim().map_err(|e| init_err(Some(run_id.as_str()), e))?;

        let created = now.format(&Rfc3339).unwrap_or_default();
        let record = RunRecord::new(run_id.clone(), video, created, self.cfg.clone());
        let active = ActiveRun {
            record,
            paths,
            step: RunState::Init,
            events: self.events.clone(),
        };
        active.save().map_err(|e| init_err(Some(run_id.as_str()), e))?;
        info!(run_id = %run_id, video = %active.record.video.display(), "run created");
        Ok(active)
    }

    async fn drive(&self, run: &mut ActiveRun) -> Result<(), PipelineError> {
        run.advance(RunState::Extracting)?;
        let frames = self
            .extractor
            .extract(&run.record.video, &run.paths.frames_dir, &self.cfg.extract)
            .await?;
        if frames.is_empty() {
            return Err(PipelineError::Extraction {
                reason: format!("no frames extracted from {}", run.record.video.display()),
            });
        }
        run.record.frame_count = frames.len();
        info!(run_id = %run.record.run_id, frames = frames.len(), "frames ready");

        run.attempt(RunState::HostSelected);
        let host = self.select_host().await?;
        run.record.host = Some(host.clone());
        let _ = self.events.send(RunEvent::Info(format!("Backend: {host}")));
        run.advance(RunState::HostSelected)?;

        run.attempt(RunState::Submitted);
        let client = self.connector.connect(&host)?;
        let task_id = client
            .create_task(&run.record.run_id, frames.paths(), &self.cfg.odm_options)
            .await?;
        info!(run_id = %run.record.run_id, host = %host, task = %task_id, "task created");
        run.record.task_id = Some(task_id.clone());
        run.advance(RunState::Submitted)?;

        run.advance(RunState::Polling)?;
        let policy = PollPolicy {
            interval: self.cfg.poll_interval(),
            max_transient_errors: self.cfg.max_poll_errors.max(1),
        };
        let record = &mut run.record;
        let outcome = wait_for_completion(&client, &task_id, policy, &self.events, |snap| {
            record.task = Some(snap.clone());
        })
        .await;
        if matches!(outcome, Ok(_) | Err(PipelineError::TaskFailed { .. })) {
            let log = run.paths.logs_dir.join("odm_console.txt");
            save_console_log(&client, &task_id, &log).await;
        }
        outcome?;

        run.advance(RunState::Downloading)?;
        let files = client.download_outputs(&task_id, &run.paths.odm_dir).await?;
        info!(run_id = %run.record.run_id, files = files.len(), dir = %run.paths.odm_dir.display(), "outputs downloaded");
        run.record.output_dir = Some(run.paths.odm_dir.clone());
        run.record.downloaded_files = files.len();

        if self.cfg.copy_processed {
            run.advance(RunState::Summarizing)?;
            run.record.summary_files =
                copy_summary_outputs(&run.paths.odm_dir, &run.paths.processed_dir)?;
            info!(run_id = %run.record.run_id, copied = run.record.summary_files.len(), "summary copies made");
        }

        run.advance(RunState::Done)
    }

    /// Host selection, repeated in rounds while every host is unreachable.
    async fn select_host(&self) -> Result<String, PipelineError> {
        let rounds = self.cfg.probe_rounds.max(1);
        let mut round = 1;
        loop {
            match self.selector.select(&self.connector).await {
                Ok(host) => return Ok(host),
                Err(e) if round < rounds && !self.selector.hosts().is_empty() => {
                    warn!(round, rounds, error = %e, "no backend host available, retrying");
                    tokio::time::sleep(self.cfg.poll_interval()).await;
                    round += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
