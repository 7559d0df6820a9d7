use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use reqwest::Url;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, trace, warn};

use crate::cancellation::{CancelDecision, CancelResolution, CancellationController};
use crate::collaborators::{AuditSink, ConfigProvider, IdentityProvider, resolve_identity};
use crate::completion::{AuditStats, AuditTicket, CompletionSideEffects, SynopsisBudget, derive_record};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, SubmissionError, ValidationError};
use crate::scheduler::PollingScheduler;
use crate::state_machine::{JobHandle, JobSnapshot, JobState, JobStateMachine, Transition};
use crate::transport::JobTransport;

/// Immutable picture of the orchestrator, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub handle: Option<JobHandle>,
    pub subject: Option<String>,
    pub state: JobState,
    pub snapshot: JobSnapshot,
    /// Number of stages in the pipeline.
    pub stage_count: u8,
    /// `start` has been sent and not yet answered.
    pub submitting: bool,
    pub cancel_requested: bool,
    pub cancel_resolution: Option<CancelResolution>,
    pub polling: bool,
}

impl JobView {
    /// True while the job still needs attention: submitting, or active and not cancelled.
    pub fn is_active(&self) -> bool {
        self.submitting || (self.state.is_active() && !self.cancel_requested)
    }
}

/// Result of [`JobOrchestrator::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The cancel call finished and the job is `Cancelled`.
    Resolved(CancelResolution),
    /// Submission is still pending; its handle is cancelled as soon as it arrives.
    Deferred,
    /// Another cancel is outstanding or already finished.
    AlreadyRequested,
    /// The job had already reached a terminal state; nothing changed.
    AlreadyTerminal,
}

/// Drives one job at a time through submission, polling, cancellation
/// and completion.
///
/// All mutable state sits behind one async mutex that is never held across
/// a transport call. Readers observe [`JobView`] clones through
/// [`subscribe`](Self::subscribe).
pub struct JobOrchestrator<T: JobTransport, C: ConfigProvider> {
    core: Arc<Core<T, C>>,
}

struct Core<T, C> {
    transport: T,
    settings: C,
    poll_interval: Duration,
    budget: SynopsisBudget,
    inner: Mutex<Inner>,
    updates: watch::Sender<JobView>,
}

struct Inner {
    machine: JobStateMachine,
    handle: Option<JobHandle>,
    subject: Option<String>,
    submitting: bool,
    /// Bumped for every submission and reset; results of older jobs are dropped.
    generation: u64,
    cancel: CancellationController,
    scheduler: Option<PollingScheduler>,
    side_effects: CompletionSideEffects,
}

impl Inner {
    fn view(&self) -> JobView {
        JobView {
            handle: self.handle.clone(),
            subject: self.subject.clone(),
            state: self.machine.state().clone(),
            snapshot: self.machine.snapshot().clone(),
            stage_count: self.machine.stage_count(),
            submitting: self.submitting,
            cancel_requested: self.cancel.is_requested(),
            cancel_resolution: self.cancel.resolution().cloned(),
            polling: self.scheduler.as_ref().is_some_and(PollingScheduler::is_running),
        }
    }

    fn is_busy(&self) -> bool {
        self.submitting || self.machine.state().is_active()
    }

    fn accepts_polls(&self, generation: u64) -> bool {
        self.generation == generation
            && !self.cancel.is_requested()
            && self.machine.state().is_active()
    }

    fn stop_polling(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
    }

    fn discard_job(&mut self) {
        self.stop_polling();
        self.machine.reset();
        self.handle = None;
        self.subject = None;
        self.cancel.reset();
        self.generation += 1;
    }

    fn completed_handle(&self) -> Result<&JobHandle, ValidationError> {
        match (self.machine.state(), &self.handle) {
            (JobState::Complete, Some(handle)) => Ok(handle),
            (state, _) => Err(ValidationError::NotComplete(state.clone())),
        }
    }

    fn downloadable_handle(&self) -> Result<JobHandle, ValidationError> {
        let handle = self.completed_handle()?;
        if !self.machine.snapshot().download_ready {
            return Err(ValidationError::DownloadNotReady);
        }
        Ok(handle.clone())
    }
}

impl<T: JobTransport, C: ConfigProvider> JobOrchestrator<T, C> {
    /// Create an orchestrator. Must be called inside a tokio runtime: the
    /// audit worker is spawned immediately.
    pub fn new(
        transport: T,
        settings: C,
        audit: impl AuditSink,
        config: &OrchestratorConfig,
    ) -> Self {
        let inner = Inner {
            machine: JobStateMachine::new(config.stage_count),
            handle: None,
            subject: None,
            submitting: false,
            generation: 0,
            cancel: CancellationController::new(),
            scheduler: None,
            side_effects: CompletionSideEffects::spawn(audit),
        };
        let (updates, _) = watch::channel(inner.view());

        Self {
            core: Arc::new(Core {
                transport,
                settings,
                poll_interval: config.poll_interval(),
                budget: SynopsisBudget {
                    lines: config.synopsis_lines,
                    words: config.synopsis_words,
                },
                inner: Mutex::new(inner),
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobView> {
        self.core.updates.subscribe()
    }

    pub fn view(&self) -> JobView {
        self.core.updates.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.core.updates.borrow().state.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.core.updates.borrow().snapshot.clone()
    }

    /// Submit a new job for `subject` and start polling it.
    ///
    /// Any previous job must be terminal; it is discarded here. On failure
    /// the orchestrator stays `Idle` and nothing is polled. The submission
    /// runs on its own task: dropping this future stops waiting for it but
    /// does not abandon the job.
    pub async fn submit(&self, subject: &str) -> Result<JobHandle, OrchestratorError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ValidationError::EmptySubject.into());
        }

        let generation = {
            let mut inner = self.core.inner.lock().await;
            if inner.is_busy() {
                return Err(ValidationError::JobAlreadyActive.into());
            }
            inner.discard_job();
            inner.submitting = true;
            inner.subject = Some(subject.to_string());
            self.core.publish(&inner);
            inner.generation
        };

        let core = self.core.clone();
        let subject = subject.to_string();
        let task = tokio::spawn(Core::run_submission(core, generation, subject));
        task.await?
    }

    /// Cancel the current job. Any poll result arriving after this call is
    /// discarded, and the job ends `Cancelled` even if the cancel call fails.
    pub async fn cancel(&self) -> Result<CancelOutcome, OrchestratorError> {
        let handle = {
            let mut inner = self.core.inner.lock().await;

            if inner.submitting {
                let outcome = match inner.cancel.request(false) {
                    CancelDecision::Deferred => {
                        info!("Cancel requested while submission is pending");
                        CancelOutcome::Deferred
                    }
                    _ => CancelOutcome::AlreadyRequested,
                };
                self.core.publish(&inner);
                return Ok(outcome);
            }

            if inner.machine.state().is_terminal() {
                return Ok(CancelOutcome::AlreadyTerminal);
            }
            let handle = match (&inner.handle, inner.machine.state().is_active()) {
                (Some(handle), true) => handle.clone(),
                _ => return Err(ValidationError::NoActiveJob.into()),
            };

            if inner.cancel.request(true) != CancelDecision::Dispatch {
                return Ok(CancelOutcome::AlreadyRequested);
            }
            inner.stop_polling();
            info!(job = %handle, "Cancel requested");
            self.core.publish(&inner);
            handle
        };

        // Resolution must happen even if the caller stops waiting.
        let core = self.core.clone();
        let resolution = tokio::spawn(async move { core.finish_cancel(handle).await }).await?;
        Ok(CancelOutcome::Resolved(resolution))
    }

    /// Forget a terminal job and return to `Idle`.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        let mut inner = self.core.inner.lock().await;
        if inner.is_busy() {
            return Err(ValidationError::JobAlreadyActive.into());
        }
        inner.discard_job();
        self.core.publish(&inner);
        Ok(())
    }

    /// Where the finished artifact can be fetched.
    pub async fn download_reference(&self) -> Result<Url, OrchestratorError> {
        let handle = self.core.inner.lock().await.downloadable_handle()?;
        Ok(self.core.transport.download_reference(&handle))
    }

    /// Fetch the finished artifact.
    pub async fn download(&self) -> Result<Vec<u8>, OrchestratorError> {
        let handle = self.core.inner.lock().await.downloadable_handle()?;
        let bytes = self.core.transport.download(&handle).await?;
        debug!(job = %handle, size = bytes.len(), "Artifact downloaded");
        Ok(bytes)
    }

    /// Derive and queue the completion record for the finished job.
    ///
    /// Allowed once per job; the record is delivered in the background and
    /// the returned ticket reports how delivery went.
    pub async fn record_completion(
        &self,
        identity: &impl IdentityProvider,
    ) -> Result<AuditTicket, OrchestratorError> {
        let identity = resolve_identity(identity);
        let mut inner = self.core.inner.lock().await;
        let handle = inner.completed_handle()?.clone();
        if inner.side_effects.is_recorded(&handle) {
            return Err(ValidationError::AlreadyRecorded(handle.to_string()).into());
        }

        let record = derive_record(
            &handle,
            inner.machine.snapshot(),
            identity,
            inner.subject.clone().unwrap_or_default(),
            self.core.budget,
        );
        info!(job = %handle, classification = %record.classification, "Queueing completion record");
        Ok(inner.side_effects.submit(record)?)
    }

    pub async fn audit_stats(&self) -> Arc<AuditStats> {
        self.core.inner.lock().await.side_effects.stats()
    }

    /// Stop polling and wait for the poll task to exit. The job itself is
    /// left as it is; call [`cancel`](Self::cancel) to stop it remotely.
    pub async fn shutdown(&self) {
        let scheduler = {
            let mut inner = self.core.inner.lock().await;
            let scheduler = inner.scheduler.take();
            self.core.publish(&inner);
            scheduler
        };
        if let Some(scheduler) = scheduler {
            scheduler.dispose().await;
        }
    }
}

impl<T: JobTransport, C: ConfigProvider> Core<T, C> {
    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.view());
    }

    async fn run_submission(
        this: Arc<Self>,
        generation: u64,
        subject: String,
    ) -> Result<JobHandle, OrchestratorError> {
        let result = this.start(&subject).await;

        let mut inner = this.inner.lock().await;
        inner.submitting = false;
        let handle = match result {
            Ok(handle) => handle,
            Err(err) => {
                warn!(subject, error = %err, "Submission failed");
                inner.cancel.reset();
                inner.subject = None;
                this.publish(&inner);
                return Err(err.into());
            }
        };

        info!(job = %handle, subject, "Job submitted");
        inner.handle = Some(handle.clone());
        inner.machine.submitted();

        if inner.cancel.handle_arrived() {
            info!(job = %handle, "Cancel was requested during submission; cancelling new job");
            this.publish(&inner);
            drop(inner);
            this.finish_cancel(handle.clone()).await;
            return Ok(handle);
        }

        inner.scheduler = Some(Self::start_polling(&this, generation, handle.clone()));
        this.publish(&inner);
        Ok(handle)
    }

    async fn start(&self, subject: &str) -> Result<JobHandle, SubmissionError> {
        let params = self.settings.submission_parameters().await?;
        self.transport
            .submit(subject, &params.credentials, &params.prompts)
            .await
    }

    /// The poll task only holds a weak reference, so dropping the
    /// orchestrator also ends polling.
    fn start_polling(this: &Arc<Self>, generation: u64, handle: JobHandle) -> PollingScheduler {
        let core: Weak<Self> = Arc::downgrade(this);
        PollingScheduler::start(this.poll_interval, move || {
            let core = core.upgrade();
            let handle = handle.clone();
            async move {
                match core {
                    Some(core) => core.poll_once(generation, &handle).await,
                    None => ControlFlow::Break(()),
                }
            }
        })
    }

    async fn poll_once(&self, generation: u64, handle: &JobHandle) -> ControlFlow<()> {
        if !self.inner.lock().await.accepts_polls(generation) {
            return ControlFlow::Break(());
        }

        let result = self.transport.poll(handle).await;

        let mut inner = self.inner.lock().await;
        if !inner.accepts_polls(generation) {
            debug!(job = %handle, "Discarding poll result after cancel or reset");
            return ControlFlow::Break(());
        }

        match result {
            Ok(observed) => match inner.machine.apply_poll(observed) {
                Transition::Next(state) => info!(job = %handle, state = %state, "Job state changed"),
                Transition::Stale { observed, current } => {
                    debug!(job = %handle, observed, current, "Ignoring stale stage report")
                }
                Transition::Unchanged | Transition::Frozen => trace!(job = %handle, "No state change"),
            },
            Err(err) => {
                warn!(job = %handle, error = %err, "Status poll failed; stopping");
                inner.machine.failed(format!("status poll failed: {err}"));
            }
        }

        let flow = if inner.machine.state().is_terminal() {
            inner.stop_polling();
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        };
        self.publish(&inner);
        flow
    }

    async fn finish_cancel(&self, handle: JobHandle) -> CancelResolution {
        let outcome = self.transport.cancel(&handle).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let (resolution, _) = inner.cancel.resolve(&mut inner.machine, outcome);
        inner.stop_polling();
        match &resolution {
            CancelResolution::Confirmed => info!(job = %handle, "Job cancelled"),
            CancelResolution::LocalOnly { reason } => {
                warn!(job = %handle, reason = %reason, "Job stopped locally; service state unconfirmed")
            }
        }
        self.publish(inner);
        resolution
    }
}
