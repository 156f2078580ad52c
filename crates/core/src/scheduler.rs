//! Recurring recommendation generation.
//!
//! [`RecommendationScheduler`] owns at most one live timer and funnels timer
//! firings and manual triggers through a single busy flag, so no two passes
//! ever overlap. Each timer firing runs in its own task: stopping or replacing
//! the timer never cancels a pass that is already in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::recommendation::RecommendationStatus;
use crate::notify::{Notifier, RunFailure, RunSummary, TriggerKind};
use crate::ports::RecommendationStore;
use crate::schedule::{ScheduleError, ScheduleSpec};
use crate::workflow::{
    Collaborators, WorkflowError, WorkflowOutcome, WorkflowRequest, WorkflowRunner,
    WorkflowSettings,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("recommendation generation is already in progress")]
    Busy,
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("scheduler timer requires a running Tokio runtime")]
    NoRuntime,
}

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub schedule: ScheduleSpec,
    /// Terminal records untouched for longer than this are deleted before each scheduled pass.
    pub retention: chrono::Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LastRunOutcome {
    Completed { processed: usize, failed: usize, total_generated: u64 },
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub run_id: String,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: LastRunOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub scheduled: bool,
    pub running: bool,
    pub schedule: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<LastRun>,
}

/// What an automatic pass did, including its maintenance steps.
#[derive(Debug)]
pub struct ScheduledRunReport {
    pub run_id: String,
    /// `None` when the sweep itself failed.
    pub expired: Option<u64>,
    pub cleaned_up: Option<u64>,
    pub result: Result<WorkflowOutcome, WorkflowError>,
}

struct ActiveTimer {
    generation: u64,
    task: JoinHandle<()>,
    next_run: Option<DateTime<Utc>>,
}

struct TimerState {
    schedule: ScheduleSpec,
    active: Option<ActiveTimer>,
    generations: u64,
}

struct SchedulerInner {
    runner: WorkflowRunner,
    store: Arc<dyn RecommendationStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    retention: chrono::Duration,
    busy: AtomicBool,
    timer: Mutex<TimerState>,
    last_run: Mutex<Option<LastRun>>,
}

/// Clears the busy flag on every exit path.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct RecommendationScheduler {
    inner: Arc<SchedulerInner>,
}

impl RecommendationScheduler {
    pub fn new(
        collaborators: Collaborators,
        workflow: WorkflowSettings,
        settings: SchedulerSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = collaborators.store.clone();
        let clock = collaborators.clock.clone();
        let inner = SchedulerInner {
            runner: WorkflowRunner::new(collaborators, workflow),
            store,
            clock,
            notifier,
            retention: settings.retention,
            busy: AtomicBool::new(false),
            timer: Mutex::new(TimerState {
                schedule: settings.schedule,
                active: None,
                generations: 0,
            }),
            last_run: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn oracle_configured(&self) -> bool {
        self.inner.runner.oracle_configured()
    }

    /// Installs the recurring timer. Returns `Ok(false)` when a timer is already live.
    pub fn start(&self) -> Result<bool, SchedulerError> {
        let mut timer = lock(&self.inner.timer);
        if timer.active.is_some() {
            warn!(
                event_name = "scheduler.start.ignored",
                correlation_id = "scheduler",
                schedule = %timer.schedule,
                "recommendation scheduler is already running"
            );
            return Ok(false);
        }
        self.install(&mut timer)?;
        info!(
            event_name = "scheduler.started",
            correlation_id = "scheduler",
            schedule = %timer.schedule,
            "recommendation scheduler started"
        );
        Ok(true)
    }

    /// Cancels future firings. A pass already in flight runs to completion.
    pub fn stop(&self) -> bool {
        let mut timer = lock(&self.inner.timer);
        match timer.active.take() {
            Some(active) => {
                active.task.abort();
                info!(
                    event_name = "scheduler.stopped",
                    correlation_id = "scheduler",
                    "recommendation scheduler stopped"
                );
                true
            }
            None => false,
        }
    }

    /// Replaces the schedule and timer under one lock. An invalid spec leaves the current timer alone.
    pub fn update_schedule(&self, raw: &str) -> Result<ScheduleSpec, SchedulerError> {
        let schedule = ScheduleSpec::parse(raw)?;
        let mut timer = lock(&self.inner.timer);
        let previous = timer.active.take();
        let previous_schedule = std::mem::replace(&mut timer.schedule, schedule.clone());

        if let Err(error) = self.install(&mut timer) {
            timer.schedule = previous_schedule;
            timer.active = previous;
            return Err(error);
        }
        if let Some(previous) = previous {
            previous.task.abort();
        }

        info!(
            event_name = "scheduler.schedule.updated",
            correlation_id = "scheduler",
            previous = %previous_schedule,
            schedule = %schedule,
            "recommendation scheduler updated"
        );
        Ok(schedule)
    }

    pub fn status(&self) -> SchedulerStatus {
        let (scheduled, schedule, next_run) = {
            let timer = lock(&self.inner.timer);
            (
                timer.active.is_some(),
                timer.schedule.to_string(),
                timer.active.as_ref().and_then(|active| active.next_run),
            )
        };
        SchedulerStatus {
            scheduled,
            running: self.inner.busy.load(Ordering::Acquire),
            schedule,
            next_run,
            last_run: lock(&self.inner.last_run).clone(),
        }
    }

    /// Manual pass over every eligible customer. Fails fast with [`SchedulerError::Busy`]
    /// while another pass holds the busy flag.
    pub async fn trigger_manual(&self, force_refresh: bool) -> Result<WorkflowOutcome, SchedulerError> {
        self.inner.run_manual(WorkflowRequest::all_customers(force_refresh)).await
    }

    /// Manual pass with an explicit customer set and type filter, behind the same busy flag.
    pub async fn generate(&self, request: WorkflowRequest) -> Result<WorkflowOutcome, SchedulerError> {
        self.inner.run_manual(request).await
    }

    /// One automatic pass. Returns `None` when skipped because another pass is running.
    pub async fn run_scheduled_pass(&self) -> Option<ScheduledRunReport> {
        self.inner.run_scheduled_pass().await
    }

    fn install(&self, timer: &mut TimerState) -> Result<(), SchedulerError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        timer.generations += 1;
        let generation = timer.generations;
        let next_run = timer.schedule.next_after(self.inner.clock.now());
        let task = handle.spawn(timer_loop(
            Arc::downgrade(&self.inner),
            generation,
            timer.schedule.clone(),
        ));
        timer.active = Some(ActiveTimer { generation, task, next_run });
        Ok(())
    }
}

async fn timer_loop(inner: Weak<SchedulerInner>, generation: u64, schedule: ScheduleSpec) {
    let mut previous: Option<DateTime<Utc>> = None;
    loop {
        let delay = {
            let Some(scheduler) = inner.upgrade() else { return };
            let now = scheduler.clock.now();
            let next = match &schedule {
                ScheduleSpec::Interval(period) => chrono::Duration::from_std(*period)
                    .ok()
                    .and_then(|step| now.checked_add_signed(step))
                    .map(|next| (next, *period)),
                ScheduleSpec::Cron(cron) => {
                    // Never fire the same cron minute twice if the wall clock lags the timer.
                    let base = previous.map_or(now, |previous| previous.max(now));
                    cron.next_after(base).map(|next| {
                        (next, (next - now).to_std().unwrap_or_default())
                    })
                }
            };
            let Some((next_run, delay)) = next else {
                warn!(
                    event_name = "scheduler.timer.exhausted",
                    correlation_id = "scheduler",
                    schedule = %schedule,
                    "schedule has no upcoming run"
                );
                scheduler.release_timer(generation);
                return;
            };
            if !scheduler.record_next_run(generation, next_run) {
                return;
            }
            previous = Some(next_run);
            delay
        };

        tokio::time::sleep(delay).await;

        let Some(scheduler) = inner.upgrade() else { return };
        if !scheduler.is_current(generation) {
            return;
        }
        tokio::spawn(async move {
            scheduler.run_scheduled_pass().await;
        });
    }
}

impl SchedulerInner {
    fn is_current(&self, generation: u64) -> bool {
        lock(&self.timer).active.as_ref().is_some_and(|active| active.generation == generation)
    }

    /// Drops the timer slot when it still belongs to `generation`.
    fn release_timer(&self, generation: u64) {
        let mut timer = lock(&self.timer);
        if timer.active.as_ref().is_some_and(|active| active.generation == generation) {
            timer.active = None;
        }
    }

    fn record_next_run(&self, generation: u64, next_run: DateTime<Utc>) -> bool {
        let mut timer = lock(&self.timer);
        match timer.active.as_mut() {
            Some(active) if active.generation == generation => {
                active.next_run = Some(next_run);
                true
            }
            _ => false,
        }
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: &self.busy })
    }

    fn record_last_run(&self, last_run: LastRun) {
        *lock(&self.last_run) = Some(last_run);
    }

    async fn expire_sweep(&self, run_id: &str) -> Option<u64> {
        match self.store.expire_past_due(self.clock.now()).await {
            Ok(expired) => {
                if expired > 0 {
                    info!(
                        event_name = "scheduler.maintenance.expired",
                        correlation_id = %run_id,
                        expired,
                        "marked past-due recommendations as expired"
                    );
                }
                Some(expired)
            }
            Err(err) => {
                error!(
                    event_name = "scheduler.maintenance.expire_failed",
                    correlation_id = %run_id,
                    error = %err,
                    "expire sweep failed; continuing"
                );
                None
            }
        }
    }

    async fn retention_cleanup(&self, run_id: &str) -> Option<u64> {
        let cutoff = self.clock.now() - self.retention;
        match self.store.delete_terminal_older_than(&RecommendationStatus::TERMINAL, cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(
                        event_name = "scheduler.maintenance.cleaned_up",
                        correlation_id = %run_id,
                        deleted,
                        "deleted old terminal recommendations"
                    );
                }
                Some(deleted)
            }
            Err(err) => {
                error!(
                    event_name = "scheduler.maintenance.cleanup_failed",
                    correlation_id = %run_id,
                    error = %err,
                    "retention cleanup failed; continuing"
                );
                None
            }
        }
    }

    async fn run_scheduled_pass(&self) -> Option<ScheduledRunReport> {
        let Some(_guard) = self.try_acquire() else {
            warn!(
                event_name = "scheduler.run.skipped",
                correlation_id = "scheduler",
                "recommendation generation already in progress, skipping firing"
            );
            return None;
        };

        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        info!(
            event_name = "scheduler.run.started",
            correlation_id = %run_id,
            trigger = TriggerKind::Scheduled.as_str(),
            "starting scheduled recommendation generation"
        );

        let expired = self.expire_sweep(&run_id).await;
        let cleaned_up = self.retention_cleanup(&run_id).await;
        let result = self
            .runner
            .execute_with_run_id(WorkflowRequest::all_customers(true), run_id.clone())
            .await;
        let finished_at = self.clock.now();

        match &result {
            Ok(outcome) => {
                info!(
                    event_name = "scheduler.run.completed",
                    correlation_id = %run_id,
                    processed = outcome.processed.len(),
                    failed = outcome.failed.len(),
                    total_generated = outcome.total_generated,
                    "scheduled recommendation generation completed"
                );
                for failure in &outcome.failed {
                    warn!(
                        event_name = "scheduler.run.customer_failed",
                        correlation_id = %run_id,
                        customer_id = %failure.customer_id,
                        error = %failure.error,
                        "customer failed during scheduled pass"
                    );
                }
                let summary = RunSummary {
                    run_id: run_id.clone(),
                    trigger: TriggerKind::Scheduled,
                    finished_at,
                    processed_customers: outcome.processed.len(),
                    total_recommendations: outcome.total_generated,
                    failed_customers: outcome.failed.len(),
                };
                if let Err(err) = self.notifier.run_succeeded(&summary).await {
                    warn!(
                        event_name = "scheduler.notify.failed",
                        correlation_id = %run_id,
                        error = %err,
                        "admin notification failed"
                    );
                }
            }
            Err(workflow_error) => {
                error!(
                    event_name = "scheduler.run.failed",
                    correlation_id = %run_id,
                    error = %workflow_error,
                    "scheduled recommendation generation failed"
                );
                let failure = RunFailure {
                    run_id: run_id.clone(),
                    trigger: TriggerKind::Scheduled,
                    finished_at,
                    error_message: workflow_error.to_string(),
                };
                if let Err(err) = self.notifier.run_failed(&failure).await {
                    warn!(
                        event_name = "scheduler.notify.failed",
                        correlation_id = %run_id,
                        error = %err,
                        "admin error notification failed"
                    );
                }
            }
        }

        self.record_last_run(LastRun {
            run_id: run_id.clone(),
            trigger: TriggerKind::Scheduled,
            started_at,
            finished_at,
            outcome: last_run_outcome(&result),
        });
        Some(ScheduledRunReport { run_id, expired, cleaned_up, result })
    }

    async fn run_manual(&self, request: WorkflowRequest) -> Result<WorkflowOutcome, SchedulerError> {
        let Some(_guard) = self.try_acquire() else {
            warn!(
                event_name = "scheduler.trigger.busy",
                correlation_id = "scheduler",
                "manual trigger rejected; a pass is already running"
            );
            return Err(SchedulerError::Busy);
        };

        let run_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        info!(
            event_name = "scheduler.trigger.started",
            correlation_id = %run_id,
            force_refresh = request.force_refresh,
            "manually triggering recommendation generation"
        );

        if request.force_refresh {
            self.expire_sweep(&run_id).await;
        }
        let result = self.runner.execute_with_run_id(request, run_id.clone()).await;

        self.record_last_run(LastRun {
            run_id: run_id.clone(),
            trigger: TriggerKind::Manual,
            started_at,
            finished_at: self.clock.now(),
            outcome: last_run_outcome(&result),
        });
        info!(
            event_name = "scheduler.trigger.finished",
            correlation_id = %run_id,
            success = result.is_ok(),
            "manual recommendation generation finished"
        );
        result.map_err(SchedulerError::from)
    }
}

fn last_run_outcome(result: &Result<WorkflowOutcome, WorkflowError>) -> LastRunOutcome {
    match result {
        Ok(outcome) => LastRunOutcome::Completed {
            processed: outcome.processed.len(),
            failed: outcome.failed.len(),
            total_generated: outcome.total_generated,
        },
        Err(error) => LastRunOutcome::Failed { error: error.to_string() },
    }
}
