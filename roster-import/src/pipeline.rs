use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::broker::CredentialBroker;
use crate::credentials::{CredentialStore, TenantCredential};
use crate::dispatcher::{ImportDispatcher, ImportOutcome};
use crate::error::{AuthError, TickError};
use crate::fetcher::ObjectFetcher;
use crate::metrics_consts::{PAYLOAD_BYTES, TICKS, TICK_DURATION};
use crate::object_name::Organization;
use crate::payload;

pub const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Fetching,
    Building,
    Dispatching,
    Done,
    Failed,
}

impl TickState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickState::Idle => "idle",
            TickState::Fetching => "fetching",
            TickState::Building => "building",
            TickState::Dispatching => "dispatching",
            TickState::Done => "done",
            TickState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TickState::Done | TickState::Failed)
    }
}

impl fmt::Display for TickState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The work a tick is doing, in the vocabulary shared by failure logs and metrics.
/// Authentication runs while the state machine is still `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStage {
    Authenticate,
    Fetch,
    Build,
    Dispatch,
}

impl TickStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickStage::Authenticate => "authenticate",
            TickStage::Fetch => "fetch",
            TickStage::Build => "build",
            TickStage::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for TickStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one completed tick went through.
#[derive(Debug)]
pub struct TickReport {
    pub organization: Organization,
    /// Every state entered, starting at `Idle` and ending at `Done` or `Failed`.
    pub transitions: Vec<TickState>,
    /// Set once the object name is resolved, so absent when authentication failed.
    pub object_name: Option<String>,
    pub elapsed: Duration,
    pub result: Result<ImportOutcome, TickError>,
}

impl TickReport {
    pub fn final_state(&self) -> TickState {
        self.transitions.last().copied().unwrap_or(TickState::Idle)
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    /// A previous tick still held the pipeline.
    Skipped,
}

struct Progress {
    transitions: Vec<TickState>,
    stage: TickStage,
    object_name: Option<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            transitions: vec![TickState::Idle],
            stage: TickStage::Authenticate,
            object_name: None,
        }
    }

    fn enter(&mut self, state: TickState) {
        match state {
            TickState::Fetching => self.stage = TickStage::Fetch,
            TickState::Building => self.stage = TickStage::Build,
            TickState::Dispatching => self.stage = TickStage::Dispatch,
            _ => {}
        }
        self.transitions.push(state);
    }
}

/// One organization's import: authenticate if needed, fetch today's export, wrap it and
/// hand it to the import service. At most one tick runs at a time; nothing is retried
/// within a tick, the next scheduled tick is the retry.
pub struct Pipeline {
    organization: Organization,
    credential: TenantCredential,
    broker: CredentialBroker,
    store: CredentialStore,
    token_max_age: Option<Duration>,
    fetcher: ObjectFetcher,
    dispatcher: ImportDispatcher,
    tick_timeout: Duration,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        organization: Organization,
        credential: TenantCredential,
        broker: CredentialBroker,
        store: CredentialStore,
        fetcher: ObjectFetcher,
        dispatcher: ImportDispatcher,
    ) -> Self {
        Self {
            organization,
            credential,
            broker,
            store,
            token_max_age: None,
            fetcher,
            dispatcher,
            tick_timeout: DEFAULT_TICK_TIMEOUT,
            running: Mutex::new(()),
        }
    }

    /// Re-exchange before a tick once the live token is older than `max_age`.
    pub fn with_token_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.token_max_age = max_age;
        self
    }

    pub fn with_tick_timeout(mut self, timeout: Duration) -> Self {
        self.tick_timeout = timeout;
        self
    }

    pub fn organization(&self) -> Organization {
        self.organization
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Exchange the tenant credential and publish the resulting token.
    pub async fn authenticate(&self) -> Result<(), AuthError> {
        let token = self.broker.exchange(&self.credential).await?;
        self.store.publish(token);
        Ok(())
    }

    pub async fn run_tick(&self) -> TickOutcome {
        let Ok(_running) = self.running.try_lock() else {
            warn!(organization = %self.organization, "previous tick still running, skipping");
            metrics::counter!(TICKS, "outcome" => "skipped").increment(1);
            return TickOutcome::Skipped;
        };

        let started = Instant::now();
        let mut progress = Progress::new();

        let result = tokio::time::timeout(self.tick_timeout, self.run_stages(&mut progress)).await;
        let result = result.unwrap_or_else(|_| {
            Err(TickError::TimedOut {
                stage: progress.stage,
                after: self.tick_timeout,
            })
        });

        progress.enter(match result {
            Ok(_) => TickState::Done,
            Err(_) => TickState::Failed,
        });

        let report = TickReport {
            organization: self.organization,
            transitions: progress.transitions,
            object_name: progress.object_name,
            elapsed: started.elapsed(),
            result,
        };
        self.record(&report);

        TickOutcome::Completed(report)
    }

    async fn run_stages(&self, progress: &mut Progress) -> Result<ImportOutcome, TickError> {
        // Still IDLE: a tick never fetches without a usable token.
        if self.store.needs_exchange(self.token_max_age) {
            self.authenticate().await?;
        }

        progress.enter(TickState::Fetching);
        let object_name = self.fetcher.object_name(self.organization);
        progress.object_name = Some(object_name.clone());
        let file = self.fetcher.fetch_object(object_name).await?;

        progress.enter(TickState::Building);
        let request = payload::build(file);

        progress.enter(TickState::Dispatching);
        let outcome = self.dispatcher.dispatch(request).await?;

        Ok(outcome)
    }

    fn record(&self, report: &TickReport) {
        let object_name = report.object_name.as_deref().unwrap_or("-");
        metrics::histogram!(TICK_DURATION).record(report.elapsed.as_millis() as f64);

        match &report.result {
            Ok(outcome) => {
                metrics::counter!(TICKS, "outcome" => "success").increment(1);
                metrics::histogram!(PAYLOAD_BYTES).record(outcome.payload_bytes as f64);
                info!(
                    organization = %self.organization,
                    object_name,
                    payload_bytes = outcome.payload_bytes,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "roster import dispatched"
                );
            }
            Err(e) => {
                metrics::counter!(TICKS, "outcome" => "failure", "stage" => e.stage()).increment(1);
                error!(
                    organization = %self.organization,
                    stage = e.stage(),
                    object_name,
                    error = %e,
                    "roster import tick failed"
                );
            }
        }
    }
}
