//! Service state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! Caller (main.rs) executes the I/O implied by each action.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The bot account confirmed by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotHandle {
    pub id: i64,
    pub username: Option<String>,
}

/// Runtime counters shared by the dispatcher and the admin listener
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub updates_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Updates currently being handled. Shutdown waits for this to reach 0
    /// (or the drain deadline) before exiting.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            updates_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

impl ServiceMetrics {
    /// Count one update as in flight until the returned guard drops.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard(self.in_flight.clone())
    }
}

/// Releases its in-flight slot on drop, including when the task panics.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicU64>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum ServiceState {
    /// Loading config, building clients
    Initializing,
    /// Verifying the bot token with `getMe`
    Connecting { retries: u32 },
    /// Polling for updates
    Running { bot: BotHandle },
    /// Shutdown requested, finishing in-flight updates
    Draining { deadline: Instant },
    /// Terminal state
    Stopped { exit_code: i32 },
    /// Connect failed, waiting to retry
    Error { error: String, retries: u32 },
}

/// Events that drive state transitions.
#[derive(Debug)]
pub enum ServiceEvent {
    /// Configuration parsed and clients built
    ConfigLoaded,
    /// `getMe` succeeded
    Connected(BotHandle),
    /// `getMe` failed for a reason worth retrying
    ConnectError(String),
    /// Telegram rejected the token
    TokenRejected,
    /// Retry backoff expired
    RetryTimer,
    /// SIGTERM/SIGINT received
    ShutdownSignal,
    /// Polling ended without a shutdown request
    PollingStopped,
    /// Every in-flight update finished
    Drained,
    /// Drain deadline exceeded
    DrainTimeout,
}

/// Actions the caller should execute after a state transition
#[derive(Debug)]
pub enum ServiceAction {
    /// Call `getMe`
    Connect,
    /// Start the admin listener and the polling loop
    StartPolling,
    /// Set retry timer
    ScheduleRetry { delay: Duration },
    /// Stop polling and wait for in-flight updates until `deadline`
    Drain { deadline: Instant },
    /// Exit the process
    Shutdown { exit_code: i32 },
    /// No-op
    None,
}

/// Maximum `getMe` retries before giving up
pub const MAX_CONNECT_RETRIES: u32 = 5;

/// How long shutdown waits for in-flight updates
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: ServiceState, event: ServiceEvent) -> (ServiceState, ServiceAction) {
    match (state, event) {
        // --- Initializing ---
        (ServiceState::Initializing, ServiceEvent::ConfigLoaded) => (
            ServiceState::Connecting { retries: 0 },
            ServiceAction::Connect,
        ),

        // --- Connecting ---
        (ServiceState::Connecting { .. }, ServiceEvent::Connected(bot)) => (
            ServiceState::Running { bot },
            ServiceAction::StartPolling,
        ),

        (ServiceState::Connecting { retries }, ServiceEvent::ConnectError(error))
            if retries < MAX_CONNECT_RETRIES =>
        {
            let delay = Duration::from_secs(2u64.pow(retries));
            (
                ServiceState::Error { error, retries },
                ServiceAction::ScheduleRetry { delay },
            )
        }

        (ServiceState::Connecting { .. }, ServiceEvent::ConnectError(_))
        | (ServiceState::Connecting { .. }, ServiceEvent::TokenRejected) => (
            ServiceState::Stopped { exit_code: 1 },
            ServiceAction::Shutdown { exit_code: 1 },
        ),

        // --- Error recovery ---
        (ServiceState::Error { retries, .. }, ServiceEvent::RetryTimer) => (
            ServiceState::Connecting {
                retries: retries + 1,
            },
            ServiceAction::Connect,
        ),

        // --- Running ---
        (ServiceState::Running { .. }, ServiceEvent::ShutdownSignal) => {
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            (
                ServiceState::Draining { deadline },
                ServiceAction::Drain { deadline },
            )
        }

        (ServiceState::Running { .. }, ServiceEvent::PollingStopped) => (
            ServiceState::Stopped { exit_code: 1 },
            ServiceAction::Shutdown { exit_code: 1 },
        ),

        // --- Draining ---
        (
            ServiceState::Draining { .. },
            ServiceEvent::Drained | ServiceEvent::DrainTimeout | ServiceEvent::PollingStopped,
        ) => (
            ServiceState::Stopped { exit_code: 0 },
            ServiceAction::Shutdown { exit_code: 0 },
        ),

        // --- Any other state + shutdown = stop ---
        (ServiceState::Draining { deadline }, ServiceEvent::ShutdownSignal) => (
            ServiceState::Draining { deadline },
            ServiceAction::None,
        ),
        (_, ServiceEvent::ShutdownSignal) => (
            ServiceState::Stopped { exit_code: 0 },
            ServiceAction::Shutdown { exit_code: 0 },
        ),

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, ServiceAction::None),
    }
}
