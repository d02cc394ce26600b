//! Link connection state machine and exponential-backoff reconnect policy
//! (§4.5).

use rand::Rng;
use std::time::Duration;

pub const RECONNECT_BASE_DELAY_SEC: f64 = 2.0;
pub const RECONNECT_MAX_DELAY_SEC: f64 = 300.0;
pub const RECONNECT_JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Stopped,
    Listening,
    Connected,
    Connecting,
    /// Internal detail; externalized as `"connecting"`.
    Reconnecting,
    /// Reserved for unrecoverable initialization failures; no transition in
    /// this implementation drives it.
    Error,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Stopped => "stopped",
            LinkState::Listening => "listening",
            LinkState::Connected => "connected",
            LinkState::Connecting => "connecting",
            LinkState::Reconnecting => "connecting",
            LinkState::Error => "error",
        }
    }
}

/// Attempt counter + delay calculator: `delay = base * 2^attempts`, clamped
/// to a ceiling, jittered by `±ratio`, floored at `base`. Parameters default
/// to the spec's constants but are configurable per the configuration
/// surface (`RECONNECT_BASE_DELAY_SEC`/`_MAX_DELAY_SEC`/`_JITTER_RATIO`).
#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    base_delay_sec: f64,
    max_delay_sec: f64,
    jitter_ratio: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> ReconnectPolicy {
        ReconnectPolicy::new()
    }
}

impl ReconnectPolicy {
    pub fn new() -> ReconnectPolicy {
        ReconnectPolicy::with_params(RECONNECT_BASE_DELAY_SEC, RECONNECT_MAX_DELAY_SEC, RECONNECT_JITTER_RATIO)
    }

    pub fn with_params(base_delay_sec: f64, max_delay_sec: f64, jitter_ratio: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: 0,
            base_delay_sec,
            max_delay_sec,
            jitter_ratio,
        }
    }

    pub fn delay(&self) -> Duration {
        let mut delay = self.base_delay_sec * 2f64.powi(self.attempts as i32);
        delay = delay.min(self.max_delay_sec);

        let jitter = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        delay *= 1.0 + jitter;

        delay = delay.max(self.base_delay_sec);
        Duration::from_secs_f64(delay)
    }

    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Per-`LinkRuntime` state machine; every transition is centralized here.
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    state: LinkStateOrDefault,
    reconnect: ReconnectPolicy,
    error_msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkStateOrDefault(LinkState);

impl Default for LinkStateOrDefault {
    fn default() -> Self {
        LinkStateOrDefault(LinkState::Stopped)
    }
}

impl LinkStateMachine {
    pub fn new() -> LinkStateMachine {
        LinkStateMachine::default()
    }

    pub fn with_reconnect_policy(reconnect: ReconnectPolicy) -> LinkStateMachine {
        LinkStateMachine {
            state: LinkStateOrDefault::default(),
            reconnect,
            error_msg: String::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state.0
    }

    pub fn error_msg(&self) -> &str {
        &self.error_msg
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect.delay()
    }

    fn transition(&mut self, target: LinkState) {
        self.state = LinkStateOrDefault(target);
    }

    pub fn on_start_server(&mut self) {
        self.transition(LinkState::Listening);
    }

    pub fn on_start_client(&mut self) {
        self.transition(LinkState::Connecting);
    }

    pub fn on_connected(&mut self) {
        self.transition(LinkState::Connected);
        self.reconnect.reset();
    }

    pub fn on_disconnected(&mut self) {
        self.transition(LinkState::Reconnecting);
    }

    pub fn on_connection_error(&mut self, reason: impl Into<String>) {
        self.error_msg = reason.into();
        self.transition(LinkState::Reconnecting);
    }

    pub fn on_reconnecting(&mut self) {
        self.reconnect.record_attempt();
        self.transition(LinkState::Connecting);
    }

    pub fn on_stop(&mut self) {
        self.transition(LinkState::Stopped);
        self.reconnect.reset();
        self.error_msg.clear();
    }
}
