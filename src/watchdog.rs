/// Self-healing watchdog: match classified events against known failure
/// signatures and restart the gateway when one keeps recurring, rate-limited
/// by a cooldown.
///
/// Counters and the cooldown stamp are one logical resource shared by every
/// observer's poll task, so both live behind a single mutex and the
/// guard-then-stamp in `fire` is one atomic section. Two observers seeing
/// the threshold crossed in the same instant produce exactly one restart.
use crate::classify::LogEvent;
use crate::hub::{Hub, Notification, StreamMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Matching events needed before a signature triggers a restart.
pub const THRESHOLD: u32 = 5;
/// Minimum elapsed time between two restarts.
pub const COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// A named failure pattern, matched case-sensitively against event messages.
pub struct FailureSignature {
    pub id: &'static str,
    pub match_text: &'static str,
    pub label: &'static str,
}

pub const SIGNATURES: &[FailureSignature] = &[
    FailureSignature {
        id: "telegram_fail",
        match_text: "Network request for",
        label: "Telegram 通讯故障",
    },
    FailureSignature {
        id: "chrome_ext_fail",
        match_text: "Chrome extension relay is running, but no tab is connected",
        label: "浏览器扩展未连接",
    },
];

/// The opaque "restart the agent" action. Implementations fire and forget;
/// the outcome is logged, never escalated.
pub trait RestartAction: Send + Sync {
    fn restart(&self);
}

/// Production action: run the configured restart command via `sh -c`,
/// detached from the caller.
pub struct ShellRestart {
    pub command: String,
}

impl RestartAction for ShellRestart {
    fn restart(&self) {
        let command = self.command.clone();
        tokio::spawn(async move {
            match tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .output()
                .await
            {
                Ok(out) if out.status.success() => {
                    tracing::info!("restart command executed");
                }
                Ok(out) => {
                    tracing::error!(code = ?out.status.code(), "restart command failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "restart command failed to spawn");
                }
            }
        });
    }
}

#[derive(Default)]
struct WatchdogState {
    counters: HashMap<&'static str, u32>,
    last_restart: Option<Instant>,
}

impl WatchdogState {
    fn in_cooldown(&self, cooldown: Duration) -> bool {
        self.last_restart.is_some_and(|t| t.elapsed() < cooldown)
    }
}

pub struct Watchdog {
    state: Mutex<WatchdogState>,
    hub: Arc<Hub>,
    action: Box<dyn RestartAction>,
    cooldown: Duration,
    threshold: u32,
}

impl Watchdog {
    pub fn new(hub: Arc<Hub>, action: Box<dyn RestartAction>) -> Self {
        Self::with_limits(hub, action, COOLDOWN, THRESHOLD)
    }

    pub fn with_limits(
        hub: Arc<Hub>,
        action: Box<dyn RestartAction>,
        cooldown: Duration,
        threshold: u32,
    ) -> Self {
        Self {
            state: Mutex::new(WatchdogState::default()),
            hub,
            action,
            cooldown,
            threshold,
        }
    }

    /// Feed one classified event through the signature counters. No-op while
    /// a cooldown is active.
    pub fn check(&self, event: &LogEvent) {
        let mut crossed: Option<&'static str> = None;
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.in_cooldown(self.cooldown) {
                return;
            }
            for signature in SIGNATURES {
                if !event.message.contains(signature.match_text) {
                    continue;
                }
                let count = state.counters.entry(signature.id).or_insert(0);
                *count += 1;
                tracing::info!(
                    signature = signature.id,
                    count = *count,
                    threshold = self.threshold,
                    "failure signature matched"
                );
                if *count >= self.threshold {
                    crossed = Some(signature.label);
                }
            }
        }
        if let Some(label) = crossed {
            self.trigger_restart(&format!("检测到持续错误: {label}"));
        }
    }

    /// Restart the gateway unless a cooldown is active. The cooldown is
    /// re-checked here so near-simultaneous triggers collapse into one
    /// action. Returns whether the restart actually fired.
    pub fn trigger_restart(&self, reason: &str) -> bool {
        if !self.fire(false) {
            tracing::debug!(reason, "restart suppressed by cooldown");
            return false;
        }
        self.announce(reason);
        true
    }

    /// Privileged trigger for explicit user-initiated changes (model
    /// switch): stamps the cooldown and fires unconditionally, so the switch
    /// restart runs exactly once and a concurrently racing generic trigger
    /// is suppressed by the fresh stamp.
    pub fn trigger_restart_privileged(&self, reason: &str) {
        self.fire(true);
        self.announce(reason);
    }

    /// Guard-then-stamp as one atomic section: check the cooldown (unless
    /// privileged), record the restart time, and clear all counters.
    fn fire(&self, privileged: bool) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if !privileged && state.in_cooldown(self.cooldown) {
            return false;
        }
        state.last_restart = Some(Instant::now());
        state.counters.clear();
        true
    }

    fn announce(&self, reason: &str) {
        tracing::warn!(reason, "triggering gateway restart");
        self.hub.deliver(&StreamMessage::Notification(Notification {
            title: "🚀 系统自愈中".to_string(),
            message: reason.to_string(),
            level: "WARN".to_string(),
        }));
        self.action.restart();
    }
}
