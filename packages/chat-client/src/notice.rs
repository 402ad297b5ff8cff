//! User-facing notices raised by the connection core
//!
//! The core surfaces exactly three conditions to the user. [`NoticeGate`] keeps
//! at most one live notice per condition and spaces out repeats, so a burst of
//! failed retries yields a single notice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Condition a notice reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Circuit breaker opened after repeated failures
    CircuitOpen,
    /// Real-time delivery turned back on
    RealtimeEnabled,
    /// Real-time delivery turned off by the user
    RealtimeDisabled,
}

impl NoticeKind {
    fn text(self) -> &'static str {
        match self {
            Self::CircuitOpen => {
                "Live chat updates are paused after repeated connection failures. Messages still send; re-enable live updates to retry."
            }
            Self::RealtimeEnabled => "Live chat updates enabled.",
            Self::RealtimeDisabled => "Live chat updates disabled.",
        }
    }

    /// Conditions that end when this one starts
    fn supersedes(self) -> &'static [NoticeKind] {
        match self {
            Self::CircuitOpen => &[Self::RealtimeEnabled],
            Self::RealtimeEnabled => &[Self::CircuitOpen, Self::RealtimeDisabled],
            Self::RealtimeDisabled => &[Self::RealtimeEnabled],
        }
    }
}

/// A notice ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// Display surface for notices (toast, status bar, log)
pub trait NoticeSink: Send + Sync {
    fn show(&self, notice: &Notice);

    /// The condition behind a live notice has ended
    fn dismiss(&self, _kind: NoticeKind) {}
}

/// Sink that writes notices to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn show(&self, notice: &Notice) {
        tracing::warn!(kind = ?notice.kind, "{}", notice.text);
    }
}

#[derive(Default)]
struct GateState {
    live: HashMap<NoticeKind, Instant>,
    last_shown: HashMap<NoticeKind, Instant>,
}

/// Rate limiter in front of a [`NoticeSink`]
pub struct NoticeGate {
    sink: Arc<dyn NoticeSink>,
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl NoticeGate {
    pub fn new(sink: Arc<dyn NoticeSink>, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Raise a notice; returns false when suppressed
    pub fn raise(&self, kind: NoticeKind) -> bool {
        let now = Instant::now();
        let dismissed: Vec<NoticeKind> = {
            let mut state = self.state.lock();
            if state.live.contains_key(&kind) {
                return false;
            }
            if let Some(last) = state.last_shown.get(&kind) {
                if now.saturating_duration_since(*last) < self.min_interval {
                    return false;
                }
            }
            state.live.insert(kind, now);
            state.last_shown.insert(kind, now);
            kind.supersedes()
                .iter()
                .copied()
                .filter(|other| state.live.remove(other).is_some())
                .collect()
        };

        for other in dismissed {
            self.sink.dismiss(other);
        }
        self.sink.show(&Notice {
            kind,
            text: kind.text().to_string(),
        });
        true
    }
}

impl std::fmt::Debug for NoticeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeGate")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
