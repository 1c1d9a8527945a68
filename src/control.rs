//! Pause/resume/stop signalling
//!
//! A [`ControlSignal`] is owned by one job's controller; every segment worker
//! holds a [`ControlReceiver`]. The state lives in a `tokio::sync::watch`
//! channel so a paused worker parks on `changed()` instead of spinning.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Shared run state observed by all workers of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Running,
    Paused,
    Stopped,
}

/// Writer side of the control channel
#[derive(Debug)]
pub struct ControlSignal {
    tx: watch::Sender<ControlState>,
}

impl ControlSignal {
    /// Create a signal in the `Running` state
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControlState::Running);
        Self { tx }
    }

    /// Current state
    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    /// New receiver for a worker
    pub fn subscribe(&self) -> ControlReceiver {
        ControlReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Running -> Paused. Returns true if the state changed.
    pub fn pause(&self) -> bool {
        self.transition(ControlState::Running, ControlState::Paused)
    }

    /// Paused -> Running. Returns true if the state changed.
    pub fn resume(&self) -> bool {
        self.transition(ControlState::Paused, ControlState::Running)
    }

    /// Any state -> Stopped. Stopped is terminal. Returns true if the state changed.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Stopped {
                false
            } else {
                *state = ControlState::Stopped;
                true
            }
        })
    }

    fn transition(&self, from: ControlState, to: ControlState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for ControlSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of the control channel, held by workers
#[derive(Debug, Clone)]
pub struct ControlReceiver {
    rx: watch::Receiver<ControlState>,
}

impl ControlReceiver {
    /// Block until the job is running.
    ///
    /// Returns immediately when running, parks while paused and yields
    /// [`EngineError::Cancelled`] once stopped. A dropped signal counts as
    /// stopped.
    pub async fn wait_until_running(&mut self) -> Result<()> {
        match self
            .rx
            .wait_for(|state| *state != ControlState::Paused)
            .await
        {
            Ok(state) if *state == ControlState::Running => {}
            _ => return Err(EngineError::Cancelled),
        }

        // wait_for matches the last value before noticing the sender is gone
        if self.rx.has_changed().is_err() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Resolve once the job is stopped (or the signal is dropped)
    pub async fn stopped(&mut self) {
        let _ = self
            .rx
            .wait_for(|state| *state == ControlState::Stopped)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let signal = ControlSignal::new();
        assert!(signal.pause());
        assert!(!signal.pause());
        assert_eq!(signal.state(), ControlState::Paused);

        assert!(signal.resume());
        assert!(!signal.resume());
        assert_eq!(signal.state(), ControlState::Running);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let signal = ControlSignal::new();
        signal.pause();
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(!signal.resume());
        assert!(!signal.pause());
        assert_eq!(signal.state(), ControlState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_until_running_parks_while_paused() {
        let signal = ControlSignal::new();
        let mut rx = signal.subscribe();
        signal.pause();

        let waiter = tokio::spawn(async move { rx.wait_until_running().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        signal.resume();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on resume")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stop_wakes_paused_worker_with_cancelled() {
        let signal = ControlSignal::new();
        let mut rx = signal.subscribe();
        signal.pause();

        let waiter = tokio::spawn(async move { rx.wait_until_running().await });
        signal.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on stop")
            .unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_signal_counts_as_stopped() {
        let signal = ControlSignal::new();
        let mut rx = signal.subscribe();
        drop(signal);
        assert!(matches!(
            rx.wait_until_running().await,
            Err(EngineError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_dropped_signal_wakes_paused_worker() {
        let signal = ControlSignal::new();
        let mut rx = signal.subscribe();
        signal.pause();

        let waiter = tokio::spawn(async move { rx.wait_until_running().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(signal);
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake when the signal is dropped")
            .unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_signal_dropped() {
        let signal = ControlSignal::new();
        let mut rx = signal.subscribe();
        drop(signal);
        tokio::time::timeout(Duration::from_secs(1), rx.stopped())
            .await
            .expect("stopped() should resolve once the signal is gone");
    }
}
