use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

static LINK_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_link_lock_poison_once(operation: &'static str) {
    if LINK_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "runtime link lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("embedded runtime rejected the call: {0}")]
    Rejected(String),
    #[error("embedded runtime is no longer available")]
    Gone,
}

/// Opaque third-party instance; every call may fail.
pub trait EmbeddedRuntime: Send + Sync {
    fn disable_input(&self) -> Result<(), BridgeError>;
    fn enable_input(&self) -> Result<(), BridgeError>;
    fn quit(&self) -> Result<(), BridgeError>;
}

pub type RuntimeRef = Arc<dyn EmbeddedRuntime>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    Disable,
    Enable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    NoRuntime,
    Failed,
}

/// Shared slot for the runtime owned by one host. The host is the only writer.
#[derive(Clone, Default)]
pub struct RuntimeLink {
    slot: Arc<RwLock<Option<RuntimeRef>>>,
    input_suppressed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RuntimeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLink")
            .field("attached", &self.is_attached())
            .field("input_suppressed", &self.input_suppressed())
            .finish()
    }
}

impl RuntimeLink {
    pub fn current(&self) -> Option<RuntimeRef> {
        match self.slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn_link_lock_poison_once("read");
                poisoned.into_inner().clone()
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current().is_some()
    }

    pub fn input_suppressed(&self) -> bool {
        self.input_suppressed.load(Ordering::SeqCst)
    }

    /// A runtime attached while input is suppressed starts disabled.
    pub(crate) fn attach(&self, runtime: RuntimeRef) -> Option<RuntimeRef> {
        let previous = match self.slot.write() {
            Ok(mut guard) => guard.replace(runtime.clone()),
            Err(poisoned) => {
                warn_link_lock_poison_once("write");
                poisoned.into_inner().replace(runtime.clone())
            }
        };
        if self.input_suppressed() {
            if let Err(error) = runtime.disable_input() {
                warn!(error = %error, "runtime_attach_disable_failed");
            } else {
                debug!("runtime_attached_with_input_disabled");
            }
        }
        previous
    }

    pub(crate) fn detach(&self) -> Option<RuntimeRef> {
        match self.slot.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => {
                warn_link_lock_poison_once("write");
                poisoned.into_inner().take()
            }
        }
    }

    pub fn signal(&self, signal: InputSignal) -> SignalOutcome {
        self.input_suppressed
            .store(signal == InputSignal::Disable, Ordering::SeqCst);
        let Some(runtime) = self.current() else {
            debug!(signal = ?signal, "runtime_signal_skipped_no_runtime");
            return SignalOutcome::NoRuntime;
        };

        let result = match signal {
            InputSignal::Disable => runtime.disable_input(),
            InputSignal::Enable => runtime.enable_input(),
        };

        match result {
            Ok(()) => SignalOutcome::Delivered,
            Err(error) => {
                warn!(signal = ?signal, error = %error, "runtime_signal_failed");
                SignalOutcome::Failed
            }
        }
    }
}

pub(crate) fn shutdown_runtime(runtime: &RuntimeRef, reason: &'static str) -> bool {
    match runtime.quit() {
        Ok(()) => {
            debug!(reason, "runtime_shutdown");
            true
        }
        Err(error) => {
            warn!(reason, error = %error, "runtime_shutdown_failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRuntime;

    fn poison_lock(link: &RuntimeLink) {
        let slot = Arc::clone(&link.slot);
        let _ = std::thread::spawn(move || {
            let _guard = slot.write().expect("lock");
            panic!("poison runtime link");
        })
        .join();
    }

    #[test]
    fn signal_without_runtime_is_a_no_op() {
        let link = RuntimeLink::default();
        assert_eq!(link.signal(InputSignal::Disable), SignalOutcome::NoRuntime);
        assert!(!link.is_attached());
    }

    #[test]
    fn signal_reaches_attached_runtime() {
        let link = RuntimeLink::default();
        let runtime = SimRuntime::new();
        link.attach(runtime.clone());

        assert_eq!(link.signal(InputSignal::Disable), SignalOutcome::Delivered);
        assert!(!runtime.input_enabled());
        assert_eq!(link.signal(InputSignal::Enable), SignalOutcome::Delivered);
        assert!(runtime.input_enabled());
    }

    #[test]
    fn failing_runtime_is_reported_not_propagated() {
        let link = RuntimeLink::default();
        let runtime = SimRuntime::new();
        runtime.fail_input_signals(true);
        link.attach(runtime.clone());

        assert_eq!(link.signal(InputSignal::Disable), SignalOutcome::Failed);
        assert_eq!(runtime.disable_calls(), 1);
    }

    #[test]
    fn clones_share_one_slot() {
        let link = RuntimeLink::default();
        let reader = link.clone();
        link.attach(SimRuntime::new());
        assert!(reader.is_attached());
        assert!(link.detach().is_some());
        assert!(!reader.is_attached());
    }

    #[test]
    fn failed_shutdown_is_swallowed() {
        let runtime = SimRuntime::new();
        runtime.fail_quit(true);
        let as_ref: RuntimeRef = runtime.clone();
        assert!(!shutdown_runtime(&as_ref, "test"));
        assert_eq!(runtime.quit_calls(), 1);
    }

    #[test]
    fn link_recovers_after_poison_without_panic() {
        let link = RuntimeLink::default();
        poison_lock(&link);
        assert!(link.slot.is_poisoned());

        let runtime = SimRuntime::new();
        assert!(link.attach(runtime.clone()).is_none());
        assert!(link.current().is_some());
        assert_eq!(link.signal(InputSignal::Disable), SignalOutcome::Delivered);
        assert!(!runtime.input_enabled());
        assert!(link.detach().is_some());
        assert!(!link.is_attached());
    }

    #[test]
    fn runtime_attached_while_suppressed_starts_disabled() {
        let link = RuntimeLink::default();
        assert_eq!(link.signal(InputSignal::Disable), SignalOutcome::NoRuntime);
        assert!(link.input_suppressed());

        let runtime = SimRuntime::new();
        link.attach(runtime.clone());
        assert!(!runtime.input_enabled());
        assert_eq!(runtime.disable_calls(), 1);

        assert_eq!(link.signal(InputSignal::Enable), SignalOutcome::Delivered);
        let next = SimRuntime::new();
        link.attach(next.clone());
        assert!(next.input_enabled());
        assert_eq!(next.disable_calls(), 0);
    }
}
