use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::bridge::{InputSignal, RuntimeLink};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(pub String);

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId(pub String);

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    TextInput,
    TextArea,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Control(ControlId),
    FormWrapper(FormId),
    Elsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPhase {
    Down,
    Press,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub phase: KeyPhase,
    pub key: String,
}

impl KeyEvent {
    pub fn new(phase: KeyPhase, key: impl Into<String>) -> Self {
        Self {
            phase,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FocusError {
    #[error("control {id} is already registered")]
    DuplicateControl { id: ControlId },
    #[error("control {id} is not registered")]
    UnknownControl { id: ControlId },
}

/// Tab-wide "a form control owns the keyboard" flag.
#[derive(Debug, Clone, Default)]
pub struct FocusState {
    active: Arc<AtomicBool>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn routes_keys_to_runtime(&self) -> bool {
        !self.is_active()
    }

    fn activate(&self) -> bool {
        !self.active.swap(true, Ordering::SeqCst)
    }

    fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct ControlEntry {
    kind: ControlKind,
    form: FormId,
}

pub struct FocusArbiter {
    state: FocusState,
    link: RuntimeLink,
    controls: HashMap<ControlId, ControlEntry>,
    focused: Option<ControlId>,
    holds_focus: bool,
    interceptor_installed: bool,
}

impl FocusArbiter {
    pub fn new(state: FocusState, link: RuntimeLink) -> Self {
        Self {
            state,
            link,
            controls: HashMap::new(),
            focused: None,
            holds_focus: false,
            interceptor_installed: false,
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn focused(&self) -> Option<&ControlId> {
        self.focused.as_ref()
    }

    pub fn interceptor_installed(&self) -> bool {
        self.interceptor_installed
    }

    pub fn control_kind(&self, id: &ControlId) -> Option<ControlKind> {
        self.controls.get(id).map(|entry| entry.kind)
    }

    pub fn register_control(
        &mut self,
        id: ControlId,
        kind: ControlKind,
        form: FormId,
    ) -> Result<(), FocusError> {
        if self.controls.contains_key(&id) {
            return Err(FocusError::DuplicateControl { id });
        }
        debug!(control = %id, form = %form, kind = ?kind, "focus_control_registered");
        self.controls.insert(id, ControlEntry { kind, form });
        Ok(())
    }

    /// Removing the focused control counts as focus leaving the form.
    pub fn unregister_control(&mut self, id: &ControlId) -> Result<(), FocusError> {
        if self.focused.as_ref() == Some(id) {
            self.on_blur(id, None)?;
        }
        self.controls
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| FocusError::UnknownControl { id: id.clone() })
    }

    pub fn on_focus(&mut self, id: &ControlId) -> Result<(), FocusError> {
        self.entry(id)?;
        self.focused = Some(id.clone());
        self.holds_focus = true;
        if self.state.activate() {
            self.link.signal(InputSignal::Disable);
            debug!(control = %id, "focus_state_activated");
        }
        Ok(())
    }

    pub fn on_blur(&mut self, id: &ControlId, related: Option<&ControlId>) -> Result<(), FocusError> {
        let form = self.entry(id)?.form.clone();
        if self.focused.as_ref() == Some(id) {
            self.focused = None;
        }

        let stays_in_form = related
            .and_then(|related| self.controls.get(related))
            .is_some_and(|entry| entry.form == form);
        if stays_in_form {
            debug!(control = %id, form = %form, "focus_moved_within_form");
            return Ok(());
        }

        self.release("blur");
        Ok(())
    }

    pub fn on_control_click(&self, _id: &ControlId) -> Propagation {
        Propagation::Stop
    }

    pub fn install_interceptor(&mut self) {
        if !self.interceptor_installed {
            self.interceptor_installed = true;
            debug!("focus_interceptor_installed");
        }
    }

    /// Always ends with this arbiter's runtime input enabled. The shared
    /// state is only cleared when one of our controls held it.
    pub fn uninstall_interceptor(&mut self) {
        if !self.interceptor_installed {
            return;
        }
        self.interceptor_installed = false;
        self.focused = None;
        let owned = std::mem::take(&mut self.holds_focus);
        if owned {
            self.state.deactivate();
        }
        self.link.signal(InputSignal::Enable);
        info!(owned, "focus_interceptor_uninstalled");
    }

    pub fn intercept_key(&self, event: &KeyEvent) -> Propagation {
        if self.interceptor_installed && self.state.is_active() {
            debug!(key = event.key.as_str(), phase = ?event.phase, "key_event_withheld_from_runtime");
            Propagation::Stop
        } else {
            Propagation::Continue
        }
    }

    pub fn on_document_click(&mut self, target: &ClickTarget) {
        if !self.interceptor_installed || !self.state.is_active() {
            return;
        }
        let inside = match target {
            ClickTarget::Control(id) => self.controls.contains_key(id),
            ClickTarget::FormWrapper(form) => {
                self.controls.values().any(|entry| &entry.form == form)
            }
            ClickTarget::Elsewhere => false,
        };
        if !inside {
            self.focused = None;
            self.release("outside_click");
        }
    }

    fn entry(&self, id: &ControlId) -> Result<&ControlEntry, FocusError> {
        self.controls
            .get(id)
            .ok_or_else(|| FocusError::UnknownControl { id: id.clone() })
    }

    fn release(&mut self, cause: &'static str) {
        self.holds_focus = false;
        if self.state.deactivate() {
            self.link.signal(InputSignal::Enable);
            debug!(cause, "focus_state_released");
        }
    }
}

impl Drop for FocusArbiter {
    fn drop(&mut self) {
        self.uninstall_interceptor();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sim::SimRuntime;

    fn control(id: &str) -> ControlId {
        ControlId(id.to_string())
    }

    fn comment_form() -> (FocusArbiter, Arc<SimRuntime>, RuntimeLink) {
        let link = RuntimeLink::default();
        let runtime = SimRuntime::new();
        link.attach(runtime.clone());
        let mut arbiter = FocusArbiter::new(FocusState::new(), link.clone());
        let form = FormId("comments".to_string());
        arbiter
            .register_control(control("body"), ControlKind::TextArea, form.clone())
            .expect("register body");
        arbiter
            .register_control(control("submit"), ControlKind::Button, form)
            .expect("register submit");
        arbiter
            .register_control(
                control("search"),
                ControlKind::TextInput,
                FormId("search".to_string()),
            )
            .expect("register search");
        arbiter.install_interceptor();
        (arbiter, runtime, link)
    }

    #[test]
    fn focus_disables_and_blur_reenables() {
        let (mut arbiter, runtime, _link) = comment_form();
        arbiter.on_focus(&control("body")).expect("focus");
        assert!(arbiter.state().is_active());
        assert!(!runtime.input_enabled());

        arbiter.on_blur(&control("body"), None).expect("blur");
        assert!(!arbiter.state().is_active());
        assert!(runtime.input_enabled());
    }

    #[test]
    fn transfer_to_submit_button_does_not_flicker() {
        let (mut arbiter, runtime, _link) = comment_form();
        arbiter.on_focus(&control("body")).expect("focus");

        let mut observed = vec![arbiter.state().is_active()];
        arbiter
            .on_blur(&control("body"), Some(&control("submit")))
            .expect("blur");
        observed.push(arbiter.state().is_active());
        arbiter.on_focus(&control("submit")).expect("focus submit");
        observed.push(arbiter.state().is_active());

        assert!(observed.iter().all(|active| *active));
        assert_eq!(runtime.disable_calls(), 1);
        assert_eq!(runtime.enable_calls(), 0);
        assert_eq!(
            arbiter.on_control_click(&control("submit")),
            Propagation::Stop
        );

        arbiter.on_document_click(&ClickTarget::FormWrapper(FormId("comments".to_string())));
        assert!(!runtime.input_enabled());

        arbiter.on_document_click(&ClickTarget::Elsewhere);
        assert!(runtime.input_enabled());
        assert_eq!(runtime.enable_calls(), 1);
    }

    #[test]
    fn moving_to_another_form_releases_input() {
        let (mut arbiter, runtime, _link) = comment_form();
        arbiter.on_focus(&control("body")).expect("focus");
        arbiter
            .on_blur(&control("body"), Some(&control("search")))
            .expect("blur");
        assert!(runtime.input_enabled());
        assert!(!arbiter.state().is_active());
    }

    #[test]
    fn keys_are_stopped_only_while_active() {
        let (mut arbiter, _runtime, _link) = comment_form();
        let key = KeyEvent::new(KeyPhase::Down, "w");
        assert_eq!(arbiter.intercept_key(&key), Propagation::Continue);

        arbiter.on_focus(&control("body")).expect("focus");
        for phase in [KeyPhase::Down, KeyPhase::Press, KeyPhase::Up] {
            assert_eq!(
                arbiter.intercept_key(&KeyEvent::new(phase, "w")),
                Propagation::Stop
            );
        }
        assert!(!arbiter.state().routes_keys_to_runtime());
    }

    #[test]
    fn focus_without_runtime_still_tracks_state() {
        let mut arbiter = FocusArbiter::new(FocusState::new(), RuntimeLink::default());
        arbiter
            .register_control(control("body"), ControlKind::TextArea, FormId("f".to_string()))
            .expect("register");
        arbiter.on_focus(&control("body")).expect("focus");
        assert!(arbiter.state().is_active());
    }

    #[test]
    fn failing_runtime_does_not_block_state_updates() {
        let (mut arbiter, runtime, _link) = comment_form();
        runtime.fail_input_signals(true);
        arbiter.on_focus(&control("body")).expect("focus");
        assert!(arbiter.state().is_active());
        arbiter.on_blur(&control("body"), None).expect("blur");
        assert!(!arbiter.state().is_active());
        assert_eq!(runtime.disable_calls(), 1);
        assert_eq!(runtime.enable_calls(), 1);
    }

    #[test]
    fn dropping_arbiter_forces_reenable() {
        let (mut arbiter, runtime, _link) = comment_form();
        let state = arbiter.state().clone();
        arbiter.on_focus(&control("body")).expect("focus");
        drop(arbiter);
        assert!(runtime.input_enabled());
        assert!(!state.is_active());
    }

    #[test]
    fn duplicate_and_unknown_controls_are_rejected() {
        let (mut arbiter, _runtime, _link) = comment_form();
        assert_eq!(
            arbiter.register_control(control("body"), ControlKind::TextInput, FormId("x".to_string())),
            Err(FocusError::DuplicateControl { id: control("body") })
        );
        assert_eq!(
            arbiter.on_focus(&control("ghost")),
            Err(FocusError::UnknownControl { id: control("ghost") })
        );
    }

    #[test]
    fn removing_focused_control_acts_as_blur() {
        let (mut arbiter, runtime, _link) = comment_form();
        arbiter.on_focus(&control("body")).expect("focus");
        arbiter.unregister_control(&control("body")).expect("unregister");
        assert!(runtime.input_enabled());
        assert_eq!(arbiter.focused(), None);
    }

    #[test]
    fn arbiter_reads_runtime_attached_later() {
        let link = RuntimeLink::default();
        let mut arbiter = FocusArbiter::new(FocusState::new(), link.clone());
        arbiter
            .register_control(control("body"), ControlKind::TextArea, FormId("f".to_string()))
            .expect("register");
        let runtime = SimRuntime::new();
        link.attach(runtime.clone());

        arbiter.on_focus(&control("body")).expect("focus");
        assert!(!runtime.input_enabled());
    }

    #[test]
    fn dropping_idle_arbiter_keeps_focus_held_elsewhere() {
        let state = FocusState::new();
        let (first_link, second_link) = (RuntimeLink::default(), RuntimeLink::default());
        let first_runtime = SimRuntime::new();
        let second_runtime = SimRuntime::new();
        first_link.attach(first_runtime.clone());
        second_link.attach(second_runtime.clone());

        let mut first = FocusArbiter::new(state.clone(), first_link);
        first.install_interceptor();
        let mut second = FocusArbiter::new(state.clone(), second_link);
        second
            .register_control(control("body"), ControlKind::TextArea, FormId("f".to_string()))
            .expect("register");
        second.install_interceptor();
        second.on_focus(&control("body")).expect("focus");

        drop(first);
        assert!(state.is_active());
        assert!(first_runtime.input_enabled());
        assert!(!second_runtime.input_enabled());
        assert_eq!(
            second.intercept_key(&KeyEvent::new(KeyPhase::Down, "w")),
            Propagation::Stop
        );

        drop(second);
        assert!(!state.is_active());
        assert!(second_runtime.input_enabled());
    }
}
