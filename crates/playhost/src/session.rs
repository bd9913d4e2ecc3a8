use crate::platform::{LoadTicket, SurfaceNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPhase {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadStep {
    AwaitingScript,
    AwaitingRuntime,
    AwaitingFrameSettle,
    AwaitingReload,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionView {
    Idle,
    Loading { progress: u8 },
    Ready,
    Error { message: String, retry_available: bool },
}

#[derive(Debug, Clone)]
pub struct RuntimeSession {
    phase: HostPhase,
    progress: u8,
    error: Option<String>,
    fullscreen: bool,
    canvas: Option<SurfaceNode>,
    frame: Option<SurfaceNode>,
    ticket: Option<LoadTicket>,
    pub(crate) step: LoadStep,
}

impl Default for RuntimeSession {
    fn default() -> Self {
        Self {
            phase: HostPhase::Idle,
            progress: 0,
            error: None,
            fullscreen: false,
            canvas: None,
            frame: None,
            ticket: None,
            step: LoadStep::Settled,
        }
    }
}

impl RuntimeSession {
    pub(crate) fn loading(ticket: LoadTicket, step: LoadStep, fullscreen: bool) -> Self {
        Self {
            phase: HostPhase::Loading,
            ticket: Some(ticket),
            step,
            fullscreen,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> HostPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == HostPhase::Loading
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn canvas(&self) -> Option<SurfaceNode> {
        self.canvas
    }

    pub fn frame(&self) -> Option<SurfaceNode> {
        self.frame
    }

    pub fn ticket(&self) -> Option<LoadTicket> {
        self.ticket
    }

    pub fn view(&self) -> SessionView {
        match self.phase {
            HostPhase::Idle => SessionView::Idle,
            HostPhase::Loading => SessionView::Loading {
                progress: self.progress,
            },
            HostPhase::Ready => SessionView::Ready,
            HostPhase::Error => SessionView::Error {
                message: self.error.clone().unwrap_or_default(),
                retry_available: true,
            },
        }
    }

    pub(crate) fn record_progress(&mut self, fraction: f32) -> bool {
        let Some(percent) = fraction_to_percent(fraction) else {
            return false;
        };
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    pub(crate) fn set_canvas(&mut self, canvas: SurfaceNode) {
        self.canvas = Some(canvas);
    }

    pub(crate) fn set_frame(&mut self, frame: SurfaceNode) {
        self.frame = Some(frame);
    }

    pub(crate) fn clear_surfaces(&mut self) {
        self.canvas = None;
        self.frame = None;
    }

    pub(crate) fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    pub(crate) fn mark_ready(&mut self) {
        self.phase = HostPhase::Ready;
        self.progress = 100;
        self.error = None;
        self.step = LoadStep::Settled;
    }

    pub(crate) fn mark_failed(&mut self, message: String) {
        self.phase = HostPhase::Error;
        self.error = Some(message);
        self.step = LoadStep::Settled;
    }
}

fn fraction_to_percent(fraction: f32) -> Option<u8> {
    if fraction.is_nan() {
        return None;
    }
    Some((fraction.clamp(0.0, 1.0) * 100.0).round() as u8)
}
