use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::RuntimeRef;
use crate::descriptor::ResolvedBuildFiles;

pub const DEFAULT_STREAMING_ASSETS_URL: &str = "StreamingAssets";
pub const DEFAULT_COMPANY_NAME: &str = "DefaultCompany";
pub const DEFAULT_PRODUCT_VERSION: &str = "1.0";

/// Capabilities granted to a frame-embedded build. Nothing else is allowed.
pub const FRAME_SANDBOX_CAPABILITIES: [&str; 6] = [
    "allow-scripts",
    "allow-same-origin",
    "allow-popups",
    "allow-pointer-lock",
    "allow-forms",
    "allow-modals",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket {
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceNode {
    Canvas(u64),
    Frame(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    FrameSettle,
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_url: String,
    pub framework_url: String,
    pub code_url: String,
    pub streaming_assets_url: String,
    pub company_name: String,
    pub product_name: String,
    pub product_version: String,
}

impl RuntimeConfig {
    pub fn for_build(files: &ResolvedBuildFiles, title: &str) -> Self {
        Self {
            data_url: files.data_url.clone(),
            framework_url: files.framework_url.clone(),
            code_url: files.code_url.clone(),
            streaming_assets_url: DEFAULT_STREAMING_ASSETS_URL.to_string(),
            company_name: DEFAULT_COMPANY_NAME.to_string(),
            product_name: title.to_string(),
            product_version: DEFAULT_PRODUCT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    pub src: String,
    pub title: String,
    pub sandbox: Vec<&'static str>,
    pub allow_fullscreen: bool,
}

impl FrameSpec {
    pub fn sandboxed(src: &str, title: &str) -> Self {
        Self {
            src: src.to_string(),
            title: title.to_string(),
            sandbox: FRAME_SANDBOX_CAPABILITIES.to_vec(),
            allow_fullscreen: true,
        }
    }

    pub fn sandbox_attribute(&self) -> String {
        self.sandbox.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("host container is not available")]
    ContainerMissing,
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FullscreenEventKind {
    Standard,
    Webkit,
    Moz,
    Ms,
}

impl FullscreenEventKind {
    pub const ALL: [FullscreenEventKind; 4] = [
        FullscreenEventKind::Standard,
        FullscreenEventKind::Webkit,
        FullscreenEventKind::Moz,
        FullscreenEventKind::Ms,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            FullscreenEventKind::Standard => "fullscreenchange",
            FullscreenEventKind::Webkit => "webkitfullscreenchange",
            FullscreenEventKind::Moz => "mozfullscreenchange",
            FullscreenEventKind::Ms => "MSFullscreenChange",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.event_name() == name)
    }
}

pub enum HostEvent {
    ScriptLoaded {
        ticket: LoadTicket,
    },
    ScriptFailed {
        ticket: LoadTicket,
        reason: String,
    },
    Progress {
        ticket: LoadTicket,
        fraction: f32,
    },
    RuntimeCreated {
        ticket: LoadTicket,
        runtime: RuntimeRef,
    },
    RuntimeFailed {
        ticket: LoadTicket,
        reason: String,
    },
    TimerElapsed {
        ticket: LoadTicket,
        timer: TimerKind,
    },
    FullscreenChanged {
        kind: FullscreenEventKind,
        element_present: bool,
    },
}

impl HostEvent {
    pub fn ticket(&self) -> Option<LoadTicket> {
        match self {
            HostEvent::ScriptLoaded { ticket }
            | HostEvent::ScriptFailed { ticket, .. }
            | HostEvent::Progress { ticket, .. }
            | HostEvent::RuntimeCreated { ticket, .. }
            | HostEvent::RuntimeFailed { ticket, .. }
            | HostEvent::TimerElapsed { ticket, .. } => Some(*ticket),
            HostEvent::FullscreenChanged { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HostEvent::ScriptLoaded { .. } => "script_loaded",
            HostEvent::ScriptFailed { .. } => "script_failed",
            HostEvent::Progress { .. } => "progress",
            HostEvent::RuntimeCreated { .. } => "runtime_created",
            HostEvent::RuntimeFailed { .. } => "runtime_failed",
            HostEvent::TimerElapsed { .. } => "timer_elapsed",
            HostEvent::FullscreenChanged { .. } => "fullscreen_changed",
        }
    }
}

impl fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::RuntimeCreated { ticket, .. } => f
                .debug_struct("RuntimeCreated")
                .field("ticket", ticket)
                .finish_non_exhaustive(),
            HostEvent::ScriptLoaded { ticket } => {
                f.debug_struct("ScriptLoaded").field("ticket", ticket).finish()
            }
            HostEvent::ScriptFailed { ticket, reason } => f
                .debug_struct("ScriptFailed")
                .field("ticket", ticket)
                .field("reason", reason)
                .finish(),
            HostEvent::Progress { ticket, fraction } => f
                .debug_struct("Progress")
                .field("ticket", ticket)
                .field("fraction", fraction)
                .finish(),
            HostEvent::RuntimeFailed { ticket, reason } => f
                .debug_struct("RuntimeFailed")
                .field("ticket", ticket)
                .field("reason", reason)
                .finish(),
            HostEvent::TimerElapsed { ticket, timer } => f
                .debug_struct("TimerElapsed")
                .field("ticket", ticket)
                .field("timer", timer)
                .finish(),
            HostEvent::FullscreenChanged {
                kind,
                element_present,
            } => f
                .debug_struct("FullscreenChanged")
                .field("kind", kind)
                .field("element_present", element_present)
                .finish(),
        }
    }
}

/// Asynchronous requests return immediately; the outcome comes back later as
/// a [`HostEvent`] carrying the same ticket.
pub trait HostPlatform {
    fn clear_container(&mut self) -> usize;
    fn inject_loader_script(&mut self, ticket: LoadTicket, url: &str)
        -> Result<(), PlatformError>;
    fn has_runtime_entry_point(&self) -> bool;
    fn attach_canvas(&mut self) -> Result<SurfaceNode, PlatformError>;
    fn create_runtime(
        &mut self,
        ticket: LoadTicket,
        canvas: SurfaceNode,
        config: &RuntimeConfig,
    ) -> Result<(), PlatformError>;
    fn attach_frame(&mut self, frame: &FrameSpec) -> Result<SurfaceNode, PlatformError>;
    fn schedule(&mut self, ticket: LoadTicket, timer: TimerKind, delay: Duration);
    fn request_fullscreen(&mut self) -> Result<(), PlatformError>;
    fn exit_fullscreen(&mut self) -> Result<(), PlatformError>;
}
