use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bridge::{shutdown_runtime, RuntimeLink, RuntimeRef};
use crate::config::HostConfig;
use crate::descriptor::{BuildFileRole, DescriptorError, GameDescriptor, GameId, PlayableSource};
use crate::notify::{Notice, NoticeQueue, Notifier};
use crate::platform::{
    FrameSpec, HostEvent, HostPlatform, LoadTicket, PlatformError, RuntimeConfig, TimerKind,
};
use crate::session::{HostPhase, LoadStep, RuntimeSession};

pub const RELOAD_NOTICE: &str = "Reloading game...";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no playable build for game {game_id}")]
    NoPlayableSource { game_id: GameId },
    #[error("build files for game {game_id} are incomplete ({} missing)", .missing.len())]
    IncompleteBuildFiles {
        game_id: GameId,
        missing: Vec<BuildFileRole>,
    },
    #[error("failed to load game loader script: {reason}")]
    ScriptLoad { reason: String },
    #[error("Unity loader is missing or incorrect")]
    LoaderEntryPointMissing,
    #[error("failed to prepare game canvas")]
    Canvas(#[source] PlatformError),
    #[error("failed to start game: {reason}")]
    RuntimeStart { reason: String },
    #[error("failed to embed game")]
    FrameEmbed(#[source] PlatformError),
}

impl From<DescriptorError> for LoadError {
    fn from(error: DescriptorError) -> Self {
        match error {
            DescriptorError::NoPlayableSource { game_id } => {
                LoadError::NoPlayableSource { game_id }
            }
            DescriptorError::IncompleteBuildFiles { game_id, missing } => {
                LoadError::IncompleteBuildFiles { game_id, missing }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Applied,
    Stale,
    Ignored,
}

/// Every asynchronous request is stamped with the generation that issued it.
/// A load, reload or unmount bumps the generation and later completions for
/// the old one are dropped.
pub struct RuntimeHost<P: HostPlatform> {
    platform: P,
    config: HostConfig,
    link: RuntimeLink,
    descriptor: Option<GameDescriptor>,
    fingerprint: Option<String>,
    pending_config: Option<RuntimeConfig>,
    session: RuntimeSession,
    generation: u64,
    notices: NoticeQueue,
}

impl<P: HostPlatform> RuntimeHost<P> {
    pub fn new(platform: P, config: HostConfig) -> Self {
        let notices = NoticeQueue::with_capacity(config.max_pending_notices);
        Self {
            platform,
            config,
            link: RuntimeLink::default(),
            descriptor: None,
            fingerprint: None,
            pending_config: None,
            session: RuntimeSession::default(),
            generation: 0,
            notices,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn session(&self) -> &RuntimeSession {
        &self.session
    }

    pub fn phase(&self) -> HostPhase {
        self.session.phase()
    }

    pub fn descriptor(&self) -> Option<&GameDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn runtime_link(&self) -> RuntimeLink {
        self.link.clone()
    }

    pub fn notices(&self) -> &NoticeQueue {
        &self.notices
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub fn mount(&mut self, descriptor: GameDescriptor) -> LoadTicket {
        info!(game_id = %descriptor.id, "runtime_host_mounted");
        self.load(descriptor)
    }

    /// Loads `descriptor` only when it differs from the one already mounted.
    pub fn set_descriptor(&mut self, descriptor: GameDescriptor) -> Option<LoadTicket> {
        let fingerprint = descriptor.fingerprint();
        if self.session.phase() != HostPhase::Idle
            && self.fingerprint.as_deref() == Some(fingerprint.as_str())
        {
            debug!(game_id = %descriptor.id, "descriptor_unchanged");
            return None;
        }
        Some(self.load(descriptor))
    }

    pub fn load(&mut self, descriptor: GameDescriptor) -> LoadTicket {
        let ticket = self.next_ticket();
        self.teardown("superseded");
        let removed = self.platform.clear_container();

        let fingerprint = descriptor.fingerprint();
        info!(
            game_id = %descriptor.id,
            generation = ticket.generation,
            build = short_fingerprint(&fingerprint),
            removed_children = removed,
            "runtime_load_started"
        );

        let fullscreen = self.session.is_fullscreen();
        let source = descriptor.playable_source();
        let title = descriptor.title.clone();
        self.descriptor = Some(descriptor);
        self.fingerprint = Some(fingerprint);

        match source {
            Err(error) => {
                self.session = RuntimeSession::loading(ticket, LoadStep::Settled, fullscreen);
                self.fail(LoadError::from(error));
            }
            Ok(PlayableSource::BuildFiles(files)) => {
                self.session =
                    RuntimeSession::loading(ticket, LoadStep::AwaitingScript, fullscreen);
                self.pending_config = Some(RuntimeConfig::for_build(&files, &title));
                if let Err(error) = self.platform.inject_loader_script(ticket, &files.loader_url)
                {
                    self.fail(LoadError::ScriptLoad {
                        reason: error.to_string(),
                    });
                }
            }
            Ok(PlayableSource::DirectUrl(url)) => {
                self.session =
                    RuntimeSession::loading(ticket, LoadStep::AwaitingFrameSettle, fullscreen);
                self.embed_frame(ticket, &url, &title);
            }
        }

        ticket
    }

    pub fn reload(&mut self) -> Option<LoadTicket> {
        if self.descriptor.is_none() {
            debug!("reload_skipped_no_descriptor");
            return None;
        }
        let ticket = self.next_ticket();
        let fullscreen = self.session.is_fullscreen();
        self.session = RuntimeSession::loading(ticket, LoadStep::AwaitingReload, fullscreen);
        self.notices.notify(Notice::info(RELOAD_NOTICE));
        self.platform
            .schedule(ticket, TimerKind::Reload, self.config.reload_delay);
        info!(generation = ticket.generation, "runtime_reload_scheduled");
        Some(ticket)
    }

    pub fn toggle_fullscreen(&mut self) -> Result<(), PlatformError> {
        let entering = !self.session.is_fullscreen();
        let result = if entering {
            self.platform.request_fullscreen()
        } else {
            self.platform.exit_fullscreen()
        };
        if let Err(error) = &result {
            warn!(entering, error = %error, "fullscreen_toggle_failed");
            self.notices
                .notify(Notice::warning(format!("Fullscreen is unavailable: {error}")));
        }
        result
    }

    pub fn unmount(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.teardown("unmount");
        let removed = self.platform.clear_container();
        let fullscreen = self.session.is_fullscreen();
        self.session = RuntimeSession::default();
        self.session.set_fullscreen(fullscreen);
        self.descriptor = None;
        self.fingerprint = None;
        info!(
            generation = self.generation,
            removed_children = removed,
            "runtime_host_unmounted"
        );
    }

    pub fn handle_event(&mut self, event: HostEvent) -> EventDisposition {
        let Some(ticket) = event.ticket() else {
            if let HostEvent::FullscreenChanged {
                kind,
                element_present,
            } = event
            {
                debug!(
                    event_name = kind.event_name(),
                    element_present, "fullscreen_changed"
                );
                self.session.set_fullscreen(element_present);
            }
            return EventDisposition::Applied;
        };

        if !self.is_live(ticket) {
            debug!(
                event = event.label(),
                generation = ticket.generation,
                live_generation = self.generation,
                "stale_host_event_dropped"
            );
            if let HostEvent::RuntimeCreated { runtime, .. } = event {
                shutdown_runtime(&runtime, "stale_load");
            }
            return EventDisposition::Stale;
        }

        match (event, self.session.step) {
            (HostEvent::ScriptLoaded { ticket }, LoadStep::AwaitingScript) => {
                self.start_runtime(ticket);
            }
            (HostEvent::ScriptFailed { reason, .. }, LoadStep::AwaitingScript) => {
                self.fail(LoadError::ScriptLoad { reason });
            }
            (HostEvent::Progress { fraction, .. }, LoadStep::AwaitingRuntime) => {
                if self.session.record_progress(fraction) {
                    debug!(progress = self.session.progress(), "runtime_load_progress");
                }
            }
            (HostEvent::RuntimeCreated { runtime, .. }, LoadStep::AwaitingRuntime) => {
                self.adopt_runtime(runtime);
            }
            (HostEvent::RuntimeFailed { reason, .. }, LoadStep::AwaitingRuntime) => {
                self.fail(LoadError::RuntimeStart { reason });
            }
            (
                HostEvent::TimerElapsed {
                    timer: TimerKind::FrameSettle,
                    ..
                },
                LoadStep::AwaitingFrameSettle,
            ) => {
                self.session.mark_ready();
                info!(generation = ticket.generation, "runtime_frame_ready");
            }
            (
                HostEvent::TimerElapsed {
                    timer: TimerKind::Reload,
                    ..
                },
                LoadStep::AwaitingReload,
            ) => match self.descriptor.clone() {
                Some(descriptor) => {
                    self.load(descriptor);
                }
                None => return EventDisposition::Ignored,
            },
            (HostEvent::RuntimeCreated { runtime, .. }, step) => {
                debug!(step = ?step, "unexpected_runtime_created");
                shutdown_runtime(&runtime, "unexpected_runtime");
                return EventDisposition::Ignored;
            }
            (event, step) => {
                debug!(event = event.label(), step = ?step, "host_event_ignored");
                return EventDisposition::Ignored;
            }
        }
        EventDisposition::Applied
    }

    fn next_ticket(&mut self) -> LoadTicket {
        self.generation = self.generation.saturating_add(1);
        LoadTicket {
            generation: self.generation,
        }
    }

    fn is_live(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation && self.session.ticket() == Some(ticket)
    }

    fn start_runtime(&mut self, ticket: LoadTicket) {
        if !self.platform.has_runtime_entry_point() {
            self.fail(LoadError::LoaderEntryPointMissing);
            return;
        }
        let canvas = match self.platform.attach_canvas() {
            Ok(canvas) => canvas,
            Err(error) => {
                self.fail(LoadError::Canvas(error));
                return;
            }
        };
        self.session.set_canvas(canvas);

        let Some(config) = self.pending_config.take() else {
            self.fail(LoadError::RuntimeStart {
                reason: "runtime configuration was not prepared".to_string(),
            });
            return;
        };
        self.session.step = LoadStep::AwaitingRuntime;
        if let Err(error) = self.platform.create_runtime(ticket, canvas, &config) {
            self.fail(LoadError::RuntimeStart {
                reason: error.to_string(),
            });
        }
    }

    fn adopt_runtime(&mut self, runtime: RuntimeRef) {
        if let Some(previous) = self.link.attach(runtime) {
            shutdown_runtime(&previous, "replaced");
        }
        self.session.mark_ready();
        info!(
            generation = self.generation,
            game_id = self.descriptor_id(),
            "runtime_ready"
        );
    }

    fn embed_frame(&mut self, ticket: LoadTicket, url: &str, title: &str) {
        let frame = FrameSpec::sandboxed(url, title);
        match self.platform.attach_frame(&frame) {
            Ok(node) => {
                self.session.set_frame(node);
                self.platform
                    .schedule(ticket, TimerKind::FrameSettle, self.config.frame_settle_delay);
            }
            Err(error) => self.fail(LoadError::FrameEmbed(error)),
        }
    }

    fn teardown(&mut self, reason: &'static str) {
        if let Some(runtime) = self.link.detach() {
            shutdown_runtime(&runtime, reason);
        }
        self.session.clear_surfaces();
        self.pending_config = None;
    }

    fn fail(&mut self, error: LoadError) {
        let message = error.to_string();
        warn!(
            game_id = self.descriptor_id(),
            generation = self.generation,
            error = %message,
            "runtime_load_failed"
        );
        if self.session.canvas().is_some() || self.session.frame().is_some() {
            self.platform.clear_container();
            self.session.clear_surfaces();
        }
        self.session.mark_failed(message);
    }

    fn descriptor_id(&self) -> &str {
        self.descriptor
            .as_ref()
            .map(|descriptor| descriptor.id.0.as_str())
            .unwrap_or("")
    }
}

impl<P: HostPlatform> Drop for RuntimeHost<P> {
    fn drop(&mut self) {
        if let Some(runtime) = self.link.detach() {
            shutdown_runtime(&runtime, "host_dropped");
        }
    }
}

fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
