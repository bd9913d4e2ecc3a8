use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use playhost::sim::{MemoryAuthService, MemoryDataStore, SimPlatform, SimRuntime};
use playhost::{
    AuthService, ClickTarget, CommentThread, ControlId, EventDisposition, FocusArbiter,
    FocusState, FormId, GameDescriptor, GameId, HostConfig, HostEvent, HostPhase, KeyEvent,
    NoticeLevel, NoticeQueue, PreferenceStore, Propagation, RuntimeHost, Session,
    SubscriptionId, ThemePreference,
};
use tracing::{debug, info};

use super::scenario::{ClickSpec, Scenario, Step, UserSpec};
use super::SimError;

#[derive(Debug)]
pub(crate) struct RunReport {
    pub(crate) lines: Vec<String>,
    pub(crate) final_phase: HostPhase,
    pub(crate) comments: usize,
    pub(crate) notices: usize,
    pub(crate) theme: ThemePreference,
}

pub(crate) struct ScenarioRunner {
    host: RuntimeHost<SimPlatform>,
    arbiter: FocusArbiter,
    store: MemoryDataStore,
    auth: MemoryAuthService,
    session: Option<Session>,
    subscription: SubscriptionId,
    threads: HashMap<GameId, CommentThread>,
    notices: NoticeQueue,
    prefs: Box<dyn PreferenceStore>,
    games: HashMap<String, GameDescriptor>,
    last_runtime: Option<Arc<SimRuntime>>,
    notices_seen: usize,
}

impl ScenarioRunner {
    pub(crate) fn new(
        scenario: &Scenario,
        config: HostConfig,
        prefs: Box<dyn PreferenceStore>,
    ) -> Result<Self, SimError> {
        let notices = NoticeQueue::with_capacity(config.max_pending_notices);
        let host = RuntimeHost::new(SimPlatform::new(), config);
        let mut arbiter = FocusArbiter::new(FocusState::new(), host.runtime_link());
        for form in &scenario.forms {
            for control in &form.controls {
                arbiter
                    .register_control(
                        ControlId(control.id.clone()),
                        control.kind,
                        FormId(form.id.clone()),
                    )
                    .map_err(|error| SimError::InvalidScenario(error.to_string()))?;
            }
        }
        arbiter.install_interceptor();

        let mut auth = MemoryAuthService::new();
        let subscription = auth.subscribe(Box::new(|session: Option<&Session>| {
            debug!(signed_in = session.is_some(), "auth_session_changed");
        }));
        let session = match &scenario.user {
            Some(user) => Some(sign_in(&mut auth, user)?),
            None => None,
        };

        let games = scenario
            .games
            .iter()
            .map(|game| (game.id.0.clone(), game.clone()))
            .collect();

        Ok(Self {
            host,
            arbiter,
            store: MemoryDataStore::new(),
            auth,
            session,
            subscription,
            threads: HashMap::new(),
            notices,
            prefs,
            games,
            last_runtime: None,
            notices_seen: 0,
        })
    }

    pub(crate) fn run(mut self, steps: &[Step]) -> Result<RunReport, SimError> {
        let mut lines = Vec::with_capacity(steps.len() + 1);
        for (index, step) in steps.iter().enumerate() {
            let outcome = self.apply(index, step)?;
            lines.push(format!(
                "[{index:02}] {:<18} {outcome:<32} | {}",
                step.op(),
                self.status()
            ));
            lines.extend(self.collect_notices());
        }

        let theme = ThemePreference::load(self.prefs.as_ref());
        let comments = self.threads.values().map(CommentThread::len).sum();
        let final_phase = self.host.phase();
        lines.push(format!(
            "summary: steps={} phase={} comments={comments} notices={} theme={}",
            steps.len(),
            phase_label(final_phase),
            self.notices_seen,
            theme.as_str()
        ));
        info!(steps = steps.len(), phase = phase_label(final_phase), "scenario_finished");

        self.auth.unsubscribe(self.subscription);
        self.arbiter.uninstall_interceptor();
        self.host.unmount();

        Ok(RunReport {
            lines,
            final_phase,
            comments,
            notices: self.notices_seen,
            theme,
        })
    }

    fn apply(&mut self, index: usize, step: &Step) -> Result<String, SimError> {
        let outcome = match step {
            Step::Mount { game } => {
                let descriptor = self
                    .games
                    .get(game)
                    .cloned()
                    .ok_or_else(|| SimError::UnknownGame {
                        step: index,
                        game: game.clone(),
                    })?;
                self.open_thread(&descriptor.id);
                let ticket = if self.host.descriptor().is_some() {
                    self.host.set_descriptor(descriptor)
                } else {
                    Some(self.host.mount(descriptor))
                };
                match ticket {
                    Some(ticket) => format!("load generation {}", ticket.generation),
                    None => "descriptor unchanged".to_string(),
                }
            }
            Step::Unmount => {
                self.host.unmount();
                "unmounted".to_string()
            }
            Step::Reload => match self.host.reload() {
                Some(ticket) => format!("reload generation {}", ticket.generation),
                None => "nothing mounted".to_string(),
            },
            Step::ToggleFullscreen => {
                let requested = self.host.toggle_fullscreen();
                let events = self.host.platform_mut().take_fullscreen_events();
                self.deliver_all(events);
                match requested {
                    Ok(()) => "fullscreen toggled".to_string(),
                    Err(error) => format!("fullscreen refused: {error}"),
                }
            }
            Step::ScriptLoaded { entry_point } => {
                let platform = self.host.platform_mut();
                platform.set_entry_point_available(*entry_point);
                let event = platform.complete_script();
                self.deliver(event, "no pending script")
            }
            Step::ScriptFailed { reason } => {
                let event = self.host.platform_mut().fail_script(reason);
                self.deliver(event, "no pending script")
            }
            Step::Progress { fraction } => {
                let event = self.host.platform().report_progress(*fraction);
                self.deliver(event, "no pending runtime")
            }
            Step::RuntimeReady => {
                let runtime = self.host.platform().spawn_runtime();
                let event = self.host.platform_mut().complete_runtime(runtime.clone());
                if event.is_some() {
                    self.last_runtime = Some(runtime);
                }
                self.deliver(event, "no pending runtime")
            }
            Step::RuntimeFailed { reason } => {
                let event = self.host.platform_mut().fail_runtime(reason);
                self.deliver(event, "no pending runtime")
            }
            Step::Advance { ms } => {
                let events = self
                    .host
                    .platform_mut()
                    .advance(Duration::from_millis(*ms));
                if events.is_empty() {
                    format!("+{ms}ms, no timers")
                } else {
                    let dispositions = self.deliver_all(events);
                    format!("+{ms}ms, {}", dispositions.join(","))
                }
            }
            Step::Focus { control } => {
                self.arbiter
                    .on_focus(&ControlId(control.clone()))
                    .map_err(|source| SimError::Focus { step: index, source })?;
                format!("focus {control}")
            }
            Step::Blur { control, related } => {
                let related = related.clone().map(ControlId);
                self.arbiter
                    .on_blur(&ControlId(control.clone()), related.as_ref())
                    .map_err(|source| SimError::Focus { step: index, source })?;
                match related {
                    Some(related) => format!("blur {control} -> {related}"),
                    None => format!("blur {control}"),
                }
            }
            Step::Key { phase, key } => {
                let event = KeyEvent::new(*phase, key.clone());
                match self.arbiter.intercept_key(&event) {
                    Propagation::Stop => format!("key {key:?} withheld"),
                    Propagation::Continue => format!("key {key:?} to runtime"),
                }
            }
            Step::ClickControl { control } => {
                match self.arbiter.on_control_click(&ControlId(control.clone())) {
                    Propagation::Stop => format!("click {control} stopped"),
                    Propagation::Continue => format!("click {control} propagated"),
                }
            }
            Step::Click { target } => {
                let target = match target {
                    ClickSpec::Control(id) => ClickTarget::Control(ControlId(id.clone())),
                    ClickSpec::Form(id) => ClickTarget::FormWrapper(FormId(id.clone())),
                    ClickSpec::Elsewhere => ClickTarget::Elsewhere,
                };
                self.arbiter.on_document_click(&target);
                format!("document click {target:?}")
            }
            Step::PostComment { control, body } => self.post_comment(control, body),
            Step::DeleteComment { index: comment } => self.delete_comment(*comment),
            Step::SetTheme { theme } => {
                theme.save(self.prefs.as_mut())?;
                format!("theme {}", ThemePreference::load(self.prefs.as_ref()).as_str())
            }
        };
        Ok(outcome)
    }

    fn deliver(&mut self, event: Option<HostEvent>, idle: &str) -> String {
        match event {
            Some(event) => {
                let label = event.label();
                format!("{label} {}", disposition_label(self.host.handle_event(event)))
            }
            None => idle.to_string(),
        }
    }

    fn deliver_all(&mut self, events: Vec<HostEvent>) -> Vec<&'static str> {
        events
            .into_iter()
            .map(|event| disposition_label(self.host.handle_event(event)))
            .collect()
    }

    fn open_thread(&mut self, game_id: &GameId) {
        if self.threads.contains_key(game_id) {
            return;
        }
        let mut thread = CommentThread::new(game_id.clone());
        if thread.refresh(&mut self.store, &mut self.notices).is_ok() {
            self.threads.insert(game_id.clone(), thread);
        }
    }

    fn current_thread(&mut self) -> Option<&mut CommentThread> {
        let game_id = self.host.descriptor()?.id.clone();
        self.threads.get_mut(&game_id)
    }

    fn post_comment(&mut self, control: &str, body: &str) -> String {
        let session = self.session.clone();
        let mut store = std::mem::take(&mut self.store);
        let mut notices = std::mem::take(&mut self.notices);
        let outcome = match self.current_thread() {
            None => "no game mounted".to_string(),
            Some(thread) => match thread.post(&mut store, &mut notices, session.as_ref(), body) {
                Ok(comment) => format!("comment #{} via {control}", comment.id),
                Err(error) => format!("comment rejected: {error}"),
            },
        };
        self.store = store;
        self.notices = notices;
        outcome
    }

    fn delete_comment(&mut self, index: usize) -> String {
        let session = self.session.clone();
        let mut store = std::mem::take(&mut self.store);
        let mut notices = std::mem::take(&mut self.notices);
        let outcome = match self.current_thread() {
            None => "no game mounted".to_string(),
            Some(thread) => match thread.delete(&mut store, &mut notices, session.as_ref(), index) {
                Ok(comment) => format!("deleted comment #{}", comment.id),
                Err(error) => format!("delete refused: {error}"),
            },
        };
        self.store = store;
        self.notices = notices;
        outcome
    }

    fn collect_notices(&mut self) -> Vec<String> {
        let mut notices = self.host.drain_notices();
        notices.extend(self.notices.drain());
        self.notices_seen += notices.len();
        notices
            .into_iter()
            .map(|notice| format!("     notice {}: {}", level_label(notice.level), notice.message))
            .collect()
    }

    fn status(&self) -> String {
        let session = self.host.session();
        let input = match (&self.last_runtime, self.host.runtime_link().is_attached()) {
            (Some(runtime), true) if runtime.input_enabled() => "enabled",
            (Some(_), true) => "disabled",
            _ => "none",
        };
        format!(
            "phase={} progress={} fullscreen={} focus={} children={} input={} error={}",
            phase_label(session.phase()),
            session.progress(),
            session.is_fullscreen(),
            if self.arbiter.state().is_active() {
                "form"
            } else {
                "game"
            },
            self.host.platform().child_count(),
            input,
            session.error().unwrap_or("-")
        )
    }
}

fn sign_in(auth: &mut MemoryAuthService, user: &UserSpec) -> Result<Session, SimError> {
    let result = if user.is_admin {
        let seeded = std::mem::take(auth).with_admin(&user.username, &user.email, &user.password);
        *auth = seeded;
        auth.sign_in(&user.email, &user.password)
    } else {
        auth.sign_up(&user.username, &user.email, &user.password)
    };
    result.map_err(|error| SimError::InvalidScenario(format!("user sign-in failed: {error}")))
}

fn phase_label(phase: HostPhase) -> &'static str {
    match phase {
        HostPhase::Idle => "idle",
        HostPhase::Loading => "loading",
        HostPhase::Ready => "ready",
        HostPhase::Error => "error",
    }
}

fn disposition_label(disposition: EventDisposition) -> &'static str {
    match disposition {
        EventDisposition::Applied => "applied",
        EventDisposition::Stale => "stale",
        EventDisposition::Ignored => "ignored",
    }
}

fn level_label(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "success",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use playhost::{JsonFilePreferenceStore, MemoryPreferenceStore};
    use tempfile::TempDir;

    use super::*;
    use crate::app::scenario::parse_scenario;

    fn run(raw: &str) -> RunReport {
        let scenario = parse_scenario(raw).expect("parse");
        scenario.validate().expect("valid");
        let runner = ScenarioRunner::new(
            &scenario,
            HostConfig::default(),
            Box::new(MemoryPreferenceStore::new()),
        )
        .expect("runner");
        runner.run(&scenario.steps).expect("run")
    }

    const COMMENT_FORM: &str = r#"
        "forms": [
            { "id": "comments", "controls": [
                { "id": "body", "kind": "text_area" },
                { "id": "submit", "kind": "button" }
            ]},
            { "id": "search", "controls": [{ "id": "query", "kind": "text_input" }] }
        ]"#;

    fn scenario(games: &str, user: &str, steps: &str) -> String {
        format!(r#"{{ "games": [{games}], {COMMENT_FORM}, {user} "steps": [{steps}] }}"#)
    }

    const ORBIT: &str = r#"{ "id": "orbit", "title": "Orbit", "build_files": {
        "loader_url": "https://cdn/orbit.loader.js",
        "framework_url": "https://cdn/orbit.framework.js",
        "code_url": "https://cdn/orbit.wasm",
        "data_url": "https://cdn/orbit.data" } }"#;
    const MAZE: &str =
        r#"{ "id": "maze", "title": "Maze", "direct_url": "https://cdn/maze/index.html" }"#;

    #[test]
    fn build_load_and_focus_round_trip() {
        let raw = scenario(
            ORBIT,
            "",
            r#"
            { "op": "mount", "game": "orbit" },
            { "op": "script_loaded" },
            { "op": "progress", "fraction": 0.4 },
            { "op": "runtime_ready" },
            { "op": "focus", "control": "body" },
            { "op": "blur", "control": "body", "related": "submit" },
            { "op": "focus", "control": "submit" },
            { "op": "key", "key": "w" },
            { "op": "click", "target": { "form": "comments" } },
            { "op": "click", "target": "elsewhere" },
            { "op": "key", "key": "w" }
            "#,
        );
        let report = run(&raw);

        assert_eq!(report.final_phase, HostPhase::Ready);
        assert!(report.lines[2].contains("progress=40"));
        assert!(report.lines[3].contains("phase=ready"));
        for line in &report.lines[4..9] {
            assert!(line.contains("focus=form"), "{line}");
            assert!(line.contains("input=disabled"), "{line}");
        }
        assert!(report.lines[7].contains("withheld"));
        assert!(report.lines[9].contains("focus=game"));
        assert!(report.lines[9].contains("input=enabled"));
        assert!(report.lines[10].contains("to runtime"));
    }

    #[test]
    fn frame_game_settles_and_stale_timer_is_dropped() {
        let raw = scenario(
            &format!("{ORBIT}, {MAZE}"),
            "",
            r#"
            { "op": "mount", "game": "maze" },
            { "op": "advance", "ms": 1000 },
            { "op": "mount", "game": "orbit" },
            { "op": "advance", "ms": 1000 },
            { "op": "mount", "game": "maze" },
            { "op": "advance", "ms": 1500 }
            "#,
        );
        let report = run(&raw);

        assert!(report.lines[1].contains("no timers"));
        assert!(report.lines[3].contains("stale"));
        assert!(report.lines[5].contains("applied"));
        assert_eq!(report.final_phase, HostPhase::Ready);
    }

    #[test]
    fn missing_loader_entry_point_shows_error() {
        let raw = scenario(
            ORBIT,
            "",
            r#"
            { "op": "mount", "game": "orbit" },
            { "op": "script_loaded", "entry_point": false }
            "#,
        );
        let report = run(&raw);
        assert_eq!(report.final_phase, HostPhase::Error);
        assert!(report.lines[1].contains("Unity loader is missing or incorrect"));
        assert!(report.lines[1].contains("children=0"));
    }

    #[test]
    fn reload_emits_notice_and_restarts() {
        let raw = scenario(
            MAZE,
            "",
            r#"
            { "op": "mount", "game": "maze" },
            { "op": "advance", "ms": 1500 },
            { "op": "reload" },
            { "op": "advance", "ms": 100 },
            { "op": "advance", "ms": 1500 }
            "#,
        );
        let report = run(&raw);
        assert!(report
            .lines
            .iter()
            .any(|line| line.contains("notice info: Reloading game...")));
        assert_eq!(report.final_phase, HostPhase::Ready);
        assert_eq!(report.notices, 1);
    }

    #[test]
    fn comments_respect_sign_in_and_ownership() {
        let user = r#""user": { "username": "ada", "email": "ada@example.com" },"#;
        let raw = scenario(
            MAZE,
            user,
            r#"
            { "op": "mount", "game": "maze" },
            { "op": "post_comment", "control": "body", "body": "   " },
            { "op": "post_comment", "control": "body", "body": "great maze" },
            { "op": "delete_comment", "index": 5 },
            { "op": "delete_comment", "index": 0 }
            "#,
        );
        let report = run(&raw);
        let joined = report.lines.join("\n");
        assert!(joined.contains("notice error: Comment cannot be empty"));
        assert!(joined.contains("comment #1 via body"));
        assert!(joined.contains("delete refused: not found"));
        assert!(joined.contains("deleted comment #1"));
        assert_eq!(report.comments, 0);
    }

    #[test]
    fn theme_is_persisted_to_data_dir() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("preferences.json");
        let raw = scenario(MAZE, "", r#"{ "op": "set_theme", "theme": "light" }"#);
        let parsed = parse_scenario(&raw).expect("parse");
        let runner = ScenarioRunner::new(
            &parsed,
            HostConfig::default(),
            Box::new(JsonFilePreferenceStore::new(&path)),
        )
        .expect("runner");

        let report = runner.run(&parsed.steps).expect("run");
        assert_eq!(report.theme, ThemePreference::Light);
        let reopened = JsonFilePreferenceStore::new(&path);
        assert_eq!(ThemePreference::load(&reopened), ThemePreference::Light);
    }
}
