use std::collections::BTreeSet;

use playhost::{ControlKind, GameDescriptor, KeyPhase, ThemePreference};
use serde::Deserialize;

use super::SimError;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) name: Option<String>,
    pub(crate) games: Vec<GameDescriptor>,
    #[serde(default)]
    pub(crate) forms: Vec<FormSpec>,
    #[serde(default)]
    pub(crate) user: Option<UserSpec>,
    pub(crate) steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FormSpec {
    pub(crate) id: String,
    pub(crate) controls: Vec<ControlSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ControlSpec {
    pub(crate) id: String,
    pub(crate) kind: ControlKind,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserSpec {
    pub(crate) username: String,
    pub(crate) email: String,
    #[serde(default = "default_password")]
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) is_admin: bool,
}

fn default_password() -> String {
    "playhost".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClickSpec {
    Control(String),
    Form(String),
    Elsewhere,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Step {
    Mount {
        game: String,
    },
    Unmount,
    Reload,
    ToggleFullscreen,
    ScriptLoaded {
        #[serde(default = "default_true")]
        entry_point: bool,
    },
    ScriptFailed {
        reason: String,
    },
    Progress {
        fraction: f32,
    },
    RuntimeReady,
    RuntimeFailed {
        reason: String,
    },
    Advance {
        ms: u64,
    },
    Focus {
        control: String,
    },
    Blur {
        control: String,
        #[serde(default)]
        related: Option<String>,
    },
    Key {
        #[serde(default = "default_key_phase")]
        phase: KeyPhase,
        key: String,
    },
    ClickControl {
        control: String,
    },
    Click {
        target: ClickSpec,
    },
    PostComment {
        control: String,
        body: String,
    },
    DeleteComment {
        index: usize,
    },
    SetTheme {
        theme: ThemePreference,
    },
}

fn default_true() -> bool {
    true
}

fn default_key_phase() -> KeyPhase {
    KeyPhase::Down
}

impl Step {
    pub(crate) fn op(&self) -> &'static str {
        match self {
            Step::Mount { .. } => "mount",
            Step::Unmount => "unmount",
            Step::Reload => "reload",
            Step::ToggleFullscreen => "toggle_fullscreen",
            Step::ScriptLoaded { .. } => "script_loaded",
            Step::ScriptFailed { .. } => "script_failed",
            Step::Progress { .. } => "progress",
            Step::RuntimeReady => "runtime_ready",
            Step::RuntimeFailed { .. } => "runtime_failed",
            Step::Advance { .. } => "advance",
            Step::Focus { .. } => "focus",
            Step::Blur { .. } => "blur",
            Step::Key { .. } => "key",
            Step::ClickControl { .. } => "click_control",
            Step::Click { .. } => "click",
            Step::PostComment { .. } => "post_comment",
            Step::DeleteComment { .. } => "delete_comment",
            Step::SetTheme { .. } => "set_theme",
        }
    }

    fn referenced_controls(&self) -> Vec<&str> {
        match self {
            Step::Focus { control }
            | Step::ClickControl { control }
            | Step::PostComment { control, .. } => vec![control.as_str()],
            Step::Blur { control, related } => {
                let mut ids = vec![control.as_str()];
                ids.extend(related.as_deref());
                ids
            }
            Step::Click {
                target: ClickSpec::Control(control),
            } => vec![control.as_str()],
            _ => Vec::new(),
        }
    }
}

pub(crate) fn parse_scenario(raw: &str) -> Result<Scenario, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer) {
        Ok(scenario) => Ok(scenario),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse scenario json: {source}"))
            } else {
                Err(format!("parse scenario json at {path}: {source}"))
            }
        }
    }
}

impl Scenario {
    pub(crate) fn validate(&self) -> Result<(), SimError> {
        let mut game_ids = BTreeSet::new();
        for game in &self.games {
            if !game_ids.insert(game.id.0.as_str()) {
                return Err(SimError::InvalidScenario(format!(
                    "duplicate game id {}",
                    game.id
                )));
            }
        }

        let mut form_ids = BTreeSet::new();
        let mut control_ids = BTreeSet::new();
        for form in &self.forms {
            if !form_ids.insert(form.id.as_str()) {
                return Err(SimError::InvalidScenario(format!(
                    "duplicate form id {}",
                    form.id
                )));
            }
            for control in &form.controls {
                if !control_ids.insert(control.id.as_str()) {
                    return Err(SimError::InvalidScenario(format!(
                        "duplicate control id {}",
                        control.id
                    )));
                }
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Mount { game } = step {
                if !game_ids.contains(game.as_str()) {
                    return Err(SimError::UnknownGame {
                        step: index,
                        game: game.clone(),
                    });
                }
            }
            if let Step::Click {
                target: ClickSpec::Form(form),
            } = step
            {
                if !form_ids.contains(form.as_str()) {
                    return Err(SimError::InvalidScenario(format!(
                        "step {index} clicks unknown form {form}"
                    )));
                }
            }
            for control in step.referenced_controls() {
                if !control_ids.contains(control) {
                    return Err(SimError::UnknownControl {
                        step: index,
                        control: control.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "games": [{ "id": "maze", "title": "Maze", "direct_url": "https://cdn/maze/index.html" }],
        "forms": [{ "id": "comments", "controls": [
            { "id": "body", "kind": "text_area" },
            { "id": "submit", "kind": "button" }
        ]}],
        "steps": [
            { "op": "mount", "game": "maze" },
            { "op": "focus", "control": "body" },
            { "op": "blur", "control": "body", "related": "submit" },
            { "op": "key", "key": "w" },
            { "op": "click", "target": "elsewhere" },
            { "op": "click", "target": { "form": "comments" } },
            { "op": "set_theme", "theme": "dark" }
        ]
    }"#;

    #[test]
    fn parses_tagged_steps_with_defaults() {
        let scenario = parse_scenario(MINIMAL).expect("parse");
        assert_eq!(scenario.steps.len(), 7);
        assert!(matches!(
            scenario.steps[3],
            Step::Key {
                phase: KeyPhase::Down,
                ..
            }
        ));
        assert!(matches!(
            scenario.steps[6],
            Step::SetTheme {
                theme: ThemePreference::Dark
            }
        ));
        scenario.validate().expect("valid");
    }

    #[test]
    fn parse_error_names_json_path() {
        let raw = r#"{ "games": [], "steps": [{ "op": "progress", "fraction": "half" }] }"#;
        let error = parse_scenario(raw).expect_err("bad fraction");
        assert!(error.starts_with("parse scenario json at steps[0]"), "{error}");
    }

    #[test]
    fn unknown_control_fails_validation() {
        let raw = r#"{
            "games": [],
            "forms": [{ "id": "f", "controls": [{ "id": "body", "kind": "text_input" }] }],
            "steps": [{ "op": "blur", "control": "body", "related": "ghost" }]
        }"#;
        let scenario = parse_scenario(raw).expect("parse");
        assert!(matches!(
            scenario.validate(),
            Err(SimError::UnknownControl { step: 0, ref control }) if control == "ghost"
        ));
    }

    #[test]
    fn unknown_game_fails_validation() {
        let raw = r#"{ "games": [], "steps": [{ "op": "mount", "game": "nope" }] }"#;
        let scenario = parse_scenario(raw).expect("parse");
        assert!(matches!(
            scenario.validate(),
            Err(SimError::UnknownGame { step: 0, .. })
        ));
    }
}
