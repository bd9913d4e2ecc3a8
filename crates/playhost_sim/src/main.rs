use std::process::ExitCode;

use playhost::JsonFilePreferenceStore;
use tracing::{error, info};

mod app;

use app::bootstrap::build_sim;
use app::runner::ScenarioRunner;
use app::SimError;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "scenario_failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), SimError> {
    let wiring = build_sim(std::env::args().skip(1))?;
    if let Some(name) = &wiring.scenario.name {
        info!(scenario = name.as_str(), "scenario_started");
    }

    let prefs = JsonFilePreferenceStore::new(&wiring.paths.preferences_file);
    let runner = ScenarioRunner::new(&wiring.scenario, wiring.config, Box::new(prefs))?;
    let report = runner.run(&wiring.scenario.steps)?;
    for line in &report.lines {
        println!("{line}");
    }
    info!(
        phase = ?report.final_phase,
        comments = report.comments,
        notices = report.notices,
        theme = report.theme.as_str(),
        "scenario_report"
    );
    Ok(())
}
