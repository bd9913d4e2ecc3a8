use std::fs;
use std::path::{Path, PathBuf};

use playhost::{prepare_host_paths, resolve_host_paths, HostConfig, HostPaths};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{parse_scenario, Scenario};
use super::SimError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub(crate) scenario_path: PathBuf,
    pub(crate) data_dir: Option<PathBuf>,
}

pub(crate) struct SimWiring {
    pub(crate) config: HostConfig,
    pub(crate) paths: HostPaths,
    pub(crate) scenario: Scenario,
}

pub(crate) fn build_sim(args: impl IntoIterator<Item = String>) -> Result<SimWiring, SimError> {
    init_tracing();
    info!("=== playhost-sim startup ===");

    let args = parse_args(args)?;
    let paths = match &args.data_dir {
        Some(dir) => prepare_host_paths(dir)?,
        None => resolve_host_paths()?,
    };
    let config = HostConfig::from_env();
    let scenario = load_scenario(&args.scenario_path)?;
    info!(
        scenario = %args.scenario_path.display(),
        data_dir = %paths.data_dir.display(),
        steps = scenario.steps.len(),
        "scenario_loaded"
    );

    Ok(SimWiring {
        config,
        paths,
        scenario,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub(crate) fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, SimError> {
    let mut scenario_path = None;
    let mut data_dir = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--data-dir" => {
                let value = iter
                    .next()
                    .ok_or_else(|| SimError::Usage("--data-dir needs a value".to_string()))?;
                data_dir = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => {
                return Err(SimError::Usage(format!("unknown flag {flag}")));
            }
            _ if scenario_path.is_some() => {
                return Err(SimError::Usage(format!("unexpected argument {arg}")));
            }
            _ => scenario_path = Some(PathBuf::from(&arg)),
        }
    }

    let scenario_path =
        scenario_path.ok_or_else(|| SimError::Usage("missing scenario path".to_string()))?;
    Ok(CliArgs {
        scenario_path,
        data_dir,
    })
}

pub(crate) fn load_scenario(path: &Path) -> Result<Scenario, SimError> {
    let raw = fs::read_to_string(path).map_err(|source| SimError::ReadScenario {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario(&raw).map_err(|message| SimError::ParseScenario {
        path: path.to_path_buf(),
        message,
    })?;
    scenario.validate()?;
    Ok(scenario)
}
