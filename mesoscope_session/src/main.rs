//! # Session Runner
//!
//! The process a human (or a scheduling script) actually invokes: the
//! `sl-run` / `sl-manage` / `sl-get` command surface (spec §6), wiring
//! startup → runtime → shutdown through [`mesoscope_engine::engine::run_session`]
//! and spawning the sibling Control UI / Visualizer processes this
//! session's capabilities are implemented against.

use clap::{Args as ClapArgs, Parser, Subcommand};
use mesoscope_common::config::ConfigLoader;
use mesoscope_common::config::SystemConfiguration;
use mesoscope_common::descriptor::{ExperimentState, SessionDescriptor, TrialStructure};
use mesoscope_common::filesystem::FilesystemLayout;
use mesoscope_common::identity::{SessionIdentity, SessionType};
use mesoscope_common::positions::ZaberPositions;
use mesoscope_engine::config::EngineConfig;
use mesoscope_engine::engine::{run_session, SessionPlan};
use mesoscope_engine::operator::StdioOperator;
use mesoscope_engine::preprocess::{LocalPreprocessor, Preprocessor};
use mesoscope_engine::sink::FileVisualizerSink;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{error, info, warn};

/// Every CLI action bottoms out in one of the crate-local error types
/// (`ConfigError`, `EngineError`, `HalError`, ...) or `std::io::Error`;
/// boxing them here keeps `main` uniform without pulling in an error
/// aggregation crate the rest of the workspace doesn't use.
type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "mesoscope_session")]
#[command(author = "Sun Lab")]
#[command(version)]
#[command(about = "Runs, manages, and inspects Mesoscope-VR sessions")]
struct Cli {
    #[command(subcommand)]
    command: TopLevel,
}

#[derive(Subcommand, Debug)]
enum TopLevel {
    /// Run one session end to end.
    #[command(subcommand, name = "sl-run")]
    Run(RunCommand),
    /// Post-hoc session management.
    #[command(subcommand, name = "sl-manage")]
    Manage(ManageCommand),
    /// Discovery queries over sessions already on disk.
    #[command(subcommand, name = "sl-get")]
    Get(GetCommand),
}

#[derive(ClapArgs, Debug)]
struct CommonSessionArgs {
    /// Host filesystem roots (`SystemConfiguration` TOML).
    #[arg(long)]
    system: PathBuf,
    /// Engine wiring configuration (`EngineConfig` TOML).
    #[arg(long)]
    engine: PathBuf,
    /// Initial `SessionDescriptor` YAML, authored with the notes
    /// placeholder already replaced (spec §3).
    #[arg(long)]
    descriptor: PathBuf,
    #[arg(long)]
    project: String,
    #[arg(long)]
    animal: String,
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    software_version: String,
    #[arg(long, default_value = "0.1.0")]
    library_version: String,
}

#[derive(Subcommand, Debug)]
enum RunCommand {
    LickTraining(CommonSessionArgs),
    RunTraining(CommonSessionArgs),
    Experiment {
        #[command(flatten)]
        common: CommonSessionArgs,
        /// Ordered phase schedule (`Vec<ExperimentState>` YAML), authored
        /// separately from `descriptor` since the descriptor only carries
        /// the experiment-wide volume/time caps (spec §3, §4.9).
        #[arg(long)]
        phases: PathBuf,
        /// Trial structure YAML (cue motifs, lengths, reward schedule).
        #[arg(long)]
        trial_structure: PathBuf,
    },
    CheckWindow(CommonSessionArgs),
    /// Drives the Motor Group to its maintenance position and back;
    /// does not start a Session Engine run.
    Maintain {
        #[arg(long)]
        engine: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ManageCommand {
    /// Re-runs the preprocessing pipeline against an already-acquired
    /// session (e.g. after a crash that skipped it).
    PreprocessSession {
        #[arg(long)]
        system: PathBuf,
        #[arg(long)]
        raw_data: PathBuf,
    },
    /// Deletes a session's raw_data tree.
    DeleteSession {
        #[arg(long)]
        raw_data: PathBuf,
        #[arg(long)]
        yes: bool,
    },
    /// Out of scope for this crate (spec §1): moving an animal between
    /// projects touches the NAS/server registries, which are external
    /// collaborators this workspace does not model.
    MigrateAnimal {
        #[arg(long)]
        animal: String,
        #[arg(long)]
        from_project: String,
        #[arg(long)]
        to_project: String,
    },
}

#[derive(Subcommand, Debug)]
enum GetCommand {
    /// Lists session directories for one animal, with completion status.
    ListSessions {
        #[arg(long)]
        system: PathBuf,
        #[arg(long)]
        project: String,
        #[arg(long)]
        animal: String,
    },
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Spawns a sibling binary found next to this process's own executable,
/// so the workspace doesn't need `$PATH` entries for the facade
/// processes during development.
fn spawn_sibling(name: &str, args: &[&str]) -> std::io::Result<Child> {
    let exe = std::env::current_exe()?;
    let sibling = exe.parent().map(|dir| dir.join(name)).unwrap_or_else(|| PathBuf::from(name));
    Command::new(sibling).args(args).spawn()
}

fn run_common(
    common: &CommonSessionArgs,
    session_type: SessionType,
) -> CliResult<(SystemConfiguration, EngineConfig, SessionIdentity, SessionDescriptor)> {
    let system = SystemConfiguration::load(&common.system)?;
    let engine_config = EngineConfig::load(&common.engine)?;
    let identity = SessionIdentity::new(
        common.project.clone(),
        common.animal.clone(),
        session_type,
        common.software_version.clone(),
        common.library_version.clone(),
    );
    let descriptor = SessionDescriptor::load_yaml(&common.descriptor)?;
    descriptor.validate_notes(&common.descriptor)?;
    Ok((system, engine_config, identity, descriptor))
}

fn run_session_from_cli(
    system: SystemConfiguration,
    engine_config: EngineConfig,
    identity: SessionIdentity,
    descriptor: SessionDescriptor,
    trial_structure: Option<TrialStructure>,
    experiment_phases: Option<Vec<ExperimentState>>,
) -> CliResult<()> {
    let layout = FilesystemLayout::create(&system.roots(), &identity)?;
    let control_vector_path = layout.raw_data.join("control_vector.shm");
    let visualizer_feed_path = layout.raw_data.join("visualizer_feed.jsonl");

    let mut ui_child = spawn_sibling(
        "mesoscope_ui",
        &["--control-vector", control_vector_path.to_string_lossy().as_ref()],
    )
    .map_err(|e| warn!("could not spawn mesoscope_ui: {e}"))
    .ok();
    let mut visualizer_child = spawn_sibling(
        "mesoscope_visualizer",
        &["--feed", visualizer_feed_path.to_string_lossy().as_ref()],
    )
    .map_err(|e| warn!("could not spawn mesoscope_visualizer: {e}"))
    .ok();

    let cached_zaber = load_yaml::<ZaberPositions>(&layout.persistent.join("zaber_positions.yaml")).ok();

    let plan = SessionPlan {
        system: &system,
        engine_config: &engine_config,
        identity: &identity,
        descriptor,
        trial_structure,
        experiment_phases,
        cached_zaber,
    };

    let mut operator = StdioOperator;
    let mut visualizer = FileVisualizerSink::create(&visualizer_feed_path)?;
    let mut preprocessor = LocalPreprocessor::new(layout.persistent.join("water_log.csv"));

    let result = run_session(plan, &mut operator, &mut visualizer, &mut preprocessor);

    for child in [&mut ui_child, &mut visualizer_child].into_iter().flatten() {
        let _ = child.kill();
        let _ = child.wait();
    }

    match result {
        Ok(steps) => {
            info!("session complete: {} preprocessing steps ran", steps.len());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn manage_preprocess_session(system_path: &Path, raw_data: &Path) -> CliResult<()> {
    let system = SystemConfiguration::load(system_path)?;
    let identity: SessionIdentity = load_yaml(&raw_data.join("session_data.yaml"))?;
    let descriptor = SessionDescriptor::load_yaml(&raw_data.join("session_descriptor.yaml"))?;
    let layout = FilesystemLayout::create(&system.roots(), &identity)?;
    let session_name = identity.session_dir_name();

    let water_delivered_ul =
        descriptor.core().dispensed_during_run_ul + descriptor.core().dispensed_during_pause_ul;
    let mut preprocessor = LocalPreprocessor::new(layout.persistent.join("water_log.csv"));
    let steps = preprocessor.run(&layout, &session_name, descriptor.core().incomplete, water_delivered_ul)?;
    info!("preprocessing complete: {steps:?}");
    Ok(())
}

fn manage_delete_session(raw_data: &Path, confirmed: bool) -> CliResult<()> {
    if !confirmed {
        return Err(format!("refusing to delete {raw_data:?} without --yes").into());
    }
    std::fs::remove_dir_all(raw_data)?;
    info!("deleted {raw_data:?}");
    Ok(())
}

fn get_list_sessions(system_path: &Path, project: &str, animal: &str) -> CliResult<()> {
    let system = SystemConfiguration::load(system_path)?;
    let dir = system.local_root.join(project).join(animal);
    if !dir.is_dir() {
        info!("no sessions recorded for {project}/{animal}");
        return Ok(());
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let complete = path.join("telomere.bin").exists();
        let initializing = path.join("nk.bin").exists();
        let status = if initializing {
            "initializing"
        } else if complete {
            "complete"
        } else {
            "incomplete"
        };
        println!("{name}  [{status}]");
    }
    Ok(())
}

fn run_maintain(engine_path: &Path) -> CliResult<()> {
    let engine_config = EngineConfig::load(engine_path)?;
    let tmp = tempfile_dir()?;
    let log_bus = mesoscope_shm::LogBus::start(tmp.join("log"))?;
    let hardware = mesoscope_engine::hardware::Hardware::build(&engine_config, &log_bus, None, &tmp.join("camera"))?;
    let mut operator = StdioOperator;
    hardware.motors.maintenance_position()?;
    operator.wait_for_enter("Motors are in maintenance position. Press enter to park and exit.");
    hardware.motors.park_position()?;
    Ok(())
}

fn tempfile_dir() -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("mesoscope_maintain_{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let cli = Cli::parse();

    let result = match cli.command {
        TopLevel::Run(RunCommand::LickTraining(common)) => (|| {
            let (system, engine_config, identity, descriptor) = run_common(&common, SessionType::LickTraining)?;
            run_session_from_cli(system, engine_config, identity, descriptor, None, None)
        })(),
        TopLevel::Run(RunCommand::RunTraining(common)) => (|| {
            let (system, engine_config, identity, descriptor) = run_common(&common, SessionType::RunTraining)?;
            run_session_from_cli(system, engine_config, identity, descriptor, None, None)
        })(),
        TopLevel::Run(RunCommand::Experiment { common, phases, trial_structure }) => (|| {
            let (system, engine_config, identity, descriptor) = run_common(&common, SessionType::Experiment)?;
            let phases: Vec<ExperimentState> = load_yaml(&phases)?;
            let trial_structure: TrialStructure = load_yaml(&trial_structure)?;
            run_session_from_cli(system, engine_config, identity, descriptor, Some(trial_structure), Some(phases))
        })(),
        TopLevel::Run(RunCommand::CheckWindow(common)) => (|| {
            let (system, engine_config, identity, descriptor) = run_common(&common, SessionType::WindowChecking)?;
            run_session_from_cli(system, engine_config, identity, descriptor, None, None)
        })(),
        TopLevel::Run(RunCommand::Maintain { engine }) => run_maintain(&engine),
        TopLevel::Manage(ManageCommand::PreprocessSession { system, raw_data }) => {
            manage_preprocess_session(&system, &raw_data)
        }
        TopLevel::Manage(ManageCommand::DeleteSession { raw_data, yes }) => manage_delete_session(&raw_data, yes),
        TopLevel::Manage(ManageCommand::MigrateAnimal { animal, from_project, to_project }) => {
            warn!(
                "sl-manage migrate-animal {animal} ({from_project} -> {to_project}): not implemented; \
                 animal migration requires coordinating the NAS/server registries, which this workspace \
                 does not model"
            );
            Ok(())
        }
        TopLevel::Get(GetCommand::ListSessions { system, project, animal }) => {
            get_list_sessions(&system, &project, &animal)
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
