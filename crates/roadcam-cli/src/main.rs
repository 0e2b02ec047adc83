use std::{error::Error, fs, path::Path};

use clap::Parser;
use log::{warn, LevelFilter};
use roadcam_core::{Intrinsics, LandmarkGroup, Vec3};
use roadcam_optim::{logging::init_logging_with_level, EstimatorConfig, PoseEstimator, PoseReport};
use serde::{Deserialize, Serialize};

/// Extrinsic pose estimation for a fixed traffic camera.
#[derive(Debug, Parser)]
#[command(author, version, about = "Traffic camera pose estimation")]
struct Args {
    /// Path to JSON file containing the scene (intrinsics, landmark groups, optional guesses).
    #[arg(long)]
    input: String,

    /// Optional path to JSON EstimatorConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Log every attempt at debug level.
    #[arg(long, short)]
    verbose: bool,
}

/// Scene description read from `--input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneInput {
    intrinsics: Intrinsics,
    groups: Vec<LandmarkGroup>,
    #[serde(default)]
    translation_guess: Option<Vec3>,
    /// Euler angles in degrees.
    #[serde(default)]
    rotation_guess: Option<Vec3>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

fn write_report_json(report: &PoseReport) -> Result<String, Box<dyn Error>> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn estimate_scene(scene: SceneInput, config: EstimatorConfig) -> PoseReport {
    let mut estimator = PoseEstimator::with_config(scene.intrinsics, config);
    estimator.add_world_objects(scene.groups);
    if let Some(t) = scene.translation_guess {
        estimator.guess_translation(t);
    }
    if let Some(r) = scene.rotation_guess {
        estimator.guess_rotation(r);
    }
    estimator.estimate(true);
    if !estimator.has_found_valid_solution() {
        warn!("no valid pose after {} attempt(s)", estimator.attempts());
    }
    estimator.report()
}

fn run_estimation_from_files(input_path: &str, config_path: Option<&str>) -> Result<String, Box<dyn Error>> {
    let scene: SceneInput = load_json_file(Path::new(input_path))?;

    let config = if let Some(cfg_path) = config_path {
        load_json_file::<EstimatorConfig>(Path::new(cfg_path))?
    } else {
        EstimatorConfig::default()
    };

    let report = estimate_scene(scene, config);
    write_report_json(&report)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging_with_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    let json = run_estimation_from_files(&args.input, args.config.as_deref())?;
    println!("{}", json);
    Ok(())
}
