//! Camera pose estimation from parametric landmarks.
//!
//! [`PoseEstimator`] owns the landmarks, computes an initial guess, builds one
//! least-squares problem per attempt and retries from perturbed guesses until a
//! solution passes the validity checks or the attempt budget is spent. Failures
//! are recorded on the estimator; `estimate()` itself never fails.

mod config;
mod error;
pub mod guess;
mod losses;
mod problem;
pub mod retry;

pub use config::*;
pub use error::*;
pub use losses::*;

use log::{debug, log, warn, Level};
use nalgebra::DVector;
use roadcam_core::{CameraPose, GroupId, Intrinsics, LandmarkGroup, LandmarkId, LandmarkStore, Real, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::backend::{Termination, TinySolverBackend};
use crate::ir::Evaluation;
use problem::{build_problem, lambda_name, mu_name, weight_name, PoseProblem, ROTATION, TRANSLATION};
use retry::{check_attempt, RetryPolicy};

/// Lifecycle of an estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatorState {
    /// No estimation has run since the landmarks last changed.
    Idle,
    BuildingProblem,
    Solving,
    /// The last run produced a valid pose.
    Converged,
    /// The last run ended without a valid pose.
    Failed,
}

/// Serializable summary of the last estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub initial_translation: Option<Vec3>,
    pub initial_rotation: Option<Vec3>,
    pub found_valid_solution: bool,
    pub attempts: usize,
    pub losses: Losses,
    pub rms_pixel_error: Option<f64>,
    pub termination: Option<Termination>,
    pub weights: Vec<f64>,
    pub lambdas: Vec<f64>,
    pub mus: Vec<f64>,
    pub landmarks: Vec<LandmarkDiagnostics>,
    pub failure: Option<String>,
}

/// Estimates the extrinsic pose of a fixed camera from observed landmarks.
///
/// Landmarks are added as [`LandmarkGroup`]s and moved into an internal
/// arena; the solver updates their `lambda`/`mu` in place. Read results after
/// [`estimate`](Self::estimate) returns, checking
/// [`has_found_valid_solution`](Self::has_found_valid_solution) first.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    config: EstimatorConfig,
    intrinsics: Arc<Intrinsics>,
    store: LandmarkStore,

    translation_guess: Option<Vec3>,
    rotation_guess: Option<Vec3>,
    initial: Option<CameraPose>,
    pose: CameraPose,
    weights: Vec<Real>,

    losses: Losses,
    diagnostics: Vec<LandmarkDiagnostics>,
    rms_pixel_error: Option<f64>,
    termination: Option<Termination>,

    state: EstimatorState,
    optimization_finished: bool,
    found_valid_solution: bool,
    attempts: usize,
    last_failure: Option<EstimationFailure>,
}

impl PoseEstimator {
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self::with_config(intrinsics, EstimatorConfig::default())
    }

    pub fn with_config(intrinsics: Intrinsics, config: EstimatorConfig) -> Self {
        Self {
            config,
            intrinsics: Arc::new(intrinsics),
            store: LandmarkStore::new(),
            translation_guess: None,
            rotation_guess: None,
            initial: None,
            pose: CameraPose::new(Vec3::zeros(), Vec3::zeros()),
            weights: Vec::new(),
            losses: Losses::default(),
            diagnostics: Vec::new(),
            rms_pixel_error: None,
            termination: None,
            state: EstimatorState::Idle,
            optimization_finished: true,
            found_valid_solution: false,
            attempts: 0,
            last_failure: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EstimatorConfig {
        &mut self.config
    }

    pub fn set_config(&mut self, config: EstimatorConfig) {
        self.config = config;
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Append a landmark group. No problem is built until [`Self::estimate`].
    pub fn add_world_object(&mut self, group: LandmarkGroup) -> GroupId {
        let id = self.store.insert_group(group);
        self.weights.push(1.0);
        self.initial = None;
        self.state = EstimatorState::Idle;
        id
    }

    pub fn add_world_objects(&mut self, groups: impl IntoIterator<Item = LandmarkGroup>) {
        for group in groups {
            self.add_world_object(group);
        }
    }

    pub fn clear_world_objects(&mut self) {
        self.store.clear();
        self.weights.clear();
        self.initial = None;
        self.state = EstimatorState::Idle;
    }

    /// Supply a translation guess; the next initial guess uses it instead of the heuristic.
    pub fn guess_translation(&mut self, translation: Vec3) {
        self.translation_guess = Some(translation);
        self.initial = None;
    }

    /// Supply a rotation guess (Euler angles, degrees).
    pub fn guess_rotation(&mut self, rotation: Vec3) {
        self.rotation_guess = Some(rotation);
        self.initial = None;
    }

    /// Compute the starting pose of the first attempt.
    ///
    /// Supplied guesses are used as is; a missing translation is placed relative
    /// to the landmark mean and a missing rotation faces that mean.
    pub fn calculate_initial_guess(&mut self) -> Result<CameraPose, EstimationFailure> {
        let mean = self.store.mean_position().ok_or(EstimationFailure::NoObservations)?;
        let guess = guess::initial_guess(&mean, self.translation_guess, self.rotation_guess, &self.config);
        debug!(
            "initial guess: translation {:?}, rotation {:?} (landmark mean {:?})",
            guess.translation.as_slice(),
            guess.rotation.as_slice(),
            mean.as_slice()
        );
        self.initial = Some(guess);
        Ok(guess)
    }

    /// Run the estimation with retries.
    ///
    /// Per-attempt outcomes and the final summary are logged at `info` when
    /// `log_summary` is set and at `debug` otherwise.
    pub fn estimate(&mut self, log_summary: bool) {
        let level = if log_summary { Level::Info } else { Level::Debug };

        self.optimization_finished = false;
        self.found_valid_solution = false;
        self.attempts = 0;
        self.last_failure = None;
        self.termination = None;
        self.state = EstimatorState::BuildingProblem;

        let result = self.run(level);
        match &result {
            Ok(()) => {
                self.state = EstimatorState::Converged;
                self.found_valid_solution = true;
            }
            Err(failure) => {
                self.state = EstimatorState::Failed;
                self.last_failure = Some(failure.clone());
                if failure.is_fatal() {
                    warn!("pose estimation rejected: {}", failure);
                }
            }
        }
        self.optimization_finished = true;
        log!(level, "{}", self);
    }

    /// Run [`Self::estimate`] on a worker thread.
    ///
    /// The estimator is handed back through the join handle, so its results can
    /// only be read once the worker has finished.
    pub fn estimate_async(mut self, log_summary: bool) -> JoinHandle<PoseEstimator> {
        std::thread::spawn(move || {
            self.estimate(log_summary);
            self
        })
    }

    fn preflight(&self) -> Result<(), EstimationFailure> {
        self.config
            .validate()
            .map_err(|e| EstimationFailure::InvalidConfiguration(e.to_string()))?;
        for (id, landmark) in self.store.landmarks() {
            landmark
                .validate()
                .map_err(|e| EstimationFailure::InvalidConfiguration(format!("landmark {id}: {e}")))?;
        }
        if self.store.observed_count() == 0 {
            return Err(EstimationFailure::NoObservations);
        }
        Ok(())
    }

    fn run(&mut self, level: Level) -> Result<(), EstimationFailure> {
        self.preflight()?;

        let base = match self.initial {
            Some(guess) => guess,
            None => self.calculate_initial_guess()?,
        };
        let mean = self.store.mean_position().ok_or(EstimationFailure::NoObservations)?;
        let furthest = self.store.furthest_from(&mean).unwrap_or(mean);
        let mut policy = RetryPolicy::new(base, mean, furthest, &self.config);
        let snapshot = self.store.snapshot();

        let mut last_failure = EstimationFailure::Solver("no attempt was made".to_string());
        let mut attempt = 0;
        while let Some(guess) = policy.guess(attempt) {
            self.store.restore(&snapshot);
            self.weights.iter_mut().for_each(|w| *w = 1.0);
            self.attempts = attempt + 1;

            match self.solve_attempt(&guess, level) {
                Ok(()) => {
                    log!(level, "attempt {} succeeded", attempt + 1);
                    return Ok(());
                }
                Err(failure) => {
                    log!(level, "attempt {} of {} rejected: {}", attempt + 1, policy.max_tries(), failure);
                    if failure.is_fatal() {
                        return Err(failure);
                    }
                    last_failure = failure;
                }
            }
            attempt += 1;
        }
        Err(last_failure)
    }

    fn solve_attempt(&mut self, guess: &CameraPose, level: Level) -> Result<(), EstimationFailure> {
        self.state = EstimatorState::BuildingProblem;
        let problem = build_problem(&self.store, &self.intrinsics, guess, &self.config)
            .map_err(|e| EstimationFailure::InvalidConfiguration(e.to_string()))?;

        self.state = EstimatorState::Solving;
        let solved = TinySolverBackend.solve(&problem.ir, &problem.initial, &self.config.solver);

        let values = match &solved {
            Ok(solution) => {
                log!(
                    level,
                    "solver stopped after {} run(s) ({}), robust cost {:.6e}",
                    solution.runs,
                    solution.termination,
                    solution.final_cost
                );
                self.termination = Some(solution.termination);
                &solution.params
            }
            Err(err) => {
                log!(level, "solver failed: {err:#}");
                self.termination = None;
                &problem.initial
            }
        };
        self.apply_values(&problem, values);
        let evaluation = problem
            .ir
            .evaluate(values)
            .map_err(|e| EstimationFailure::Solver(e.to_string()))?;
        self.record_evaluation(&evaluation);

        match solved {
            Ok(solution) => check_attempt(&self.pose, guess, solution.termination, &evaluation, &self.config),
            Err(err) => Err(EstimationFailure::Solver(format!("{err:#}"))),
        }
    }

    /// Copy parameter values back into the pose, landmarks and weights.
    fn apply_values(&mut self, problem: &PoseProblem, values: &HashMap<String, DVector<f64>>) {
        let vec3 = |name: &str| values.get(name).filter(|v| v.len() == 3).map(|v| Vec3::new(v[0], v[1], v[2]));
        let scalar = |name: &str| values.get(name).and_then(|v| v.get(0).copied());

        if let (Some(translation), Some(rotation)) = (vec3(TRANSLATION), vec3(ROTATION)) {
            self.pose = CameraPose::new(translation, rotation);
        }
        for &id in &problem.observed {
            if let (Some(lambda), Some(mu)) = (scalar(&lambda_name(id)), scalar(&mu_name(id))) {
                if let Some(landmark) = self.store.landmark_mut(id) {
                    landmark.set_parameters(lambda, mu);
                }
            }
        }
        for &group in &problem.weighted_groups {
            if let (Some(weight), Some(slot)) = (scalar(&weight_name(group)), self.weights.get_mut(group.0)) {
                *slot = weight;
            }
        }
    }

    fn record_evaluation(&mut self, evaluation: &Evaluation) {
        self.losses = Losses::from_evaluation(evaluation);
        self.diagnostics = landmark_diagnostics(evaluation);
        self.rms_pixel_error = evaluation.rms_pixel_error();
    }

    /// Estimated camera position in world space.
    pub fn translation(&self) -> Vec3 {
        self.pose.translation
    }

    /// Estimated Euler angles in degrees.
    pub fn rotation(&self) -> Vec3 {
        self.pose.rotation
    }

    pub fn pose(&self) -> CameraPose {
        self.pose
    }

    /// Translation the first attempt started from.
    pub fn initial_translation(&self) -> Option<Vec3> {
        self.initial.map(|p| p.translation)
    }

    /// Rotation the first attempt started from.
    pub fn initial_rotation(&self) -> Option<Vec3> {
        self.initial.map(|p| p.rotation)
    }

    /// Landmark groups with the current landmark parameters.
    pub fn world_objects(&self) -> Vec<LandmarkGroup> {
        self.store.to_groups()
    }

    pub fn landmark_store(&self) -> &LandmarkStore {
        &self.store
    }

    /// Per-group weights in insertion order.
    pub fn weights(&self) -> &[Real] {
        &self.weights
    }

    /// `lambda` of every landmark in insertion order.
    pub fn lambdas(&self) -> Vec<Real> {
        self.store.landmarks().map(|(_, l)| l.lambda()).collect()
    }

    /// `mu` of every landmark in insertion order.
    pub fn mus(&self) -> Vec<Real> {
        self.store.landmarks().map(|(_, l)| l.mu()).collect()
    }

    pub fn losses(&self) -> &Losses {
        &self.losses
    }

    pub fn correspondences_loss(&self) -> f64 {
        self.losses.correspondence
    }

    pub fn weights_loss(&self) -> f64 {
        self.losses.weight
    }

    pub fn lambdas_loss(&self) -> f64 {
        self.losses.lambda
    }

    pub fn rotations_loss(&self) -> f64 {
        self.losses.rotation
    }

    pub fn total_loss(&self) -> f64 {
        self.losses.total
    }

    /// Pixel error of every observed landmark at the last evaluated parameters.
    pub fn landmark_diagnostics(&self) -> &[LandmarkDiagnostics] {
        &self.diagnostics
    }

    pub fn pixel_error(&self, landmark: LandmarkId) -> Option<f64> {
        self.diagnostics
            .iter()
            .find(|d| d.landmark == landmark)
            .map(|d| d.pixel_error)
    }

    pub fn rms_pixel_error(&self) -> Option<f64> {
        self.rms_pixel_error
    }

    /// Why the solver of the last attempt stopped, `None` if it failed outright.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn is_optimization_finished(&self) -> bool {
        self.optimization_finished
    }

    pub fn has_found_valid_solution(&self) -> bool {
        self.found_valid_solution
    }

    /// Number of solve attempts made by the last estimation.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn last_failure(&self) -> Option<&EstimationFailure> {
        self.last_failure.as_ref()
    }

    pub fn report(&self) -> PoseReport {
        PoseReport {
            translation: self.pose.translation,
            rotation: self.pose.rotation,
            initial_translation: self.initial_translation(),
            initial_rotation: self.initial_rotation(),
            found_valid_solution: self.found_valid_solution,
            attempts: self.attempts,
            losses: self.losses,
            rms_pixel_error: self.rms_pixel_error,
            termination: self.termination,
            weights: self.weights.clone(),
            lambdas: self.lambdas(),
            mus: self.mus(),
            landmarks: self.diagnostics.clone(),
            failure: self.last_failure.as_ref().map(|f| f.to_string()),
        }
    }
}

impl std::fmt::Display for PoseEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.pose.translation;
        let r = self.pose.rotation;
        writeln!(f, "Pose estimation ({:?}, {} attempt(s))", self.state, self.attempts)?;
        if let Some(initial) = &self.initial {
            let (it, ir) = (initial.translation, initial.rotation);
            writeln!(f, "  initial translation: [{:.4}, {:.4}, {:.4}]", it.x, it.y, it.z)?;
            writeln!(f, "  initial rotation:    [{:.4}, {:.4}, {:.4}]", ir.x, ir.y, ir.z)?;
        }
        writeln!(f, "  translation: [{:.4}, {:.4}, {:.4}]", t.x, t.y, t.z)?;
        writeln!(f, "  rotation:    [{:.4}, {:.4}, {:.4}]", r.x, r.y, r.z)?;
        writeln!(f, "  losses: {}", self.losses)?;
        if let Some(rms) = self.rms_pixel_error {
            writeln!(f, "  rms pixel error: {rms:.4}")?;
        }
        if let Some(termination) = self.termination {
            writeln!(f, "  solver: {termination}")?;
        }
        match &self.last_failure {
            Some(failure) => write!(f, "  valid: {} ({failure})", self.found_valid_solution),
            None => write!(f, "  valid: {}", self.found_valid_solution),
        }
    }
}
