//! tiny-solver backend for the pose problem.
//!
//! The backend compiles the IR into a tiny-solver problem, applies fixed
//! parameters and robust losses, and runs Levenberg-Marquardt until the cost
//! is stationary. tiny-solver stops at the first rejected step, so the solve
//! is restarted from the last accepted values with increasing damping until
//! no step reduces the cost. The reason the solve stopped is reported with the
//! solution so callers can reject solves that merely ran out of budget.

mod tiny_solver_backend;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use tiny_solver_backend::TinySolverBackend;

/// Solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSolveOptions {
    /// Maximum number of iterations of one Levenberg-Marquardt run.
    pub max_iters: usize,
    /// Maximum number of warm restarts after a run stops.
    pub max_restarts: usize,
    /// Verbosity level passed to tiny-solver.
    pub verbosity: usize,
    pub linear_solver: LinearSolverKind,
    /// A restart that lowers the cost by less than this counts as no progress.
    pub min_abs_decrease: f64,
    /// Relative counterpart of `min_abs_decrease`.
    pub min_rel_decrease: f64,
    /// Cost below which the solve stops immediately.
    pub min_error: f64,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            max_restarts: 100,
            verbosity: 0,
            linear_solver: LinearSolverKind::SparseCholesky,
            min_abs_decrease: 1e-12,
            min_rel_decrease: 1e-12,
            min_error: 1e-16,
        }
    }
}

/// Linear solver used for the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    SparseCholesky,
    SparseQR,
}

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The cost dropped below `min_error`.
    ErrorTooSmall,
    /// Even the most damped step failed to lower the cost.
    Stationary,
    /// The restart budget ran out while the cost was still decreasing.
    RestartBudgetExhausted,
    /// A later run hit a singular system or a NaN cost; the last finite values are kept.
    NumericalFailure,
}

impl Termination {
    /// `true` when the returned values are a genuine local minimum.
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::ErrorTooSmall | Termination::Stationary)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Termination::ErrorTooSmall => "cost below threshold",
            Termination::Stationary => "stationary",
            Termination::RestartBudgetExhausted => "restart budget exhausted",
            Termination::NumericalFailure => "numerical failure",
        };
        f.write_str(text)
    }
}

/// Solver output.
///
/// The `params` map uses the IR parameter block names.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    /// Optimized parameter vectors keyed by block name.
    pub params: HashMap<String, DVector<f64>>,
    /// Final robustified cost.
    pub final_cost: f64,
    pub termination: Termination,
    /// Number of Levenberg-Marquardt runs, the first one included.
    pub runs: usize,
}
