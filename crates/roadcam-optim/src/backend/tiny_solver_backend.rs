use crate::backend::{BackendSolution, BackendSolveOptions, LinearSolverKind, Termination};
use crate::factors::{interval_residual, reprojection_residual_generic, target_value_residual, LandmarkObservation};
use crate::ir::{FactorKind, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, ensure, Result};
use log::debug;
use nalgebra::{DVector, Vector3};
use roadcam_core::Intrinsics;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{CauchyLoss, HuberLoss, Loss};
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

/// tiny-solver backend adapter.
#[derive(Debug, Clone, Copy)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(&self, ir: &ProblemIR, initial: &HashMap<String, DVector<f64>>) -> Result<Problem> {
        ir.validate()?;

        let mut problem = Problem::new();

        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                param.dim,
                init.len()
            );
            ensure!(
                init.iter().all(|v| v.is_finite()),
                "initial value of {} is not finite",
                param.name
            );

            for idx in param.fixed.iter() {
                problem.fix_variable(&param.name, idx);
            }
        }

        for residual in &ir.residuals {
            let (factor, loss) = compile_factor(residual, &ir.intrinsics)?;
            let param_names: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            problem.add_residual_block(residual.residual_dim, &param_names, factor, loss);
        }

        Ok(problem)
    }
}

const MIN_DIAGONAL: f64 = 1e-6;
const MAX_DIAGONAL: f64 = 1e32;
/// Trust region radius of the first run; restarts after progress return to it.
const MAX_TRUST_REGION_RADIUS: f64 = 1e4;
/// Runs at this radius that cannot lower the cost end the solve as stationary.
const MIN_TRUST_REGION_RADIUS: f64 = 1e-4;
const RADIUS_FACTOR: f64 = 10.0;

impl TinySolverBackend {
    /// Solve `ir` starting from `initial`.
    ///
    /// Runs Levenberg-Marquardt repeatedly from the last accepted values. A run
    /// that makes no progress shrinks the initial trust region; one that does
    /// widens it again. Fails only when the first run cannot produce a finite
    /// solution.
    pub fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let problem = self.compile(ir, initial)?;
        let options = to_optimizer_options(opts);

        let mut values = initial.clone();
        let mut cost = squared_cost(&problem, &values);
        let mut radius = MAX_TRUST_REGION_RADIUS;
        let mut runs = 0;

        let termination = loop {
            if cost < opts.min_error {
                break Termination::ErrorTooSmall;
            }
            if runs > opts.max_restarts {
                break Termination::RestartBudgetExhausted;
            }

            runs += 1;
            let optimizer = LevenbergMarquardtOptimizer::new(MIN_DIAGONAL, MAX_DIAGONAL, radius);
            let next = optimizer
                .optimize(&problem, &values, Some(options.clone()))
                .map(|next| {
                    let next_cost = squared_cost(&problem, &next);
                    (next, next_cost)
                })
                .filter(|(_, next_cost)| next_cost.is_finite());
            let Some((next, next_cost)) = next else {
                ensure!(runs > 1, "tiny-solver failed to produce a finite solution");
                break Termination::NumericalFailure;
            };

            let decrease = cost - next_cost;
            if decrease > opts.min_abs_decrease && decrease > opts.min_rel_decrease * cost {
                values = next;
                cost = next_cost;
                radius = (radius * RADIUS_FACTOR).min(MAX_TRUST_REGION_RADIUS);
            } else {
                if decrease > 0.0 {
                    values = next;
                    cost = next_cost;
                }
                if radius <= MIN_TRUST_REGION_RADIUS {
                    break Termination::Stationary;
                }
                radius /= RADIUS_FACTOR;
            }
        };

        debug!(
            "tiny-solver stopped after {} run(s): {} (cost {:.6e})",
            runs,
            termination,
            0.5 * cost
        );
        Ok(BackendSolution {
            params: values,
            final_cost: 0.5 * cost,
            termination,
            runs,
        })
    }
}

fn squared_cost(problem: &Problem, values: &HashMap<String, DVector<f64>>) -> f64 {
    let blocks = problem.initialize_parameter_blocks(values);
    problem.compute_residuals(&blocks, true).as_ref().squared_norm_l2()
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        linear_solver_type: match opts.linear_solver {
            LinearSolverKind::SparseCholesky => LinearSolverType::SparseCholesky,
            LinearSolverKind::SparseQR => LinearSolverType::SparseQR,
        },
        min_abs_error_decrease_threshold: opts.min_abs_decrease,
        min_rel_error_decrease_threshold: opts.min_rel_decrease,
        min_error_threshold: opts.min_error,
    }
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    match loss {
        RobustLoss::None => Ok(None),
        RobustLoss::Huber { scale } => {
            ensure!(scale > 0.0, "Huber scale must be positive");
            Ok(Some(Box::new(HuberLoss::new(scale))))
        }
        RobustLoss::Cauchy { scale } => {
            ensure!(scale > 0.0, "Cauchy scale must be positive");
            Ok(Some(Box::new(CauchyLoss::new(scale))))
        }
    }
}

type CompiledFactor = (
    Box<dyn tiny_solver::factors::FactorImpl + Send>,
    Option<Box<dyn Loss + Send>>,
);

fn compile_factor(residual: &ResidualBlock, intrinsics: &Arc<Intrinsics>) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    match &residual.factor {
        FactorKind::Reprojection { observation } => {
            let factor = TinyReprojectionFactor {
                observation: observation.clone(),
                intrinsics: Arc::clone(intrinsics),
            };
            Ok((Box::new(factor), loss))
        }
        FactorKind::TargetValue { index, target, scale } => {
            let factor = TinyTargetValueFactor {
                index: *index,
                target: *target,
                scale: *scale,
            };
            Ok((Box::new(factor), loss))
        }
        FactorKind::Interval {
            index,
            lower,
            upper,
            scale,
        } => {
            let factor = TinyIntervalFactor {
                index: *index,
                lower: *lower,
                upper: *upper,
                scale: *scale,
            };
            Ok((Box::new(factor), loss))
        }
    }
}

#[derive(Debug, Clone)]
struct TinyReprojectionFactor {
    observation: LandmarkObservation,
    intrinsics: Arc<Intrinsics>,
}

impl<T: nalgebra::RealField> Factor<T> for TinyReprojectionFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(
            params.len(),
            5,
            "expected [translation, rotation, lambda, mu, weight] parameter blocks"
        );
        let vec3 = |p: &DVector<T>| Vector3::new(p[0].clone(), p[1].clone(), p[2].clone());
        let out = reprojection_residual_generic(
            &vec3(&params[0]),
            &vec3(&params[1]),
            params[2][0].clone(),
            params[3][0].clone(),
            params[4][0].clone(),
            &self.observation,
            &self.intrinsics,
        );
        DVector::from_row_slice(out.residual.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinyTargetValueFactor {
    index: usize,
    target: f64,
    scale: f64,
}

impl<T: nalgebra::RealField> Factor<T> for TinyTargetValueFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected a single parameter block");
        let r = target_value_residual(params[0][self.index].clone(), self.target, self.scale);
        DVector::from_element(1, r)
    }
}

#[derive(Debug, Clone)]
struct TinyIntervalFactor {
    index: usize,
    lower: f64,
    upper: f64,
    scale: f64,
}

impl<T: nalgebra::RealField> Factor<T> for TinyIntervalFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected a single parameter block");
        let r = interval_residual(params[0][self.index].clone(), self.lower, self.upper, self.scale);
        DVector::from_element(1, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FixedMask, ResidualFamily};
    use roadcam_core::{synthetic, LandmarkId};

    fn scalar_problem() -> (ProblemIR, HashMap<String, DVector<f64>>) {
        let mut ir = ProblemIR::new(Arc::new(synthetic::traffic_intrinsics().unwrap()));
        let x = ir.add_param_block("x", 2, FixedMask::all_free());
        ir.add_residual_block(ResidualBlock::new(
            vec![x],
            FactorKind::Interval {
                index: 0,
                lower: 1.0,
                upper: 2.0,
                scale: 1.0,
            },
            ResidualFamily::Lambda,
            RobustLoss::None,
        ));
        ir.add_residual_block(ResidualBlock::new(
            vec![x],
            FactorKind::TargetValue {
                index: 1,
                target: -3.0,
                scale: 1.0,
            },
            ResidualFamily::Weight,
            RobustLoss::None,
        ));
        let initial = HashMap::from([("x".to_string(), DVector::from_row_slice(&[5.0, 4.0]))]);
        (ir, initial)
    }

    #[test]
    fn interval_and_target_pull_scalar_into_place() {
        let (ir, initial) = scalar_problem();
        let solution = TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .unwrap();
        let x = &solution.params["x"];
        assert!((x[0] - 2.0).abs() < 1e-6, "x0 = {}", x[0]);
        assert!((x[1] + 3.0).abs() < 1e-6, "x1 = {}", x[1]);
        assert!(solution.termination.is_converged(), "{}", solution.termination);
        assert!(solution.final_cost < 1e-12);
    }

    #[test]
    fn truncated_solve_is_not_reported_as_converged() {
        let (ir, initial) = scalar_problem();
        let opts = BackendSolveOptions {
            max_iters: 1,
            max_restarts: 0,
            ..BackendSolveOptions::default()
        };
        let solution = TinySolverBackend.solve(&ir, &initial, &opts).unwrap();
        assert_eq!(solution.runs, 1);
        assert_eq!(solution.termination, Termination::RestartBudgetExhausted);
        assert!(!solution.termination.is_converged());
    }

    #[test]
    fn restarts_continue_past_a_single_short_run() {
        let (ir, initial) = scalar_problem();
        let opts = BackendSolveOptions {
            max_iters: 1,
            ..BackendSolveOptions::default()
        };
        let solution = TinySolverBackend.solve(&ir, &initial, &opts).unwrap();
        assert!(solution.runs > 1);
        assert!(solution.termination.is_converged(), "{}", solution.termination);
        assert!((solution.params["x"][1] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn solved_start_stops_without_running() {
        let (ir, _) = scalar_problem();
        let initial = HashMap::from([("x".to_string(), DVector::from_row_slice(&[1.5, -3.0]))]);
        let solution = TinySolverBackend
            .solve(&ir, &initial, &BackendSolveOptions::default())
            .unwrap();
        assert_eq!(solution.runs, 0);
        assert_eq!(solution.termination, Termination::ErrorTooSmall);
    }

    #[test]
    fn missing_initial_value_fails_compilation() {
        let mut ir = ProblemIR::new(Arc::new(synthetic::traffic_intrinsics().unwrap()));
        ir.add_param_block("translation", 3, FixedMask::all_free());
        let initial = HashMap::new();
        assert!(TinySolverBackend.compile(&ir, &initial).is_err());
    }

    #[test]
    fn reprojection_factor_matches_plain_evaluation() {
        let intrinsics = Arc::new(synthetic::traffic_intrinsics().unwrap());
        let factor = TinyReprojectionFactor {
            observation: LandmarkObservation {
                landmark: LandmarkId(0),
                origin: [-4.0, 15.0, 0.0],
                axis_a: [0.0, 0.0, 1.0],
                axis_b: [0.0; 3],
                expected_pixel: [770.0, 690.0],
                max_lambda: 2.0,
            },
            intrinsics,
        };
        let params = vec![
            DVector::from_row_slice(&[0.0, -10.0, 5.0]),
            DVector::from_row_slice(&[90.0, 0.0, 0.0]),
            DVector::from_element(1, 3.0),
            DVector::from_element(1, 0.0),
            DVector::from_element(1, 1.0),
        ];
        let r: DVector<f64> = factor.residual_func(&params);
        assert!((r[0] - 2.0).abs() < 1e-9);
        assert!((r[1] + 6.0).abs() < 1e-9);
        assert!((r[2] - 1.0).abs() < 1e-12);
    }
}
