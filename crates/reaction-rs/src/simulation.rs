//! Simulation engine for [`ReactionNetwork`]s.

use crate::expr::{CompiledExpr, Slot};
use crate::ReactionNetwork;
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use netev_core::{
    Concentration, Deadline, Eigenvalue, IntegratorSettings, OscError, Result, SimulationEngine,
    SimulationWindow, Time, Trajectory,
};
use ode_solvers::dop_shared::OutputType;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::System;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use tracing::{debug, trace};

/// Relative finite-difference step for Jacobians
const FD_STEP: f64 = 1e-6;

/// Concentrations beyond this magnitude count as a diverged state
const DIVERGENCE_LIMIT: f64 = 1e100;

/// Output times closer than this fraction of the output step are the same sample
const GRID_SLACK: f64 = 1e-4;

/// Newton solver settings for steady states
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateSettings {
    /// Residual 2-norm accepted as converged
    pub tolerance: f64,
    /// Maximum Newton iterations
    pub max_iterations: usize,
    /// Maximum step halvings per iteration
    pub max_halvings: usize,
}

impl Default for SteadyStateSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
            max_halvings: 20,
        }
    }
}

// =============================================================================
// RATE MODEL
// =============================================================================

/// Network with rate laws resolved against the floating species ordering
#[derive(Debug, Clone)]
struct RateModel {
    rates: Vec<CompiledExpr>,
    stoichiometry: Array2<f64>,
}

impl RateModel {
    fn compile(network: &ReactionNetwork) -> Result<Self> {
        let floating = network.floating_species_ids();
        let resolve = |name: &str| -> Option<Slot> {
            if let Some(i) = floating.iter().position(|s| s == name) {
                return Some(Slot::State(i));
            }
            if let Some(s) = network.get_species(name) {
                return Some(Slot::Constant(s.initial_concentration));
            }
            if let Some(p) = network.get_parameter(name) {
                return Some(Slot::Constant(p.value));
            }
            (name == "time").then_some(Slot::Time)
        };

        let rates = network.reactions.iter()
            .map(|r| {
                r.rate_law.compile(&resolve).map_err(|e| match e {
                    OscError::ModelNotFound(msg) => {
                        OscError::ModelNotFound(format!("reaction {}: {}", r.id, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rates,
            stoichiometry: network.stoichiometry_matrix(),
        })
    }

    fn dimension(&self) -> usize {
        self.stoichiometry.nrows()
    }

    fn reaction_rates(&self, t: Time, x: &[f64]) -> Vec<f64> {
        self.rates.iter().map(|r| r.eval(x, t)).collect()
    }

    /// dx/dt = N v(x)
    fn derivatives(&self, t: Time, x: &[f64], dx: &mut [f64]) {
        let v = self.reaction_rates(t, x);
        for (i, out) in dx.iter_mut().enumerate() {
            *out = self.stoichiometry.row(i)
                .iter()
                .zip(&v)
                .map(|(n, rate)| n * rate)
                .sum();
        }
    }

    fn residual(&self, t: Time, x: &DVector<f64>) -> DVector<f64> {
        let mut f = DVector::zeros(x.len());
        self.derivatives(t, x.as_slice(), f.as_mut_slice());
        f
    }

    /// Central-difference Jacobian
    fn jacobian(&self, t: Time, x: &[f64]) -> DMatrix<f64> {
        let n = x.len();
        let mut jac = DMatrix::zeros(n, n);
        let mut shifted = x.to_vec();
        let mut f_plus = vec![0.0; n];
        let mut f_minus = vec![0.0; n];

        for j in 0..n {
            let h = FD_STEP * x[j].abs().max(1.0);
            shifted[j] = x[j] + h;
            self.derivatives(t, &shifted, &mut f_plus);
            shifted[j] = x[j] - h;
            self.derivatives(t, &shifted, &mut f_minus);
            shifted[j] = x[j];

            for i in 0..n {
                jac[(i, j)] = (f_plus[i] - f_minus[i]) / (2.0 * h);
            }
        }

        jac
    }
}

/// Why the integrator was asked to stop early
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Deadline(Time),
    Diverged(Time),
}

struct Integration<'a> {
    model: &'a RateModel,
    deadline: Option<Deadline>,
    interrupt: &'a Cell<Option<Interrupt>>,
}

impl System<f64, DVector<f64>> for Integration<'_> {
    fn system(&self, t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        self.model.derivatives(t, y.as_slice(), dy.as_mut_slice());
    }

    fn solout(&mut self, t: f64, y: &DVector<f64>, _dy: &DVector<f64>) -> bool {
        if y.iter().any(|v| !v.is_finite() || v.abs() > DIVERGENCE_LIMIT) {
            self.interrupt.set(Some(Interrupt::Diverged(t)));
            return true;
        }
        if self.deadline.is_some_and(|d| d.expired()) {
            self.interrupt.set(Some(Interrupt::Deadline(t)));
            return true;
        }
        false
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

/// Deterministic simulator for a reaction network
#[derive(Debug, Clone)]
pub struct NetworkSimulation {
    network: ReactionNetwork,
    model: RateModel,
    species: Vec<String>,
    /// Declared initial concentrations
    initial: Vec<Concentration>,
    /// Current state (floating species concentrations)
    state: Vec<Concentration>,
    /// Current time
    t: Time,
    integrator: IntegratorSettings,
    steady: SteadyStateSettings,
    deadline: Option<Deadline>,
}

impl NetworkSimulation {
    /// Create a new simulation at the network's initial state
    pub fn new(network: ReactionNetwork) -> Result<Self> {
        let model = RateModel::compile(&network)?;
        let species = network.floating_species_ids();
        let initial: Vec<_> = network.floating_species()
            .map(|s| s.initial_concentration)
            .collect();

        debug!(
            species = species.len(),
            reactions = network.reactions.len(),
            "compiled reaction network"
        );

        Ok(Self {
            state: initial.clone(),
            network,
            model,
            species,
            initial,
            t: 0.0,
            integrator: IntegratorSettings::default(),
            steady: SteadyStateSettings::default(),
            deadline: None,
        })
    }

    pub fn with_integrator(mut self, settings: IntegratorSettings) -> Self {
        self.integrator = settings;
        self
    }

    pub fn with_steady_state(mut self, settings: SteadyStateSettings) -> Self {
        self.steady = settings;
        self
    }

    /// Model as declared (initial values, not current state)
    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn integrator_settings(&self) -> IntegratorSettings {
        self.integrator
    }

    /// Current time
    pub fn time(&self) -> Time {
        self.t
    }

    /// Current concentration of one floating species
    pub fn concentration(&self, id: &str) -> Option<Concentration> {
        let i = self.species.iter().position(|s| s == id)?;
        Some(self.state[i])
    }

    /// Overwrite the current concentration of one floating species
    pub fn set_concentration(&mut self, id: &str, value: Concentration) -> Result<()> {
        let i = self.species.iter()
            .position(|s| s == id)
            .ok_or_else(|| OscError::ModelNotFound(format!("floating species '{}'", id)))?;
        self.state[i] = value;
        Ok(())
    }

    /// Change a parameter value and recompile the rate laws
    pub fn set_parameter(&mut self, id: &str, value: f64) -> Result<()> {
        let parameter = self.network.get_parameter_mut(id)
            .ok_or_else(|| OscError::ModelNotFound(format!("parameter '{}'", id)))?;
        parameter.value = value;
        self.model = RateModel::compile(&self.network)?;
        Ok(())
    }

    /// Reaction rates at the current state, in reaction order
    pub fn reaction_rates(&self) -> Vec<f64> {
        self.model.reaction_rates(self.t, &self.state)
    }

    /// Species derivatives at the current state
    pub fn derivatives(&self) -> Vec<f64> {
        let mut dx = vec![0.0; self.state.len()];
        self.model.derivatives(self.t, &self.state, &mut dx);
        dx
    }

    /// Finite-difference Jacobian at the current state
    pub fn jacobian(&self) -> DMatrix<f64> {
        self.model.jacobian(self.t, &self.state)
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(d) if d.expired() => Err(OscError::Cancelled(self.t)),
            _ => Ok(()),
        }
    }

    /// One Dopri5 run from `t0` to `t1`.
    ///
    /// Dense output samples every `dx`; sparse output records every accepted
    /// step and ends at `t1`.
    fn integrate(
        &self,
        t0: Time,
        t1: Time,
        dx: Time,
        y0: DVector<f64>,
        output: OutputType,
    ) -> Result<(Vec<Time>, Vec<DVector<f64>>)> {
        let interrupt = Cell::new(None);
        let system = Integration {
            model: &self.model,
            deadline: self.deadline,
            interrupt: &interrupt,
        };
        let rtol = self.integrator.relative_tolerance;
        let atol = self.integrator.absolute_tolerance;

        let mut stepper = match output {
            OutputType::Dense => Dopri5::new(system, t0, t1, dx, y0, rtol, atol),
            OutputType::Sparse => Dopri5::from_param(
                system, t0, t1, dx, y0, rtol, atol,
                0.9, 0.04, 0.2, 10.0, t1 - t0, 0.0, 100_000, 1000,
                OutputType::Sparse,
            ),
        };
        let outcome = stepper.integrate();

        match interrupt.get() {
            Some(Interrupt::Deadline(t)) => return Err(OscError::Cancelled(t)),
            Some(Interrupt::Diverged(t)) => {
                return Err(OscError::NumericalError(format!(
                    "state diverged at t = {}",
                    t
                )))
            }
            None => {}
        }
        outcome.map_err(|e| OscError::SimulationError(format!("{:?}", e)))?;

        Ok((stepper.x_out().clone(), stepper.y_out().clone()))
    }
}

impl SimulationEngine for NetworkSimulation {
    fn reset(&mut self) {
        self.state.clone_from(&self.initial);
        self.t = 0.0;
    }

    fn steady_state(&mut self) -> Result<()> {
        let n = self.model.dimension();
        if n == 0 {
            return Ok(());
        }

        let mut x = DVector::from_column_slice(&self.state);
        let mut f = self.model.residual(self.t, &x);
        let mut norm = f.norm();

        for iter in 0..self.steady.max_iterations {
            self.check_deadline()?;

            if !norm.is_finite() {
                return Err(OscError::NumericalError(format!(
                    "non-finite residual at Newton iteration {}",
                    iter
                )));
            }
            if norm < self.steady.tolerance {
                trace!(iterations = iter, residual = norm, "steady state converged");
                self.state = x.as_slice().to_vec();
                return Ok(());
            }

            let jac = self.model.jacobian(self.t, x.as_slice());
            let step = jac.lu().solve(&(-&f)).ok_or_else(|| {
                OscError::NumericalError(format!("singular Jacobian at Newton iteration {}", iter))
            })?;

            // Damped step: halve until the residual decreases
            let mut lambda = 1.0;
            let mut accepted = false;
            for _ in 0..=self.steady.max_halvings {
                let candidate = &x + &step * lambda;
                let f_candidate = self.model.residual(self.t, &candidate);
                let candidate_norm = f_candidate.norm();
                if candidate_norm.is_finite() && candidate_norm < norm {
                    x = candidate;
                    f = f_candidate;
                    norm = candidate_norm;
                    accepted = true;
                    break;
                }
                lambda *= 0.5;
            }

            if !accepted {
                return Err(OscError::NumericalError(format!(
                    "Newton step could not reduce residual {:e}",
                    norm
                )));
            }
        }

        if norm < self.steady.tolerance {
            self.state = x.as_slice().to_vec();
            return Ok(());
        }

        Err(OscError::NumericalError(format!(
            "steady state not reached after {} iterations (residual {:e})",
            self.steady.max_iterations, norm
        )))
    }

    fn eigenvalues(&mut self) -> Result<Vec<Eigenvalue>> {
        self.check_deadline()?;

        if self.model.dimension() == 0 {
            return Ok(Vec::new());
        }

        let jac = self.jacobian();
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(OscError::NumericalError(format!(
                "non-finite Jacobian at t = {}",
                self.t
            )));
        }

        Ok(jac.complex_eigenvalues().iter().copied().collect())
    }

    fn simulate(&mut self, window: &SimulationWindow) -> Result<Trajectory> {
        window.validate()?;
        self.check_deadline()?;

        let grid = window.time_grid();
        let n = self.model.dimension();
        if n == 0 {
            self.t = window.t_end;
            return Trajectory::from_rows(Vec::new(), grid, Vec::new());
        }

        let step = window.output_step();
        let slack = GRID_SLACK * step;
        let y0 = DVector::from_column_slice(&self.state);
        let (times, states) =
            self.integrate(window.t_start, window.t_end, step, y0.clone(), OutputType::Dense)?;

        // Dense output drifts by accumulated rounding and can stop short of t_end;
        // any grid time it misses is reached by a short run from the previous sample.
        let mut outputs = times.into_iter().zip(states).peekable();
        let mut rows = Vec::with_capacity(grid.len() * n);
        let mut previous = (window.t_start, y0);
        for &t in &grid {
            while outputs.next_if(|(x, _)| *x < t - slack).is_some() {}
            let y = match outputs.next_if(|(x, _)| (*x - t).abs() <= slack) {
                Some((_, y)) => y,
                None if (t - previous.0).abs() <= slack => previous.1.clone(),
                None => {
                    trace!(t, "filling missed output sample");
                    let (_, mut ys) = self.integrate(
                        previous.0,
                        t,
                        t - previous.0,
                        previous.1.clone(),
                        OutputType::Sparse,
                    )?;
                    ys.pop().unwrap_or_else(|| previous.1.clone())
                }
            };
            rows.extend(y.iter().copied());
            previous = (t, y);
        }

        self.state = previous.1.as_slice().to_vec();
        self.t = window.t_end;
        let trajectory = Trajectory::from_rows(self.species.clone(), grid, rows)?;

        debug!(
            samples = trajectory.len(),
            rtol = self.integrator.relative_tolerance,
            "simulation finished"
        );
        Ok(trajectory)
    }

    fn relative_tolerance(&self) -> f64 {
        self.integrator.relative_tolerance
    }

    fn set_relative_tolerance(&mut self, tolerance: f64) {
        self.integrator.relative_tolerance = tolerance;
    }

    fn species_ids(&self) -> Vec<String> {
        self.species.clone()
    }

    fn concentrations(&self) -> Vec<Concentration> {
        self.state.clone()
    }

    fn set_deadline(&mut self, deadline: Option<Deadline>) {
        self.deadline = deadline;
    }
}

// =============================================================================
// TESTS
// =============================================================================
