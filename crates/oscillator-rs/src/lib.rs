//! # NetEv Oscillator
//!
//! Decides whether an evolved reaction network oscillates by inspecting the
//! Jacobian eigenvalues at its fixed point.
//!
//! ## Tiers
//!
//! Engines fail often on evolved networks (singular Jacobians, stiff
//! dynamics, negative states), so classification walks an ordered list of
//! strategies and stops at the first conclusive one:
//!
//! 1. **Steady state**: solve for the fixed point and test its eigenvalues.
//!    An oscillatory signature counts only if every floating concentration
//!    is non-negative there.
//! 2. **Simulation**: integrate from the initial state and test the
//!    eigenvalues at the end of the run. A failed run is retried once with a
//!    tightened relative tolerance; a second failure ends classification.
//! 3. **Steady state again**, now from the end of the simulation.
//!
//! If nothing is conclusive the most recent eigenvalue verdict stands, and
//! `false` if none was ever reached.

pub mod eigen;

pub use eigen::{check_eigens, has_oscillator_eigens, EigenCriterion};

use netev_core::{Deadline, Eigenvalue, OscError, SimulationEngine, SimulationWindow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Relative tolerance for the retried simulation
pub const TIGHTENED_TOLERANCE: f64 = 1e-10;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Classifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Simulation run used by the second tier
    pub window: SimulationWindow,
    /// Relative tolerance installed before retrying a failed simulation
    pub tightened_tolerance: f64,
    /// Eigenvalue test applied at every tier
    pub criterion: EigenCriterion,
    /// Wall-clock budget for one classification, in seconds
    pub timeout_secs: Option<f64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window: SimulationWindow::default(),
            tightened_tolerance: TIGHTENED_TOLERANCE,
            criterion: EigenCriterion::Marginal,
            timeout_secs: None,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> netev_core::Result<()> {
        self.window.validate()?;
        if !(self.tightened_tolerance.is_finite() && self.tightened_tolerance > 0.0) {
            return Err(OscError::InvalidInput(format!(
                "tightened tolerance must be positive, got {}",
                self.tightened_tolerance
            )));
        }
        if let Some(secs) = self.timeout_secs {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(OscError::InvalidInput(format!(
                    "timeout must be a non-negative number of seconds, got {}",
                    secs
                )));
            }
        }
        Ok(())
    }

    /// Deadline for a classification starting now
    pub fn deadline(&self) -> Option<Deadline> {
        let secs = self.timeout_secs?;
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) => Some(Deadline::after(timeout)),
            Err(_) => {
                warn!(secs, "ignoring invalid classification timeout");
                None
            }
        }
    }
}

// =============================================================================
// TIERS
// =============================================================================

/// Classification strategy, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    SteadyState,
    Simulation,
    SteadyStateRetry,
}

impl Tier {
    pub const ORDER: [Tier; 3] = [Tier::SteadyState, Tier::Simulation, Tier::SteadyStateRetry];

    pub fn name(self) -> &'static str {
        match self {
            Tier::SteadyState => "steady-state",
            Tier::Simulation => "simulation",
            Tier::SteadyStateRetry => "steady-state retry",
        }
    }

    fn run<E: SimulationEngine + ?Sized>(
        self,
        session: &mut SimulationSession<'_, E>,
    ) -> Result<TierOutcome, AnalysisError> {
        match self {
            Tier::SteadyState => steady_state_tier(session),
            Tier::Simulation => simulation_tier(session),
            Tier::SteadyStateRetry => steady_state_retry_tier(session),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a tier concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOutcome {
    Decided(bool),
    Undecided,
}

/// Engine failure inside a tier
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Swallowed; the next tier is attempted
    #[error("{tier} tier failed: {source}")]
    Recoverable { tier: Tier, source: OscError },

    /// Ends classification with a negative verdict
    #[error("{tier} tier aborted: {source}")]
    Fatal { tier: Tier, source: OscError },
}

impl AnalysisError {
    pub fn tier(&self) -> Tier {
        match self {
            AnalysisError::Recoverable { tier, .. } | AnalysisError::Fatal { tier, .. } => *tier,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, AnalysisError::Fatal { .. })
    }
}

fn recoverable(tier: Tier) -> impl Fn(OscError) -> AnalysisError {
    move |source| AnalysisError::Recoverable { tier, source }
}

fn fatal(tier: Tier) -> impl Fn(OscError) -> AnalysisError {
    move |source| AnalysisError::Fatal { tier, source }
}

/// Engine failure that classification absorbed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierFailure {
    pub tier: Tier,
    pub fatal: bool,
    pub message: String,
}

// =============================================================================
// SESSION
// =============================================================================

/// Exclusive hold on an engine for one classification.
///
/// Tiers run in sequence against the same mutated engine state; the session
/// carries the most recent eigenvalue verdict between them.
struct SimulationSession<'a, E: SimulationEngine + ?Sized> {
    engine: &'a mut E,
    config: &'a ClassifierConfig,
    last_verdict: bool,
    eigenvalues: Vec<Eigenvalue>,
    failures: Vec<TierFailure>,
}

impl<'a, E: SimulationEngine + ?Sized> SimulationSession<'a, E> {
    fn new(engine: &'a mut E, config: &'a ClassifierConfig) -> Self {
        Self {
            engine,
            config,
            last_verdict: false,
            eigenvalues: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn judge(&mut self, eigenvalues: Vec<Eigenvalue>) -> bool {
        self.last_verdict = self.config.criterion.matches(&eigenvalues);
        self.eigenvalues = eigenvalues;
        self.last_verdict
    }

    fn absorb(&mut self, tier: Tier, fatal: bool, error: &dyn fmt::Display) {
        debug!(%tier, fatal, error = %error, "engine failure absorbed");
        self.failures.push(TierFailure {
            tier,
            fatal,
            message: error.to_string(),
        });
    }

    fn absorb_error(&mut self, error: AnalysisError) {
        let tier = error.tier();
        let fatal = error.is_fatal();
        match &error {
            AnalysisError::Recoverable { source, .. } | AnalysisError::Fatal { source, .. } => {
                self.absorb(tier, fatal, source)
            }
        }
    }

    /// Run every tier in order until one decides
    fn run_tiers(&mut self) -> (bool, Option<Tier>) {
        for tier in Tier::ORDER {
            match tier.run(self) {
                Ok(TierOutcome::Decided(verdict)) => return (verdict, Some(tier)),
                Ok(TierOutcome::Undecided) => {}
                Err(error) if error.is_fatal() => {
                    self.absorb_error(error);
                    return (false, Some(tier));
                }
                Err(error) => self.absorb_error(error),
            }
        }
        (self.last_verdict, None)
    }

    fn finish(self, oscillator: bool, decided_by: Option<Tier>) -> Classification {
        Classification {
            oscillator,
            decided_by,
            eigenvalues: self.eigenvalues,
            failures: self.failures,
        }
    }
}

fn steady_state_tier<E: SimulationEngine + ?Sized>(
    session: &mut SimulationSession<'_, E>,
) -> Result<TierOutcome, AnalysisError> {
    let tier = Tier::SteadyState;
    session.engine.steady_state().map_err(recoverable(tier))?;
    let eigenvalues = session.engine.eigenvalues().map_err(recoverable(tier))?;

    if !session.judge(eigenvalues) {
        return Ok(TierOutcome::Undecided);
    }

    let concentrations = session.engine.concentrations();
    if let Some(position) = concentrations.iter().position(|c| *c < 0.0) {
        let species = session.engine.species_ids();
        debug!(
            species = species.get(position).map(String::as_str).unwrap_or("?"),
            concentration = concentrations[position],
            "oscillatory fixed point has a negative concentration"
        );
        return Ok(TierOutcome::Decided(false));
    }

    Ok(TierOutcome::Decided(true))
}

fn simulation_tier<E: SimulationEngine + ?Sized>(
    session: &mut SimulationSession<'_, E>,
) -> Result<TierOutcome, AnalysisError> {
    let tier = Tier::Simulation;
    let window = session.config.window;

    session.engine.reset();
    if let Err(first) = session.engine.simulate(&window) {
        session.absorb(tier, false, &first);
        let tolerance = session.config.tightened_tolerance;
        session.engine.set_relative_tolerance(tolerance);
        session.engine.reset();
        session.engine.simulate(&window).map_err(fatal(tier))?;
    }

    let eigenvalues = session.engine.eigenvalues().map_err(fatal(tier))?;
    if session.judge(eigenvalues) {
        Ok(TierOutcome::Decided(true))
    } else {
        Ok(TierOutcome::Undecided)
    }
}

fn steady_state_retry_tier<E: SimulationEngine + ?Sized>(
    session: &mut SimulationSession<'_, E>,
) -> Result<TierOutcome, AnalysisError> {
    let tier = Tier::SteadyStateRetry;
    session.engine.steady_state().map_err(recoverable(tier))?;
    let eigenvalues = session.engine.eigenvalues().map_err(recoverable(tier))?;
    Ok(TierOutcome::Decided(session.judge(eigenvalues)))
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Result of one classification
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub oscillator: bool,
    /// Tier that reached the verdict; `None` when every tier was inconclusive
    pub decided_by: Option<Tier>,
    /// Eigenvalues of the most recent successful test
    pub eigenvalues: Vec<Eigenvalue>,
    pub failures: Vec<TierFailure>,
}

/// Tiered oscillator classifier
#[derive(Debug, Clone, Default)]
pub struct OscillationClassifier {
    config: ClassifierConfig,
}

impl OscillationClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a loaded model. Never fails: engine errors become a verdict.
    pub fn classify<E: SimulationEngine + ?Sized>(&self, engine: &mut E) -> Classification {
        let deadline = self.config.deadline();
        if deadline.is_some() {
            engine.set_deadline(deadline);
        }

        let mut session = SimulationSession::new(&mut *engine, &self.config);
        let (oscillator, decided_by) = session.run_tiers();
        let classification = session.finish(oscillator, decided_by);

        if deadline.is_some() {
            engine.set_deadline(None);
        }

        debug!(
            oscillator,
            tier = decided_by.map(Tier::name).unwrap_or("none"),
            failures = classification.failures.len(),
            "classified"
        );
        classification
    }

    pub fn is_oscillator<E: SimulationEngine + ?Sized>(&self, engine: &mut E) -> bool {
        self.classify(engine).oscillator
    }
}

/// Classify with default settings
pub fn is_oscillator<E: SimulationEngine + ?Sized>(engine: &mut E) -> bool {
    OscillationClassifier::default().is_oscillator(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netev_core::{Concentration, Trajectory};
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Reset,
        SteadyState,
        Eigenvalues,
        Simulate { tolerance: f64 },
        SetTolerance(f64),
        Deadline(bool),
    }

    /// Engine whose answers are queued up front. An exhausted queue fails.
    struct ScriptedEngine {
        initial: Vec<Concentration>,
        state: Vec<Concentration>,
        tolerance: f64,
        steady_states: VecDeque<Option<Vec<Concentration>>>,
        simulations: VecDeque<bool>,
        eigenvalues: VecDeque<Option<Vec<Eigenvalue>>>,
        calls: Vec<Call>,
    }

    impl ScriptedEngine {
        fn new(initial: &[Concentration]) -> Self {
            Self {
                initial: initial.to_vec(),
                state: initial.to_vec(),
                tolerance: 1e-6,
                steady_states: VecDeque::new(),
                simulations: VecDeque::new(),
                eigenvalues: VecDeque::new(),
                calls: Vec::new(),
            }
        }

        fn steady(mut self, state: Option<&[Concentration]>) -> Self {
            self.steady_states.push_back(state.map(<[Concentration]>::to_vec));
            self
        }

        fn simulation(mut self, succeeds: bool) -> Self {
            self.simulations.push_back(succeeds);
            self
        }

        fn eigen(mut self, values: Option<&[(f64, f64)]>) -> Self {
            self.eigenvalues.push_back(
                values.map(|v| v.iter().map(|&(re, im)| Eigenvalue::new(re, im)).collect()),
            );
            self
        }

        fn count(&self, call: &Call) -> usize {
            self.calls.iter().filter(|c| *c == call).count()
        }
    }

    impl SimulationEngine for ScriptedEngine {
        fn reset(&mut self) {
            self.calls.push(Call::Reset);
            self.state = self.initial.clone();
        }

        fn steady_state(&mut self) -> netev_core::Result<()> {
            self.calls.push(Call::SteadyState);
            match self.steady_states.pop_front().flatten() {
                Some(state) => {
                    self.state = state;
                    Ok(())
                }
                None => Err(OscError::NumericalError("singular Jacobian".into())),
            }
        }

        fn eigenvalues(&mut self) -> netev_core::Result<Vec<Eigenvalue>> {
            self.calls.push(Call::Eigenvalues);
            self.eigenvalues
                .pop_front()
                .flatten()
                .ok_or_else(|| OscError::NumericalError("non-finite Jacobian".into()))
        }

        fn simulate(&mut self, window: &SimulationWindow) -> netev_core::Result<Trajectory> {
            self.calls.push(Call::Simulate { tolerance: self.tolerance });
            if self.simulations.pop_front().unwrap_or(false) {
                Trajectory::from_rows(self.species_ids(), vec![window.t_end], self.state.clone())
            } else {
                Err(OscError::SimulationError("step size too small".into()))
            }
        }

        fn relative_tolerance(&self) -> f64 {
            self.tolerance
        }

        fn set_relative_tolerance(&mut self, tolerance: f64) {
            self.calls.push(Call::SetTolerance(tolerance));
            self.tolerance = tolerance;
        }

        fn species_ids(&self) -> Vec<String> {
            (0..self.state.len()).map(|i| format!("S{}", i)).collect()
        }

        fn concentrations(&self) -> Vec<Concentration> {
            self.state.clone()
        }

        fn set_deadline(&mut self, deadline: Option<Deadline>) {
            self.calls.push(Call::Deadline(deadline.is_some()));
        }
    }

    #[test]
    fn test_steady_state_oscillator() {
        let mut engine = ScriptedEngine::new(&[1.0, 1.0, 1.0])
            .steady(Some(&[0.2, 0.0, 3.5]))
            .eigen(Some(&[(-1.0, 0.0), (0.5, 3.0)]));

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::SteadyState));
        assert!(result.failures.is_empty());
        assert_eq!(engine.calls, vec![Call::SteadyState, Call::Eigenvalues]);
    }

    #[test]
    fn test_negative_fixed_point_is_rejected() {
        let mut engine = ScriptedEngine::new(&[1.0, 1.0])
            .steady(Some(&[0.4, -0.01]))
            .eigen(Some(&[(-1.0, 0.0), (0.5, 3.0)]));

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::SteadyState));
        assert_eq!(engine.count(&Call::Reset), 0);
    }

    #[test]
    fn test_failed_retry_ends_classification() {
        let mut engine = ScriptedEngine::new(&[1.0])
            .steady(None)
            .simulation(false)
            .simulation(false);

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::Simulation));
        assert_eq!(engine.count(&Call::SteadyState), 1);
        assert_eq!(engine.count(&Call::Reset), 2);
        assert_eq!(engine.count(&Call::Eigenvalues), 0);
        assert_eq!(
            engine.calls,
            vec![
                Call::SteadyState,
                Call::Reset,
                Call::Simulate { tolerance: 1e-6 },
                Call::SetTolerance(TIGHTENED_TOLERANCE),
                Call::Reset,
                Call::Simulate { tolerance: TIGHTENED_TOLERANCE },
            ]
        );

        let fatal: Vec<bool> = result.failures.iter().map(|f| f.fatal).collect();
        assert_eq!(fatal, vec![false, false, true]);
    }

    #[test]
    fn test_retry_tier_recovers_after_simulation() {
        let mut engine = ScriptedEngine::new(&[1.0, 2.0])
            .steady(None)
            .simulation(true)
            .eigen(Some(&[(-2.0, 0.0), (-1.0, 0.0)]))
            .steady(Some(&[0.3, 0.4]))
            .eigen(Some(&[(0.1, 1.0)]));

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::SteadyStateRetry));
        assert_eq!(result.eigenvalues, vec![Eigenvalue::new(0.1, 1.0)]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].tier, Tier::SteadyState);
    }

    #[test]
    fn test_simulation_verdict_skips_sign_check() {
        // Negative initial state survives the scripted run
        let mut engine = ScriptedEngine::new(&[-0.5, 1.0])
            .steady(Some(&[1.0, 1.0]))
            .eigen(Some(&[(-1.0, 0.0)]))
            .simulation(false)
            .simulation(true)
            .eigen(Some(&[(0.0, 1.0), (0.0, -1.0)]));

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::Simulation));
        assert_eq!(engine.relative_tolerance(), TIGHTENED_TOLERANCE);
        assert!(engine.concentrations()[0] < 0.0);
    }

    #[test]
    fn test_eigenvalue_failure_after_simulation_is_fatal() {
        let mut engine = ScriptedEngine::new(&[1.0]).steady(None).simulation(true);

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::Simulation));
        assert_eq!(engine.count(&Call::SteadyState), 1);
        assert!(result.failures.last().is_some_and(|f| f.fatal));
    }

    #[test]
    fn test_stable_network_is_not_oscillator() {
        let mut engine = ScriptedEngine::new(&[1.0])
            .steady(Some(&[2.0]))
            .eigen(Some(&[(-1.0, 0.0)]))
            .simulation(true)
            .eigen(Some(&[(-1.0, 0.0)]))
            .steady(Some(&[2.0]))
            .eigen(Some(&[(-1.0, 0.0)]));

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::SteadyStateRetry));
    }

    #[test]
    fn test_exhausted_tiers_keep_last_verdict() {
        let mut engine = ScriptedEngine::new(&[1.0])
            .steady(Some(&[2.0]))
            .eigen(Some(&[(-1.0, 0.0)]))
            .simulation(true)
            .eigen(Some(&[(-3.0, 0.0)]))
            .steady(None);

        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert_eq!(result.decided_by, None);
        assert_eq!(result.eigenvalues, vec![Eigenvalue::new(-3.0, 0.0)]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].tier, Tier::SteadyStateRetry);
    }

    #[test]
    fn test_criterion_applies_to_centre() {
        let script = || {
            ScriptedEngine::new(&[1.0])
                .steady(Some(&[1.0]))
                .eigen(Some(&[(0.0, 2.0), (0.0, -2.0)]))
        };

        let marginal = OscillationClassifier::default();
        assert!(marginal.is_oscillator(&mut script()));

        let strict = OscillationClassifier::new(ClassifierConfig {
            criterion: EigenCriterion::Strict,
            ..ClassifierConfig::default()
        });
        let mut engine = script();
        let result = strict.classify(&mut engine);
        assert!(!result.oscillator);
        assert!(engine.count(&Call::Reset) > 0);
    }

    #[test]
    fn test_deadline_installed_and_cleared() {
        let config = ClassifierConfig {
            timeout_secs: Some(30.0),
            ..ClassifierConfig::default()
        };
        let mut engine = ScriptedEngine::new(&[1.0])
            .steady(Some(&[1.0]))
            .eigen(Some(&[(0.2, 1.0)]));

        assert!(OscillationClassifier::new(config).is_oscillator(&mut engine));
        assert_eq!(engine.calls.first(), Some(&Call::Deadline(true)));
        assert_eq!(engine.calls.last(), Some(&Call::Deadline(false)));

        let mut untimed = ScriptedEngine::new(&[1.0])
            .steady(Some(&[1.0]))
            .eigen(Some(&[(0.2, 1.0)]));
        assert!(is_oscillator(&mut untimed));
        assert_eq!(untimed.count(&Call::Deadline(true)), 0);
    }

    #[test]
    fn test_config_partial_json() {
        let config: ClassifierConfig =
            serde_json::from_str(r#"{"criterion": "strict", "timeout_secs": 5.0}"#).unwrap();

        assert_eq!(config.criterion, EigenCriterion::Strict);
        assert_eq!(config.timeout_secs, Some(5.0));
        assert_eq!(config.window, SimulationWindow::default());
        assert_eq!(config.tightened_tolerance, TIGHTENED_TOLERANCE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let negative_timeout = ClassifierConfig {
            timeout_secs: Some(-1.0),
            ..ClassifierConfig::default()
        };
        assert!(negative_timeout.validate().is_err());
        assert!(negative_timeout.deadline().is_none());

        let zero_tolerance = ClassifierConfig {
            tightened_tolerance: 0.0,
            ..ClassifierConfig::default()
        };
        assert!(zero_tolerance.validate().is_err());
    }

    fn brusselator(b: f64, x: f64, y: f64) -> netev_reaction::NetworkSimulation {
        let text = format!(
            "
            model *brusselator()
              J0: -> X; a
              J1: X -> Y; b*X
              J2: 2 X + Y -> 3 X; X^2*Y
              J3: X -> ; X
              a = 1; b = {}
              X = {}; Y = {}
            end
            ",
            b, x, y
        );
        let network = netev_antimony::parse_antimony(&text).unwrap();
        netev_reaction::NetworkSimulation::new(network).unwrap()
    }

    #[test]
    fn test_brusselator_beyond_hopf() {
        // b > 1 + a^2: unstable focus at (a, b/a)
        let mut engine = brusselator(3.0, 1.1, 2.7);
        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(result.oscillator);
        assert_eq!(result.decided_by, Some(Tier::SteadyState));
        assert!(result.eigenvalues.iter().all(|e| e.re > 0.0));
    }

    #[test]
    fn test_brusselator_below_hopf() {
        // b < 1 + a^2: stable focus
        let mut engine = brusselator(1.5, 1.1, 1.4);
        let result = OscillationClassifier::default().classify(&mut engine);

        assert!(!result.oscillator);
        assert!(result.eigenvalues.iter().all(|e| e.re < 0.0));
    }
}
