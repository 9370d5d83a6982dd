//! # NetEv Core
//!
//! Shared types for analysing evolved biochemical reaction networks.
//!
//! ## Contents
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`SimulationEngine`] | capability interface over a numerical engine |
//! | [`Trajectory`] | sampled time course of floating species |
//! | [`SimulationWindow`] | time span and sample count of a run |
//! | [`IntegratorSettings`] | integrator tolerances |
//! | [`Deadline`] | optional cancellation point for long engine calls |
//!
//! Everything numerically heavy lives behind [`SimulationEngine`]; analysis
//! crates only orchestrate calls and inspect results.

use ndarray::{Array2, ArrayView1};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Common errors
#[derive(Debug, Error)]
pub enum OscError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Simulation error: {0}")]
    SimulationError(String),

    #[error("Numerical error: {0}")]
    NumericalError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled: deadline passed at t = {0}")]
    Cancelled(f64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, OscError>;

/// Time point
pub type Time = f64;

/// Concentration (model units)
pub type Concentration = f64;

/// Eigenvalue of a linearised system
pub type Eigenvalue = Complex64;

// =============================================================================
// SIMULATION SETTINGS
// =============================================================================

/// Time span and sampling of a forward simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationWindow {
    /// Start time
    pub t_start: Time,
    /// End time
    pub t_end: Time,
    /// Number of output samples, both ends included
    pub samples: usize,
}

impl SimulationWindow {
    pub fn new(t_start: Time, t_end: Time, samples: usize) -> Self {
        Self { t_start, t_end, samples }
    }

    /// Spacing between consecutive output samples
    pub fn output_step(&self) -> Time {
        (self.t_end - self.t_start) / (self.samples.saturating_sub(1).max(1)) as f64
    }

    /// `samples` evenly spaced output times; the last one is exactly `t_end`
    pub fn time_grid(&self) -> Vec<Time> {
        let step = self.output_step();
        let last = self.samples.saturating_sub(1);
        (0..self.samples)
            .map(|k| if k == last { self.t_end } else { self.t_start + step * k as f64 })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.t_start.is_finite() || !self.t_end.is_finite() {
            return Err(OscError::InvalidInput("simulation bounds must be finite".into()));
        }
        if self.t_end <= self.t_start {
            return Err(OscError::InvalidInput(format!(
                "end time {} must be greater than start time {}",
                self.t_end, self.t_start
            )));
        }
        if self.samples < 2 {
            return Err(OscError::InvalidInput(format!(
                "need at least 2 samples, got {}",
                self.samples
            )));
        }
        Ok(())
    }
}

impl Default for SimulationWindow {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 50.0,
            samples: 100_000,
        }
    }
}

/// Integrator configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// Relative tolerance
    pub relative_tolerance: f64,
    /// Absolute tolerance
    pub absolute_tolerance: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-12,
        }
    }
}

/// Wall-clock point after which engine calls give up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

// =============================================================================
// TRAJECTORY
// =============================================================================

/// Sampled time course: one row per sample, one column per floating species
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    /// Time points
    pub time: Vec<Time>,
    /// Column names
    pub species: Vec<String>,
    /// Concentrations, shape (samples, species)
    pub values: Array2<Concentration>,
}

impl Trajectory {
    /// Build from a flat row-major buffer of `time.len() * species.len()` values
    pub fn from_rows(species: Vec<String>, time: Vec<Time>, rows: Vec<Concentration>) -> Result<Self> {
        let values = Array2::from_shape_vec((time.len(), species.len()), rows)
            .map_err(|e| OscError::InvalidInput(format!("trajectory shape: {}", e)))?;
        Ok(Self { time, species, values })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Column for one species
    pub fn column(&self, species: &str) -> Option<ArrayView1<'_, Concentration>> {
        let idx = self.species.iter().position(|s| s == species)?;
        Some(self.values.column(idx))
    }

    /// Concentrations at the last sample
    pub fn final_state(&self) -> Option<Vec<Concentration>> {
        let n = self.values.nrows();
        if n == 0 {
            return None;
        }
        Some(self.values.row(n - 1).to_vec())
    }

    /// Write as CSV with a `time` column followed by one column per species
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.species.len() + 1);
        header.push("time".to_string());
        header.extend(self.species.iter().cloned());
        out.write_record(&header)?;

        for (t, row) in self.time.iter().zip(self.values.rows()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(t.to_string());
            record.extend(row.iter().map(|v| v.to_string()));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }
}

// =============================================================================
// ENGINE INTERFACE
// =============================================================================

/// Capability interface of a loaded, simulatable model.
///
/// Every call may mutate the model's internal state: after `steady_state`
/// the concentrations sit at the fixed point, after `simulate` at the final
/// sample. `reset` restores the declared initial concentrations but keeps
/// integrator settings.
pub trait SimulationEngine {
    /// Restore the declared initial state
    fn reset(&mut self);

    /// Drive the model to a fixed point, moving the current state there
    fn steady_state(&mut self) -> Result<()>;

    /// Jacobian eigenvalues at the current state
    fn eigenvalues(&mut self) -> Result<Vec<Eigenvalue>>;

    /// Advance through `window` and return the sampled trajectory
    fn simulate(&mut self, window: &SimulationWindow) -> Result<Trajectory>;

    fn relative_tolerance(&self) -> f64;

    fn set_relative_tolerance(&mut self, tolerance: f64);

    /// Floating species identifiers, in state order
    fn species_ids(&self) -> Vec<String>;

    /// Current floating species concentrations, in state order
    fn concentrations(&self) -> Vec<Concentration>;

    /// Install or clear a deadline for subsequent calls
    fn set_deadline(&mut self, _deadline: Option<Deadline>) {}
}

impl<E: SimulationEngine + ?Sized> SimulationEngine for &mut E {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn steady_state(&mut self) -> Result<()> {
        (**self).steady_state()
    }

    fn eigenvalues(&mut self) -> Result<Vec<Eigenvalue>> {
        (**self).eigenvalues()
    }

    fn simulate(&mut self, window: &SimulationWindow) -> Result<Trajectory> {
        (**self).simulate(window)
    }

    fn relative_tolerance(&self) -> f64 {
        (**self).relative_tolerance()
    }

    fn set_relative_tolerance(&mut self, tolerance: f64) {
        (**self).set_relative_tolerance(tolerance)
    }

    fn species_ids(&self) -> Vec<String> {
        (**self).species_ids()
    }

    fn concentrations(&self) -> Vec<Concentration> {
        (**self).concentrations()
    }

    fn set_deadline(&mut self, deadline: Option<Deadline>) {
        (**self).set_deadline(deadline)
    }
}
