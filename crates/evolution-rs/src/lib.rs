//! # NetEv Evolution
//!
//! Readers for the output tree of network-evolution runs:
//!
//! ```text
//! <root>/
//!   2024-02-24T12:03:00.332/     one directory per run
//!     datatracker.json           per-generation statistics
//!     final_models/
//!       bestmodel_H4Pyg4D9SZ5i   Antimony text of the best network
//! ```

use netev_core::{OscError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Characters of the run directory name used as a model label
pub const LABEL_LEN: usize = 15;

const FINAL_MODELS: &str = "final_models";
const TRACKER: &str = "datatracker.json";
const BEST_PREFIX: &str = "best";

fn label_of(name: &str) -> &str {
    let chars = name.chars().count();
    if chars <= LABEL_LEN {
        return name;
    }
    name.char_indices()
        .nth(chars - LABEL_LEN)
        .map_or(name, |(start, _)| &name[start..])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Fitness recorded in a model file's `#fitness:` annotation
pub fn model_fitness(text: &str) -> Option<f64> {
    netev_antimony::metadata(text).get("fitness")?.parse().ok()
}

// =============================================================================
// RUN DIRECTORIES
// =============================================================================

/// Output directory of a single evolution run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    pub name: String,
    pub path: PathBuf,
}

impl RunDirectory {
    /// Every sub-directory of `root`, sorted by name
    pub fn discover(root: &Path) -> Result<Vec<RunDirectory>> {
        if !root.is_dir() {
            return Err(OscError::ModelNotFound(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() {
                runs.push(RunDirectory {
                    name: file_name(&path),
                    path,
                });
            }
        }
        runs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(runs)
    }

    pub fn label(&self) -> &str {
        label_of(&self.name)
    }

    pub fn tracker_path(&self) -> PathBuf {
        self.path.join(TRACKER)
    }

    /// Files in `final_models/` whose name starts with `best`
    pub fn best_models(&self) -> Result<Vec<BestModel>> {
        let dir = self.path.join(FINAL_MODELS);
        if !dir.is_dir() {
            debug!(run = %self.name, "no final_models directory");
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && file_name(path).starts_with(BEST_PREFIX))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .map(|path| {
                let text = fs::read_to_string(&path)?;
                Ok(BestModel {
                    run: self.name.clone(),
                    name: file_name(&path),
                    path,
                    text,
                })
            })
            .collect()
    }
}

/// Best models of every run under `root`
pub fn best_models(root: &Path) -> Result<Vec<BestModel>> {
    let mut models = Vec::new();
    for run in RunDirectory::discover(root)? {
        models.extend(run.best_models()?);
    }
    Ok(models)
}

/// Best network of a run, as Antimony text
#[derive(Debug, Clone)]
pub struct BestModel {
    /// Run directory name
    pub run: String,
    pub path: PathBuf,
    /// File name inside `final_models/`
    pub name: String,
    pub text: String,
}

impl BestModel {
    pub fn label(&self) -> &str {
        label_of(&self.run)
    }

    pub fn fitness(&self) -> Option<f64> {
        model_fitness(&self.text)
    }

    /// `<label>_<file>`, unique across runs
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.label(), self.name)
    }
}

// =============================================================================
// FITNESS TRACKERS
// =============================================================================

#[derive(Deserialize)]
struct Tracker {
    top_individual_fitness: Vec<f64>,
}

/// Top-individual fitness per generation of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessTrack {
    pub run: String,
    pub fitness: Vec<f64>,
}

/// Overview of a fitness track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessSummary {
    pub generations: usize,
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
}

impl FitnessTrack {
    /// Read a `datatracker.json`; the run name is its parent directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let tracker: Tracker = serde_json::from_str(&text)?;
        let run = path.parent().map(file_name).unwrap_or_default();
        Ok(Self {
            run,
            fitness: tracker.top_individual_fitness,
        })
    }

    /// Trackers of every run under `root`. Unreadable ones are skipped.
    pub fn scan(root: &Path) -> Result<Vec<Self>> {
        let mut tracks = Vec::new();
        for run in RunDirectory::discover(root)? {
            match Self::load(&run.tracker_path()) {
                Ok(mut track) => {
                    track.run = run.name;
                    tracks.push(track);
                }
                Err(e) => warn!(run = %run.name, error = %e, "skipping fitness tracker"),
            }
        }
        Ok(tracks)
    }

    pub fn label(&self) -> &str {
        label_of(&self.run)
    }

    /// First generation `i` with `fitness[i + 1] < fitness[i]`.
    ///
    /// Every consecutive pair is compared, including the final one that the
    /// evolution tool's own check leaves out, so a drop in the last
    /// generation is reported here.
    pub fn first_decrease(&self) -> Option<usize> {
        self.fitness.windows(2).position(|pair| pair[1] < pair[0])
    }

    pub fn summary(&self) -> Option<FitnessSummary> {
        let first = *self.fitness.first()?;
        let last = *self.fitness.last()?;
        let (min, max) = self
            .fitness
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &f| (lo.min(f), hi.max(f)));
        Some(FitnessSummary {
            generations: self.fitness.len(),
            first,
            last,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MODEL: &str = "// Created by netev\nS0 -> S1; k0*S0\nS0 = 1; S1 = 0\nk0 = 0.5\n#fitness: 0.125\n";

    fn track(values: &[f64]) -> FitnessTrack {
        FitnessTrack {
            run: "run".into(),
            fitness: values.to_vec(),
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn evolution_tree() -> TempDir {
        let root = TempDir::new().unwrap();
        let base = root.path();

        let run_b = base.join("2024-02-24T12:03:00.332");
        write(&run_b.join("final_models/bestmodel_H4Pyg4D9SZ5i"), MODEL);
        write(&run_b.join("final_models/worst_model"), MODEL);
        write(
            &run_b.join(TRACKER),
            r#"{"top_individual_fitness": [1.0, 2.0, 2.0, 1.5, 3.0], "generation": 5}"#,
        );

        let run_a = base.join("2024-02-23T09:00:00.000");
        write(&run_a.join("final_models/best_a"), "A -> B; k*A\nA = 1; k = 1\n");
        write(&run_a.join(TRACKER), "not json");

        fs::create_dir_all(base.join("2024-02-25T00:00:00.000")).unwrap();
        write(&base.join("notes.txt"), "loose file");

        root
    }

    #[test]
    fn test_label_is_last_fifteen_chars() {
        assert_eq!(label_of("2024-02-24T12:03:00.332"), "24T12:03:00.332");
        assert_eq!(label_of("short"), "short");
    }

    #[test]
    fn test_discover_sorted_runs() {
        let root = evolution_tree();
        let runs = RunDirectory::discover(root.path()).unwrap();

        let names: Vec<_> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "2024-02-23T09:00:00.000",
                "2024-02-24T12:03:00.332",
                "2024-02-25T00:00:00.000",
            ]
        );
        assert!(RunDirectory::discover(&root.path().join("notes.txt")).is_err());
    }

    #[test]
    fn test_best_models() {
        let root = evolution_tree();
        let models = best_models(root.path()).unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "best_a");
        assert_eq!(models[0].fitness(), None);

        let best = &models[1];
        assert_eq!(best.label(), "24T12:03:00.332");
        assert_eq!(best.output_name(), "24T12:03:00.332_bestmodel_H4Pyg4D9SZ5i");
        assert_eq!(best.fitness(), Some(0.125));
        assert_eq!(best.text, MODEL);
    }

    #[test]
    fn test_first_decrease() {
        assert_eq!(track(&[1.0, 2.0, 2.0, 1.5, 3.0]).first_decrease(), Some(2));
        assert_eq!(track(&[1.0, 2.0, 2.0, 3.0]).first_decrease(), None);
        // The final pair counts too
        assert_eq!(track(&[1.0, 2.0, 1.0]).first_decrease(), Some(1));
        assert_eq!(track(&[]).first_decrease(), None);
    }

    #[test]
    fn test_summary() {
        let summary = track(&[1.0, 2.0, 2.0, 1.5, 3.0]).summary().unwrap();
        assert_eq!(summary.generations, 5);
        assert_eq!(summary.first, 1.0);
        assert_eq!(summary.last, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert!(track(&[]).summary().is_none());
    }

    #[test]
    fn test_scan_skips_unreadable_trackers() {
        let root = evolution_tree();
        let tracks = FitnessTrack::scan(root.path()).unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].run, "2024-02-24T12:03:00.332");
        assert_eq!(tracks[0].label(), "24T12:03:00.332");
        assert_eq!(tracks[0].first_decrease(), Some(2));
    }

    #[test]
    fn test_load_tracker() {
        let root = evolution_tree();
        let path = root.path().join("2024-02-24T12:03:00.332").join(TRACKER);
        let track = FitnessTrack::load(&path).unwrap();
        assert_eq!(track.run, "2024-02-24T12:03:00.332");
        assert_eq!(track.fitness.len(), 5);

        let broken = root.path().join("2024-02-23T09:00:00.000").join(TRACKER);
        assert!(matches!(FitnessTrack::load(&broken), Err(OscError::JsonError(_))));
    }
}
