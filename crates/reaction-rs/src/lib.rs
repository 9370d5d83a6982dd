//! # REACTION-RS
//!
//! Chemical reaction network models and a simulation engine for them.
//!
//! ## Model
//!
//! A [`ReactionNetwork`] is the in-memory form of a model description:
//! species with initial concentrations, kinetic parameters, and reactions
//! whose rate laws are arbitrary [`Expr`]essions. The network is passive
//! data; parsing text into it lives in `netev-antimony`.
//!
//! ## Engine
//!
//! [`NetworkSimulation`] implements [`netev_core::SimulationEngine`] on top
//! of third-party numerics:
//!
//! 1. **Time course**: Dormand–Prince 5(4) from `ode_solvers`
//! 2. **Steady state**: damped Newton iteration, LU solves from `nalgebra`
//! 3. **Eigenvalues**: finite-difference Jacobian, real Schur from `nalgebra`

pub mod expr;
pub mod simulation;

pub use expr::{BinaryOp, CompiledExpr, Expr, Function, Slot};
pub use simulation::{NetworkSimulation, SteadyStateSettings};

use ndarray::Array2;
use netev_core::Concentration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// NETWORK TYPES
// =============================================================================

/// Species (molecule, metabolite)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub initial_concentration: Concentration,
    /// Boundary species are held constant during simulation
    pub boundary: bool,
}

impl Species {
    pub fn new(id: &str, initial_concentration: Concentration) -> Self {
        Self {
            id: id.to_string(),
            initial_concentration,
            boundary: false,
        }
    }

    pub fn boundary(id: &str, value: Concentration) -> Self {
        Self {
            boundary: true,
            ..Self::new(id, value)
        }
    }
}

/// Parameter (kinetic constant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub value: f64,
    pub constant: bool,
}

impl Parameter {
    pub fn new(id: &str, value: f64) -> Self {
        Self {
            id: id.to_string(),
            value,
            constant: true,
        }
    }
}

/// Species reference in a reaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesReference {
    pub species: String,
    pub stoichiometry: f64,
}

impl SpeciesReference {
    pub fn new(species: &str, stoichiometry: f64) -> Self {
        Self {
            species: species.to_string(),
            stoichiometry,
        }
    }
}

/// Reaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub reversible: bool,
    pub reactants: Vec<SpeciesReference>,
    pub products: Vec<SpeciesReference>,
    pub rate_law: Expr,
}

impl Reaction {
    pub fn new(id: &str, rate_law: Expr) -> Self {
        Self {
            id: id.to_string(),
            reversible: false,
            reactants: Vec::new(),
            products: Vec::new(),
            rate_law,
        }
    }

    /// Add a reactant, merging repeated species
    pub fn with_reactant(mut self, species: &str, stoichiometry: f64) -> Self {
        add_reference(&mut self.reactants, species, stoichiometry);
        self
    }

    /// Add a product, merging repeated species
    pub fn with_product(mut self, species: &str, stoichiometry: f64) -> Self {
        add_reference(&mut self.products, species, stoichiometry);
        self
    }

    /// Mass-action reaction `reactants -> products; k * prod(reactants)`
    pub fn mass_action(id: &str, reactants: &[&str], products: &[&str], rate_constant: &str) -> Self {
        let mut reaction = Self::new(id, Expr::mass_action(rate_constant, reactants));
        for s in reactants {
            add_reference(&mut reaction.reactants, s, 1.0);
        }
        for s in products {
            add_reference(&mut reaction.products, s, 1.0);
        }
        reaction
    }

    /// Net stoichiometric change of one species
    pub fn net_change(&self, species: &str) -> f64 {
        let produced: f64 = self.products.iter()
            .filter(|r| r.species == species)
            .map(|r| r.stoichiometry)
            .sum();
        let consumed: f64 = self.reactants.iter()
            .filter(|r| r.species == species)
            .map(|r| r.stoichiometry)
            .sum();
        produced - consumed
    }
}

pub(crate) fn add_reference(refs: &mut Vec<SpeciesReference>, species: &str, stoichiometry: f64) {
    match refs.iter_mut().find(|r| r.species == species) {
        Some(existing) => existing.stoichiometry += stoichiometry,
        None => refs.push(SpeciesReference::new(species, stoichiometry)),
    }
}

// =============================================================================
// NETWORK
// =============================================================================

/// Complete reaction network model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReactionNetwork {
    pub name: Option<String>,
    pub species: Vec<Species>,
    pub parameters: Vec<Parameter>,
    pub reactions: Vec<Reaction>,
    /// Free-form annotations carried in the description (e.g. `fitness`)
    pub metadata: BTreeMap<String, String>,
}

impl ReactionNetwork {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Add a species
    pub fn add_species(&mut self, species: Species) {
        self.species.push(species);
    }

    /// Add a parameter
    pub fn add_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    /// Add a reaction
    pub fn add_reaction(&mut self, reaction: Reaction) {
        self.reactions.push(reaction);
    }

    /// Get species by ID
    pub fn get_species(&self, id: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    /// Get parameter by ID
    pub fn get_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn get_parameter_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    /// Species that change during simulation, in state order
    pub fn floating_species(&self) -> impl Iterator<Item = &Species> {
        self.species.iter().filter(|s| !s.boundary)
    }

    pub fn floating_species_ids(&self) -> Vec<String> {
        self.floating_species().map(|s| s.id.clone()).collect()
    }

    /// Fitness recorded by the evolution run, if present
    pub fn fitness(&self) -> Option<f64> {
        self.metadata.get("fitness")?.trim().parse().ok()
    }

    /// Stoichiometry matrix over floating species (rows) and reactions (columns)
    pub fn stoichiometry_matrix(&self) -> Array2<f64> {
        let floating: Vec<&Species> = self.floating_species().collect();
        let mut matrix = Array2::zeros((floating.len(), self.reactions.len()));

        let species_index: HashMap<&str, usize> = floating.iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        for (j, reaction) in self.reactions.iter().enumerate() {
            // Reactants (negative stoichiometry)
            for sr in &reaction.reactants {
                if let Some(&i) = species_index.get(sr.species.as_str()) {
                    matrix[[i, j]] -= sr.stoichiometry;
                }
            }
            // Products (positive stoichiometry)
            for sr in &reaction.products {
                if let Some(&i) = species_index.get(sr.species.as_str()) {
                    matrix[[i, j]] += sr.stoichiometry;
                }
            }
        }

        matrix
    }
}

// =============================================================================
// STANDARD MODELS
// =============================================================================

pub mod models {
    use super::*;

    /// Brusselator: unstable focus (limit cycle) when `b > 1 + a^2`
    pub fn brusselator(a: f64, b: f64) -> ReactionNetwork {
        let mut network = ReactionNetwork::new("Brusselator");

        // Start near the fixed point (a, b/a)
        network.add_species(Species::new("X", a * 1.1));
        network.add_species(Species::new("Y", b / a * 0.9));

        network.add_parameter(Parameter::new("a", a));
        network.add_parameter(Parameter::new("b", b));
        network.add_parameter(Parameter::new("c", 1.0));
        network.add_parameter(Parameter::new("d", 1.0));

        // -> X
        network.add_reaction(Reaction::mass_action("inflow", &[], &["X"], "a"));
        // X -> Y
        network.add_reaction(Reaction::mass_action("convert", &["X"], &["Y"], "b"));
        // 2X + Y -> 3X
        network.add_reaction(Reaction::mass_action("autocatalysis", &["X", "X", "Y"], &["X", "X", "X"], "c"));
        // X ->
        network.add_reaction(Reaction::mass_action("decay", &["X"], &[], "d"));

        network
    }

    /// Lotka-Volterra predator-prey: a centre at `(c/b, a/b)` with eigenvalues `±i sqrt(a c)`
    pub fn lotka_volterra(a: f64, b: f64, c: f64) -> ReactionNetwork {
        let mut network = ReactionNetwork::new("LotkaVolterra");

        network.add_species(Species::new("Prey", 2.0 * c / b));
        network.add_species(Species::new("Predator", a / b));

        network.add_parameter(Parameter::new("a", a));
        network.add_parameter(Parameter::new("b", b));
        network.add_parameter(Parameter::new("c", c));

        network.add_reaction(Reaction::mass_action("breed", &["Prey"], &["Prey", "Prey"], "a"));
        network.add_reaction(Reaction::mass_action("hunt", &["Prey", "Predator"], &["Predator", "Predator"], "b"));
        network.add_reaction(Reaction::mass_action("starve", &["Predator"], &[], "c"));

        network
    }

    /// First-order decay `A -> ; k*A`
    pub fn decay(initial: f64, k: f64) -> ReactionNetwork {
        let mut network = ReactionNetwork::new("Decay");
        network.add_species(Species::new("A", initial));
        network.add_parameter(Parameter::new("k", k));
        network.add_reaction(Reaction::mass_action("degradation", &["A"], &[], "k"));
        network
    }
}

// =============================================================================
// TESTS
// =============================================================================
