//! # ANTIMONY-RS
//!
//! Reader and writer for the Antimony subset that network-evolution runs
//! emit for their models.
//!
//! ## Supported statements
//!
//! | Statement | Example |
//! |-----------|---------|
//! | species declaration | `species S1, $S2;` |
//! | constant / variable flags | `const k1, k2;` |
//! | reaction | `_J0: S1 + 2 S2 -> S0; k1*S1*S2^2;` |
//! | assignment | `k1 = 3.36;` |
//! | model wrapper | `model *osc() ... end` |
//! | annotations | `#fitness: 0.0509` |
//!
//! Everything else (events, rules, units, functions) is rejected with a
//! [`OscError::ParseError`] carrying line and column.

use netev_core::{OscError, Result};
use netev_reaction::{
    BinaryOp, Expr, Function, Parameter, Reaction, ReactionNetwork, Species, SpeciesReference,
};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::warn;

// =============================================================================
// GRAMMAR
// =============================================================================

/// Antimony parser
#[derive(Parser)]
#[grammar_inline = r##"
WHITESPACE = _{ " " | "\t" | "\r" | "\n" }
COMMENT = _{ ("//" | "#") ~ (!NEWLINE ~ ANY)* | "/*" ~ (!"*/" ~ ANY)* ~ "*/" }

ident_char = _{ ASCII_ALPHANUMERIC | "_" }
number = @{ (ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT*)? | "." ~ ASCII_DIGIT+) ~ (^"e" ~ ("+" | "-")? ~ ASCII_DIGIT+)? }
identifier = @{ (ASCII_ALPHA | "_") ~ ident_char* }
boundary_mark = { "$" }
species_name = ${ boundary_mark? ~ identifier }

// Keywords
model_kw = @{ "model" ~ !ident_char }
end_kw = @{ "end" ~ !ident_char }
in_kw = @{ "in" ~ !ident_char }
decl_kw = @{ ("species" | "const" | "var" | "compartment" | "parameter") ~ !ident_char }

// Expressions
add_op = { "+" | "-" }
mul_op = { "*" | "/" }
neg = { "-" }
expr = { sum }
sum = { product ~ (add_op ~ product)* }
product = { unary ~ (mul_op ~ unary)* }
unary = { neg* ~ power }
power = { atom ~ ("^" ~ unary)? }
atom = _{ call | number | identifier | "(" ~ expr ~ ")" }
call = { identifier ~ "(" ~ (expr ~ ("," ~ expr)*)? ~ ")" }

// Statements
model_start = { model_kw ~ "*"? ~ identifier ~ ("(" ~ (identifier ~ ("," ~ identifier)*)? ~ ")")? }
model_end = { end_kw }
decl_item = { species_name ~ (in_kw ~ identifier)? ~ ("=" ~ expr)? }
declaration = { decl_kw+ ~ decl_item ~ ("," ~ decl_item)* }
species_term = { number? ~ species_name }
side = { (species_term ~ ("+" ~ species_term)*)? }
arrow = { "=>" | "->" }
reaction_id = { identifier ~ ":" }
reaction = { reaction_id? ~ side ~ arrow ~ side ~ ";" ~ expr }
assignment = { identifier ~ "=" ~ expr }

statement = _{ model_start | model_end | declaration | reaction | assignment }
program = { SOI ~ (statement | ";")* ~ EOI }
"##]
pub struct AntimonyParser;

// =============================================================================
// METADATA
// =============================================================================

/// `#key: value` annotations. Keys starting with `fit` are stored as `fitness`.
pub fn metadata(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    for line in text.lines() {
        let Some(rest) = line.trim_start().strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        let valid_key = key.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        // Commented-out reactions look like `#J1: A -> B; k*A`
        if !valid_key || value.is_empty() || value.contains(';') || value.contains("->") {
            continue;
        }

        let key = if key.starts_with("fit") { "fitness" } else { key };
        out.insert(key.to_string(), value.to_string());
    }

    out
}

// =============================================================================
// PARSER
// =============================================================================

/// Parse an Antimony description into a reaction network
pub fn parse_antimony(text: &str) -> Result<ReactionNetwork> {
    let mut pairs = AntimonyParser::parse(Rule::program, text)
        .map_err(|e| OscError::ParseError(e.to_string()))?;
    let program = next_pair(&mut pairs, "program")?;

    let mut builder = Builder::default();
    for statement in program.into_inner() {
        builder.statement(statement)?;
    }

    Ok(builder.finish(metadata(text)))
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| OscError::ParseError(format!("expected {}", what)))
}

fn line_of(pair: &Pair<'_, Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn parse_number(pair: &Pair<'_, Rule>) -> Result<f64> {
    pair.as_str().parse().map_err(|_| {
        OscError::ParseError(format!("line {}: invalid number '{}'", line_of(pair), pair.as_str()))
    })
}

/// Build an expression tree from a parse subtree
fn build_expr(pair: Pair<'_, Rule>) -> Result<Expr> {
    let line = line_of(&pair);
    match pair.as_rule() {
        Rule::expr => build_expr(next_pair(&mut pair.into_inner(), "expression")?),
        Rule::sum | Rule::product => {
            let mut inner = pair.into_inner();
            let mut acc = build_expr(next_pair(&mut inner, "operand")?)?;
            while let Some(op) = inner.next() {
                let rhs = build_expr(next_pair(&mut inner, "operand")?)?;
                let op = match op.as_str() {
                    "+" => BinaryOp::Add,
                    "-" => BinaryOp::Sub,
                    "*" => BinaryOp::Mul,
                    _ => BinaryOp::Div,
                };
                acc = Expr::binary(op, acc, rhs);
            }
            Ok(acc)
        }
        Rule::unary => {
            let mut negations = 0;
            let mut operand = None;
            for p in pair.into_inner() {
                match p.as_rule() {
                    Rule::neg => negations += 1,
                    _ => operand = Some(build_expr(p)?),
                }
            }
            let mut expr = operand
                .ok_or_else(|| OscError::ParseError(format!("line {}: missing operand", line)))?;
            for _ in 0..negations {
                expr = Expr::Neg(Box::new(expr));
            }
            Ok(expr)
        }
        Rule::power => {
            let mut inner = pair.into_inner();
            let base = build_expr(next_pair(&mut inner, "base")?)?;
            match inner.next() {
                Some(exponent) => Ok(Expr::binary(BinaryOp::Pow, base, build_expr(exponent)?)),
                None => Ok(base),
            }
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "function name")?;
            let function = Function::from_name(name.as_str()).ok_or_else(|| {
                OscError::ParseError(format!("line {}: unknown function '{}'", line, name.as_str()))
            })?;
            let args = inner.map(build_expr).collect::<Result<Vec<_>>>()?;
            Expr::call(function, args)
                .map_err(|e| OscError::ParseError(format!("line {}: {}", line, e)))
        }
        Rule::number => Ok(Expr::Number(parse_number(&pair)?)),
        Rule::identifier => Ok(Expr::symbol(pair.as_str())),
        other => Err(OscError::ParseError(format!(
            "line {}: unexpected {:?} in expression",
            line, other
        ))),
    }
}

/// `$name` or `name`
fn species_name(pair: Pair<'_, Rule>) -> Result<(String, bool)> {
    let mut boundary = false;
    let mut id = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::boundary_mark => boundary = true,
            _ => id = Some(p.as_str().to_string()),
        }
    }
    let id = id.ok_or_else(|| OscError::ParseError("species name missing".into()))?;
    Ok((id, boundary))
}

/// Accumulates statements in source order
#[derive(Default)]
struct Builder {
    name: Option<String>,
    species: Vec<String>,
    boundary: HashSet<String>,
    compartments: Vec<String>,
    assigned: Vec<String>,
    values: HashMap<String, f64>,
    constants: HashSet<String>,
    variables: HashSet<String>,
    reactions: Vec<Reaction>,
}

impl Builder {
    fn statement(&mut self, pair: Pair<'_, Rule>) -> Result<()> {
        match pair.as_rule() {
            Rule::model_start => {
                let name = pair.into_inner()
                    .find(|p| p.as_rule() == Rule::identifier)
                    .map(|p| p.as_str().to_string());
                self.name = name;
                Ok(())
            }
            Rule::model_end | Rule::EOI => Ok(()),
            Rule::declaration => self.declaration(pair),
            Rule::reaction => self.reaction(pair),
            Rule::assignment => {
                let line = line_of(&pair);
                let mut inner = pair.into_inner();
                let target = next_pair(&mut inner, "assignment target")?.as_str().to_string();
                let expr = build_expr(next_pair(&mut inner, "assignment value")?)?;
                self.assign(&target, &expr, line)
            }
            other => Err(OscError::ParseError(format!(
                "line {}: unexpected {:?}",
                line_of(&pair),
                other
            ))),
        }
    }

    fn declaration(&mut self, pair: Pair<'_, Rule>) -> Result<()> {
        let mut keywords = Vec::new();
        let mut items = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::decl_kw => keywords.push(p.as_str().to_string()),
                _ => items.push(p),
            }
        }
        let has = |kw: &str| keywords.iter().any(|k| k == kw);

        for item in items {
            let line = line_of(&item);
            let mut inner = item.into_inner();
            let (id, boundary) = species_name(next_pair(&mut inner, "declared name")?)?;

            if has("species") {
                self.declare_species(&id, boundary);
            } else if boundary {
                return Err(OscError::ParseError(format!(
                    "line {}: '$' is only valid on species",
                    line
                )));
            }
            if has("compartment") && !self.compartments.contains(&id) {
                self.compartments.push(id.clone());
            }
            if has("const") {
                self.constants.insert(id.clone());
            }
            if has("var") {
                self.variables.insert(id.clone());
            }

            for rest in inner {
                if rest.as_rule() == Rule::expr {
                    let expr = build_expr(rest)?;
                    self.assign(&id, &expr, line)?;
                }
            }
        }
        Ok(())
    }

    fn reaction(&mut self, pair: Pair<'_, Rule>) -> Result<()> {
        let line = line_of(&pair);
        let mut id = None;
        let mut sides = Vec::with_capacity(2);
        let mut reversible = true;
        let mut rate_law = None;

        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::reaction_id => {
                    id = p.into_inner().next().map(|i| i.as_str().to_string());
                }
                Rule::side => sides.push(self.side(p)?),
                Rule::arrow => reversible = p.as_str() == "->",
                Rule::expr => rate_law = Some(build_expr(p)?),
                _ => {}
            }
        }

        let (Some(products), Some(reactants)) = (sides.pop(), sides.pop()) else {
            return Err(OscError::ParseError(format!("line {}: malformed reaction", line)));
        };
        let rate_law = rate_law
            .ok_or_else(|| OscError::ParseError(format!("line {}: reaction without rate law", line)))?;
        let id = id.unwrap_or_else(|| format!("_J{}", self.reactions.len()));

        let mut reaction = Reaction::new(&id, rate_law);
        reaction.reversible = reversible;
        for r in reactants {
            reaction = reaction.with_reactant(&r.species, r.stoichiometry);
        }
        for r in products {
            reaction = reaction.with_product(&r.species, r.stoichiometry);
        }
        self.reactions.push(reaction);
        Ok(())
    }

    fn side(&mut self, pair: Pair<'_, Rule>) -> Result<Vec<SpeciesReference>> {
        let mut refs = Vec::new();
        for term in pair.into_inner() {
            let mut stoichiometry = 1.0;
            let mut name = None;
            for p in term.into_inner() {
                match p.as_rule() {
                    Rule::number => stoichiometry = parse_number(&p)?,
                    _ => name = Some(species_name(p)?),
                }
            }
            let (id, boundary) =
                name.ok_or_else(|| OscError::ParseError("reaction term without species".into()))?;
            self.declare_species(&id, boundary);
            refs.push(SpeciesReference::new(&id, stoichiometry));
        }
        Ok(refs)
    }

    fn declare_species(&mut self, id: &str, boundary: bool) {
        if !self.species.iter().any(|s| s == id) {
            self.species.push(id.to_string());
        }
        if boundary {
            self.boundary.insert(id.to_string());
        }
    }

    fn assign(&mut self, id: &str, expr: &Expr, line: usize) -> Result<()> {
        let value = expr
            .eval_with(&|name| self.values.get(name).copied())
            .map_err(|e| OscError::ParseError(format!("line {}: {}", line, e)))?;
        if !self.assigned.iter().any(|a| a == id) {
            self.assigned.push(id.to_string());
        }
        self.values.insert(id.to_string(), value);
        Ok(())
    }

    fn finish(self, metadata: BTreeMap<String, String>) -> ReactionNetwork {
        let mut network = ReactionNetwork {
            name: self.name,
            metadata,
            ..ReactionNetwork::default()
        };

        for id in &self.species {
            network.add_species(Species {
                id: id.clone(),
                initial_concentration: self.values.get(id).copied().unwrap_or(0.0),
                boundary: self.boundary.contains(id) || self.constants.contains(id),
            });
        }

        let is_constant =
            |id: &str| self.constants.contains(id) && !self.variables.contains(id);
        let parameter_ids: Vec<&String> = self.assigned.iter()
            .chain(self.compartments.iter())
            .filter(|id| network.get_species(id).is_none())
            .collect();
        for id in parameter_ids {
            if network.get_parameter(id).is_some() {
                continue;
            }
            // Compartments without a size default to unit volume
            let value = self.values.get(id.as_str()).copied().unwrap_or(1.0);
            let mut parameter = Parameter::new(id, value);
            parameter.constant = is_constant(id);
            network.add_parameter(parameter);
        }

        let mut missing = Vec::new();
        for reaction in &self.reactions {
            for symbol in reaction.rate_law.symbols() {
                if symbol != "time"
                    && network.get_species(symbol).is_none()
                    && network.get_parameter(symbol).is_none()
                    && !missing.iter().any(|m: &String| m == symbol)
                {
                    warn!(symbol, reaction = %reaction.id, "rate law uses unassigned symbol, defaulting to 0");
                    missing.push(symbol.to_string());
                }
            }
        }
        for id in missing {
            let mut parameter = Parameter::new(&id, 0.0);
            parameter.constant = is_constant(&id);
            network.add_parameter(parameter);
        }

        network.reactions = self.reactions;
        network
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Antimony rendering of a network, laid out like libAntimony output
pub struct Antimony<'a>(pub &'a ReactionNetwork);

/// Render a network as Antimony text
pub fn to_antimony(network: &ReactionNetwork) -> String {
    Antimony(network).to_string()
}

fn species_label(network: &ReactionNetwork, id: &str) -> String {
    match network.get_species(id) {
        Some(s) if s.boundary => format!("${}", id),
        _ => id.to_string(),
    }
}

fn write_side(f: &mut fmt::Formatter<'_>, network: &ReactionNetwork, refs: &[SpeciesReference]) -> fmt::Result {
    for (i, r) in refs.iter().enumerate() {
        if i > 0 {
            write!(f, " + ")?;
        }
        if r.stoichiometry != 1.0 {
            write!(f, "{} ", r.stoichiometry)?;
        }
        write!(f, "{}", species_label(network, &r.species))?;
    }
    Ok(())
}

impl fmt::Display for Antimony<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let network = self.0;

        writeln!(f, "// Created by netev")?;
        if let Some(name) = &network.name {
            writeln!(f, "model *{}()", name)?;
            writeln!(f)?;
        }

        if !network.species.is_empty() {
            writeln!(f, "// Compartments and Species:")?;
            let labels: Vec<_> = network.species.iter()
                .map(|s| species_label(network, &s.id))
                .collect();
            writeln!(f, "species {};", labels.join(", "))?;
            writeln!(f)?;
        }

        if !network.reactions.is_empty() {
            writeln!(f, "// Reactions:")?;
            for reaction in &network.reactions {
                write!(f, "{}: ", reaction.id)?;
                write_side(f, network, &reaction.reactants)?;
                write!(f, " {} ", if reaction.reversible { "->" } else { "=>" })?;
                write_side(f, network, &reaction.products)?;
                writeln!(f, "; {};", reaction.rate_law)?;
            }
            writeln!(f)?;
        }

        if !network.species.is_empty() {
            writeln!(f, "// Species initializations:")?;
            for s in &network.species {
                writeln!(f, "{} = {};", s.id, s.initial_concentration)?;
            }
            writeln!(f)?;
        }

        if !network.parameters.is_empty() {
            writeln!(f, "// Variable initializations:")?;
            for p in &network.parameters {
                writeln!(f, "{} = {};", p.id, p.value)?;
            }
            writeln!(f)?;
        }

        let constants: Vec<_> = network.parameters.iter()
            .filter(|p| p.constant)
            .map(|p| p.id.as_str())
            .collect();
        if !constants.is_empty() {
            writeln!(f, "// Other declarations:")?;
            writeln!(f, "const {};", constants.join(", "))?;
        }

        if network.name.is_some() {
            writeln!(f, "end")?;
        }

        if !network.metadata.is_empty() {
            writeln!(f)?;
            for (key, value) in &network.metadata {
                writeln!(f, "#{}: {}", key, value)?;
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
