//! Rate-law expressions.
//!
//! Expressions are stored symbolically in the network and compiled against a
//! species ordering before simulation, so evaluation is index lookups only.

use netev_core::{OscError, Result, Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 4,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
        }
    }
}

/// Built-in functions usable in rate laws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Pow,
    Min,
    Max,
}

impl Function {
    /// Look up a function by name (`log` is the natural logarithm)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Self::Exp),
            "ln" | "log" => Some(Self::Ln),
            "log10" => Some(Self::Log10),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "pow" => Some(Self::Pow),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Pow | Self::Min | Self::Max => 2,
            _ => 1,
        }
    }

    /// Missing arguments evaluate as NaN
    fn apply(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        let b = args.get(1).copied().unwrap_or(f64::NAN);
        match self {
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Pow => a.powf(b),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }

    fn check_arity(self, given: usize) -> Result<()> {
        if given != self.arity() {
            return Err(OscError::ParseError(format!(
                "{} expects {} argument(s), got {}",
                self.name(),
                self.arity(),
                given
            )));
        }
        Ok(())
    }
}

/// Symbolic expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn symbol(name: &str) -> Self {
        Self::Symbol(name.to_string())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Build a call, checking arity
    pub fn call(function: Function, args: Vec<Expr>) -> Result<Self> {
        function.check_arity(args.len())?;
        Ok(Self::Call { function, args })
    }

    /// Mass-action product `k * S1 * S2 * ...`
    pub fn mass_action(rate_constant: &str, reactants: &[&str]) -> Self {
        reactants.iter().fold(Self::symbol(rate_constant), |acc, s| {
            Self::binary(BinaryOp::Mul, acc, Self::symbol(s))
        })
    }

    /// Every symbol referenced by the expression
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Symbol(name) => {
                out.insert(name.as_str());
            }
            Self::Neg(inner) => inner.collect_symbols(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_symbols(out);
                }
            }
        }
    }

    /// Evaluate with a symbol resolver
    pub fn eval_with<F>(&self, lookup: &F) -> Result<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        Ok(match self {
            Self::Number(v) => *v,
            Self::Symbol(name) => lookup(name)
                .ok_or_else(|| OscError::ModelNotFound(format!("undefined symbol '{}'", name)))?,
            Self::Neg(inner) => -inner.eval_with(lookup)?,
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval_with(lookup)?, rhs.eval_with(lookup)?),
            Self::Call { function, args } => {
                function.check_arity(args.len())?;
                let values = args
                    .iter()
                    .map(|a| a.eval_with(lookup))
                    .collect::<Result<Vec<_>>>()?;
                function.apply(&values)
            }
        })
    }

    /// Resolve symbols to state slots or constants
    pub fn compile<F>(&self, resolve: &F) -> Result<CompiledExpr>
    where
        F: Fn(&str) -> Option<Slot>,
    {
        Ok(match self {
            Self::Number(v) => CompiledExpr::Const(*v),
            Self::Symbol(name) => match resolve(name) {
                Some(Slot::Constant(v)) => CompiledExpr::Const(v),
                Some(Slot::State(i)) => CompiledExpr::State(i),
                Some(Slot::Time) => CompiledExpr::Time,
                None => {
                    return Err(OscError::ModelNotFound(format!(
                        "undefined symbol '{}' in rate law",
                        name
                    )))
                }
            },
            Self::Neg(inner) => CompiledExpr::Neg(Box::new(inner.compile(resolve)?)),
            Self::Binary { op, lhs, rhs } => CompiledExpr::Binary(
                *op,
                Box::new(lhs.compile(resolve)?),
                Box::new(rhs.compile(resolve)?),
            ),
            Self::Call { function, args } => {
                function.check_arity(args.len())?;
                CompiledExpr::Call(
                    *function,
                    args.iter()
                        .map(|a| a.compile(resolve))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Neg(_) => 3,
            Self::Number(v) if *v < 0.0 => 3,
            _ => 5,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parent: u8, tighter: bool) -> fmt::Result {
        let own = self.precedence();
        if own < parent || (tighter && own == parent) {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", v),
            Self::Symbol(name) => write!(f, "{}", name),
            Self::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_child(f, 3, true)
            }
            Self::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                // `^` is right-associative, the others left-associative
                let (left_tight, right_tight) = match op {
                    BinaryOp::Pow => (true, false),
                    _ => (false, true),
                };
                lhs.fmt_child(f, p, left_tight)?;
                write!(f, "{}", op.symbol())?;
                rhs.fmt_child(f, p, right_tight)
            }
            Self::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// What a symbol resolves to at compile time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// Index into the floating species state vector
    State(usize),
    /// Fixed value (parameter or boundary species)
    Constant(f64),
    /// Simulation time
    Time,
}

/// Expression with symbols resolved
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Const(f64),
    State(usize),
    Time,
    Neg(Box<CompiledExpr>),
    Binary(BinaryOp, Box<CompiledExpr>, Box<CompiledExpr>),
    Call(Function, Vec<CompiledExpr>),
}

impl CompiledExpr {
    pub fn eval(&self, state: &[f64], t: Time) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::State(i) => state[*i],
            Self::Time => t,
            Self::Neg(inner) => -inner.eval(state, t),
            Self::Binary(op, lhs, rhs) => op.apply(lhs.eval(state, t), rhs.eval(state, t)),
            Self::Call(function, args) => {
                let mut values = [0.0; 2];
                for (slot, arg) in values.iter_mut().zip(args) {
                    *slot = arg.eval(state, t);
                }
                function.apply(&values[..args.len().min(2)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lookup(name: &str) -> Option<f64> {
        match name {
            "k" => Some(2.0),
            "S" => Some(3.0),
            _ => None,
        }
    }

    #[test]
    fn test_mass_action_eval() {
        let e = Expr::mass_action("k", &["S", "S"]);
        assert_relative_eq!(e.eval_with(&lookup).unwrap(), 18.0);
        assert_eq!(e.to_string(), "k*S*S");
    }

    #[test]
    fn test_undefined_symbol() {
        let e = Expr::symbol("missing");
        assert!(matches!(e.eval_with(&lookup), Err(OscError::ModelNotFound(_))));
    }

    #[test]
    fn test_call_arity() {
        assert!(Expr::call(Function::Exp, vec![]).is_err());
        let e = Expr::call(Function::Pow, vec![Expr::symbol("S"), Expr::number(2.0)]).unwrap();
        assert_relative_eq!(e.eval_with(&lookup).unwrap(), 9.0);
    }

    #[test]
    fn test_wrong_arity_built_directly() {
        let e = Expr::Call {
            function: Function::Max,
            args: vec![Expr::symbol("S")],
        };
        assert!(matches!(e.eval_with(&lookup), Err(OscError::ParseError(_))));
        assert!(matches!(
            e.compile(&|_| Some(Slot::State(0))),
            Err(OscError::ParseError(_))
        ));

        let compiled = CompiledExpr::Call(Function::Pow, vec![CompiledExpr::Const(2.0)]);
        assert!(compiled.eval(&[], 0.0).is_nan());
    }

    #[test]
    fn test_display_parenthesises() {
        // k*(S - 1)
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::symbol("k"),
            Expr::binary(BinaryOp::Sub, Expr::symbol("S"), Expr::number(1.0)),
        );
        assert_eq!(e.to_string(), "k*(S-1)");

        // a - (b - c) keeps its grouping
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::symbol("a"),
            Expr::binary(BinaryOp::Sub, Expr::symbol("b"), Expr::symbol("c")),
        );
        assert_eq!(e.to_string(), "a-(b-c)");
    }

    #[test]
    fn test_compile_and_eval() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::mass_action("k", &["S"]),
            Expr::symbol("time"),
        );
        let compiled = e
            .compile(&|name| match name {
                "k" => Some(Slot::Constant(0.5)),
                "S" => Some(Slot::State(1)),
                "time" => Some(Slot::Time),
                _ => None,
            })
            .unwrap();
        assert_relative_eq!(compiled.eval(&[0.0, 4.0], 1.5), 3.5);
    }

    #[test]
    fn test_symbols() {
        let e = Expr::mass_action("k1", &["S0", "S1"]);
        let symbols: Vec<_> = e.symbols().into_iter().collect();
        assert_eq!(symbols, vec!["S0", "S1", "k1"]);
    }
}
