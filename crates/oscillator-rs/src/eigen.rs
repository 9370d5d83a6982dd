//! Eigenvalue signatures of oscillation.

use netev_core::Eigenvalue;
use serde::{Deserialize, Serialize};

/// Which real parts count as oscillatory for a complex eigenvalue.
///
/// The two criteria disagree only on purely imaginary eigenvalues
/// (`re == 0`, a centre): `Marginal` accepts them, `Strict` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EigenCriterion {
    /// `re >= 0 && im != 0`
    #[default]
    Marginal,
    /// `re > 0 && im != 0`
    Strict,
}

impl EigenCriterion {
    /// Does a single eigenvalue carry the oscillatory signature?
    pub fn is_oscillatory(self, eigenvalue: &Eigenvalue) -> bool {
        let growing = match self {
            Self::Marginal => eigenvalue.re >= 0.0,
            Self::Strict => eigenvalue.re > 0.0,
        };
        growing && eigenvalue.im != 0.0
    }

    /// True if any eigenvalue matches; false for an empty set
    pub fn matches(self, eigenvalues: &[Eigenvalue]) -> bool {
        eigenvalues.iter().any(|e| self.is_oscillatory(e))
    }
}

/// Classifier test: an unstable or marginal complex pair
pub fn check_eigens(eigenvalues: &[Eigenvalue]) -> bool {
    EigenCriterion::Marginal.matches(eigenvalues)
}

/// Listing test: a strictly unstable complex pair
pub fn has_oscillator_eigens(eigenvalues: &[Eigenvalue]) -> bool {
    EigenCriterion::Strict.matches(eigenvalues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn c(re: f64, im: f64) -> Eigenvalue {
        Eigenvalue::new(re, im)
    }

    #[test]
    fn test_empty_is_not_oscillatory() {
        assert!(!check_eigens(&[]));
        assert!(!has_oscillator_eigens(&[]));
    }

    #[test]
    fn test_predicates_disagree_on_centre() {
        let centre = [c(0.0, 2.0)];
        assert!(check_eigens(&centre));
        assert!(!has_oscillator_eigens(&centre));
    }

    #[test]
    fn test_hopf_pair() {
        let eigs = [c(-1.0, 0.0), c(0.5, 3.0), c(0.5, -3.0)];
        assert!(check_eigens(&eigs));
        assert!(has_oscillator_eigens(&eigs));
    }

    #[test]
    fn test_real_unstable_is_not_oscillatory() {
        let saddle = [c(2.0, 0.0), c(-1.0, 0.0)];
        assert!(!check_eigens(&saddle));
        assert!(!has_oscillator_eigens(&saddle));
    }

    #[test]
    fn test_criterion_serde_names() {
        let json = serde_json::to_string(&EigenCriterion::Strict).unwrap();
        assert_eq!(json, "\"strict\"");
        let parsed: EigenCriterion = serde_json::from_str("\"marginal\"").unwrap();
        assert_eq!(parsed, EigenCriterion::Marginal);
    }

    fn stable_or_real() -> impl Strategy<Value = Eigenvalue> {
        prop_oneof![
            (-1e3..-1e-9f64, -1e3..1e3f64).prop_map(|(re, im)| c(re, im)),
            (-1e3..1e3f64).prop_map(|re| c(re, 0.0)),
        ]
    }

    proptest! {
        #[test]
        fn prop_no_signature_is_rejected(eigs in prop::collection::vec(stable_or_real(), 0..8)) {
            prop_assert!(!check_eigens(&eigs));
            prop_assert!(!has_oscillator_eigens(&eigs));
        }

        #[test]
        fn prop_marginal_pair_is_accepted(
            mut eigs in prop::collection::vec(stable_or_real(), 0..8),
            re in 0.0..1e3f64,
            im in 1e-6..1e3f64,
            negate in any::<bool>(),
            position in any::<prop::sample::Index>(),
        ) {
            let im = if negate { -im } else { im };
            let at = position.index(eigs.len() + 1);
            eigs.insert(at, c(re, im));
            prop_assert!(check_eigens(&eigs));
            prop_assert_eq!(has_oscillator_eigens(&eigs), re > 0.0);
        }
    }
}
