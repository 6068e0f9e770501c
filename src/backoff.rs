//! Samples an integer backoff count from either a uniform range or a
//! Beta-mapped range.
//!
//! BEB, STANDARD, NOBA and SW-NOBA all draw a plain uniform count from
//! their current range. GNU-NOBA instead maps a Beta-distributed
//! sample onto the range, built here from two independent Gamma draws
//! rather than a dedicated Beta sampler.

use rand::Rng;
use rand_core::RngCore;
use rand_distr::{Distribution, Gamma};

/// Draws a uniform integer count on `[lo, hi]` (inclusive).
pub fn uniform(lo: u32, hi: u32, rng: &mut dyn RngCore) -> u32 {
    debug_assert!(lo <= hi);
    if lo == hi {
        return lo;
    }
    rng.gen_range(lo..=hi)
}

/// Draws `X ~ Gamma(alpha, 1)`, `Y ~ Gamma(beta, 1)`, maps
/// `z = X / (X + Y)` onto `[lo, hi]` via `lo + floor((hi - lo) * z)`.
///
/// `alpha` and `beta` must be strictly positive (Gamma shape
/// parameters); callers clamp `alpha` to `[0.8, 1.7]` per the
/// GNU-NOBA low-pass filter in [`crate::csma::policy::gnu_noba`] before
/// calling this.
pub fn beta_mapped(lo: u32, hi: u32, alpha: f64, beta: f64, rng: &mut dyn RngCore) -> u32 {
    debug_assert!(lo <= hi);
    if lo == hi {
        return lo;
    }

    let gamma_alpha = Gamma::new(alpha, 1.0).expect("alpha must be positive");
    let gamma_beta = Gamma::new(beta, 1.0).expect("beta must be positive");

    let x = gamma_alpha.sample(rng);
    let y = gamma_beta.sample(rng);
    let z = x / (x + y);

    let span = (hi - lo) as f64;
    let offset = (span * z).floor() as u32;
    lo + offset.min(hi - lo)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let v = uniform(4, 16, &mut rng);
            assert!((4..=16).contains(&v));
        }
    }

    #[test]
    fn uniform_degenerate_range_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(uniform(5, 5, &mut rng), 5);
    }

    #[test]
    fn beta_mapped_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = beta_mapped(1, 64, 1.7, 1.1, &mut rng);
            assert!((1..=64).contains(&v));
        }
    }

    #[test]
    fn beta_mapped_degenerate_range_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(beta_mapped(9, 9, 1.2, 1.1, &mut rng), 9);
    }
}
