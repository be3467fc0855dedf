use std::f64::consts::{E, LN_10};

use rand::Rng;
use rand_distr::Distribution as _;
use statrs::distribution::{Continuous, Laplace, Normal};

use super::PriorError;

/// Family of a [Distribution]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistributionKind {
    Uniform { low: f64, high: f64 },
    Normal { loc: f64, scale: f64 },
    Laplace { loc: f64, scale: f64 },
}

/// A univariate distribution, optionally of the exponentiated variable
///
/// With a log base `b`, samples are `b^x` where `x` follows the underlying
/// family, i.e. the logarithm to base `b` of the variable is distributed
/// according to [DistributionKind].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    kind: DistributionKind,
    log_base: Option<f64>,
}

fn check_finite(name: &str, value: f64) -> Result<(), PriorError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PriorError::InvalidParameters(format!(
            "{} must be finite, got {}",
            name, value
        )))
    }
}

fn check_scale(scale: f64) -> Result<(), PriorError> {
    check_finite("scale", scale)?;
    if scale <= 0.0 {
        return Err(PriorError::InvalidParameters(format!(
            "scale must be positive, got {}",
            scale
        )));
    }
    Ok(())
}

impl Distribution {
    pub fn uniform(low: f64, high: f64) -> Result<Self, PriorError> {
        check_finite("low", low)?;
        check_finite("high", high)?;
        if low > high {
            return Err(PriorError::InvalidParameters(format!(
                "lower limit {} exceeds upper limit {}",
                low, high
            )));
        }
        Ok(Self::from_kind(DistributionKind::Uniform { low, high }))
    }

    pub fn normal(loc: f64, scale: f64) -> Result<Self, PriorError> {
        check_finite("loc", loc)?;
        check_scale(scale)?;
        Ok(Self::from_kind(DistributionKind::Normal { loc, scale }))
    }

    pub fn laplace(loc: f64, scale: f64) -> Result<Self, PriorError> {
        check_finite("loc", loc)?;
        check_scale(scale)?;
        Ok(Self::from_kind(DistributionKind::Laplace { loc, scale }))
    }

    fn from_kind(kind: DistributionKind) -> Self {
        Distribution {
            kind,
            log_base: None,
        }
    }

    /// The same family, applied to the logarithm to base `base`
    pub fn with_log_base(mut self, base: f64) -> Self {
        self.log_base = Some(base);
        self
    }

    /// The same family, applied to the natural logarithm
    pub fn with_log(self) -> Self {
        self.with_log_base(E)
    }

    /// The same family, applied to the decadic logarithm
    pub fn with_log10(self) -> Self {
        self.with_log_base(10.0)
    }

    pub fn kind(&self) -> DistributionKind {
        self.kind
    }

    pub fn log_base(&self) -> Option<f64> {
        self.log_base
    }

    fn sample_untransformed<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self.kind {
            DistributionKind::Uniform { low, high } => rand_distr::Uniform::new_inclusive(low, high)
                .map(|u| u.sample(rng))
                .unwrap_or(f64::NAN),
            DistributionKind::Normal { loc, scale } => rand_distr::Normal::new(loc, scale)
                .map(|n| n.sample(rng))
                .unwrap_or(f64::NAN),
            DistributionKind::Laplace { loc, scale } => {
                // inverse transform of a uniform sample on the open (-1/2, 1/2)
                let u: f64 = rng.sample::<f64, _>(rand_distr::Open01) - 0.5;
                loc - scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
            }
        }
    }

    /// Draw one sample
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let x = self.sample_untransformed(rng);
        match self.log_base {
            Some(base) => base.powf(x),
            None => x,
        }
    }

    /// Draw `n` samples
    pub fn sample_n<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n).map(|_| self.sample(rng)).collect()
    }

    fn pdf_untransformed(&self, x: f64) -> f64 {
        match self.kind {
            DistributionKind::Uniform { low, high } => {
                if x < low || x > high {
                    0.0
                } else if low == high {
                    f64::INFINITY
                } else {
                    1.0 / (high - low)
                }
            }
            DistributionKind::Normal { loc, scale } => Normal::new(loc, scale)
                .map(|n| n.pdf(x))
                .unwrap_or(f64::NAN),
            DistributionKind::Laplace { loc, scale } => Laplace::new(loc, scale)
                .map(|l| l.pdf(x))
                .unwrap_or(f64::NAN),
        }
    }

    /// Probability density at `x`
    ///
    /// For log distributions the density includes the Jacobian of the log
    /// transformation and is zero for non-positive `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        match self.log_base {
            None => self.pdf_untransformed(x),
            Some(_) if x <= 0.0 => 0.0,
            Some(base) => {
                let ln_base = if base == 10.0 { LN_10 } else { base.ln() };
                self.pdf_untransformed(x.ln() / ln_base) / (x * ln_base)
            }
        }
    }

    /// Negative natural logarithm of [Distribution::pdf]
    pub fn neglogpdf(&self, x: f64) -> f64 {
        -self.pdf(x).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_invalid_parameters() {
        assert!(Distribution::normal(0.0, 0.0).is_err());
        assert!(Distribution::laplace(0.0, -1.0).is_err());
        assert!(Distribution::uniform(2.0, 1.0).is_err());
        assert!(Distribution::uniform(f64::NEG_INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_pdf() {
        let n = Distribution::normal(1.0, 2.0).unwrap();
        assert_relative_eq!(
            n.pdf(1.0),
            1.0 / (2.0 * (2.0 * std::f64::consts::PI).sqrt()),
            epsilon = 1e-12
        );
        let l = Distribution::laplace(0.0, 0.5).unwrap();
        assert_relative_eq!(l.pdf(0.0), 1.0, epsilon = 1e-12);
        let u = Distribution::uniform(0.0, 4.0).unwrap();
        assert_relative_eq!(u.pdf(2.0), 0.25);
        assert_eq!(u.pdf(5.0), 0.0);
    }

    #[test]
    fn test_log_pdf_includes_jacobian() {
        let d = Distribution::normal(0.0, 1.0).unwrap().with_log10();
        let x: f64 = 100.0;
        let expected = Distribution::normal(0.0, 1.0).unwrap().pdf(2.0) / (x * LN_10);
        assert_relative_eq!(d.pdf(x), expected, epsilon = 1e-15);
        assert_eq!(d.pdf(-1.0), 0.0);
    }

    #[test]
    fn test_samples_within_support() {
        let mut rng = StdRng::seed_from_u64(42);
        let u = Distribution::uniform(1.0, 2.0).unwrap().with_log();
        for x in u.sample_n(200, &mut rng) {
            assert!(x >= 1f64.exp() && x <= 2f64.exp());
        }
    }

    /// Generator that only ever yields zero bits
    struct Zeros;

    impl rand::RngCore for Zeros {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0);
        }
    }

    #[test]
    fn test_samples_at_edge_of_unit_interval_are_finite() {
        let d = Distribution::laplace(0.0, 1.0).unwrap();
        assert!(d.sample(&mut Zeros).is_finite());
        let u = Distribution::uniform(-1.0, 1.0).unwrap();
        assert!((-1.0..=1.0).contains(&u.sample(&mut Zeros)));
    }

    #[test]
    fn test_degenerate_uniform() {
        let mut rng = StdRng::seed_from_u64(5);
        let d = Distribution::uniform(2.5, 2.5).unwrap();
        assert!(d.sample_n(10, &mut rng).iter().all(|x| *x == 2.5));
    }

    #[test]
    fn test_laplace_sample_median() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Distribution::laplace(3.0, 1.0).unwrap();
        let mut samples = d.sample_n(2001, &mut rng);
        samples.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(samples[1000], 3.0, epsilon = 0.2);
    }
}
