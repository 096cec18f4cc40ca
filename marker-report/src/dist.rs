//! p-values combined across conditions
//!
//! A conserved marker is tested once per condition; these reduce the per-condition
//! p-values of one gene to a single value.

/// Largest p-value across conditions. None if there are no values or one is missing.
#[inline]
pub fn max_pvalue(pvalues: &[Option<f64>]) -> Option<f64> {
    if pvalues.is_empty() {
        return None;
    }
    pvalues
        .iter()
        .try_fold(f64::NEG_INFINITY, |acc, &p| p.map(|p| acc.max(p)))
}

/// Wilkinson's minimum-p combination: the probability that the smallest of `k` independent
/// uniform p-values is at most the observed minimum, `1 - (1 - min p)^k`.
///
/// Computed as `-expm1(k * ln(1 - p))` so tiny p-values keep their precision
/// (the result is close to `k * p`).
#[inline]
pub fn minimump_pvalue(pvalues: &[Option<f64>]) -> Option<f64> {
    if pvalues.is_empty() {
        return None;
    }
    let min = pvalues
        .iter()
        .try_fold(f64::INFINITY, |acc, &p| p.map(|p| acc.min(p)))?;
    let k = pvalues.len() as f64;
    let min = min.clamp(0.0, 1.0);
    Some(-(k * (-min).ln_1p()).exp_m1())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_max_pvalue() {
        assert_eq!(max_pvalue(&[Some(0.01), Some(0.2), Some(1e-5)]), Some(0.2));
        assert_eq!(max_pvalue(&[Some(0.01), None]), None);
        assert_eq!(max_pvalue(&[]), None);
    }

    #[test]
    fn test_minimump_pvalue() {
        // 1 - (1 - 0.1)^2
        assert_relative_eq!(minimump_pvalue(&[Some(0.1), Some(0.5)]).unwrap(), 0.19, epsilon = 1e-12);
        assert_relative_eq!(minimump_pvalue(&[Some(0.3)]).unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(
            minimump_pvalue(&[Some(1e-300), Some(0.5), Some(0.9)]).unwrap(),
            3e-300,
            max_relative = 1e-9
        );
        assert_eq!(minimump_pvalue(&[Some(1.0), Some(1.0)]), Some(1.0));
        assert_eq!(minimump_pvalue(&[Some(0.0), Some(1.0)]), Some(0.0));
        assert_eq!(minimump_pvalue(&[None, Some(0.1)]), None);
    }
}
