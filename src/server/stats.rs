// Least-squares fit of the overall score against the four daily factors.

use thiserror::Error;

/// Parameters estimated: intercept plus one coefficient per factor.
const PARAMS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("not enough entries for stats: have {have}, need at least {need}")]
    NotEnoughEntries { have: usize, need: usize },
    #[error("entries do not vary enough to compute stats")]
    Singular,
}

/// Fit `overall ~ 1 + sleep + eat + water + social` and return the four
/// factor coefficients (intercept dropped), in factor order.
pub fn fit_factors(samples: &[([f64; 4], f64)]) -> Result<[f64; 4], StatsError> {
    if samples.len() < PARAMS {
        return Err(StatsError::NotEnoughEntries {
            have: samples.len(),
            need: PARAMS,
        });
    }

    // Normal equations: (X^T X) beta = X^T y, augmented into one matrix.
    let mut m = [[0.0f64; PARAMS + 1]; PARAMS];
    for (factors, y) in samples {
        let x = [1.0, factors[0], factors[1], factors[2], factors[3]];
        for i in 0..PARAMS {
            for j in 0..PARAMS {
                m[i][j] += x[i] * x[j];
            }
            m[i][PARAMS] += x[i] * y;
        }
    }

    let beta = solve(&mut m)?;
    Ok([beta[1], beta[2], beta[3], beta[4]])
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
fn solve(m: &mut [[f64; PARAMS + 1]; PARAMS]) -> Result<[f64; PARAMS], StatsError> {
    const EPS: f64 = 1e-9;
    for col in 0..PARAMS {
        let pivot = (col..PARAMS)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < EPS {
            return Err(StatsError::Singular);
        }
        m.swap(col, pivot);
        for row in 0..PARAMS {
            if row == col {
                continue;
            }
            let factor = m[row][col] / m[col][col];
            for k in col..=PARAMS {
                let pivot_value = m[col][k];
                m[row][k] -= factor * pivot_value;
            }
        }
    }
    let mut out = [0.0; PARAMS];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = m[i][PARAMS] / m[i][i];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn recovers_exact_linear_relation() {
        let xs = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 1.0, 0.0, 2.0],
            [2.0, 8.0, 1.0, 9.0],
            [9.0, 3.0, 7.0, 1.0],
            [4.0, 4.0, 9.0, 6.0],
            [7.0, 6.0, 2.0, 3.0],
            [0.0, 10.0, 5.0, 5.0],
        ];
        let samples: Vec<_> = xs
            .iter()
            .map(|x| (*x, 1.0 + 0.5 * x[0] - 0.25 * x[1] + 0.1 * x[3]))
            .collect();
        let coef = fit_factors(&samples).unwrap();
        assert!(close(coef[0], 0.5));
        assert!(close(coef[1], -0.25));
        assert!(close(coef[2], 0.0));
        assert!(close(coef[3], 0.1));
    }

    #[test]
    fn too_few_samples() {
        let samples = vec![([1.0, 1.0, 1.0, 1.0], 5.0); 4];
        assert_eq!(
            fit_factors(&samples),
            Err(StatsError::NotEnoughEntries { have: 4, need: 5 })
        );
    }

    #[test]
    fn constant_factors_are_singular() {
        let samples = vec![([3.0, 3.0, 3.0, 3.0], 5.0); 8];
        assert_eq!(fit_factors(&samples), Err(StatsError::Singular));
    }
}
