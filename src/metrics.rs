/// 相対 L2 誤差 `‖pred - exact‖₂ / ‖exact‖₂`
pub fn relative_l2_error(predicted: &[f64], exact: &[f64]) -> f64 {
    let diff: f64 = predicted
        .iter()
        .zip(exact)
        .map(|(p, e)| (p - e).powi(2))
        .sum();
    let norm: f64 = exact.iter().map(|e| e * e).sum();
    (diff / norm).sqrt()
}

/// 同定した係数の誤差（パーセント）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientErrors {
    pub lambda_1: f64,
    pub lambda_2: f64,
}

impl CoefficientErrors {
    /// 推定値 `(λ₁, λ₂)` と参照値から `|推定 - 参照| / |参照| * 100` を求めます。
    pub fn new(estimated: (f64, f64), reference: (f64, f64)) -> Self {
        let percent = |est: f64, truth: f64| (est - truth).abs() / truth.abs() * 100.0;
        Self {
            lambda_1: percent(estimated.0, reference.0),
            lambda_2: percent(estimated.1, reference.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn relative_error_of_scaled_field() {
        let exact = [1.0, -2.0, 2.0];
        let predicted = exact.map(|e| e * 1.1);
        assert_relative_eq!(relative_l2_error(&predicted, &exact), 0.1, epsilon = 1e-12);
        assert_eq!(relative_l2_error(&exact, &exact), 0.0);
    }

    #[test]
    fn coefficient_errors_are_percentages() {
        let errors = CoefficientErrors::new((0.99, 0.0105), (1.0, 0.01));
        assert_relative_eq!(errors.lambda_1, 1.0, epsilon = 1e-9);
        assert_relative_eq!(errors.lambda_2, 5.0, epsilon = 1e-9);
    }
}
