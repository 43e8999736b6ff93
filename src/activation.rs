// The logistic function σ(z) = 1 / (1 + e^(-z)). Saturates toward 0.0 and 1.0 for large |z|.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-z))
}

// σ'(z) = σ(z)(1 - σ(z)).
pub fn sigmoid_prime(z: f64) -> f64 {
    let s = sigmoid(z);
    s * (1.0 - s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sigmoid_known_values() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(sigmoid(2.0), 0.8807970779778823, epsilon = 1e-12);
        assert_abs_diff_eq!(sigmoid(-2.0), 1.0 - sigmoid(2.0), epsilon = 1e-12);
    }

    #[test]
    fn sigmoid_prime_peaks_at_zero() {
        assert_abs_diff_eq!(sigmoid_prime(0.0), 0.25, epsilon = 1e-12);
        assert!(sigmoid_prime(3.0) < sigmoid_prime(1.0));
        assert_abs_diff_eq!(sigmoid_prime(1.5), sigmoid_prime(-1.5), epsilon = 1e-12);
    }

    #[test]
    fn sigmoid_prime_matches_central_difference() {
        let h = 1e-6;
        for z in [-4.0, -0.7, 0.0, 0.3, 2.5] {
            let numeric = (sigmoid(z + h) - sigmoid(z - h)) / (2.0 * h);
            assert_abs_diff_eq!(sigmoid_prime(z), numeric, epsilon = 1e-8);
        }
    }

    #[test]
    fn sigmoid_saturates_without_overflow() {
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid_prime(1000.0), 0.0);
    }
}
