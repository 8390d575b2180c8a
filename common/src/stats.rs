//! The "altered" mean/stddev rule used throughout the aggregator: empty data
//! has no opinion, a single sample has zero spread, and everything else gets
//! ordinary sample statistics.

/// Empty -> None. Single sample -> that sample. Otherwise -> arithmetic mean.
pub fn altered_mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        1 => Some(data[0]),
        n => Some(data.iter().sum::<f64>() / n as f64),
    }
}

/// Empty -> None. Single sample -> 0.0. Otherwise -> sample standard deviation
/// (Bessel-corrected, divisor n-1).
pub fn altered_stddev(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        1 => Some(0.0),
        n => {
            let mean = data.iter().sum::<f64>() / n as f64;
            let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(variance.sqrt())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn altered_mean_empty_is_none() {
        assert_eq!(altered_mean(&[]), None);
    }

    #[test]
    fn altered_mean_single_is_value() {
        assert_eq!(altered_mean(&[4.5]), Some(4.5));
    }

    #[test]
    fn altered_stddev_single_is_zero() {
        assert_eq!(altered_stddev(&[4.5]), Some(0.0));
    }

    #[test]
    fn altered_mean_matches_arithmetic_mean() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(altered_mean(&data), Some(2.5));
    }

    #[test]
    fn altered_stddev_matches_sample_stddev() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stddev = altered_stddev(&data).unwrap();
        assert!((stddev - 2.1381).abs() < 0.001);
    }
}
