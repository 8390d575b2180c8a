//! Beacon-arrival jitter: sample derivation and HDR histogram encoding.
//!
//! The histogram range `[1, 5_000_000]` with 5 significant figures and the
//! `+1_000_000` bias are fixed by SPEC_FULL.md §4.4/§9 so payloads stay
//! compatible with what the central collector expects to decode.

use hdrhistogram::serialization::V2Serializer;
use hdrhistogram::Histogram;

pub const HISTOGRAM_LOW: u64 = 1;
pub const HISTOGRAM_HIGH: u64 = 5_000_000;
pub const HISTOGRAM_SIGFIGS: u8 = 5;
pub const JITTER_BIAS: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct JitterSamples {
    pub interval: u16,
    pub bad_intervals: bool,
    /// Unbiased jitter, microseconds; one entry per adjacent beacon pair.
    pub jitter_us: Vec<i64>,
}

/// `timings` is `(tsf, beacon_interval)` pairs in arrival order. Returns
/// `None` if fewer than two beacons were observed (no interval to measure).
pub fn compute_jitter(mut timings: Vec<(u64, u16)>) -> Option<JitterSamples> {
    if timings.len() < 2 {
        return None;
    }
    let interval = timings[0].1;
    let bad_intervals = timings.iter().any(|(_, iv)| *iv != interval);

    timings.sort_by_key(|(tsf, _)| *tsf);

    let expected = interval as i64 * 1024;
    let jitter_us = timings
        .windows(2)
        .map(|pair| {
            let (tsf_prev, _) = pair[0];
            let (tsf_next, _) = pair[1];
            (tsf_next as i64 - tsf_prev as i64) - expected
        })
        .collect();

    Some(JitterSamples { interval, bad_intervals, jitter_us })
}

/// Biases every sample by [`JITTER_BIAS`], drops anything landing below the
/// histogram's floor (never clamps), and serializes the v2 HDR binary form.
/// Returns the serialized bytes plus the unbiased jitter values actually
/// recorded (for min/max/mean/stddev).
pub fn encode_histogram(jitter_us: &[i64]) -> (Vec<u8>, Vec<i64>) {
    let mut histogram = Histogram::<u64>::new_with_bounds(HISTOGRAM_LOW, HISTOGRAM_HIGH, HISTOGRAM_SIGFIGS)
        .expect("histogram bounds are fixed and valid");
    let mut accepted = Vec::with_capacity(jitter_us.len());
    for &j in jitter_us {
        let biased = j + JITTER_BIAS;
        if biased < 1 {
            continue;
        }
        let clamped = biased.min(HISTOGRAM_HIGH as i64) as u64;
        let _ = histogram.record(clamped);
        accepted.push(j);
    }

    let mut buf = Vec::new();
    V2Serializer::new()
        .serialize(&histogram, &mut buf)
        .expect("serializing to an in-memory buffer cannot fail");
    (buf, accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_picks_first_seen_interval_and_flags_mismatch() {
        let timings = vec![(0u64, 100u16), (102_400, 100), (204_500, 50)];
        let samples = compute_jitter(timings).unwrap();
        assert_eq!(samples.interval, 100);
        assert!(samples.bad_intervals);
    }

    #[test]
    fn jitter_is_zero_for_perfectly_regular_beacons() {
        let timings = vec![(0u64, 100u16), (102_400, 100), (204_800, 100)];
        let samples = compute_jitter(timings).unwrap();
        assert_eq!(samples.jitter_us, vec![0, 0]);
        assert!(!samples.bad_intervals);
    }

    #[test]
    fn encode_histogram_drops_samples_below_bias_floor() {
        let jitter = vec![-2_000_000i64, 100, -150];
        let (_buf, accepted) = encode_histogram(&jitter);
        assert_eq!(accepted.len(), 2);
        assert!(!accepted.contains(&-2_000_000));
    }

    #[test]
    fn single_beacon_produces_no_jitter() {
        assert!(compute_jitter(vec![(0, 100)]).is_none());
    }
}
