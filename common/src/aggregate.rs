//! Folds a stream of decoded frames from one capture dwell into a
//! [`MeasurementResult`]: per-station counters, per-BSSID membership and
//! beacon timing, and the measurement-level noise/power summary.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use crate::decode::{BeaconInfo, ControlSubtype, DecodedFrame, FrameType, ManagementSubtype};
use crate::jitter::{self, JitterSamples};
use crate::model::{DataCounters, Measurement};
use crate::stats::{altered_mean, altered_stddev};

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult {
    pub measurement: Measurement,
    pub station_counters: BTreeMap<String, DataCounters>,
    pub bssid_infra_macs: BTreeMap<String, BTreeSet<String>>,
    pub bssid_associated_macs: BTreeMap<String, BTreeSet<String>>,
    pub bssid_to_ssid: BTreeMap<String, Option<Vec<u8>>>,
    pub bssid_to_jitter: BTreeMap<String, JitterSamples>,
    /// On-channel signal strength samples per BSSID, gathered from the same
    /// beacons that feed jitter; folded into each jitter record's extra data.
    pub bssid_to_power: BTreeMap<String, Vec<f64>>,
    /// Last-seen beacon capability/crypto info per BSSID, folded into each
    /// persisted `ServiceSet`'s extra data.
    pub bssid_to_beacon_info: BTreeMap<String, BeaconInfo>,
    pub action_frame_count: i64,
    pub probe_request_frame_count: i64,
    pub weird_frame_count: u64,
}

impl MeasurementResult {
    pub fn stations(&self) -> impl Iterator<Item = &str> {
        self.station_counters.keys().map(String::as_str)
    }

    pub fn bssids(&self) -> BTreeSet<&str> {
        self.bssid_to_ssid.keys().map(String::as_str).collect()
    }
}

/// Per-(measurement, service-set) jitter reduced to the four summary values
/// plus the encoded histogram, ready to become a [`crate::model::JitterMeasurement`].
pub struct JitterSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub interval: u16,
    pub histogram: Vec<u8>,
    /// `{"bad_intervals": bool, "average_power": f64?}`, matching the
    /// reference `calculate_beacon_jitter`/`bssid_to_power_map` pairing.
    pub extra_data: Value,
}

pub fn summarize_jitter(samples: &JitterSamples, power_measurements: &[f64]) -> JitterSummary {
    let (histogram, accepted) = jitter::encode_histogram(&samples.jitter_us);
    let as_f64: Vec<f64> = accepted.iter().map(|&j| j as f64).collect();
    let min = as_f64.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = as_f64.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    JitterSummary {
        min: if min.is_finite() { min } else { 0.0 },
        max: if max.is_finite() { max } else { 0.0 },
        avg: altered_mean(&as_f64).unwrap_or(0.0),
        std_dev: altered_stddev(&as_f64).unwrap_or(0.0),
        interval: samples.interval,
        histogram,
        extra_data: json!({
            "bad_intervals": samples.bad_intervals,
            "average_power": altered_mean(power_measurements),
        }),
    }
}

struct Aggregator {
    channel: i64,
    station_counters: BTreeMap<String, DataCounters>,
    bssid_infra_macs: BTreeMap<String, BTreeSet<String>>,
    bssid_associated_macs: BTreeMap<String, BTreeSet<String>>,
    bssid_to_ssid: BTreeMap<String, Option<Vec<u8>>>,
    bssid_to_beacon_timings: BTreeMap<String, Vec<(u64, u16)>>,
    bssid_to_power: BTreeMap<String, Vec<f64>>,
    bssid_to_beacon_info: BTreeMap<String, BeaconInfo>,
    noise_measurements: Vec<f64>,
    action_frame_count: i64,
    probe_request_frame_count: i64,
    weird_frame_count: u64,
}

impl Aggregator {
    fn new(channel: i64) -> Self {
        Aggregator {
            channel,
            station_counters: BTreeMap::new(),
            bssid_infra_macs: BTreeMap::new(),
            bssid_associated_macs: BTreeMap::new(),
            bssid_to_ssid: BTreeMap::new(),
            bssid_to_beacon_timings: BTreeMap::new(),
            bssid_to_power: BTreeMap::new(),
            bssid_to_beacon_info: BTreeMap::new(),
            noise_measurements: Vec::new(),
            action_frame_count: 0,
            probe_request_frame_count: 0,
            weird_frame_count: 0,
        }
    }

    fn counters_mut(&mut self, mac: &str) -> &mut DataCounters {
        self.station_counters.entry(mac.to_string()).or_insert_with(DataCounters::zero)
    }

    /// Retry bit, power/rate samples, and failed-FCS count: every accepted
    /// frame contributes these except CTS/ACK, which are excluded by name in
    /// SPEC_FULL.md §4.4.
    fn contribute_extras(counters: &mut DataCounters, frame: &DecodedFrame) {
        if frame.retry {
            counters.retry_frame_count += 1;
        }
        if let Some(p) = frame.signal_dbm {
            counters.power_measurements.push(p);
        }
        if let Some(r) = frame.rate_mbps {
            counters.rate_measurements.push(r);
        }
        if let Some(bad_fcs) = frame.bad_fcs {
            let current = counters.failed_fcs_count.unwrap_or(0);
            counters.failed_fcs_count = Some(current + if bad_fcs { 1 } else { 0 });
        }
    }

    fn observe(&mut self, frame: &DecodedFrame) {
        if let Some(noise) = frame.noise_dbm {
            self.noise_measurements.push(noise);
        }

        match frame.frame_type {
            FrameType::Management => self.observe_management(frame),
            FrameType::Control => self.observe_control(frame),
            FrameType::Data => self.observe_data(frame),
            FrameType::Other(_) => {}
        }
    }

    fn observe_management(&mut self, frame: &DecodedFrame) {
        let Some(src) = frame.src.clone() else { return };
        {
            let counters = self.counters_mut(&src);
            counters.management_frame_count += 1;
            Self::contribute_extras(counters, frame);
        }

        match frame.mgmt_subtype {
            Some(ManagementSubtype::AssocReq) | Some(ManagementSubtype::AssocResp) => {
                self.counters_mut(&src).association_frame_count += 1;
            }
            Some(ManagementSubtype::ReassocReq) | Some(ManagementSubtype::ReassocResp) => {
                self.counters_mut(&src).reassociation_frame_count += 1;
            }
            Some(ManagementSubtype::Disassoc) => {
                self.counters_mut(&src).disassociation_frame_count += 1;
            }
            Some(ManagementSubtype::Action) => self.action_frame_count += 1,
            Some(ManagementSubtype::ProbeReq) => self.probe_request_frame_count += 1,
            Some(ManagementSubtype::Beacon) => self.observe_beacon(frame, &src),
            _ => {}
        }
    }

    fn observe_beacon(&mut self, frame: &DecodedFrame, src: &str) {
        let Some(beacon) = &frame.beacon else { return };
        let Some(bssid) = frame.bssid.clone() else { return };

        self.bssid_to_ssid.insert(bssid.clone(), beacon.ssid.clone());
        self.bssid_infra_macs.entry(bssid.clone()).or_default().insert(src.to_string());
        self.bssid_to_beacon_info.insert(bssid.clone(), beacon.clone());

        let accepted = match beacon.channel {
            None => true,
            Some(advertised) => advertised as i64 == self.channel,
        };
        if !accepted {
            tracing::warn!(
                bssid = %bssid,
                advertised_channel = beacon.channel,
                dwell_channel = self.channel,
                "off-channel beacon, skipping timing/power contribution"
            );
            return;
        }

        self.bssid_to_beacon_timings
            .entry(bssid.clone())
            .or_default()
            .push((beacon.timestamp, beacon.beacon_interval));
        if let Some(power) = frame.signal_dbm {
            self.bssid_to_power.entry(bssid).or_default().push(power);
        }
    }

    fn observe_control(&mut self, frame: &DecodedFrame) {
        match frame.control_subtype {
            Some(ControlSubtype::Rts) => {
                if let Some(src) = &frame.src {
                    let counters = self.counters_mut(src);
                    counters.control_frame_count += 1;
                    counters.cts_frame_count += 1;
                    Self::contribute_extras(counters, frame);
                }
            }
            Some(ControlSubtype::Cts) => {
                if let Some(dst) = &frame.dst {
                    self.counters_mut(dst).rts_frame_count += 1;
                }
            }
            Some(ControlSubtype::Ack) => {
                if let Some(dst) = &frame.dst {
                    self.counters_mut(dst).ack_frame_count += 1;
                }
            }
            Some(ControlSubtype::BlockAck) | Some(ControlSubtype::BlockAckReq) | Some(ControlSubtype::CfEnd) => {
                if let Some(src) = &frame.src {
                    let counters = self.counters_mut(src);
                    counters.control_frame_count += 1;
                    Self::contribute_extras(counters, frame);
                }
            }
            _ => {}
        }
    }

    fn observe_data(&mut self, frame: &DecodedFrame) {
        let payload_len = frame.data_payload_len as i64;

        if let Some(src) = &frame.src {
            let counters = self.counters_mut(src);
            counters.data_frame_count += 1;
            counters.data_throughput_out += payload_len;
            Self::contribute_extras(counters, frame);
        }
        if let Some(dst) = &frame.dst {
            self.counters_mut(dst).data_throughput_in += payload_len;
        }

        if let Some(bssid) = &frame.bssid {
            match (frame.to_ds, frame.from_ds) {
                (true, false) => {
                    if let Some(src) = &frame.src {
                        self.bssid_associated_macs.entry(bssid.clone()).or_default().insert(src.clone());
                    }
                    if let Some(dst) = &frame.dst {
                        self.bssid_infra_macs.entry(bssid.clone()).or_default().insert(dst.clone());
                    }
                }
                (false, true) => {
                    if let Some(dst) = &frame.dst {
                        self.bssid_associated_macs.entry(bssid.clone()).or_default().insert(dst.clone());
                    }
                    if let Some(src) = &frame.src {
                        self.bssid_infra_macs.entry(bssid.clone()).or_default().insert(src.clone());
                    }
                }
                _ => {}
            }
        }
    }

    fn finish(self, start: f64, end: f64, duration: f64) -> MeasurementResult {
        let data_counters = self
            .station_counters
            .values()
            .fold(DataCounters::zero(), |acc, c| acc.add(c));

        let measurement = Measurement::new(
            start,
            end,
            duration,
            self.channel,
            &self.noise_measurements,
            Some(data_counters),
            json!({ "weird_frame_count": self.weird_frame_count }),
        );

        let bssid_to_jitter = self
            .bssid_to_beacon_timings
            .into_iter()
            .filter_map(|(bssid, timings)| jitter::compute_jitter(timings).map(|j| (bssid, j)))
            .collect();

        MeasurementResult {
            measurement,
            station_counters: self.station_counters,
            bssid_infra_macs: self.bssid_infra_macs,
            bssid_associated_macs: self.bssid_associated_macs,
            bssid_to_ssid: self.bssid_to_ssid,
            bssid_to_jitter,
            bssid_to_power: self.bssid_to_power,
            bssid_to_beacon_info: self.bssid_to_beacon_info,
            action_frame_count: self.action_frame_count,
            probe_request_frame_count: self.probe_request_frame_count,
            weird_frame_count: self.weird_frame_count,
        }
    }
}

/// Decode and fold every raw frame buffer captured in one dwell. A frame
/// that fails to decode is logged and counted in `weird_frame_count`; it
/// never aborts the round.
pub fn aggregate_capture<I>(raw_frames: I, channel: i64, start: f64, end: f64, duration: f64) -> MeasurementResult
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut aggregator = Aggregator::new(channel);
    for buf in raw_frames {
        match crate::decode::decode_frame(&buf) {
            Ok(frame) => aggregator.observe(&frame),
            Err(err) => {
                aggregator.weird_frame_count += 1;
                tracing::warn!(error = %err, "failed to decode captured frame");
            }
        }
    }
    aggregator.finish(start, end, duration)
}

/// Fold already-decoded frames (used by tests and anywhere the radiotap
/// header has already been stripped off by the caller).
pub fn aggregate_frames<'a, I>(frames: I, channel: i64, start: f64, end: f64, duration: f64) -> MeasurementResult
where
    I: IntoIterator<Item = &'a DecodedFrame>,
{
    let mut aggregator = Aggregator::new(channel);
    for frame in frames {
        aggregator.observe(frame);
    }
    aggregator.finish(start, end, duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{BeaconInfo, ControlSubtype, FrameType, ManagementSubtype};

    fn beacon_frame(bssid: &str, src: &str, tsf: u64, interval: u16, ssid: &str) -> DecodedFrame {
        DecodedFrame {
            frame_type: FrameType::Management,
            mgmt_subtype: Some(ManagementSubtype::Beacon),
            control_subtype: None,
            src: Some(src.to_string()),
            dst: Some("ff:ff:ff:ff:ff:ff".to_string()),
            bssid: Some(bssid.to_string()),
            retry: false,
            to_ds: false,
            from_ds: false,
            rate_mbps: None,
            signal_dbm: Some(-40.0),
            noise_dbm: None,
            bad_fcs: None,
            data_payload_len: 0,
            beacon: Some(BeaconInfo {
                timestamp: tsf,
                beacon_interval: interval,
                ssid: Some(ssid.as_bytes().to_vec()),
                channel: Some(6),
                country: None,
                rates: vec![],
                power_capability: None,
                crypto: vec!["OPN"],
            }),
        }
    }

    #[test]
    fn beacon_only_capture_produces_one_service_set_and_expected_jitter_count() {
        let bssid = "aa:bb:cc:00:00:01";
        let src = "aa:bb:cc:00:00:01";
        let offsets = [0i64, 200, -150, 50, 0, 200, -150, 50, 0, 200];
        let mut tsf = 0u64;
        let frames: Vec<DecodedFrame> = offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| {
                if i > 0 {
                    tsf = (tsf as i64 + 102_400 + offset) as u64;
                }
                beacon_frame(bssid, src, tsf, 100, "Lab")
            })
            .collect();

        let result = aggregate_frames(frames.iter(), 6, 0.0, 10.0, 10.0);
        assert_eq!(result.bssid_to_ssid.len(), 1);
        assert_eq!(result.bssid_to_ssid[bssid], Some(b"Lab".to_vec()));
        let jitter = &result.bssid_to_jitter[bssid];
        assert_eq!(jitter.jitter_us.len(), 9);
    }

    fn control_frame(subtype: ControlSubtype, src: Option<&str>, dst: Option<&str>) -> DecodedFrame {
        DecodedFrame {
            frame_type: FrameType::Control,
            mgmt_subtype: None,
            control_subtype: Some(subtype),
            src: src.map(str::to_string),
            dst: dst.map(str::to_string),
            bssid: None,
            retry: false,
            to_ds: false,
            from_ds: false,
            rate_mbps: None,
            signal_dbm: None,
            noise_dbm: None,
            bad_fcs: None,
            data_payload_len: 0,
            beacon: None,
        }
    }

    #[test]
    fn mixed_control_frames_preserve_inverted_rts_cts_attribution() {
        let frames = vec![
            control_frame(ControlSubtype::Rts, Some("02:00:00:00:00:01"), None),
            control_frame(ControlSubtype::Cts, None, Some("02:00:00:00:00:02")),
            control_frame(ControlSubtype::Ack, None, Some("02:00:00:00:00:02")),
        ];
        let result = aggregate_frames(frames.iter(), 6, 0.0, 1.0, 1.0);

        let station_01 = &result.station_counters["02:00:00:00:00:01"];
        assert_eq!(station_01.cts_frame_count, 1);
        assert_eq!(station_01.control_frame_count, 1);

        let station_02 = &result.station_counters["02:00:00:00:00:02"];
        assert_eq!(station_02.rts_frame_count, 1);
        assert_eq!(station_02.ack_frame_count, 1);
        assert_eq!(station_02.control_frame_count, 0);

        assert_eq!(result.measurement.data_counters.unwrap().control_frame_count, 1);
    }

    fn data_frame(bssid: &str, src: &str, dst: &str, to_ds: bool, from_ds: bool, len: usize) -> DecodedFrame {
        DecodedFrame {
            frame_type: FrameType::Data,
            mgmt_subtype: None,
            control_subtype: None,
            src: Some(src.to_string()),
            dst: Some(dst.to_string()),
            bssid: Some(bssid.to_string()),
            retry: false,
            to_ds,
            from_ds,
            rate_mbps: None,
            signal_dbm: None,
            noise_dbm: None,
            bad_fcs: None,
            data_payload_len: len,
            beacon: None,
        }
    }

    #[test]
    fn data_flow_direction_attributes_throughput_and_bss_membership() {
        let frame = data_frame("bb:bb:bb:00:00:01", "aa:aa:aa:00:00:01", "cc:cc:cc:00:00:01", true, false, 500);
        let result = aggregate_frames(std::iter::once(&frame), 6, 0.0, 1.0, 1.0);

        assert_eq!(result.station_counters["aa:aa:aa:00:00:01"].data_throughput_out, 500);
        assert_eq!(result.station_counters["cc:cc:cc:00:00:01"].data_throughput_in, 500);
        assert!(result.bssid_associated_macs["bb:bb:bb:00:00:01"].contains("aa:aa:aa:00:00:01"));
        assert!(result.bssid_infra_macs["bb:bb:bb:00:00:01"].contains("cc:cc:cc:00:00:01"));
    }

    #[test]
    fn off_channel_beacon_keeps_ssid_but_drops_timing() {
        let mut frame = beacon_frame("aa:bb:cc:00:00:02", "aa:bb:cc:00:00:02", 0, 100, "Other");
        frame.beacon.as_mut().unwrap().channel = Some(3);
        let result = aggregate_frames(std::iter::once(&frame), 6, 0.0, 1.0, 1.0);
        assert_eq!(result.bssid_to_ssid["aa:bb:cc:00:00:02"], Some(b"Other".to_vec()));
        assert!(!result.bssid_to_jitter.contains_key("aa:bb:cc:00:00:02"));
    }
}
