//! Capture Loop (C7): orchestrates the radio controller, capture sink,
//! decoder/aggregator, and store round-by-round across channels 1..=11,
//! exactly as laid out in SPEC_FULL.md §4.7.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use wifiology_common::aggregate::MeasurementResult;
use wifiology_common::model::{JitterMeasurement, ServiceSet, Station};
use wifiology_common::store::{kv, queries, Store};
use wifiology_common::{aggregate, jitter, Result, WifiologyError};

use crate::capture_sink;
use crate::radio::{CommandRunner, RadioHandle};

pub struct LoopConfig {
    pub interface: String,
    pub tmp_dir: PathBuf,
    pub sample_seconds: u64,
    pub capture_rounds: u64,
}

/// `capture_rounds == 0` runs forever; otherwise counts down and returns
/// cleanly on reaching zero. `heartbeat` is called once per channel dwell.
pub fn run<R: CommandRunner>(
    store: &mut Store,
    radio: &RadioHandle<R>,
    config: &LoopConfig,
    mut heartbeat: impl FnMut(),
) -> Result<()> {
    write_startup_kv(store, config)?;

    let mut round = 0u64;
    loop {
        round += 1;
        kv::set(store.connection(), "capture/current_script_round", &serde_json::json!(round))?;

        for channel in 1..=11u32 {
            run_one_channel(store, radio, config, channel);
            heartbeat();
        }

        if config.capture_rounds != 0 && round >= config.capture_rounds {
            return Ok(());
        }
    }
}

fn write_startup_kv(store: &Store, config: &LoopConfig) -> Result<()> {
    let conn = store.connection();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    kv::set(conn, "capture/script_start_time", &serde_json::json!(now))?;
    kv::set(conn, "capture/script_pid", &serde_json::json!(std::process::id()))?;
    kv::set(conn, "capture/interface", &serde_json::json!(config.interface))?;
    kv::set(conn, "capture/sample_seconds", &serde_json::json!(config.sample_seconds))?;
    Ok(())
}

/// A failed dwell (radio, capture device, or store error) is logged and
/// skipped; the loop always proceeds to the next channel.
fn run_one_channel<R: CommandRunner>(store: &mut Store, radio: &RadioHandle<R>, config: &LoopConfig, channel: u32) {
    if let Err(e) = radio.set_channel(channel) {
        tracing::error!(error = %e, channel, "failed to switch channel, skipping this dwell");
        return;
    }

    let wall_now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    let file = config.tmp_dir.join(format!("channel{channel}-{wall_now}.pcap"));

    let outcome = capture_and_persist(store, config, channel, &file);

    if file.exists() {
        if let Err(e) = fs::remove_file(&file) {
            tracing::warn!(error = %e, path = %file.display(), "failed to remove capture file");
        }
    }

    if let Err(e) = outcome {
        tracing::error!(error = %e, channel, "channel dwell failed");
    }
}

fn capture_and_persist(
    store: &mut Store,
    config: &LoopConfig,
    channel: u32,
    file: &std::path::Path,
) -> Result<()> {
    let window = capture_sink::capture(&config.interface, file, config.sample_seconds)?;
    let frames = capture_sink::read_frames(file)?;
    let result = aggregate::aggregate_capture(
        frames,
        channel as i64,
        window.start_wall,
        window.end_wall,
        window.dwell_seconds,
    );
    tracing::debug!(channel, weird_frames = result.weird_frame_count, "channel dwell analysed");

    let tx = store.deferred_transaction()?;
    persist(&tx, &result)?;
    tx.commit()?;
    store.optimize()
}

fn persist(tx: &rusqlite::Transaction<'_>, result: &MeasurementResult) -> Result<()> {
    let measurement_id = queries::insert_measurement(tx, &result.measurement)?;

    for (mac, counters) in &result.station_counters {
        let station_id = queries::insert_station(tx, &Station::new(mac.clone()))?;
        queries::insert_measurement_station(tx, measurement_id, station_id, counters)?;
    }

    for (bssid, ssid) in &result.bssid_to_ssid {
        let network_stats = result
            .bssid_to_beacon_info
            .get(bssid)
            .map(|beacon| beacon.to_network_stats_json())
            .unwrap_or_else(|| serde_json::json!({}));
        queries::insert_service_set(tx, &ServiceSet::new(bssid.clone(), ssid.clone(), network_stats))?;
        if let Some(name) = ssid {
            queries::update_service_set_network_name(tx, bssid, name)?;
        }

        if let Some(jitter_samples) = result.bssid_to_jitter.get(bssid) {
            let power_measurements = result.bssid_to_power.get(bssid).map(|v| v.as_slice()).unwrap_or(&[]);
            let summary = aggregate::summarize_jitter(jitter_samples, power_measurements);
            let service_set_id = queries::select_service_set_by_bssid(tx, bssid)?
                .and_then(|s| s.service_set_id)
                .ok_or_else(|| WifiologyError::Invariant(format!("service set {bssid} vanished mid-transaction")))?;

            let jitter_measurement = JitterMeasurement {
                measurement_id: Some(measurement_id),
                service_set_id: Some(service_set_id),
                min_jitter: summary.min,
                max_jitter: summary.max,
                avg_jitter: summary.avg,
                std_dev_jitter: summary.std_dev,
                jitter_histogram: summary.histogram,
                jitter_histogram_offset: jitter::JITTER_BIAS,
                interval: summary.interval as i64,
                extra_data: summary.extra_data,
            };
            queries::insert_jitter_measurement(tx, &jitter_measurement)?;
        }
    }

    for (bssid, macs) in &result.bssid_infra_macs {
        for mac in macs {
            queries::insert_service_set_infrastructure_station(tx, measurement_id, bssid, mac)?;
        }
    }
    for (bssid, macs) in &result.bssid_associated_macs {
        for mac in macs {
            queries::insert_service_set_associated_station(tx, measurement_id, bssid, mac)?;
        }
    }

    Ok(())
}
