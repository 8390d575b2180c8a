//! Uploader (C9): pulls a batch of unshipped measurements, assembles the
//! wire payload from SPEC_FULL.md §6, and ships each to the collector under
//! one deferred transaction so a rejected batch rolls the status flips back
//! with it. Grounded in the reference `write_offline_analysis_to_database`
//! read side, mirrored as an upload rather than a write.

use serde_json::{json, Value};

use wifiology_common::model::Measurement;
use wifiology_common::store::{queries, Store};
use wifiology_common::{Result, WifiologyError};

/// Abstracts the HTTP POST so tests can substitute a scripted transport
/// instead of a real collector.
pub trait UploadTransport {
    async fn post_measurement(&self, base_url: &str, node_id: &str, api_key: &str, payload: &Value) -> Result<u16>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTransport for ReqwestTransport {
    async fn post_measurement(&self, base_url: &str, node_id: &str, api_key: &str, payload: &Value) -> Result<u16> {
        let url = format!("{base_url}/api/1.0/nodes/{node_id}/measurements");
        let response = self
            .client
            .post(&url)
            .header("X-API-Key", api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| WifiologyError::Upload(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Returns `true` iff the batch was non-empty. A non-2xx response drops the
/// transaction without committing, so nothing selected this round is marked
/// shipped -- the same measurements are retried on the next call.
pub async fn pull_and_upload<T: UploadTransport>(
    store: &mut Store,
    transport: &T,
    base_url: &str,
    node_id: &str,
    api_key: &str,
    batch: i64,
) -> Result<bool> {
    let tx = store.deferred_transaction()?;
    let pending = queries::select_measurements_that_need_upload(&tx, batch)?;
    if pending.is_empty() {
        tx.commit()?;
        return Ok(false);
    }

    let mut shipped_ids = Vec::with_capacity(pending.len());
    for measurement in &pending {
        let payload = build_payload(&tx, measurement)?;
        let status = transport.post_measurement(base_url, node_id, api_key, &payload).await?;
        if !(200..300).contains(&status) {
            tracing::warn!(status, measurement_id = measurement.measurement_id, "upload rejected, aborting batch");
            return Err(WifiologyError::Upload(format!("collector returned status {status}")));
        }
        shipped_ids.push(measurement.measurement_id.expect("selected row always has an id"));
    }

    queries::update_measurements_upload_status(&tx, &shipped_ids, true)?;
    tx.commit()?;
    tracing::info!(count = shipped_ids.len(), "uploaded measurement batch");
    Ok(true)
}

fn build_payload(conn: &rusqlite::Connection, measurement: &Measurement) -> Result<Value> {
    let measurement_id = measurement.measurement_id.expect("selected row always has an id");

    let stations = queries::select_stations_for_measurement(conn, measurement_id)?;
    let stations_json: Vec<Value> = stations.iter().map(|s| s.to_api_upload_payload()).collect();

    let service_sets = queries::select_service_sets_for_measurement(conn, measurement_id)?;
    let jitter_rows = queries::select_jitter_measurements_by_measurement_id(conn, measurement_id)?;

    let mut service_sets_json = Vec::with_capacity(service_sets.len());
    let mut bssid_to_network_name = serde_json::Map::new();
    for ss in &service_sets {
        let infra = queries::select_infrastructure_mac_addresses_for_measurement_service_set(
            conn,
            measurement_id,
            &ss.bssid,
        )?;
        let associated = queries::select_associated_mac_addresses_for_measurement_service_set(
            conn,
            measurement_id,
            &ss.bssid,
        )?;
        let jitter = jitter_rows.iter().find(|j| j.service_set_id == ss.service_set_id);

        service_sets_json.push(ss.to_api_upload_payload(
            (!infra.is_empty()).then_some(infra),
            (!associated.is_empty()).then_some(associated),
            jitter,
        ));

        if let Some(name) = ss.nice_network_name() {
            bssid_to_network_name.insert(ss.bssid.clone(), json!(name));
        }
    }

    Ok(measurement.to_api_upload_payload(
        Some(json!(stations_json)),
        Some(json!(service_sets_json)),
        Some(Value::Object(bssid_to_network_name)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use wifiology_common::model::{DataCounters, Measurement, ServiceSet, Station};
    use wifiology_common::store::queries;

    struct ScriptedTransport {
        responses: Mutex<Vec<u16>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<u16>) -> Self {
            ScriptedTransport { responses: Mutex::new(responses), calls: Mutex::new(0) }
        }
    }

    impl UploadTransport for ScriptedTransport {
        async fn post_measurement(&self, _base_url: &str, _node_id: &str, _api_key: &str, _payload: &Value) -> Result<u16> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            Ok(if responses.is_empty() { 200 } else { responses.remove(0) })
        }
    }

    fn seed(store: &mut Store, n: usize) {
        let conn = store.connection();
        for i in 0..n {
            let m = Measurement::new(i as f64, i as f64 + 1.0, 1.0, 6, &[], None, json!({}));
            let id = queries::insert_measurement(conn, &m).unwrap();
            let station = Station::new(format!("aa:bb:cc:00:00:{i:02x}"));
            let station_id = queries::insert_station(conn, &station).unwrap();
            queries::insert_measurement_station(conn, id, station_id, &DataCounters::zero()).unwrap();
            let ss = ServiceSet::new(format!("bb:cc:dd:00:00:{i:02x}"), Some(b"Lab".to_vec()), json!({}));
            queries::insert_service_set(conn, &ss).unwrap();
            queries::insert_service_set_infrastructure_station(conn, id, &ss.bssid, &station.mac_address).unwrap();
        }
    }

    #[tokio::test]
    async fn batch_marks_only_selected_rows_as_uploaded() {
        let mut store = Store::open(":memory:", Duration::from_secs(5)).unwrap();
        seed(&mut store, 3);

        let transport = ScriptedTransport::new(vec![]);
        let progressed = pull_and_upload(&mut store, &transport, "http://collector", "node-1", "key", 2)
            .await
            .unwrap();
        assert!(progressed);

        let remaining = queries::select_measurements_that_need_upload(store.connection(), 10).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_is_retried_in_full_next_time() {
        let mut store = Store::open(":memory:", Duration::from_secs(5)).unwrap();
        seed(&mut store, 1);

        let failing = ScriptedTransport::new(vec![500]);
        let err = pull_and_upload(&mut store, &failing, "http://collector", "node-1", "key", 10).await;
        assert!(err.is_err());
        assert_eq!(queries::select_measurements_that_need_upload(store.connection(), 10).unwrap().len(), 1);

        let succeeding = ScriptedTransport::new(vec![]);
        let progressed = pull_and_upload(&mut store, &succeeding, "http://collector", "node-1", "key", 10)
            .await
            .unwrap();
        assert!(progressed);
        assert!(queries::select_measurements_that_need_upload(store.connection(), 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_store_makes_no_progress() {
        let mut store = Store::open(":memory:", Duration::from_secs(5)).unwrap();
        let transport = ScriptedTransport::new(vec![]);
        let progressed = pull_and_upload(&mut store, &transport, "http://collector", "node-1", "key", 10)
            .await
            .unwrap();
        assert!(!progressed);
    }
}
