//! Query surface over the schema in [`super::schema`], ported from the
//! reference `queries/core.py` function-for-function.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::model::{DataCounters, JitterMeasurement, Measurement, ServiceSet, Station};

pub fn insert_measurement(conn: &Connection, m: &Measurement) -> Result<i64> {
    let extra = serde_json::to_string(&m.extra_data)?;
    conn.execute(
        "INSERT INTO measurement
            (measurementStartTime, measurementEndTime, measurementDuration, channel,
             averageNoise, stdDevNoise, hasBeenUploaded, extraJSONData)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            m.measurement_start_time,
            m.measurement_end_time,
            m.measurement_duration,
            m.channel,
            m.average_noise,
            m.std_dev_noise,
            m.has_been_uploaded as i64,
            extra,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn select_station_by_mac_address(conn: &Connection, mac_address: &str) -> Result<Option<Station>> {
    conn.query_row(
        "SELECT stationID, macAddress, extraJSONData FROM station WHERE macAddress = ?1",
        [mac_address],
        Station::from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Idempotent upsert: inserts the station the first time a MAC is seen,
/// otherwise returns its existing surrogate id.
pub fn insert_station(conn: &Connection, s: &Station) -> Result<i64> {
    if let Some(existing) = select_station_by_mac_address(conn, &s.mac_address)? {
        return Ok(existing.station_id.expect("row loaded from the store always has an id"));
    }
    let extra = serde_json::to_string(&s.extra_data)?;
    conn.execute(
        "INSERT INTO station (macAddress, extraJSONData) VALUES (?1, ?2)",
        params![s.mac_address, extra],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn select_service_set_by_bssid(conn: &Connection, bssid: &str) -> Result<Option<ServiceSet>> {
    conn.query_row(
        "SELECT serviceSetID, bssid, networkName, extraJSONData FROM serviceSet WHERE bssid = ?1",
        [bssid],
        ServiceSet::from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn insert_service_set(conn: &Connection, ss: &ServiceSet) -> Result<i64> {
    if let Some(existing) = select_service_set_by_bssid(conn, &ss.bssid)? {
        return Ok(existing.service_set_id.expect("row loaded from the store always has an id"));
    }
    let extra = serde_json::to_string(&ss.extra_data)?;
    conn.execute(
        "INSERT INTO serviceSet (bssid, networkName, extraJSONData) VALUES (?1, ?2, ?3)",
        params![ss.bssid, ss.network_name, extra],
    )?;
    Ok(conn.last_insert_rowid())
}

/// No-op if the BSSID's stored name already matches.
pub fn update_service_set_network_name(conn: &Connection, bssid: &str, network_name: &[u8]) -> Result<()> {
    let current = select_service_set_by_bssid(conn, bssid)?;
    if current.as_ref().and_then(|c| c.network_name.as_deref()) == Some(network_name) {
        return Ok(());
    }
    conn.execute(
        "UPDATE serviceSet SET networkName = ?1 WHERE bssid = ?2",
        params![network_name, bssid],
    )?;
    Ok(())
}

pub fn insert_measurement_station(
    conn: &Connection,
    measurement_id: i64,
    station_id: i64,
    counters: &DataCounters,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO measurementStationMap
            (mapMeasurementID, mapStationID, managementFrameCount, associationFrameCount,
             reassociationFrameCount, disassociationFrameCount, controlFrameCount,
             rtsFrameCount, ctsFrameCount, ackFrameCount, dataFrameCount,
             dataThroughputIn, dataThroughputOut, retryFrameCount,
             averagePower, stdDevPower, lowestRate, highestRate, failedFCSCount)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            measurement_id,
            station_id,
            counters.management_frame_count,
            counters.association_frame_count,
            counters.reassociation_frame_count,
            counters.disassociation_frame_count,
            counters.control_frame_count,
            counters.rts_frame_count,
            counters.cts_frame_count,
            counters.ack_frame_count,
            counters.data_frame_count,
            counters.data_throughput_in,
            counters.data_throughput_out,
            counters.retry_frame_count,
            counters.average_power(),
            counters.std_dev_power(),
            counters.lowest_rate(),
            counters.highest_rate(),
            counters.failed_fcs_count,
        ],
    )?;
    Ok(())
}

/// Silently no-ops (via `INSERT OR IGNORE`) if the pairing was already
/// recorded in this measurement, or if a concurrent writer raced it in.
pub fn insert_service_set_infrastructure_station(
    conn: &Connection,
    measurement_id: i64,
    bssid: &str,
    mac_address: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO infrastructureStationServiceSetMap (mapMeasurementID, bssid, macAddress)
         VALUES (?1, ?2, ?3)",
        params![measurement_id, bssid, mac_address],
    )?;
    Ok(())
}

pub fn insert_service_set_associated_station(
    conn: &Connection,
    measurement_id: i64,
    bssid: &str,
    mac_address: &str,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO associationStationServiceSetMap (mapMeasurementID, bssid, macAddress)
         VALUES (?1, ?2, ?3)",
        params![measurement_id, bssid, mac_address],
    )?;
    Ok(())
}

pub fn insert_jitter_measurement(conn: &Connection, j: &JitterMeasurement) -> Result<()> {
    let extra = serde_json::to_string(&j.extra_data)?;
    conn.execute(
        "INSERT INTO serviceSetJitterMeasurement
            (measurementID, serviceSetID, minJitter, maxJitter, avgJitter, stdDevJitter,
             jitterHistogram, jitterHistogramOffset, interval, extraJSONData)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            j.measurement_id,
            j.service_set_id,
            j.min_jitter,
            j.max_jitter,
            j.avg_jitter,
            j.std_dev_jitter,
            j.jitter_histogram,
            j.jitter_histogram_offset,
            j.interval,
            extra,
        ],
    )?;
    Ok(())
}

pub fn select_measurements_that_need_upload(conn: &Connection, limit: i64) -> Result<Vec<Measurement>> {
    let mut stmt = conn.prepare(
        "SELECT measurementID, measurementStartTime, measurementEndTime, measurementDuration,
                channel, averageNoise, stdDevNoise, hasBeenUploaded, extraJSONData
         FROM measurement
         WHERE hasBeenUploaded = 0
         ORDER BY measurementStartTime ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], Measurement::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn update_measurements_upload_status(conn: &Connection, ids: &[i64], uploaded: bool) -> Result<()> {
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "UPDATE measurement SET hasBeenUploaded = {} WHERE measurementID IN ({})",
        uploaded as i64,
        placeholders.join(", ")
    );
    let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    conn.execute(&sql, params.as_slice())?;
    Ok(())
}

/// Cut-off is `now - days*86400` seconds, matching wall-clock `measurementStartTime`.
pub fn delete_old_measurements(conn: &Connection, now: f64, days: f64) -> Result<usize> {
    let cutoff = now - days * 86400.0;
    let affected = conn.execute("DELETE FROM measurement WHERE measurementStartTime < ?1", [cutoff])?;
    Ok(affected)
}

pub fn select_stations_for_measurement(conn: &Connection, measurement_id: i64) -> Result<Vec<Station>> {
    let mut stmt = conn.prepare(
        "SELECT s.stationID, s.macAddress, s.extraJSONData,
                m.managementFrameCount, m.associationFrameCount, m.reassociationFrameCount,
                m.disassociationFrameCount, m.controlFrameCount, m.rtsFrameCount,
                m.ctsFrameCount, m.ackFrameCount, m.dataFrameCount, m.dataThroughputIn,
                m.dataThroughputOut, m.retryFrameCount, m.averagePower, m.stdDevPower,
                m.lowestRate, m.highestRate, m.failedFCSCount
         FROM station s
         JOIN measurementStationMap m ON m.mapStationID = s.stationID
         WHERE m.mapMeasurementID = ?1
         ORDER BY s.macAddress",
    )?;
    let rows = stmt.query_map([measurement_id], |row| {
        let mut station = Station::from_row(row)?;
        station.data_counters = Some(DataCounters::from_row(row)?);
        Ok(station)
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn select_service_sets_for_measurement(conn: &Connection, measurement_id: i64) -> Result<Vec<ServiceSet>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ss.serviceSetID, ss.bssid, ss.networkName, ss.extraJSONData
         FROM serviceSet ss
         WHERE ss.bssid IN (
             SELECT bssid FROM infrastructureStationServiceSetMap WHERE mapMeasurementID = ?1
             UNION
             SELECT bssid FROM associationStationServiceSetMap WHERE mapMeasurementID = ?1
         )
         ORDER BY ss.bssid",
    )?;
    let rows = stmt.query_map([measurement_id], ServiceSet::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn select_infrastructure_mac_addresses_for_measurement_service_set(
    conn: &Connection,
    measurement_id: i64,
    bssid: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT macAddress FROM infrastructureStationServiceSetMap
         WHERE mapMeasurementID = ?1 AND bssid = ?2 ORDER BY macAddress",
    )?;
    let rows = stmt.query_map(params![measurement_id, bssid], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn select_associated_mac_addresses_for_measurement_service_set(
    conn: &Connection,
    measurement_id: i64,
    bssid: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT macAddress FROM associationStationServiceSetMap
         WHERE mapMeasurementID = ?1 AND bssid = ?2 ORDER BY macAddress",
    )?;
    let rows = stmt.query_map(params![measurement_id, bssid], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn select_jitter_measurements_by_measurement_id(
    conn: &Connection,
    measurement_id: i64,
) -> Result<Vec<JitterMeasurement>> {
    let mut stmt = conn.prepare(
        "SELECT measurementID, serviceSetID, minJitter, maxJitter, avgJitter, stdDevJitter,
                jitterHistogram, jitterHistogramOffset, interval, extraJSONData
         FROM serviceSetJitterMeasurement WHERE measurementID = ?1",
    )?;
    let rows = stmt.query_map([measurement_id], JitterMeasurement::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::store::aggregates::register(&conn).unwrap();
        conn.execute_batch(crate::store::schema::DDL).unwrap();
        conn
    }

    #[test]
    fn station_insert_is_idempotent_by_mac_address() {
        let conn = open();
        let s = Station::new("aa:bb:cc:00:00:01".to_string());
        let first = insert_station(&conn, &s).unwrap();
        let second = insert_station(&conn, &s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn measurement_round_trips_through_insert_and_select() {
        let conn = open();
        let m = Measurement::new(100.0, 110.0, 10.0, 6, &[-70.0, -72.0], None, json!({}));
        let id = insert_measurement(&conn, &m).unwrap();
        let pending = select_measurements_that_need_upload(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].measurement_id, Some(id));
        assert!((pending[0].average_noise.unwrap() - (-71.0)).abs() < 1e-9);
    }

    #[test]
    fn upload_status_update_is_batch_and_monotonic() {
        let conn = open();
        let id_a = insert_measurement(&conn, &Measurement::new(1.0, 2.0, 1.0, 1, &[], None, json!({}))).unwrap();
        let id_b = insert_measurement(&conn, &Measurement::new(2.0, 3.0, 1.0, 1, &[], None, json!({}))).unwrap();
        update_measurements_upload_status(&conn, &[id_a, id_b], true).unwrap();
        assert!(select_measurements_that_need_upload(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn delete_old_measurements_respects_ttl_cutoff() {
        let conn = open();
        let now = 30.0 * 86400.0;
        insert_measurement(&conn, &Measurement::new(now - 20.0 * 86400.0, now - 20.0 * 86400.0 + 1.0, 1.0, 1, &[], None, json!({}))).unwrap();
        let recent_start = now - 1.0 * 86400.0;
        insert_measurement(&conn, &Measurement::new(recent_start, recent_start + 1.0, 1.0, 1, &[], None, json!({}))).unwrap();

        let deleted = delete_old_measurements(&conn, now, 14.0).unwrap();
        assert_eq!(deleted, 1);
        let remaining = select_measurements_that_need_upload(&conn, 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].measurement_start_time, recent_start);
    }

    #[test]
    fn infrastructure_map_insert_is_idempotent() {
        let conn = open();
        let mid = insert_measurement(&conn, &Measurement::new(1.0, 2.0, 1.0, 1, &[], None, json!({}))).unwrap();
        insert_service_set_infrastructure_station(&conn, mid, "aa:bb:cc:00:00:01", "02:00:00:00:00:01").unwrap();
        insert_service_set_infrastructure_station(&conn, mid, "aa:bb:cc:00:00:01", "02:00:00:00:00:01").unwrap();
        let macs = select_infrastructure_mac_addresses_for_measurement_service_set(&conn, mid, "aa:bb:cc:00:00:01").unwrap();
        assert_eq!(macs, vec!["02:00:00:00:00:01".to_string()]);
    }
}
