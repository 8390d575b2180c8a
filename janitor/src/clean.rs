//! Janitor (C10): age-based deletion plus optional engine maintenance.
//! Deletion runs under an immediate transaction -- the one place the store
//! must serialize against a concurrent capture/upload writer rather than
//! letting sqlite's deferred-lock promotion race it.

use std::time::{SystemTime, UNIX_EPOCH};

use wifiology_common::store::{queries, Store};
use wifiology_common::Result;

pub struct CleanOptions {
    pub max_age_days: f64,
    pub do_vacuum: bool,
    pub do_optimize: bool,
}

pub fn clean(store: &mut Store, options: &CleanOptions) -> Result<usize> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();

    let tx = store.immediate_transaction()?;
    let deleted = queries::delete_old_measurements(&tx, now, options.max_age_days)?;
    tx.commit()?;
    tracing::info!(deleted, max_age_days = options.max_age_days, "purged aged measurements");

    if options.do_optimize {
        store.optimize()?;
        tracing::info!("ran PRAGMA optimize");
    }
    if options.do_vacuum {
        store.vacuum()?;
        tracing::info!("ran VACUUM");
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wifiology_common::model::Measurement;
    use wifiology_common::store::queries;

    #[test]
    fn clean_removes_only_rows_older_than_the_ttl() {
        let mut store = Store::open(":memory:", Duration::from_secs(5)).unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64();

        let old_start = now - 20.0 * 86400.0;
        let recent_start = now - 1.0 * 86400.0;
        {
            let conn = store.connection();
            queries::insert_measurement(conn, &Measurement::new(old_start, old_start + 1.0, 1.0, 1, &[], None, json!({}))).unwrap();
            queries::insert_measurement(conn, &Measurement::new(recent_start, recent_start + 1.0, 1.0, 1, &[], None, json!({}))).unwrap();
        }

        let deleted = clean(&mut store, &CleanOptions { max_age_days: 14.0, do_vacuum: false, do_optimize: false }).unwrap();
        assert_eq!(deleted, 1);

        let remaining = queries::select_measurements_that_need_upload(store.connection(), 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].measurement_start_time, recent_start);
    }
}
