//! User-defined weighted aggregates, registered on every connection open.
//!
//! Mirrors the reference implementation's `WeightedAverage`/`WeightedStdDev`
//! classes (a step/finalize accumulator registered with the embedded
//! engine's aggregate-function hook) via rusqlite's native
//! `create_aggregate_function` API instead of hand-rolling the reduction in
//! application code.

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::{Connection, Result as SqlResult};

#[derive(Default)]
struct WeightedAvgState {
    weighted_sum: f64,
    total_weight: f64,
}

struct WeightedAvg;

impl Aggregate<WeightedAvgState, Option<f64>> for WeightedAvg {
    fn init(&self, _ctx: &mut Context<'_>) -> SqlResult<WeightedAvgState> {
        Ok(WeightedAvgState::default())
    }

    fn step(&self, ctx: &mut Context<'_>, state: &mut WeightedAvgState) -> SqlResult<()> {
        let value: Option<f64> = ctx.get(0)?;
        let weight: Option<f64> = ctx.get(1)?;
        if let (Some(value), Some(weight)) = (value, weight) {
            state.weighted_sum += value * weight;
            state.total_weight += weight;
        }
        Ok(())
    }

    fn finalize(&self, _ctx: &mut Context<'_>, state: Option<WeightedAvgState>) -> SqlResult<Option<f64>> {
        Ok(state.and_then(|s| (s.total_weight > 0.0).then_some(s.weighted_sum / s.total_weight)))
    }
}

#[derive(Default)]
struct WeightedStdDevState {
    weighted_variance_sum: f64,
    total_weight: f64,
}

struct WeightedStdDev;

impl Aggregate<WeightedStdDevState, Option<f64>> for WeightedStdDev {
    fn init(&self, _ctx: &mut Context<'_>) -> SqlResult<WeightedStdDevState> {
        Ok(WeightedStdDevState::default())
    }

    fn step(&self, ctx: &mut Context<'_>, state: &mut WeightedStdDevState) -> SqlResult<()> {
        let stddev: Option<f64> = ctx.get(0)?;
        let weight: Option<f64> = ctx.get(1)?;
        if let (Some(stddev), Some(weight)) = (stddev, weight) {
            state.weighted_variance_sum += stddev * stddev * weight;
            state.total_weight += weight;
        }
        Ok(())
    }

    fn finalize(&self, _ctx: &mut Context<'_>, state: Option<WeightedStdDevState>) -> SqlResult<Option<f64>> {
        Ok(state.and_then(|s| {
            (s.total_weight > 0.0).then_some((s.weighted_variance_sum / s.total_weight).sqrt())
        }))
    }
}

pub fn register(conn: &Connection) -> SqlResult<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_aggregate_function("weighted_avg", 2, flags, WeightedAvg)?;
    conn.create_aggregate_function("weighted_std_dev", 2, flags, WeightedStdDev)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_avg_and_std_dev_match_hand_computation() {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        conn.execute_batch("CREATE TABLE t (value REAL, weight REAL)").unwrap();
        conn.execute("INSERT INTO t VALUES (-50.0, 10.0), (-60.0, 30.0)", []).unwrap();

        let avg: f64 = conn
            .query_row("SELECT weighted_avg(value, weight) FROM t", [], |r| r.get(0))
            .unwrap();
        assert!((avg - ((-50.0 * 10.0 + -60.0 * 30.0) / 40.0)).abs() < 1e-9);

        conn.execute_batch("CREATE TABLE s (stddev REAL, weight REAL)").unwrap();
        conn.execute("INSERT INTO s VALUES (2.0, 10.0), (1.0, 30.0)", []).unwrap();
        let std_dev: f64 = conn
            .query_row("SELECT weighted_std_dev(stddev, weight) FROM s", [], |r| r.get(0))
            .unwrap();
        let expected = ((2.0f64.powi(2) * 10.0 + 1.0f64.powi(2) * 30.0) / 40.0).sqrt();
        assert!((std_dev - expected).abs() < 1e-9);
    }

    #[test]
    fn weighted_avg_is_null_when_no_rows() {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        conn.execute_batch("CREATE TABLE empty_t (value REAL, weight REAL)").unwrap();
        let avg: Option<f64> = conn
            .query_row("SELECT weighted_avg(value, weight) FROM empty_t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(avg, None);
    }
}
