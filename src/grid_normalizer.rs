use anyhow::{bail, Result};
use polars::prelude::*;

const HOUR_MS: i64 = 3_600_000;

/// Expand the raw measurements onto the dense (site x hour) grid covering
/// every known site and every hour between the global min and max observed
/// timestamp. Hours with no reading survive as rows with null sensor fields,
/// so each site gets a contiguous hourly index.
///
/// Duplicate (site, ts) readings are resolved keep-last before the join, so
/// the output is deterministic for any input order.
pub fn normalize_grid(measurements: &DataFrame, site_ids: &[i64]) -> Result<DataFrame> {
    if measurements.height() == 0 {
        bail!("Measurement table is empty, cannot derive a time range");
    }
    if site_ids.is_empty() {
        bail!("No site identifiers configured for grid expansion");
    }

    let ts = measurements.column("ts")?.datetime()?;
    let min_ts = match ts.min() {
        Some(v) => v,
        None => bail!("Measurement table has no valid timestamps"),
    };
    let max_ts = ts.max().unwrap_or(min_ts);

    // Inclusive hourly spine between the observed extremes.
    let mut spine = Vec::with_capacity(((max_ts - min_ts) / HOUR_MS + 1) as usize);
    let mut t = min_ts;
    while t <= max_ts {
        spine.push(t);
        t += HOUR_MS;
    }

    let mut sites = site_ids.to_vec();
    sites.sort_unstable();

    let mut grid_sites: Vec<i64> = Vec::with_capacity(sites.len() * spine.len());
    let mut grid_ts: Vec<i64> = Vec::with_capacity(sites.len() * spine.len());
    for &site in &sites {
        for &hour in &spine {
            grid_sites.push(site);
            grid_ts.push(hour);
        }
    }

    let grid = DataFrame::new(vec![
        Series::new("site", grid_sites),
        Series::new("ts", grid_ts).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
    ])?;

    let deduped = measurements.unique(
        Some(&["site".to_string(), "ts".to_string()]),
        UniqueKeepStrategy::Last,
        None,
    )?;

    let normalized = grid
        .lazy()
        .join(
            deduped.lazy(),
            [col("site"), col("ts")],
            [col("site"), col("ts")],
            JoinArgs::new(JoinType::Left),
        )
        .sort_by_exprs([col("site"), col("ts")], [false, false], false, false)
        .collect()?;

    log::info!(
        "Normalized {} readings onto a {} x {} grid ({} rows)",
        measurements.height(),
        sites.len(),
        spine.len(),
        normalized.height()
    );
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts_millis(day: u32, hour: u32) -> i64 {
        NaiveDate::from_ymd_opt(2021, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn measurements(rows: &[(i64, i64, f64)]) -> DataFrame {
        let sites: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let ts: Vec<i64> = rows.iter().map(|r| r.1).collect();
        let power: Vec<f64> = rows.iter().map(|r| r.2).collect();
        DataFrame::new(vec![
            Series::new("site", sites),
            Series::new("ts", ts)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .unwrap(),
            Series::new("power", power),
        ])
        .unwrap()
    }

    #[test]
    fn test_grid_is_dense_and_unique() {
        // Site 1 has hours 0 and 3 (gap of two), site 2 only hour 1. The
        // grid must still contain every hour 0..=3 for both sites.
        let raw = measurements(&[
            (1, ts_millis(1, 0), 10.0),
            (1, ts_millis(1, 3), 40.0),
            (2, ts_millis(1, 1), 20.0),
        ]);

        let grid = normalize_grid(&raw, &[1, 2]).unwrap();
        assert_eq!(grid.height(), 2 * 4);

        let unique = grid
            .unique(
                Some(&["site".to_string(), "ts".to_string()]),
                UniqueKeepStrategy::First,
                None,
            )
            .unwrap();
        assert_eq!(unique.height(), grid.height());

        // Gap rows carry nulls, present rows carry their reading.
        let power = grid.column("power").unwrap().f64().unwrap();
        assert_eq!(power.get(0), Some(10.0));
        assert_eq!(power.get(1), None);
        assert_eq!(power.get(2), None);
        assert_eq!(power.get(3), Some(40.0));
    }

    #[test]
    fn test_grid_covers_sites_without_readings() {
        let raw = measurements(&[(1, ts_millis(1, 0), 10.0), (1, ts_millis(1, 1), 11.0)]);

        let grid = normalize_grid(&raw, &[1, 2, 3, 4]).unwrap();
        assert_eq!(grid.height(), 4 * 2);

        // Sites 2-4 exist purely as null rows.
        let mask = grid
            .column("site")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .zip(grid.column("power").unwrap().f64().unwrap().into_iter())
            .filter(|(site, _)| *site == Some(3))
            .all(|(_, power)| power.is_none());
        assert!(mask);
    }

    #[test]
    fn test_duplicate_rows_keep_last() {
        let raw = measurements(&[
            (1, ts_millis(1, 0), 10.0),
            (1, ts_millis(1, 0), 99.0),
        ]);

        let grid = normalize_grid(&raw, &[1]).unwrap();
        assert_eq!(grid.height(), 1);
        assert_eq!(grid.column("power").unwrap().f64().unwrap().get(0), Some(99.0));
    }

    #[test]
    fn test_empty_measurements_rejected() {
        let raw = measurements(&[]);
        assert!(normalize_grid(&raw, &[1]).is_err());
    }

    #[test]
    fn test_rows_sorted_by_site_then_time() {
        let raw = measurements(&[
            (2, ts_millis(1, 1), 1.0),
            (1, ts_millis(1, 0), 2.0),
        ]);

        let grid = normalize_grid(&raw, &[2, 1]).unwrap();
        let sites: Vec<Option<i64>> = grid.column("site").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(sites, vec![Some(1), Some(1), Some(2), Some(2)]);
    }
}
