use anyhow::Result;
use polars::prelude::*;
use rayon::prelude::*;

use crate::rolling_aggregator::site_runs;

/// Columns replaced by their first difference within each site's run.
const DIFFERENCED_COLUMNS: [&str; 6] = [
    "power",
    "temp",
    "angle",
    "direction",
    "wind_speed",
    "cap_util",
];

fn first_difference(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        if idx == 0 {
            out.push(None);
        } else {
            out.push(match (values[idx], values[idx - 1]) {
                (Some(current), Some(previous)) => Some(current - previous),
                _ => None,
            });
        }
    }
    out
}

/// Lagged-delta view of the enriched panel: each measured field becomes
/// (current - immediately preceding same-site value). The first row of every
/// site's run is null, and a null on either side of the subtraction yields
/// null. Site, timestamp and the derived calendar fields pass through.
pub fn difference_panel(enriched: &DataFrame) -> Result<DataFrame> {
    let mut df = enriched
        .clone()
        .lazy()
        .sort_by_exprs([col("site"), col("ts")], [false, false], false, false)
        .collect()?;

    let sites: Vec<Option<i64>> = df.column("site")?.i64()?.into_iter().collect();
    let runs = site_runs(&sites);

    for name in DIFFERENCED_COLUMNS {
        let values: Vec<Option<f64>> = df.column(name)?.f64()?.into_iter().collect();

        let per_run: Vec<Vec<Option<f64>>> = runs
            .par_iter()
            .map(|&(start, end)| first_difference(&values[start..end]))
            .collect();

        let mut diffed = Vec::with_capacity(values.len());
        for run in per_run {
            diffed.extend(run);
        }
        df.with_column(Series::new(name, diffed))?;
    }

    log::info!("Difference panel: {} rows", df.height());
    Ok(df)
}
