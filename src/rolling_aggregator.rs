use anyhow::Result;
use polars::prelude::*;
use rayon::prelude::*;

use crate::models::PipelineConfig;

/// Trailing window sizes in hourly samples.
pub const DAILY_WINDOW: usize = 24;
pub const SEASONAL_WINDOW: usize = 720;

/// Right-aligned trailing window statistic over a single site's ordered
/// values. Output is null until a full window of rows exists; inside a full
/// window, nulls are skipped and the statistic runs over whatever samples
/// are available. A window of only nulls stays null.
fn rolling_stat(values: &[Option<f64>], window: usize, mean: bool) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    let mut count = 0usize;

    for idx in 0..values.len() {
        if let Some(v) = values[idx] {
            sum += v;
            count += 1;
        }
        if idx >= window {
            if let Some(v) = values[idx - window] {
                sum -= v;
                count -= 1;
            }
        }

        if idx + 1 < window || count == 0 {
            out.push(None);
        } else if mean {
            out.push(Some(sum / count as f64));
        } else {
            out.push(Some(sum));
        }
    }
    out
}

fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_stat(values, window, true)
}

fn rolling_sum(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_stat(values, window, false)
}

/// Divide by the max absolute value of the series itself, no centering. An
/// all-null or all-zero series is left as-is rather than divided by zero.
fn scale_by_max_abs(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    let max_abs = values
        .iter()
        .flatten()
        .map(|v| v.abs())
        .fold(0.0_f64, f64::max);
    if max_abs > 0.0 {
        values.iter().map(|v| v.map(|x| x / max_abs)).collect()
    } else {
        values
    }
}

/// Contiguous (start, end) index ranges of equal site key. Input must
/// already be sorted by site.
pub(crate) fn site_runs(sites: &[Option<i64>]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for idx in 1..sites.len() {
        if sites[idx] != sites[start] {
            runs.push((start, idx));
            start = idx;
        }
    }
    if !sites.is_empty() {
        runs.push((start, sites.len()));
    }
    runs
}

struct RunOutput {
    temp_daily: Vec<Option<f64>>,
    wind_speed_daily: Vec<Option<f64>>,
    temp_seasonal: Vec<Option<f64>>,
    wind_speed_seasonal: Vec<Option<f64>>,
    power_daily: Vec<Option<f64>>,
    speed_daily: Vec<Option<f64>>,
}

/// Per-site trailing daily and seasonal statistics over the enriched panel,
/// optionally restricted to timestamps at or after the configured cutoff.
/// One output row per input row; windows shrink to null, rows are never
/// dropped, and no window ever crosses a site boundary.
pub fn rolling_panel(enriched: &DataFrame, config: &PipelineConfig) -> Result<DataFrame> {
    let mut lf = enriched.clone().lazy();
    if let Some(cutoff) = config.rolling_cutoff {
        let cutoff_ms = cutoff
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
            .timestamp_millis();
        lf = lf.filter(col("ts").cast(DataType::Int64).gt_eq(lit(cutoff_ms)));
    }
    let mut df = lf
        .sort_by_exprs([col("site"), col("ts")], [false, false], false, false)
        .collect()?;

    let sites: Vec<Option<i64>> = df.column("site")?.i64()?.into_iter().collect();
    let temp: Vec<Option<f64>> = df.column("temp")?.f64()?.into_iter().collect();
    let wind_speed: Vec<Option<f64>> = df.column("wind_speed")?.f64()?.into_iter().collect();
    let power: Vec<Option<f64>> = df.column("power")?.f64()?.into_iter().collect();
    let rotor_speed: Vec<Option<f64>> = df.column("rotor_speed")?.f64()?.into_iter().collect();

    let runs = site_runs(&sites);

    // Each site's ordered subsequence is independent, so runs can be
    // computed in parallel and stitched back in order.
    let outputs: Vec<RunOutput> = runs
        .par_iter()
        .map(|&(start, end)| RunOutput {
            temp_daily: rolling_mean(&temp[start..end], DAILY_WINDOW),
            wind_speed_daily: rolling_mean(&wind_speed[start..end], DAILY_WINDOW),
            temp_seasonal: rolling_mean(&temp[start..end], SEASONAL_WINDOW),
            wind_speed_seasonal: rolling_mean(&wind_speed[start..end], SEASONAL_WINDOW),
            power_daily: scale_by_max_abs(rolling_sum(&power[start..end], DAILY_WINDOW)),
            speed_daily: scale_by_max_abs(rolling_mean(&rotor_speed[start..end], DAILY_WINDOW)),
        })
        .collect();

    let height = df.height();
    let mut temp_daily = Vec::with_capacity(height);
    let mut wind_speed_daily = Vec::with_capacity(height);
    let mut temp_seasonal = Vec::with_capacity(height);
    let mut wind_speed_seasonal = Vec::with_capacity(height);
    let mut power_daily = Vec::with_capacity(height);
    let mut speed_daily = Vec::with_capacity(height);
    for run in outputs {
        temp_daily.extend(run.temp_daily);
        wind_speed_daily.extend(run.wind_speed_daily);
        temp_seasonal.extend(run.temp_seasonal);
        wind_speed_seasonal.extend(run.wind_speed_seasonal);
        power_daily.extend(run.power_daily);
        speed_daily.extend(run.speed_daily);
    }

    df.with_column(Series::new("temp_daily", temp_daily))?;
    df.with_column(Series::new("wind_speed_daily", wind_speed_daily))?;
    df.with_column(Series::new("temp_seasonal", temp_seasonal))?;
    df.with_column(Series::new("wind_speed_seasonal", wind_speed_seasonal))?;
    df.with_column(Series::new("power_daily", power_daily))?;
    df.with_column(Series::new("speed_daily", speed_daily))?;

    log::info!("Rolling panel: {} rows", df.height());
    Ok(df)
}
