use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike};
use polars::prelude::*;

use crate::models::{Cardinal, PipelineConfig, TimeOfDay};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Join per-site rated capacity and derive the engineered feature columns:
/// calendar fields, wind presence, capacity utilization, time-of-day bucket
/// and compass cardinality.
///
/// Missing data never aborts a row here; every derived field degrades to
/// null instead. A site without a metadata entry simply has null cap_util.
pub fn enrich(grid: &DataFrame, metadata: &DataFrame, config: &PipelineConfig) -> Result<DataFrame> {
    let capacity_lf = metadata
        .clone()
        .lazy()
        .select([col("site"), col("rated_capacity")]);

    let mut df = grid
        .clone()
        .lazy()
        .join(
            capacity_lf,
            [col("site")],
            [col("site")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    let height = df.height();
    let ts = df.column("ts")?.datetime()?.clone();
    let power = df.column("power")?.f64()?.clone();
    let capacity = df.column("rated_capacity")?.f64()?.clone();
    let direction = df.column("direction")?.f64()?.clone();
    let wind_speed = df.column("wind_speed")?.f64()?.clone();

    let mut years: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut months: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut days: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut hours: Vec<Option<i32>> = Vec::with_capacity(height);
    let mut has_wind: Vec<bool> = Vec::with_capacity(height);
    let mut cap_util: Vec<Option<f64>> = Vec::with_capacity(height);
    let mut masked_direction: Vec<Option<f64>> = Vec::with_capacity(height);
    let mut time_of_day: Vec<Option<&'static str>> = Vec::with_capacity(height);
    let mut cardinal: Vec<Option<&'static str>> = Vec::with_capacity(height);

    for idx in 0..height {
        let datetime = ts
            .get(idx)
            .and_then(DateTime::from_timestamp_millis);

        years.push(datetime.map(|dt| dt.year()));
        months.push(datetime.map(|dt| dt.month() as i32));
        days.push(datetime.map(|dt| dt.day() as i32));
        hours.push(datetime.map(|dt| dt.hour() as i32));
        time_of_day.push(
            datetime
                .and_then(|dt| TimeOfDay::from_hour(dt.hour()))
                .map(|bucket| bucket.label()),
        );

        // Power draw periods are clamped to zero, so utilization is never
        // negative. It can still exceed 1.0 when output beats nameplate.
        cap_util.push(match (power.get(idx), capacity.get(idx)) {
            (Some(p), Some(cap)) if cap > 0.0 => Some(round2(p.max(0.0) / cap)),
            _ => None,
        });

        let dir = direction.get(idx);
        let windy = dir.is_some()
            && wind_speed
                .get(idx)
                .map_or(false, |speed| speed > config.wind_speed_threshold);
        has_wind.push(windy);

        // A stale direction reading on a calm hour must not leak into the
        // cardinality buckets, so direction itself is masked too.
        if windy {
            masked_direction.push(dir);
            cardinal.push(dir.and_then(Cardinal::from_degrees).map(|c| c.label()));
        } else {
            masked_direction.push(None);
            cardinal.push(None);
        }
    }

    df.with_column(Series::new("year", years))?;
    df.with_column(Series::new("month", months))?;
    df.with_column(Series::new("day", days))?;
    df.with_column(Series::new("hour", hours))?;
    df.with_column(Series::new("has_wind", has_wind))?;
    df.with_column(Series::new("cap_util", cap_util))?;
    df.with_column(Series::new("direction", masked_direction))?;
    df.with_column(Series::new("time_of_day", time_of_day))?;
    df.with_column(Series::new("cardinal", cardinal))?;

    log::info!("Enriched panel: {} rows", df.height());
    Ok(df)
}
