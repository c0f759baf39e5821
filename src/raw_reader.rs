use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;

use crate::models::{MeasurementColumns, MetadataColumns};

/// Timestamp layouts seen across raw exports. RFC 3339 first, then the
/// common space/T separated forms, all interpreted as UTC.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

fn require_columns(df: &DataFrame, required: &[&str], path: &Path) -> Result<()> {
    let present = df.get_column_names();
    for name in required {
        if !present.contains(name) {
            bail!(
                "Required column '{}' not found in {}",
                name,
                path.display()
            );
        }
    }
    Ok(())
}

/// Replace a Utf8 or Datetime timestamp column with canonical Datetime(ms).
fn canonicalize_timestamps(df: &mut DataFrame, path: &Path) -> Result<()> {
    let dtype = df.column("ts")?.dtype().clone();
    match dtype {
        DataType::Datetime(_, _) => {
            let cast = df
                .column("ts")?
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            df.with_column(cast)?;
        }
        DataType::Utf8 => {
            let millis = {
                let raw = df.column("ts")?.utf8()?;
                let mut millis: Vec<Option<i64>> = Vec::with_capacity(raw.len());
                for value in raw.into_iter() {
                    match value {
                        Some(text) => match parse_timestamp_millis(text) {
                            Some(ms) => millis.push(Some(ms)),
                            None => bail!(
                                "Unparseable timestamp '{}' in {}",
                                text,
                                path.display()
                            ),
                        },
                        None => millis.push(None),
                    }
                }
                millis
            };
            let series = Series::new("ts", millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            df.with_column(series)?;
        }
        other => bail!(
            "Timestamp column in {} has unsupported type {:?}",
            path.display(),
            other
        ),
    }
    Ok(())
}

/// Cast the site key to Int64, failing loudly if any value does not parse
/// rather than silently dropping rows from the grid.
fn canonicalize_site_keys(df: &mut DataFrame, path: &Path) -> Result<()> {
    let site = df.column("site")?;
    let nulls_before = site.null_count();
    let cast = site
        .cast(&DataType::Int64)
        .with_context(|| format!("Site column in {} is not castable to integer", path.display()))?;
    if cast.null_count() > nulls_before {
        bail!(
            "Site column in {} contains non-integer identifiers",
            path.display()
        );
    }
    df.with_column(cast)?;
    Ok(())
}

/// Load the measurement file into a frame with canonical columns
/// [ts, site, power, temp, angle, rotor_speed, direction, wind_speed].
pub fn read_measurements(path: &Path, columns: &MeasurementColumns) -> Result<DataFrame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open measurement file {}", path.display()))?;

    // Force the sensor columns to Float64 so a file of round readings does
    // not come back as integers.
    let schema = Arc::new(Schema::from_iter(
        columns
            .sensor_pairs()
            .iter()
            .map(|(source, _)| Field::new(source, DataType::Float64)),
    ));

    let df = CsvReader::new(file)
        .has_header(true)
        .with_dtypes(Some(schema))
        .finish()
        .with_context(|| format!("Failed to parse measurement file {}", path.display()))?;

    let mut required = vec![columns.timestamp.as_str(), columns.site.as_str()];
    required.extend(columns.sensor_pairs().iter().map(|(source, _)| *source));
    require_columns(&df, &required, path)?;

    // Remap source names to canonical names so downstream stages are
    // insulated from the raw schema.
    let mut select_exprs = vec![
        col(&columns.timestamp).alias("ts"),
        col(&columns.site).alias("site"),
    ];
    for (source, canonical) in columns.sensor_pairs() {
        select_exprs.push(col(source).cast(DataType::Float64).alias(canonical));
    }
    let mut df = df.lazy().select(select_exprs).collect()?;

    canonicalize_timestamps(&mut df, path)?;
    canonicalize_site_keys(&mut df, path)?;

    log::info!(
        "Loaded {} measurement rows from {}",
        df.height(),
        path.display()
    );
    Ok(df)
}

/// Load the per-site metadata file into a frame with canonical columns
/// [site, turbine_count, rated_capacity, latitude, longitude, jurisdiction,
/// country].
pub fn read_metadata(path: &Path, columns: &MetadataColumns) -> Result<DataFrame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open metadata file {}", path.display()))?;

    let schema = Arc::new(Schema::from_iter([
        Field::new(columns.rated_capacity.as_str(), DataType::Float64),
        Field::new(columns.latitude.as_str(), DataType::Float64),
        Field::new(columns.longitude.as_str(), DataType::Float64),
    ]));

    let df = CsvReader::new(file)
        .has_header(true)
        .with_dtypes(Some(schema))
        .finish()
        .with_context(|| format!("Failed to parse metadata file {}", path.display()))?;

    let required: Vec<&str> = columns.pairs().iter().map(|(source, _)| *source).collect();
    require_columns(&df, &required, path)?;

    let select_exprs: Vec<Expr> = columns
        .pairs()
        .iter()
        .map(|(source, canonical)| col(source).alias(canonical))
        .collect();
    let mut df = df
        .lazy()
        .select(select_exprs)
        .with_column(col("turbine_count").cast(DataType::Int64))
        .collect()?;

    canonicalize_site_keys(&mut df, path)?;

    log::info!("Loaded {} site metadata rows from {}", df.height(), path.display());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_measurements_canonical_schema() {
        let file = write_temp_csv(
            "timestamp,site,power,temp,angle,rotor_speed,direction,wind_speed\n\
             2021-01-01 00:00:00,1,120.5,4.2,180.0,12.1,90.0,6.3\n\
             2021-01-01 01:00:00,1,-3.0,4.0,,,,0.0\n",
        );

        let df = read_measurements(file.path(), &MeasurementColumns::default()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names(),
            vec![
                "ts",
                "site",
                "power",
                "temp",
                "angle",
                "rotor_speed",
                "direction",
                "wind_speed"
            ]
        );
        assert!(matches!(
            df.column("ts").unwrap().dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
        assert_eq!(df.column("site").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("power").unwrap().f64().unwrap().get(0), Some(120.5));
        assert_eq!(df.column("angle").unwrap().null_count(), 1);
    }

    #[test]
    fn test_read_measurements_renames_source_columns() {
        let file = write_temp_csv(
            "Datetime,TurbID,Patv,Etmp,Ndir,Rspd,Wdir,Wspd\n\
             2021-01-01T05:00:00Z,2,100.0,1.0,10.0,8.0,45.0,5.0\n",
        );

        let columns = MeasurementColumns {
            timestamp: "Datetime".to_string(),
            site: "TurbID".to_string(),
            power: "Patv".to_string(),
            temp: "Etmp".to_string(),
            angle: "Ndir".to_string(),
            rotor_speed: "Rspd".to_string(),
            direction: "Wdir".to_string(),
            wind_speed: "Wspd".to_string(),
        };

        let df = read_measurements(file.path(), &columns).unwrap();
        assert_eq!(df.column("power").unwrap().f64().unwrap().get(0), Some(100.0));
        assert_eq!(df.column("site").unwrap().i64().unwrap().get(0), Some(2));
    }

    #[test]
    fn test_read_measurements_missing_column_is_fatal() {
        let file = write_temp_csv(
            "timestamp,site,power,temp,angle,rotor_speed,direction\n\
             2021-01-01 00:00:00,1,1.0,1.0,1.0,1.0,1.0\n",
        );

        let err = read_measurements(file.path(), &MeasurementColumns::default()).unwrap_err();
        assert!(err.to_string().contains("wind_speed"));
    }

    #[test]
    fn test_read_measurements_bad_timestamp_is_fatal() {
        let file = write_temp_csv(
            "timestamp,site,power,temp,angle,rotor_speed,direction,wind_speed\n\
             not-a-time,1,1.0,1.0,1.0,1.0,1.0,1.0\n",
        );

        let err = read_measurements(file.path(), &MeasurementColumns::default()).unwrap_err();
        assert!(err.to_string().contains("Unparseable timestamp"));
    }

    #[test]
    fn test_read_metadata() {
        let file = write_temp_csv(
            "site,turbine_count,rated_capacity,latitude,longitude,jurisdiction,country\n\
             1,10,200.0,53.5,8.1,Bremen,Germany\n\
             2,14,320.0,54.0,9.0,Schleswig-Holstein,Germany\n",
        );

        let df = read_metadata(file.path(), &MetadataColumns::default()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.column("rated_capacity").unwrap().f64().unwrap().get(0),
            Some(200.0)
        );
        assert_eq!(df.column("site").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_read_metadata_missing_file() {
        let err = read_metadata(
            Path::new("/definitely/not/here.csv"),
            &MetadataColumns::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
