use anyhow::Result;
use polars::prelude::DataFrame;
use std::path::Path;

use crate::difference_builder::difference_panel;
use crate::feature_enricher::enrich;
use crate::grid_normalizer::normalize_grid;
use crate::models::{MeasurementColumns, MetadataColumns, PipelineConfig};
use crate::raw_reader::{read_measurements, read_metadata};

/// The three derived tables handed to presentation code. All are fully
/// recomputed from the source files on each run; none is mutated after
/// construction.
pub struct PanelSet {
    pub analytical: DataFrame,
    pub rolling: DataFrame,
    pub difference: DataFrame,
}

/// One-directional batch pipeline: raw files -> dense grid -> enriched
/// panel -> {rolling, difference} panels.
pub struct PanelPipeline {
    config: PipelineConfig,
    measurement_columns: MeasurementColumns,
    metadata_columns: MetadataColumns,
}

impl PanelPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            measurement_columns: MeasurementColumns::default(),
            metadata_columns: MetadataColumns::default(),
        }
    }

    pub fn with_measurement_columns(mut self, columns: MeasurementColumns) -> Self {
        self.measurement_columns = columns;
        self
    }

    pub fn with_metadata_columns(mut self, columns: MetadataColumns) -> Self {
        self.metadata_columns = columns;
        self
    }

    pub fn run(&self, measurement_path: &Path, metadata_path: &Path) -> Result<PanelSet> {
        let measurements = read_measurements(measurement_path, &self.measurement_columns)?;
        let metadata = read_metadata(metadata_path, &self.metadata_columns)?;

        let grid = normalize_grid(&measurements, &self.config.site_ids)?;
        let analytical = enrich(&grid, &metadata, &self.config)?;
        let rolling = crate::rolling_aggregator::rolling_panel(&analytical, &self.config)?;
        let difference = difference_panel(&analytical)?;

        Ok(PanelSet {
            analytical,
            rolling,
            difference,
        })
    }
}
