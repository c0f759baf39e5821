pub mod models;
pub mod raw_reader;
pub mod grid_normalizer;
pub mod feature_enricher;
pub mod rolling_aggregator;
pub mod difference_builder;
pub mod pipeline;

pub use models::{Cardinal, MeasurementColumns, MetadataColumns, PipelineConfig, TimeOfDay};
pub use pipeline::{PanelPipeline, PanelSet};
