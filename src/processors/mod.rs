pub mod anomaly_corrector;
pub mod extractor;
pub mod pipeline;
pub mod surface_extractor;
pub mod upper_air_extractor;

pub use anomaly_corrector::{AnomalyCorrector, CorrectionConfig, CorrectionSummary};
pub use extractor::{extract, extract_table, ExtractionLog};
pub use pipeline::{Pipeline, PipelineAction, PipelineOptions};
pub use surface_extractor::extract_surface;
pub use upper_air_extractor::extract_upper_air;
