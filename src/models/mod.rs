pub mod report;
pub mod request;
pub mod series;
pub mod sounding;
pub mod state;
pub mod station;
pub mod surface;

pub use report::{FailureKind, ReportSlots, RunReport, UnitOutcome, UnitReport};
pub use request::{build_units, DataFormat, RetrievalUnit};
pub use series::{CorrectedSeries, ExtractedSeries};
pub use sounding::{
    CorrectedLevel, CorrectedSounding, LevelField, LevelRecord, UpperAirSounding,
};
pub use state::{PipelineState, Stage, StageFailure};
pub use station::{DatasetKind, SiteCharacteristics, StationRequest, StationRequestBuilder};
pub use surface::{CorrectedSurfaceRecord, CorrectionFlag, SurfaceField, SurfaceRecord};
