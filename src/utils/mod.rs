pub mod atomic;
pub mod constants;
pub mod conversions;
pub mod coordinates;
pub mod filename;
pub mod progress;

pub use atomic::{write_atomic, write_json_atomic};
pub use constants::*;
pub use coordinates::haversine_distance;
pub use filename::DataLayout;
pub use progress::ProgressReporter;
