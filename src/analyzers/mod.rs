pub mod output_analyzer;

pub use output_analyzer::{verify_file, ColumnStats, OutputAnalyzer, OutputStatistics};
