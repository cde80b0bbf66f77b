pub mod csv_grid;
pub mod grid_table;
pub mod netcdf_grid;
pub mod output_reader;
pub mod raw_reader;

pub use csv_grid::read_csv_grid;
pub use grid_table::{GridRow, GridTable};
pub use netcdf_grid::read_netcdf_grid;
pub use output_reader::{read_output, DecodedOutput, OutputKind};
pub use raw_reader::read_raw_archive;
