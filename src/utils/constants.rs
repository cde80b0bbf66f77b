/// ERA5 datasets on the Climate Data Store
pub const SURFACE_DATASET: &str = "reanalysis-era5-single-levels";
pub const UPPER_AIR_DATASET: &str = "reanalysis-era5-pressure-levels";
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";

/// Variables requested per dataset kind, paired with the short name used in
/// the delivered CSV/NetCDF tables.
pub const SURFACE_VARIABLES: &[(&str, &str)] = &[
    ("2m_temperature", "t2m"),
    ("2m_dewpoint_temperature", "d2m"),
    ("surface_pressure", "sp"),
    ("10m_u_component_of_wind", "u10"),
    ("10m_v_component_of_wind", "v10"),
    ("total_cloud_cover", "tcc"),
    ("cloud_base_height", "cbh"),
    ("total_precipitation", "tp"),
    ("boundary_layer_height", "blh"),
    ("forecast_surface_roughness", "fsr"),
    ("surface_sensible_heat_flux", "sshf"),
    ("friction_velocity", "zust"),
];

pub const UPPER_AIR_VARIABLES: &[(&str, &str)] = &[
    ("temperature", "t"),
    ("geopotential", "z"),
    ("u_component_of_wind", "u"),
    ("v_component_of_wind", "v"),
    ("relative_humidity", "r"),
];

/// Pressure levels (hPa) covering the lower troposphere
pub const PRESSURE_LEVELS: &[u32] = &[
    1000, 975, 950, 925, 900, 875, 850, 825, 800, 775, 750, 700, 650, 600, 550, 500,
];

/// IGRA mandatory levels (hPa)
pub const MANDATORY_LEVELS: &[u32] = &[1000, 925, 850, 700, 500, 400, 300, 250, 200, 150, 100];

pub const UPPER_AIR_HOURS: &[u32] = &[0, 6, 12, 18];

/// Physical constants
pub const GRAVITY: f64 = 9.80665;
pub const KELVIN_OFFSET: f64 = 273.15;
pub const VON_KARMAN: f64 = 0.4;
pub const SPECIFIC_HEAT_AIR: f64 = 1004.0;
pub const GAS_CONSTANT_DRY_AIR: f64 = 287.04;
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Magnus formula coefficients (degC)
pub const MAGNUS_A: f64 = 17.625;
pub const MAGNUS_B: f64 = 243.04;

/// Anomaly correction defaults
pub const DEFAULT_CALM_THRESHOLD: f64 = 0.5;
pub const CALM_DIRECTION: f64 = 999.0;
pub const MAX_VALID_WIND_SPEED: f64 = 50.0;
pub const MIN_VALID_TEMP: f64 = -90.0;
pub const MAX_VALID_TEMP: f64 = 60.0;
pub const MIN_VALID_PRESSURE: f64 = 500.0;
pub const MAX_VALID_PRESSURE: f64 = 1100.0;
pub const MAX_CLOUD_TENTHS: f64 = 10.0;
/// Sensible heat flux bounds (W m-2); keeps clear of the SFC H sentinel
pub const MIN_VALID_HEAT_FLUX: f64 = -500.0;
pub const MAX_VALID_HEAT_FLUX: f64 = 1500.0;
pub const DEFAULT_MAX_REJECTED_FRACTION: f64 = 0.25;

/// Measurement heights written to the surface/profile files (m)
pub const WIND_REFERENCE_HEIGHT: f64 = 10.0;
pub const TEMPERATURE_REFERENCE_HEIGHT: f64 = 2.0;

/// A profile hour uses the nearest sounding no further away than this
pub const SOUNDING_WINDOW_HOURS: i64 = 3;

/// Station header defaults
pub const DEFAULT_STATION_ID: &str = "99999";
pub const DEFAULT_AREA_BUFFER: f64 = 0.25;
pub const FORMAT_VERSION: &str = "ERA5MP";

/// Retrieval defaults
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Directory names under the data root
pub const RAW_DIR: &str = "raw";
pub const INTERIM_DIR: &str = "interim";
pub const PROCESSED_DIR: &str = "processed";
pub const STATE_DIR: &str = "state";
pub const REPORTS_DIR: &str = "reports";

pub const DEFAULT_CONFIG_FILE: &str = "metprep.toml";
pub const DEFAULT_DATA_DIR: &str = "data/met";
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB
