use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Per-field outcome of anomaly correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CorrectionFlag {
    #[default]
    Measured,
    Calm,
    Clamped,
    Missing,
    Rejected,
}

impl CorrectionFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionFlag::Measured => "M",
            CorrectionFlag::Calm => "C",
            CorrectionFlag::Clamped => "K",
            CorrectionFlag::Missing => "X",
            CorrectionFlag::Rejected => "R",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M" => Some(CorrectionFlag::Measured),
            "C" => Some(CorrectionFlag::Calm),
            "K" => Some(CorrectionFlag::Clamped),
            "X" => Some(CorrectionFlag::Missing),
            "R" => Some(CorrectionFlag::Rejected),
            _ => None,
        }
    }
}

/// Hourly surface observation at the station coordinate.
///
/// Units after extraction: speeds m/s, direction degrees (from), temperatures
/// degC, pressure hPa, cloud cover tenths, heights m, precipitation mm,
/// heat flux W m-2 (upward positive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRecord {
    pub timestamp: NaiveDateTime,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub ceiling_height: Option<f64>,
    pub dewpoint: Option<f64>,
    pub precipitation: Option<f64>,
    pub sensible_heat_flux: Option<f64>,
    pub friction_velocity: Option<f64>,
    pub boundary_layer_height: Option<f64>,
    pub roughness: Option<f64>,
}

impl SurfaceRecord {
    pub fn missing(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            wind_speed: None,
            wind_direction: None,
            temperature: None,
            pressure: None,
            cloud_cover: None,
            ceiling_height: None,
            dewpoint: None,
            precipitation: None,
            sensible_heat_flux: None,
            friction_velocity: None,
            boundary_layer_height: None,
            roughness: None,
        }
    }

    pub fn get(&self, field: SurfaceField) -> Option<f64> {
        match field {
            SurfaceField::WindSpeed => self.wind_speed,
            SurfaceField::WindDirection => self.wind_direction,
            SurfaceField::Temperature => self.temperature,
            SurfaceField::Pressure => self.pressure,
            SurfaceField::CloudCover => self.cloud_cover,
            SurfaceField::CeilingHeight => self.ceiling_height,
            SurfaceField::Dewpoint => self.dewpoint,
            SurfaceField::Precipitation => self.precipitation,
            SurfaceField::SensibleHeatFlux => self.sensible_heat_flux,
            SurfaceField::FrictionVelocity => self.friction_velocity,
            SurfaceField::BoundaryLayerHeight => self.boundary_layer_height,
            SurfaceField::Roughness => self.roughness,
        }
    }

    pub fn set(&mut self, field: SurfaceField, value: Option<f64>) {
        let slot = match field {
            SurfaceField::WindSpeed => &mut self.wind_speed,
            SurfaceField::WindDirection => &mut self.wind_direction,
            SurfaceField::Temperature => &mut self.temperature,
            SurfaceField::Pressure => &mut self.pressure,
            SurfaceField::CloudCover => &mut self.cloud_cover,
            SurfaceField::CeilingHeight => &mut self.ceiling_height,
            SurfaceField::Dewpoint => &mut self.dewpoint,
            SurfaceField::Precipitation => &mut self.precipitation,
            SurfaceField::SensibleHeatFlux => &mut self.sensible_heat_flux,
            SurfaceField::FrictionVelocity => &mut self.friction_velocity,
            SurfaceField::BoundaryLayerHeight => &mut self.boundary_layer_height,
            SurfaceField::Roughness => &mut self.roughness,
        };
        *slot = value;
    }

    pub fn is_empty(&self) -> bool {
        SurfaceField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceField {
    WindSpeed,
    WindDirection,
    Temperature,
    Pressure,
    CloudCover,
    CeilingHeight,
    Dewpoint,
    Precipitation,
    SensibleHeatFlux,
    FrictionVelocity,
    BoundaryLayerHeight,
    Roughness,
}

impl SurfaceField {
    pub const COUNT: usize = 12;

    pub const ALL: [SurfaceField; SurfaceField::COUNT] = [
        SurfaceField::WindSpeed,
        SurfaceField::WindDirection,
        SurfaceField::Temperature,
        SurfaceField::Pressure,
        SurfaceField::CloudCover,
        SurfaceField::CeilingHeight,
        SurfaceField::Dewpoint,
        SurfaceField::Precipitation,
        SurfaceField::SensibleHeatFlux,
        SurfaceField::FrictionVelocity,
        SurfaceField::BoundaryLayerHeight,
        SurfaceField::Roughness,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Column stem used in the interim surface table
    pub fn column(&self) -> &'static str {
        match self {
            SurfaceField::WindSpeed => "wind_speed",
            SurfaceField::WindDirection => "wind_direction",
            SurfaceField::Temperature => "temperature",
            SurfaceField::Pressure => "pressure",
            SurfaceField::CloudCover => "cloud_cover",
            SurfaceField::CeilingHeight => "ceiling_height",
            SurfaceField::Dewpoint => "dewpoint",
            SurfaceField::Precipitation => "precipitation",
            SurfaceField::SensibleHeatFlux => "sensible_heat_flux",
            SurfaceField::FrictionVelocity => "friction_velocity",
            SurfaceField::BoundaryLayerHeight => "boundary_layer_height",
            SurfaceField::Roughness => "roughness",
        }
    }
}

/// Measured and corrected values side by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSurfaceRecord {
    pub measured: SurfaceRecord,
    pub corrected: SurfaceRecord,
    pub flags: [CorrectionFlag; SurfaceField::COUNT],
}

impl CorrectedSurfaceRecord {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.corrected.timestamp
    }

    pub fn flag(&self, field: SurfaceField) -> CorrectionFlag {
        self.flags[field.index()]
    }

    pub fn is_rejected(&self) -> bool {
        self.flags.contains(&CorrectionFlag::Rejected)
    }

    pub fn is_calm(&self) -> bool {
        self.flag(SurfaceField::WindDirection) == CorrectionFlag::Calm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_field_accessors() {
        let mut record = SurfaceRecord::missing(timestamp());
        assert!(record.is_empty());

        for (i, field) in SurfaceField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
            record.set(*field, Some(i as f64));
        }
        assert_eq!(record.get(SurfaceField::Temperature), Some(2.0));
        assert_eq!(record.roughness, Some(11.0));
        assert!(!record.is_empty());
    }

    #[test]
    fn test_flag_codes() {
        for flag in [
            CorrectionFlag::Measured,
            CorrectionFlag::Calm,
            CorrectionFlag::Clamped,
            CorrectionFlag::Missing,
            CorrectionFlag::Rejected,
        ] {
            assert_eq!(CorrectionFlag::parse(flag.as_str()), Some(flag));
        }
        assert_eq!(CorrectionFlag::parse("?"), None);
    }
}
