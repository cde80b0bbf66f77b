use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::surface::CorrectionFlag;

/// One pressure level of a sounding. Height is geopotential height above
/// mean sea level; humidity in %, temperatures degC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub pressure: f64,
    pub height: Option<f64>,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub dewpoint: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

impl LevelRecord {
    pub fn new(pressure: f64) -> Self {
        Self {
            pressure,
            height: None,
            temperature: None,
            relative_humidity: None,
            dewpoint: None,
            wind_speed: None,
            wind_direction: None,
        }
    }

    pub fn get(&self, field: LevelField) -> Option<f64> {
        match field {
            LevelField::Temperature => self.temperature,
            LevelField::RelativeHumidity => self.relative_humidity,
            LevelField::Dewpoint => self.dewpoint,
            LevelField::WindSpeed => self.wind_speed,
            LevelField::WindDirection => self.wind_direction,
        }
    }

    pub fn set(&mut self, field: LevelField, value: Option<f64>) {
        let slot = match field {
            LevelField::Temperature => &mut self.temperature,
            LevelField::RelativeHumidity => &mut self.relative_humidity,
            LevelField::Dewpoint => &mut self.dewpoint,
            LevelField::WindSpeed => &mut self.wind_speed,
            LevelField::WindDirection => &mut self.wind_direction,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelField {
    Temperature,
    RelativeHumidity,
    Dewpoint,
    WindSpeed,
    WindDirection,
}

impl LevelField {
    pub const COUNT: usize = 5;

    pub const ALL: [LevelField; LevelField::COUNT] = [
        LevelField::Temperature,
        LevelField::RelativeHumidity,
        LevelField::Dewpoint,
        LevelField::WindSpeed,
        LevelField::WindDirection,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpperAirSounding {
    pub timestamp: NaiveDateTime,
    pub levels: Vec<LevelRecord>,
}

impl UpperAirSounding {
    pub fn new(timestamp: NaiveDateTime, levels: Vec<LevelRecord>) -> Self {
        Self { timestamp, levels }
    }

    /// Pressure strictly decreasing and known heights strictly increasing
    pub fn is_ordered(&self) -> bool {
        let pressures_ok = self
            .levels
            .windows(2)
            .all(|pair| pair[0].pressure > pair[1].pressure);
        let heights: Vec<f64> = self.levels.iter().filter_map(|l| l.height).collect();
        let heights_ok = heights.windows(2).all(|pair| pair[0] < pair[1]);
        pressures_ok && heights_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedLevel {
    pub measured: LevelRecord,
    pub corrected: LevelRecord,
    pub flags: [CorrectionFlag; LevelField::COUNT],
}

impl CorrectedLevel {
    pub fn flag(&self, field: LevelField) -> CorrectionFlag {
        self.flags[field.index()]
    }

    /// Geopotential height of the corrected level. Levels without a height
    /// never survive correction.
    pub fn height(&self) -> f64 {
        self.corrected.height.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSounding {
    pub timestamp: NaiveDateTime,
    pub levels: Vec<CorrectedLevel>,
}

impl CorrectedSounding {
    pub fn is_ordered(&self) -> bool {
        self.levels.windows(2).all(|pair| {
            pair[0].corrected.pressure > pair[1].corrected.pressure
                && pair[0].height() < pair[1].height()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn level(pressure: f64, height: Option<f64>) -> LevelRecord {
        LevelRecord {
            height,
            ..LevelRecord::new(pressure)
        }
    }

    #[test]
    fn test_sounding_ordering() {
        let timestamp = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        let ordered = UpperAirSounding::new(
            timestamp,
            vec![
                level(1000.0, Some(110.0)),
                level(925.0, None),
                level(850.0, Some(1500.0)),
            ],
        );
        assert!(ordered.is_ordered());

        let inverted = UpperAirSounding::new(
            timestamp,
            vec![level(1000.0, Some(110.0)), level(925.0, Some(90.0))],
        );
        assert!(!inverted.is_ordered());

        let duplicate = UpperAirSounding::new(
            timestamp,
            vec![level(1000.0, Some(110.0)), level(1000.0, Some(120.0))],
        );
        assert!(!duplicate.is_ordered());
    }

    #[test]
    fn test_level_accessors() {
        let mut record = LevelRecord::new(850.0);
        record.set(LevelField::WindDirection, Some(270.0));
        assert_eq!(record.get(LevelField::WindDirection), Some(270.0));
        assert_eq!(record.get(LevelField::Temperature), None);
        assert_eq!(LevelField::WindDirection.index(), 4);
    }
}
