//! Detects and repairs known reanalysis artifacts. Pure: no I/O, measured
//! values are kept alongside the corrected ones with a per-field flag.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ProcessingError, Result};
use crate::models::{
    CorrectedLevel, CorrectedSeries, CorrectedSounding, CorrectedSurfaceRecord, CorrectionFlag,
    ExtractedSeries, LevelField, LevelRecord, SurfaceField, SurfaceRecord, UpperAirSounding,
};
use crate::utils::constants::{
    CALM_DIRECTION, DEFAULT_CALM_THRESHOLD, DEFAULT_MAX_REJECTED_FRACTION, MAX_CLOUD_TENTHS,
    MAX_VALID_HEAT_FLUX, MAX_VALID_PRESSURE, MAX_VALID_TEMP, MAX_VALID_WIND_SPEED,
    MIN_VALID_HEAT_FLUX, MIN_VALID_PRESSURE, MIN_VALID_TEMP,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Wind speeds below this (m/s) are calm
    pub calm_threshold: f64,
    /// Largest tolerated share of rejected records (or dropped levels)
    pub max_rejected_fraction: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            calm_threshold: DEFAULT_CALM_THRESHOLD,
            max_rejected_fraction: DEFAULT_MAX_REJECTED_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSummary {
    pub records: usize,
    pub rejected_records: usize,
    pub corrected_fields: usize,
    pub calm_records: usize,
    pub dropped_levels: usize,
    pub dropped_soundings: usize,
    pub violations: Vec<String>,
}

impl CorrectionSummary {
    pub fn rejected_fraction(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.rejected_records as f64 / self.records as f64
        }
    }
}

enum Verdict {
    Keep,
    Clamp(f64),
    Reject(String),
}

fn out_of_range(value: f64, unit: &str, min: f64, max: f64) -> Verdict {
    Verdict::Reject(format!("{:.2} {} outside [{}, {}]", value, unit, min, max))
}

fn wind_rule(speed_or_direction: f64, is_speed: bool) -> Verdict {
    if is_speed {
        if speed_or_direction < 0.0 {
            Verdict::Clamp(0.0)
        } else if speed_or_direction > MAX_VALID_WIND_SPEED {
            Verdict::Reject(format!(
                "{:.2} m/s above {} m/s",
                speed_or_direction, MAX_VALID_WIND_SPEED
            ))
        } else {
            Verdict::Keep
        }
    } else if !(0.0..360.0).contains(&speed_or_direction) {
        Verdict::Clamp(speed_or_direction.rem_euclid(360.0))
    } else {
        Verdict::Keep
    }
}

fn surface_rule(field: SurfaceField, value: f64) -> Verdict {
    if !value.is_finite() {
        return Verdict::Reject("is not finite".to_string());
    }
    match field {
        SurfaceField::WindSpeed => wind_rule(value, true),
        SurfaceField::WindDirection => wind_rule(value, false),
        SurfaceField::Temperature if !(MIN_VALID_TEMP..=MAX_VALID_TEMP).contains(&value) => {
            out_of_range(value, "degC", MIN_VALID_TEMP, MAX_VALID_TEMP)
        }
        SurfaceField::Pressure if !(MIN_VALID_PRESSURE..=MAX_VALID_PRESSURE).contains(&value) => {
            out_of_range(value, "hPa", MIN_VALID_PRESSURE, MAX_VALID_PRESSURE)
        }
        SurfaceField::CloudCover if value > MAX_CLOUD_TENTHS => Verdict::Clamp(MAX_CLOUD_TENTHS),
        SurfaceField::CloudCover if value < 0.0 => Verdict::Clamp(0.0),
        SurfaceField::Precipitation | SurfaceField::BoundaryLayerHeight if value < 0.0 => {
            Verdict::Clamp(0.0)
        }
        SurfaceField::SensibleHeatFlux
            if !(MIN_VALID_HEAT_FLUX..=MAX_VALID_HEAT_FLUX).contains(&value) =>
        {
            Verdict::Clamp(value.clamp(MIN_VALID_HEAT_FLUX, MAX_VALID_HEAT_FLUX))
        }
        SurfaceField::Roughness if value <= 0.0 => {
            Verdict::Reject(format!("{:.4} m is not positive", value))
        }
        _ => Verdict::Keep,
    }
}

fn level_rule(field: LevelField, value: f64) -> Verdict {
    if !value.is_finite() {
        return Verdict::Reject("is not finite".to_string());
    }
    match field {
        LevelField::WindSpeed => wind_rule(value, true),
        LevelField::WindDirection => wind_rule(value, false),
        LevelField::Temperature if !(MIN_VALID_TEMP..=MAX_VALID_TEMP).contains(&value) => {
            out_of_range(value, "degC", MIN_VALID_TEMP, MAX_VALID_TEMP)
        }
        LevelField::RelativeHumidity if !(0.0..=100.0).contains(&value) => {
            Verdict::Clamp(value.clamp(0.0, 100.0))
        }
        _ => Verdict::Keep,
    }
}

fn describe(timestamp: NaiveDateTime, what: &str, reason: &str) -> String {
    format!("{} {} {}", timestamp.format("%Y-%m-%d %H:%M"), what, reason)
}

pub struct AnomalyCorrector {
    config: CorrectionConfig,
    station_elevation: f64,
}

impl AnomalyCorrector {
    pub fn new(config: CorrectionConfig) -> Self {
        Self {
            config,
            station_elevation: 0.0,
        }
    }

    /// Levels at or below this geopotential height are discarded
    pub fn with_station_elevation(mut self, elevation: f64) -> Self {
        self.station_elevation = elevation;
        self
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn correct(&self, series: &ExtractedSeries) -> Result<(CorrectedSeries, CorrectionSummary)> {
        let (corrected, summary) = match series {
            ExtractedSeries::Surface(records) => {
                let (records, summary) = self.correct_surface(records)?;
                (CorrectedSeries::Surface(records), summary)
            }
            ExtractedSeries::UpperAir(soundings) => {
                let (soundings, summary) = self.correct_upper_air(soundings)?;
                (CorrectedSeries::UpperAir(soundings), summary)
            }
        };

        let fraction = summary.rejected_fraction();
        if fraction > self.config.max_rejected_fraction {
            return Err(ProcessingError::Validation(format!(
                "{:.1}% of {} records rejected (limit {:.1}%); first: {}",
                fraction * 100.0,
                series.kind(),
                self.config.max_rejected_fraction * 100.0,
                summary.violations.first().map(String::as_str).unwrap_or("-")
            )));
        }

        Ok((corrected, summary))
    }

    fn check_order(previous: Option<NaiveDateTime>, current: NaiveDateTime) -> Result<()> {
        match previous {
            Some(prev) if current <= prev => Err(ProcessingError::Validation(format!(
                "timestamps not strictly increasing: {} follows {}",
                current, prev
            ))),
            _ => Ok(()),
        }
    }

    pub fn correct_surface(
        &self,
        records: &[SurfaceRecord],
    ) -> Result<(Vec<CorrectedSurfaceRecord>, CorrectionSummary)> {
        let mut summary = CorrectionSummary {
            records: records.len(),
            ..Default::default()
        };
        let mut out = Vec::with_capacity(records.len());
        let mut previous = None;

        for record in records {
            Self::check_order(previous, record.timestamp)?;
            previous = Some(record.timestamp);
            out.push(self.correct_surface_record(record, &mut summary));
        }

        if summary.rejected_records > 0 {
            warn!(
                "Rejected {} of {} surface records",
                summary.rejected_records, summary.records
            );
        }
        Ok((out, summary))
    }

    fn correct_surface_record(
        &self,
        record: &SurfaceRecord,
        summary: &mut CorrectionSummary,
    ) -> CorrectedSurfaceRecord {
        let mut corrected = record.clone();
        let mut flags = [CorrectionFlag::Measured; SurfaceField::COUNT];
        let mut violations = Vec::new();

        for field in SurfaceField::ALL {
            let Some(value) = record.get(field) else {
                flags[field.index()] = CorrectionFlag::Missing;
                continue;
            };
            match surface_rule(field, value) {
                Verdict::Keep => {}
                Verdict::Clamp(v) => {
                    corrected.set(field, Some(v));
                    flags[field.index()] = CorrectionFlag::Clamped;
                }
                Verdict::Reject(reason) => violations.push(format!("{} {}", field.column(), reason)),
            }
        }

        if !violations.is_empty() {
            summary.rejected_records += 1;
            summary.violations.push(describe(
                record.timestamp,
                "surface record rejected:",
                &violations.join("; "),
            ));
            return CorrectedSurfaceRecord {
                measured: record.clone(),
                corrected: SurfaceRecord::missing(record.timestamp),
                flags: [CorrectionFlag::Rejected; SurfaceField::COUNT],
            };
        }

        if let (Some(t), Some(td)) = (corrected.temperature, corrected.dewpoint) {
            if td > t {
                corrected.dewpoint = Some(t);
                flags[SurfaceField::Dewpoint.index()] = CorrectionFlag::Clamped;
            }
        }

        if corrected
            .wind_speed
            .is_some_and(|ws| ws < self.config.calm_threshold)
        {
            corrected.wind_direction = Some(CALM_DIRECTION);
            flags[SurfaceField::WindDirection.index()] = CorrectionFlag::Calm;
            summary.calm_records += 1;
        }

        summary.corrected_fields += flags
            .iter()
            .filter(|f| matches!(f, CorrectionFlag::Clamped | CorrectionFlag::Calm))
            .count();

        CorrectedSurfaceRecord {
            measured: record.clone(),
            corrected,
            flags,
        }
    }

    pub fn correct_upper_air(
        &self,
        soundings: &[UpperAirSounding],
    ) -> Result<(Vec<CorrectedSounding>, CorrectionSummary)> {
        let mut summary = CorrectionSummary::default();
        let mut out = Vec::with_capacity(soundings.len());
        let mut previous = None;

        for sounding in soundings {
            Self::check_order(previous, sounding.timestamp)?;
            previous = Some(sounding.timestamp);
            summary.records += sounding.levels.len();

            let levels = self.correct_sounding(sounding, &mut summary);
            if levels.is_empty() {
                summary.dropped_soundings += 1;
                summary
                    .violations
                    .push(describe(sounding.timestamp, "sounding", "dropped: no usable levels"));
                continue;
            }
            out.push(CorrectedSounding {
                timestamp: sounding.timestamp,
                levels,
            });
        }

        summary.rejected_records = summary.dropped_levels;
        if summary.dropped_levels > 0 {
            warn!(
                "Dropped {} of {} sounding levels ({} empty soundings)",
                summary.dropped_levels, summary.records, summary.dropped_soundings
            );
        }
        Ok((out, summary))
    }

    fn correct_sounding(
        &self,
        sounding: &UpperAirSounding,
        summary: &mut CorrectionSummary,
    ) -> Vec<CorrectedLevel> {
        let mut kept: Vec<CorrectedLevel> = Vec::with_capacity(sounding.levels.len());

        for level in &sounding.levels {
            let discard = |summary: &mut CorrectionSummary, reason: String| {
                summary.dropped_levels += 1;
                summary.violations.push(describe(
                    sounding.timestamp,
                    &format!("level {:.0} hPa", level.pressure),
                    &reason,
                ));
            };

            let Some(height) = level.height.filter(|h| h.is_finite()) else {
                discard(summary, "dropped: no geopotential height".to_string());
                continue;
            };
            if height - self.station_elevation <= 0.0 {
                discard(summary, "dropped: below station elevation".to_string());
                continue;
            }
            if let Some(last) = kept.last() {
                if level.pressure >= last.corrected.pressure {
                    discard(summary, "dropped: duplicate or non-decreasing pressure".to_string());
                    continue;
                }
                if height <= last.height() {
                    discard(summary, "dropped: height not increasing".to_string());
                    continue;
                }
            }

            match self.correct_level(level) {
                Ok((corrected, flags)) => {
                    summary.corrected_fields += flags
                        .iter()
                        .filter(|f| matches!(f, CorrectionFlag::Clamped | CorrectionFlag::Calm))
                        .count();
                    if flags[LevelField::WindDirection.index()] == CorrectionFlag::Calm {
                        summary.calm_records += 1;
                    }
                    kept.push(CorrectedLevel {
                        measured: level.clone(),
                        corrected,
                        flags,
                    });
                }
                Err(reason) => discard(summary, format!("dropped: {}", reason)),
            }
        }

        kept
    }

    fn correct_level(
        &self,
        level: &LevelRecord,
    ) -> std::result::Result<(LevelRecord, [CorrectionFlag; LevelField::COUNT]), String> {
        if !level.pressure.is_finite() || level.pressure <= 0.0 {
            return Err(format!("pressure {} is not valid", level.pressure));
        }

        let mut corrected = level.clone();
        let mut flags = [CorrectionFlag::Measured; LevelField::COUNT];

        for field in LevelField::ALL {
            let Some(value) = level.get(field) else {
                flags[field.index()] = CorrectionFlag::Missing;
                continue;
            };
            match level_rule(field, value) {
                Verdict::Keep => {}
                Verdict::Clamp(v) => {
                    corrected.set(field, Some(v));
                    flags[field.index()] = CorrectionFlag::Clamped;
                }
                Verdict::Reject(reason) => {
                    return Err(format!("{:?} {}", field, reason).to_lowercase())
                }
            }
        }

        if let (Some(t), Some(td)) = (corrected.temperature, corrected.dewpoint) {
            if td > t {
                corrected.dewpoint = Some(t);
                flags[LevelField::Dewpoint.index()] = CorrectionFlag::Clamped;
            }
        }

        if corrected
            .wind_speed
            .is_some_and(|ws| ws < self.config.calm_threshold)
        {
            corrected.wind_direction = Some(CALM_DIRECTION);
            flags[LevelField::WindDirection.index()] = CorrectionFlag::Calm;
        }

        Ok((corrected, flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn good(hour: i64) -> SurfaceRecord {
        SurfaceRecord {
            wind_speed: Some(4.0),
            wind_direction: Some(180.0),
            temperature: Some(10.0),
            pressure: Some(1010.0),
            cloud_cover: Some(4.0),
            dewpoint: Some(6.0),
            precipitation: Some(0.0),
            roughness: Some(0.1),
            ..SurfaceRecord::missing(at(hour))
        }
    }

    fn corrector() -> AnomalyCorrector {
        AnomalyCorrector::new(CorrectionConfig::default())
    }

    #[test]
    fn test_calm_wind_gets_sentinel_direction() {
        let mut record = good(0);
        record.wind_speed = Some(0.2);
        record.wind_direction = Some(360.0);

        let (out, summary) = corrector().correct_surface(&[record]).unwrap();
        let r = &out[0];
        assert_eq!(r.corrected.wind_direction, Some(CALM_DIRECTION));
        assert_eq!(r.measured.wind_direction, Some(360.0));
        assert!(r.is_calm());
        assert_eq!(summary.calm_records, 1);
    }

    #[test]
    fn test_heat_flux_is_clamped_clear_of_sentinel() {
        let mut low = good(0);
        low.sensible_heat_flux = Some(-999.0);
        let mut high = good(1);
        high.sensible_heat_flux = Some(25_000.0);

        let (out, summary) = corrector().correct_surface(&[low, high]).unwrap();
        assert_eq!(out[0].corrected.sensible_heat_flux, Some(MIN_VALID_HEAT_FLUX));
        assert_eq!(out[1].corrected.sensible_heat_flux, Some(MAX_VALID_HEAT_FLUX));
        assert_eq!(
            out[0].flag(SurfaceField::SensibleHeatFlux),
            CorrectionFlag::Clamped
        );
        assert_eq!(out[1].measured.sensible_heat_flux, Some(25_000.0));
        assert_eq!(summary.rejected_records, 0);
        assert_eq!(summary.corrected_fields, 2);
    }

    #[test]
    fn test_clamps() {
        let mut record = good(0);
        record.wind_speed = Some(-1.0);
        record.wind_direction = Some(370.0);
        record.cloud_cover = Some(12.0);
        record.dewpoint = Some(11.0);
        record.precipitation = Some(-0.1);
        record.boundary_layer_height = Some(-5.0);

        let (out, summary) = corrector().correct_surface(&[record]).unwrap();
        let c = &out[0].corrected;
        assert_eq!(c.wind_speed, Some(0.0));
        // Speed clamped to zero is calm
        assert_eq!(c.wind_direction, Some(CALM_DIRECTION));
        assert_eq!(c.cloud_cover, Some(10.0));
        assert_eq!(c.dewpoint, Some(10.0));
        assert_eq!(c.precipitation, Some(0.0));
        assert_eq!(c.boundary_layer_height, Some(0.0));
        assert_eq!(out[0].flag(SurfaceField::CloudCover), CorrectionFlag::Clamped);
        assert_eq!(out[0].flag(SurfaceField::CeilingHeight), CorrectionFlag::Missing);
        assert_eq!(summary.rejected_records, 0);

        let mut wrapped = good(1);
        wrapped.wind_direction = Some(-90.0);
        let (out, _) = corrector().correct_surface(&[wrapped]).unwrap();
        assert_eq!(out[0].corrected.wind_direction, Some(270.0));
    }

    #[test]
    fn test_rejected_record_keeps_calendar_slot() {
        let mut records: Vec<SurfaceRecord> = (0..10).map(good).collect();
        records[3].temperature = Some(75.0);
        records[5].wind_speed = Some(80.0);

        let (out, summary) = corrector().correct_surface(&records).unwrap();
        assert_eq!(out.len(), 10);
        assert!(out[3].is_rejected());
        assert!(out[3].corrected.is_empty());
        assert_eq!(out[3].timestamp(), at(3));
        assert_eq!(out[3].measured.temperature, Some(75.0));
        assert_eq!(summary.rejected_records, 2);
        assert!(summary.violations[0].contains("temperature"));
    }

    #[test]
    fn test_rejected_fraction_limit() {
        let mut records: Vec<SurfaceRecord> = (0..4).map(good).collect();
        records[0].pressure = Some(0.0);
        records[1].roughness = Some(0.0);
        let err = corrector()
            .correct(&ExtractedSeries::Surface(records))
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
    }

    #[test]
    fn test_non_increasing_timestamps_fail() {
        let records = vec![good(1), good(1)];
        assert!(matches!(
            corrector().correct_surface(&records),
            Err(ProcessingError::Validation(_))
        ));
    }

    fn level(pressure: f64, height: Option<f64>, speed: f64) -> LevelRecord {
        LevelRecord {
            height,
            temperature: Some(5.0),
            relative_humidity: Some(104.0),
            dewpoint: Some(6.0),
            wind_speed: Some(speed),
            wind_direction: Some(90.0),
            ..LevelRecord::new(pressure)
        }
    }

    #[test]
    fn test_sounding_levels_filtered() {
        let sounding = UpperAirSounding::new(
            at(0),
            vec![
                // Below the 20 m station
                level(1000.0, Some(15.0), 3.0),
                level(975.0, Some(250.0), 0.3),
                level(975.0, Some(260.0), 3.0),
                // Height inversion
                level(950.0, Some(240.0), 3.0),
                level(925.0, None, 3.0),
                level(900.0, Some(1000.0), 70.0),
                level(850.0, Some(1500.0), 5.0),
            ],
        );
        let empty = UpperAirSounding::new(at(6), vec![level(1000.0, Some(10.0), 2.0)]);

        let corrector = AnomalyCorrector::new(CorrectionConfig {
            max_rejected_fraction: 1.0,
            ..CorrectionConfig::default()
        })
        .with_station_elevation(20.0);
        let (out, summary) = corrector.correct_upper_air(&[sounding, empty]).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(summary.dropped_soundings, 1);
        assert_eq!(summary.dropped_levels, 6);
        let levels = &out[0].levels;
        assert_eq!(levels.len(), 2);
        assert!(out[0].is_ordered());
        assert_eq!(levels[0].corrected.wind_direction, Some(CALM_DIRECTION));
        assert_eq!(levels[0].corrected.relative_humidity, Some(100.0));
        assert_eq!(levels[0].corrected.dewpoint, Some(5.0));
        assert_eq!(levels[0].flag(LevelField::RelativeHumidity), CorrectionFlag::Clamped);
    }
}
