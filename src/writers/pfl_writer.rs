use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{ProcessingError, Result};
use crate::models::{CorrectedSounding, StationRequest};
use crate::utils::constants::{SOUNDING_WINDOW_HOURS, WIND_REFERENCE_HEIGHT};
use crate::utils::conversions::round_direction;
use crate::writers::columns::{FieldValue, LineLayout};

/// Decimals of the `wd` column
const DIRECTION_DECIMALS: usize = 1;

/// `4(I2,1X),F7.1,1X,I1,1X,F7.1,1X,F7.2,1X,F7.1,1X,F6.1,1X,F7.2`
pub fn pfl_layout() -> LineLayout {
    LineLayout::new("PFL")
        .integer("yr", 2, -9)
        .space(1)
        .integer("mo", 2, -9)
        .space(1)
        .integer("dy", 2, -9)
        .space(1)
        .integer("hr", 2, -9)
        .space(1)
        .fixed("height", 7, 1, -999.0)
        .space(1)
        .integer("top", 1, 9)
        .space(1)
        .fixed("wd", 7, 1, -9.0)
        .space(1)
        .fixed("ws", 7, 2, 999.0)
        .space(1)
        .fixed("temp", 7, 1, 999.0)
        .space(1)
        .fixed("sigma_a", 6, 1, 99.0)
        .space(1)
        .fixed("sigma_w", 7, 2, 99.0)
}

/// Index of the sounding closest to `hour` within the window; ties go to
/// the earlier sounding. `soundings` must be sorted by timestamp.
pub fn nearest_sounding(soundings: &[CorrectedSounding], hour: NaiveDateTime) -> Option<usize> {
    let window = Duration::hours(SOUNDING_WINDOW_HOURS);
    let split = soundings.partition_point(|s| s.timestamp < hour);

    let before = split.checked_sub(1).map(|i| (i, hour - soundings[i].timestamp));
    let after = soundings.get(split).map(|s| (split, s.timestamp - hour));

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if a.1 < b.1 {
                a
            } else {
                b
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    (best.1 <= window).then_some(best.0)
}

fn time_fields(hour: NaiveDateTime) -> [FieldValue; 4] {
    [
        FieldValue::Int(Some((hour.year() % 100) as i64)),
        FieldValue::Int(Some(hour.month() as i64)),
        FieldValue::Int(Some(hour.day() as i64)),
        FieldValue::Int(Some(hour.hour() as i64 + 1)),
    ]
}

/// Render one profile block per hour of `year`.
pub fn encode_profile(
    soundings: &[CorrectedSounding],
    station: &StationRequest,
    year: i32,
) -> Result<String> {
    let layout = pfl_layout();
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::Encoding(format!("Year {} is out of range", year)))?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ProcessingError::Encoding(format!("Year {} is out of range", year)))?;

    let mut out = String::new();
    let mut hour = start;
    while hour < end {
        let [yr, mo, dy, hr] = time_fields(hour);
        let levels = nearest_sounding(soundings, hour)
            .map(|i| &soundings[i].levels)
            .filter(|levels| !levels.is_empty());

        match levels {
            Some(levels) => {
                let last = levels.len() - 1;
                for (i, level) in levels.iter().enumerate() {
                    let c = &level.corrected;
                    let values = [
                        yr.clone(),
                        mo.clone(),
                        dy.clone(),
                        hr.clone(),
                        FieldValue::Real(Some(level.height() - station.elevation)),
                        FieldValue::Int(Some(i64::from(i == last))),
                        FieldValue::Real(
                            c.wind_direction.map(|d| round_direction(d, DIRECTION_DECIMALS)),
                        ),
                        FieldValue::Real(c.wind_speed),
                        FieldValue::Real(c.temperature),
                        FieldValue::Real(None),
                        FieldValue::Real(None),
                    ];
                    out.push_str(&layout.encode(&values)?);
                    out.push('\n');
                }
            }
            None => {
                let values = [
                    yr,
                    mo,
                    dy,
                    hr,
                    FieldValue::Real(Some(WIND_REFERENCE_HEIGHT)),
                    FieldValue::Int(Some(1)),
                    FieldValue::Real(None),
                    FieldValue::Real(None),
                    FieldValue::Real(None),
                    FieldValue::Real(None),
                    FieldValue::Real(None),
                ];
                out.push_str(&layout.encode(&values)?);
                out.push('\n');
            }
        }

        hour += Duration::hours(1);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrectedLevel, CorrectionFlag, LevelField, LevelRecord};
    use crate::readers::output_reader::{DecodedOutput, OutputKind};
    use crate::utils::constants::CALM_DIRECTION;
    use crate::writers::columns::assert_within_tolerance;
    use std::path::Path;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn level(pressure: f64, height: f64, speed: f64, direction: f64) -> CorrectedLevel {
        let record = LevelRecord {
            height: Some(height),
            temperature: Some(5.0),
            wind_speed: Some(speed),
            wind_direction: Some(direction),
            ..LevelRecord::new(pressure)
        };
        CorrectedLevel {
            measured: record.clone(),
            corrected: record,
            flags: [CorrectionFlag::Measured; LevelField::COUNT],
        }
    }

    fn sounding(day: u32, hour: u32) -> CorrectedSounding {
        CorrectedSounding {
            timestamp: at(day, hour),
            levels: vec![
                level(1000.0, 120.0, 3.0, 200.0),
                level(925.0, 780.0, 8.5, 240.0),
            ],
        }
    }

    fn station() -> StationRequest {
        StationRequest::builder("SiteA")
            .coordinates(51.5, -0.13)
            .elevation(20.0)
            .year(2021)
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout_width() {
        assert_eq!(pfl_layout().line_width(), 4 * 3 + 8 + 2 + 8 + 8 + 8 + 7 + 7);
    }

    #[test]
    fn test_nearest_sounding_window() {
        let soundings = vec![sounding(1, 0), sounding(1, 6), sounding(1, 12)];
        assert_eq!(nearest_sounding(&soundings, at(1, 0)), Some(0));
        assert_eq!(nearest_sounding(&soundings, at(1, 2)), Some(0));
        // Equidistant picks the earlier sounding
        assert_eq!(nearest_sounding(&soundings, at(1, 3)), Some(0));
        assert_eq!(nearest_sounding(&soundings, at(1, 4)), Some(1));
        assert_eq!(nearest_sounding(&soundings, at(1, 15)), Some(2));
        assert_eq!(nearest_sounding(&soundings, at(1, 16)), None);
        assert_eq!(nearest_sounding(&[], at(1, 0)), None);
    }

    #[test]
    fn test_profile_blocks() {
        let text = encode_profile(&[sounding(1, 0)], &station(), 2021).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        // 8760 hours; the first four are covered by the two-level sounding
        assert_eq!(lines.len(), 8760 + 4);
        assert_eq!(lines[0], "21  1  1  1   100.0 0   200.0    3.00     5.0   99.0   99.00");
        assert_eq!(lines[1], "21  1  1  1   760.0 1   240.0    8.50     5.0   99.0   99.00");
        assert_eq!(lines[8], "21  1  1  5    10.0 1    -9.0  999.00   999.0   99.0   99.00");
        assert!(lines.last().unwrap().starts_with("21 12 31 24"));
    }

    #[test]
    fn test_profile_decodes_within_tolerance() {
        let mut calm = level(925.0, 780.0, 0.2, CALM_DIRECTION);
        calm.corrected.temperature = None;
        let mut sounding = CorrectedSounding {
            timestamp: at(1, 0),
            levels: vec![level(1000.0, 120.37, 3.012, 200.04), calm],
        };
        let mut top = level(850.0, 1500.42, 12.341, 359.96);
        top.corrected.temperature = Some(-3.26);
        sounding.levels.push(top);

        let text = encode_profile(&[sounding], &station(), 2021).unwrap();
        let decoded = DecodedOutput::decode(OutputKind::Pfl, &text, Path::new("2021.PFL")).unwrap();
        assert_eq!(decoded.records.len(), 8760 + 4 * 2);

        let line = |hr: i64, height: f64, top: i64, wd: Option<f64>, ws: Option<f64>, temp: Option<f64>| {
            vec![
                FieldValue::Int(Some(21)),
                FieldValue::Int(Some(1)),
                FieldValue::Int(Some(1)),
                FieldValue::Int(Some(hr)),
                FieldValue::Real(Some(height)),
                FieldValue::Int(Some(top)),
                FieldValue::Real(wd),
                FieldValue::Real(ws),
                FieldValue::Real(temp),
                FieldValue::Real(None),
                FieldValue::Real(None),
            ]
        };
        let layout = pfl_layout();
        let expected = [
            line(1, 100.37, 0, Some(200.04), Some(3.012), Some(5.0)),
            line(1, 760.0, 0, Some(CALM_DIRECTION), Some(0.2), None),
            line(1, 1480.42, 1, Some(0.0), Some(12.341), Some(-3.26)),
        ];
        for (want, got) in expected.iter().zip(&decoded.records) {
            assert_within_tolerance(&layout, want, got);
        }
        // First hour past the sounding window
        assert_within_tolerance(
            &layout,
            &line(5, WIND_REFERENCE_HEIGHT, 1, None, None, None),
            &decoded.records[12],
        );
    }
}
