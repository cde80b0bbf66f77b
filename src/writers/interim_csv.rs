use chrono::{Datelike, Timelike};
use csv::Writer;

use crate::error::{ProcessingError, Result};
use crate::models::{CorrectedSurfaceRecord, SurfaceField};

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn interim_header() -> Vec<String> {
    let mut header: Vec<String> = ["year", "month", "day", "hour"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for field in SurfaceField::ALL {
        header.push(field.column().to_string());
        header.push(format!("{}_measured", field.column()));
        header.push(format!("{}_flag", field.column()));
    }
    header
}

/// Onsite-style hourly table: hour ending 1-24, corrected value, measured
/// value and correction flag for every field. Missing values are empty.
pub fn encode_surface_table(records: &[CorrectedSurfaceRecord]) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(interim_header())?;

    for record in records {
        let ts = record.timestamp();
        let mut row = vec![
            ts.year().to_string(),
            ts.month().to_string(),
            ts.day().to_string(),
            (ts.hour() + 1).to_string(),
        ];
        for field in SurfaceField::ALL {
            row.push(cell(record.corrected.get(field)));
            row.push(cell(record.measured.get(field)));
            row.push(record.flag(field).as_str().to_string());
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ProcessingError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrectionFlag, SurfaceRecord};
    use chrono::NaiveDate;

    #[test]
    fn test_surface_table() {
        let ts = NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut measured = SurfaceRecord::missing(ts);
        measured.wind_speed = Some(0.2);
        measured.wind_direction = Some(360.0);
        let mut corrected = measured.clone();
        corrected.wind_direction = Some(999.0);

        let mut flags = [CorrectionFlag::Missing; SurfaceField::COUNT];
        flags[SurfaceField::WindSpeed.index()] = CorrectionFlag::Measured;
        flags[SurfaceField::WindDirection.index()] = CorrectionFlag::Calm;

        let bytes = encode_surface_table(&[CorrectedSurfaceRecord {
            measured,
            corrected,
            flags,
        }])
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("year,month,day,hour,wind_speed,wind_speed_measured,wind_speed_flag,wind_direction"));
        assert_eq!(header.split(',').count(), 4 + 3 * SurfaceField::COUNT);

        let row = lines.next().unwrap();
        assert!(row.starts_with("2021,7,4,1,0.2,0.2,M,999,360,C,,,X"));
    }
}
