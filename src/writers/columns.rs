//! Fixed-column line layouts in the Fortran edit-descriptor style (`I5`,
//! `F7.2`, `A7`, `1X`). A layout both encodes and decodes, so every file the
//! writers produce can be read back against the same column definitions.

use crate::error::{ProcessingError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// `Iw`; optionally zero padded
    Integer { missing: i64, zero_pad: bool },
    /// `Fw.d`; a precision of zero keeps the trailing point, as Fortran does
    Fixed { precision: usize, missing: f64 },
    /// `Aw`
    Text { left_align: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Zero-based offset into the line
    pub start: usize,
    pub width: usize,
    pub kind: FieldKind,
}

impl ColumnSpec {
    pub fn end(&self) -> usize {
        self.start + self.width
    }

    /// Half a unit of the last written digit
    pub fn tolerance(&self) -> f64 {
        match self.kind {
            FieldKind::Integer { .. } => 0.5,
            FieldKind::Fixed { precision, .. } => 0.5 * 10f64.powi(-(precision as i32)),
            FieldKind::Text { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(Option<i64>),
    Real(Option<f64>),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => v.map(|n| n as f64),
            FieldValue::Real(v) => *v,
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => *v,
            FieldValue::Real(v) => v.map(|x| x.round() as i64),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineLayout {
    name: &'static str,
    columns: Vec<ColumnSpec>,
    width: usize,
}

impl LineLayout {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            columns: Vec::new(),
            width: 0,
        }
    }

    fn push(mut self, name: &'static str, width: usize, kind: FieldKind) -> Self {
        self.columns.push(ColumnSpec {
            name,
            start: self.width,
            width,
            kind,
        });
        self.width += width;
        self
    }

    pub fn integer(self, name: &'static str, width: usize, missing: i64) -> Self {
        self.push(
            name,
            width,
            FieldKind::Integer {
                missing,
                zero_pad: false,
            },
        )
    }

    pub fn zero_padded(self, name: &'static str, width: usize, missing: i64) -> Self {
        self.push(
            name,
            width,
            FieldKind::Integer {
                missing,
                zero_pad: true,
            },
        )
    }

    pub fn fixed(self, name: &'static str, width: usize, precision: usize, missing: f64) -> Self {
        self.push(name, width, FieldKind::Fixed { precision, missing })
    }

    pub fn text(self, name: &'static str, width: usize) -> Self {
        self.push(name, width, FieldKind::Text { left_align: false })
    }

    pub fn left_text(self, name: &'static str, width: usize) -> Self {
        self.push(name, width, FieldKind::Text { left_align: true })
    }

    /// `nX`
    pub fn space(mut self, count: usize) -> Self {
        self.width += count;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn line_width(&self) -> usize {
        self.width
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Render one line, without the trailing newline.
    pub fn encode(&self, values: &[FieldValue]) -> Result<String> {
        if values.len() != self.columns.len() {
            return Err(ProcessingError::Encoding(format!(
                "{} layout expects {} fields, got {}",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }

        let mut line = String::with_capacity(self.width);
        for (column, value) in self.columns.iter().zip(values) {
            while line.len() < column.start {
                line.push(' ');
            }
            line.push_str(&self.encode_field(column, value)?);
        }
        while line.len() < self.width {
            line.push(' ');
        }

        Ok(line)
    }

    fn encode_field(&self, column: &ColumnSpec, value: &FieldValue) -> Result<String> {
        let width = column.width;
        let text = match (column.kind, value) {
            (FieldKind::Integer { missing, zero_pad }, FieldValue::Int(v)) => {
                let n = v.unwrap_or(missing);
                if zero_pad && n >= 0 {
                    format!("{:0width$}", n, width = width)
                } else {
                    format!("{:>width$}", n, width = width)
                }
            }
            (FieldKind::Fixed { precision, missing }, FieldValue::Real(v)) => {
                let x = match v {
                    Some(x) if !x.is_finite() => {
                        return Err(self.field_error(column, &format!("non-finite value {}", x)))
                    }
                    Some(x) => *x,
                    None => missing,
                };
                format!("{:>width$}", format_fixed(x, precision), width = width)
            }
            (FieldKind::Text { left_align }, FieldValue::Text(s)) => {
                if !s.is_ascii() {
                    return Err(self.field_error(column, "non-ASCII text"));
                }
                if left_align {
                    format!("{:<width$}", s, width = width)
                } else {
                    format!("{:>width$}", s, width = width)
                }
            }
            (kind, value) => {
                return Err(self.field_error(
                    column,
                    &format!("value {:?} does not fit column kind {:?}", value, kind),
                ))
            }
        };

        if text.len() > width {
            return Err(self.field_error(
                column,
                &format!("'{}' overflows width {}", text.trim(), width),
            ));
        }
        Ok(text)
    }

    fn field_error(&self, column: &ColumnSpec, message: &str) -> ProcessingError {
        ProcessingError::Encoding(format!(
            "{} column '{}': {}",
            self.name, column.name, message
        ))
    }

    /// Parse one line back into field values; sentinels become `None`.
    pub fn decode(&self, line: &str) -> Result<Vec<FieldValue>> {
        if !line.is_ascii() {
            return Err(ProcessingError::Encoding(format!(
                "{} line is not ASCII",
                self.name
            )));
        }
        let line = line.trim_end_matches(['\r', '\n']);

        self.columns
            .iter()
            .map(|column| {
                let end = column.end().min(line.len());
                let raw = line.get(column.start.min(end)..end).unwrap_or("").trim();
                self.decode_field(column, raw)
            })
            .collect()
    }

    fn decode_field(&self, column: &ColumnSpec, raw: &str) -> Result<FieldValue> {
        match column.kind {
            FieldKind::Integer { missing, .. } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| self.field_error(column, &format!("bad integer '{}'", raw)))?;
                Ok(FieldValue::Int(if n == missing { None } else { Some(n) }))
            }
            FieldKind::Fixed { missing, .. } => {
                let x: f64 = raw
                    .parse()
                    .map_err(|_| self.field_error(column, &format!("bad number '{}'", raw)))?;
                let is_missing = (x - missing).abs() < column.tolerance();
                Ok(FieldValue::Real(if is_missing { None } else { Some(x) }))
            }
            FieldKind::Text { .. } => Ok(FieldValue::Text(raw.to_string())),
        }
    }
}

/// `Fw.d` body without padding. Negative zero prints unsigned.
fn format_fixed(value: f64, precision: usize) -> String {
    let mut text = format!("{:.*}", precision, value);
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text.remove(0);
    }
    if precision == 0 {
        text.push('.');
    }
    text
}

/// Assert that `decoded` reproduces `expected` column by column: numbers
/// within half a unit of the last digit, sentinels back as `None`.
#[cfg(test)]
pub(crate) fn assert_within_tolerance(
    layout: &LineLayout,
    expected: &[FieldValue],
    decoded: &[FieldValue],
) {
    assert_eq!(expected.len(), decoded.len());
    for ((column, want), got) in layout.columns().iter().zip(expected).zip(decoded) {
        match (want, got) {
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                assert_eq!(a.trim(), b, "{} column '{}'", layout.name(), column.name)
            }
            _ => match (want.as_f64(), got.as_f64()) {
                (Some(a), Some(b)) => assert!(
                    (a - b).abs() <= column.tolerance() + 1e-9,
                    "{} column '{}': wrote {}, read {}",
                    layout.name(),
                    column.name,
                    a,
                    b
                ),
                (a, b) => assert_eq!(a, b, "{} column '{}'", layout.name(), column.name),
            },
        }
    }
}
