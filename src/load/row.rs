//! Parsing delimited source rows into tuples.

use std::sync::Arc;

use super::error::RowError;
use super::stats::StatisticsTracker;
use crate::datum::{Tuple, TupleDescriptor, Type, Value};

/// Layout of a delimited source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub separator: String,
    /// The first line names the columns and is never loaded.
    pub has_header: bool,
    /// Rows end with a trailing separator (as in `.tbl` dumps); drop the
    /// empty last field.
    pub skip_last_field: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: ",".into(),
            has_header: false,
            skip_last_field: false,
        }
    }
}

impl CsvOptions {
    /// Pipe-separated rows with a trailing separator and no header.
    pub fn tbl() -> Self {
        Self {
            separator: "|".into(),
            has_header: false,
            skip_last_field: true,
        }
    }
}

/// Turns lines into tuples of a fixed descriptor.
#[derive(Debug, Clone)]
pub struct RowParser {
    desc: Arc<TupleDescriptor>,
    options: CsvOptions,
}

impl RowParser {
    pub fn new(desc: Arc<TupleDescriptor>, options: CsvOptions) -> Self {
        Self { desc, options }
    }

    pub fn options(&self) -> &CsvOptions {
        &self.options
    }

    /// Parses one raw line, rejecting it if it is not UTF-8.
    pub fn parse_bytes(&self, line: &[u8]) -> Result<Tuple, RowError> {
        let line = std::str::from_utf8(line).map_err(|e| RowError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        self.parse(line)
    }

    /// Parses one line (without its terminator).
    ///
    /// Integers may be written in float notation and are truncated. Text
    /// longer than its field is cut at the last character boundary that
    /// fits.
    pub fn parse(&self, line: &str) -> Result<Tuple, RowError> {
        let mut raw: Vec<&str> = line.split(self.options.separator.as_str()).collect();
        if self.options.skip_last_field {
            raw.pop();
        }
        if raw.len() != self.desc.len() {
            return Err(RowError::FieldCount {
                expected: self.desc.len(),
                actual: raw.len(),
            });
        }

        let values = self
            .desc
            .fields()
            .iter()
            .zip(raw)
            .map(|(field, raw)| {
                let mismatch = || RowError::TypeMismatch {
                    field: field.name.clone(),
                    raw: raw.to_string(),
                    ty: field.ty,
                };
                Ok(match field.ty {
                    Type::Int64 => {
                        let s = raw.trim();
                        match s.parse::<i64>() {
                            Ok(v) => Value::Int64(v),
                            Err(_) => {
                                let f = s.parse::<f64>().map_err(|_| mismatch())?;
                                if !f.is_finite() {
                                    return Err(mismatch());
                                }
                                Value::Int64(f as i64)
                            }
                        }
                    }
                    Type::Float64 => Value::Float64(raw.trim().parse().map_err(|_| mismatch())?),
                    Type::Text { width } => Value::Text(truncate(raw, width).to_string()),
                })
            })
            .collect::<Result<Vec<_>, RowError>>()?;

        Ok(Tuple::new(Arc::clone(&self.desc), values)?)
    }
}

fn truncate(s: &str, width: usize) -> &str {
    if s.len() <= width {
        return s;
    }
    let mut end = width;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Rejects rows whose numeric values stray too far from a frozen mean.
#[derive(Debug, Clone)]
pub struct OutlierGate {
    /// (field index, field name, low, high)
    bounds: Vec<(usize, String, f64, f64)>,
}

impl OutlierGate {
    /// Accepts values within `mean ± k * std_dev` of each numeric field.
    pub fn from_stats(desc: &TupleDescriptor, stats: &mut StatisticsTracker, k: f64) -> Self {
        let bounds = desc
            .fields()
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let s = stats.field_mut(&f.name)?;
                if s.count() == 0 {
                    return None;
                }
                let spread = k * s.std_dev();
                Some((i, f.name.clone(), s.mean() - spread, s.mean() + spread))
            })
            .collect();
        Self { bounds }
    }

    pub fn check(&self, tuple: &Tuple) -> Result<(), RowError> {
        for (i, name, low, high) in &self.bounds {
            let Some(value) = tuple.value(*i).and_then(Value::as_f64) else {
                continue;
            };
            if value < *low || value > *high {
                return Err(RowError::Outlier {
                    field: name.clone(),
                    value,
                    low: *low,
                    high: *high,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::FieldType;
    use crate::load::stats::FieldStatistics;
    use std::collections::BTreeMap;

    fn desc() -> Arc<TupleDescriptor> {
        Arc::new(TupleDescriptor::new(vec![
            FieldType::int64("id"),
            FieldType::float64("price"),
            FieldType::text("name", 4),
        ]))
    }

    #[test]
    fn test_parse_csv_row() {
        let parser = RowParser::new(desc(), CsvOptions::default());
        let tuple = parser.parse("7, 1.25,bob").unwrap();
        assert_eq!(
            tuple.values(),
            &[
                Value::Int64(7),
                Value::Float64(1.25),
                Value::Text("bob".into())
            ]
        );
    }

    #[test]
    fn test_parse_tbl_row() {
        let parser = RowParser::new(desc(), CsvOptions::tbl());
        let tuple = parser.parse("3.0|2|widgets|").unwrap();
        assert_eq!(tuple.value(0), Some(&Value::Int64(3)));
        assert_eq!(tuple.value(1), Some(&Value::Float64(2.0)));
        assert_eq!(tuple.value(2), Some(&Value::Text("widg".into())));
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        assert_eq!(truncate("aé", 2), "a");
        assert_eq!(truncate("abc", 5), "abc");
    }

    #[test]
    fn test_field_count() {
        let parser = RowParser::new(desc(), CsvOptions::default());
        assert!(matches!(
            parser.parse("1,2"),
            Err(RowError::FieldCount {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let desc = Arc::new(TupleDescriptor::new(vec![
            FieldType::int64("id"),
            FieldType::text("name", 8),
        ]));
        let parser = RowParser::new(desc, CsvOptions::default());
        assert!(matches!(
            parser.parse_bytes(b"1,ab\xffcd"),
            Err(RowError::InvalidUtf8 { valid_up_to: 4 })
        ));
        let tuple = parser.parse_bytes(b"1,abcd").unwrap();
        assert_eq!(tuple.value(1), Some(&Value::Text("abcd".into())));
    }

    #[test]
    fn test_type_mismatch() {
        let parser = RowParser::new(desc(), CsvOptions::default());
        assert!(matches!(
            parser.parse("one,2,x"),
            Err(RowError::TypeMismatch { ref field, .. }) if field == "id"
        ));
        assert!(matches!(
            parser.parse("1,two,x"),
            Err(RowError::TypeMismatch { ref field, .. }) if field == "price"
        ));
    }

    #[test]
    fn test_outlier_gate() {
        let desc = desc();
        let mut stats = StatisticsTracker::default();
        stats.freeze(
            BTreeMap::from([
                // mean 10, population deviation 2
                ("price".to_string(), FieldStatistics::from_two_pass(4, 10.0, 16.0)),
            ]),
            4,
        );
        let gate = OutlierGate::from_stats(&desc, &mut stats, 2.0);
        let parser = RowParser::new(desc, CsvOptions::default());

        gate.check(&parser.parse("1,13.9,a").unwrap()).unwrap();
        gate.check(&parser.parse("1,6,a").unwrap()).unwrap();
        assert!(matches!(
            gate.check(&parser.parse("1,14.5,a").unwrap()),
            Err(RowError::Outlier { ref field, .. }) if field == "price"
        ));
    }
}
