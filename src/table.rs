use std::io::Read;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::TableError;

/// Ground-truth label column. 1 = healthy, 0 = unhealthy.
pub const GROUND_TRUTH: &str = "Engine Condition";
/// Column appended to the download.
pub const PREDICTED: &str = "Predicted Condition";

/// One uploaded CSV. Cells stay as the uploaded text so the download
/// reproduces the user's values verbatim; numbers are parsed on demand.
#[derive(Debug, Clone)]
pub struct SensorTable {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl SensorTable {
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        // flexible(false) makes ragged rows a csv::Error
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(TableError::NoHeader);
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?);
        }
        if rows.is_empty() {
            return Err(TableError::Empty);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_csv_bytes(data: &[u8]) -> Result<Self, TableError> {
        Self::from_csv_reader(data)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Raw cell text, row-major.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        self.rows.iter().map(|r| r.iter().collect())
    }

    /// First `n` rows, for the upload preview.
    pub fn head(&self, n: usize) -> Vec<Vec<&str>> {
        self.rows().take(n).collect()
    }

    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumns(vec![name.to_string()]))?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, record)| parse_number(name, row, &record[idx]))
            .collect()
    }

    /// Parses the ground-truth column when the upload carries one.
    pub fn ground_truth(&self) -> Result<Option<Vec<i64>>, TableError> {
        let Some(idx) = self.column_index(GROUND_TRUTH) else {
            return Ok(None);
        };
        self.rows
            .iter()
            .enumerate()
            .map(|(row, record)| parse_label(GROUND_TRUTH, row, &record[idx]))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Serializes the table with one extra column appended to every row.
    pub fn to_csv_with_column<T: ToString>(
        &self,
        name: &str,
        values: &[T],
    ) -> Result<Vec<u8>, TableError> {
        debug_assert_eq!(values.len(), self.rows.len());
        let mut wtr = WriterBuilder::new().from_writer(Vec::new());

        let mut header = self.headers.clone();
        header.push(name.to_string());
        wtr.write_record(&header)?;

        for (record, value) in self.rows.iter().zip(values) {
            let value = value.to_string();
            wtr.write_record(record.iter().chain(std::iter::once(value.as_str())))?;
        }

        wtr.into_inner()
            .map_err(|e| TableError::Csv(csv::Error::from(e.into_error())))
    }
}

pub(crate) fn parse_number(column: &str, row: usize, value: &str) -> Result<f64, TableError> {
    value.trim().parse::<f64>().map_err(|_| TableError::NotNumeric {
        column: column.to_string(),
        row: row + 1,
        value: value.to_string(),
    })
}

/// Accepts `1`, `0` and float spellings of whole numbers such as `1.0`.
fn parse_label(column: &str, row: usize, value: &str) -> Result<i64, TableError> {
    let v = value.trim();
    if let Ok(n) = v.parse::<i64>() {
        return Ok(n);
    }
    match v.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => Err(TableError::NotLabel {
            column: column.to_string(),
            row: row + 1,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Engine rpm,Lub oil pressure,Fuel pressure,Coolant pressure,lub oil temp,Coolant temp,Engine Condition\n\
700,2.49,11.79,3.17,84.14,81.63,1\n\
876,2.94,16.19,2.46,77.64,82.44,0\n";

    #[test]
    fn parses_headers_and_rows() {
        let t = SensorTable::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.headers().len(), 7);
        assert!(t.has_column(GROUND_TRUTH));
        assert_eq!(t.numeric_column("Engine rpm").unwrap(), vec![700.0, 876.0]);
        assert_eq!(t.ground_truth().unwrap(), Some(vec![1, 0]));
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = SensorTable::from_csv_bytes(b"a,b\n").unwrap_err();
        assert!(matches!(err, TableError::Empty));
    }

    #[test]
    fn ragged_row_is_rejected() {
        let err = SensorTable::from_csv_bytes(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, TableError::Csv(_)));
    }

    #[test]
    fn non_numeric_cell_names_row_and_column() {
        let t = SensorTable::from_csv_bytes(b"a,b\n1,2\nx,4\n").unwrap();
        let err = t.numeric_column("a").unwrap_err();
        assert_eq!(err.to_string(), "column 'a' row 2: 'x' is not a number");
    }

    #[test]
    fn label_accepts_float_spelling() {
        let t = SensorTable::from_csv_bytes(b"Engine Condition\n1.0\n0\n").unwrap();
        assert_eq!(t.ground_truth().unwrap(), Some(vec![1, 0]));
    }

    #[test]
    fn appended_column_keeps_original_text() {
        let t = SensorTable::from_csv_bytes(b"a,b\n1.50,2\n3,4\n").unwrap();
        let out = t.to_csv_with_column(PREDICTED, &[1, 0]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "a,b,Predicted Condition\n1.50,2,1\n3,4,0\n");
    }

    #[test]
    fn bom_is_stripped_from_first_header() {
        let t = SensorTable::from_csv_bytes("\u{feff}a,b\n1,2\n".as_bytes()).unwrap();
        assert_eq!(t.headers()[0], "a");
    }
}
