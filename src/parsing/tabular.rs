use super::{Dataset, Value};
use crate::error::LoadError;
use log::{debug, info};
use std::collections::HashSet;
use std::path::Path;

const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "nan", "null", "?"];

fn is_missing(s: &str) -> bool {
    MISSING_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m))
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Convert a trimmed field of a column. Missing markers become `Missing`;
/// in a numeric column everything else is a `Number`, in a categorical
/// column it is kept verbatim as a label
fn parse_cell(s: &str, numeric: bool) -> Value {
    if is_missing(s) {
        return Value::Missing;
    }

    match parse_number(s) {
        Some(x) if numeric => Value::Number(x),
        _ => Value::Category(s.to_string()),
    }
}

/// Read a comma separated file with a header row into a Dataset
pub fn load_dataset(path: &Path) -> Result<Dataset, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| LoadError::Malformed { line: 1, source })?
        .clone();

    if headers.is_empty() {
        return Err(LoadError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(headers.len());
    for (position, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(LoadError::EmptyColumnName { position });
        }
        if !seen.insert(name) {
            return Err(LoadError::DuplicateColumn(name.to_string()));
        }
        columns.push(name.to_string());
    }

    let mut raw: Vec<csv::StringRecord> = vec![];

    for result in reader.records() {
        let record = result.map_err(|source| LoadError::Malformed {
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Blank trailing lines are skipped by the reader, anything else must be full width
        if record.len() != columns.len() {
            return Err(LoadError::Ragged {
                line,
                expected: columns.len(),
                found: record.len(),
            });
        }

        raw.push(record);
    }

    // A column is numeric only if every present field parses as a number,
    // so labels such as "007" survive untouched in categorical columns
    let numeric: Vec<bool> = (0..columns.len())
        .map(|idx| {
            raw.iter()
                .map(|r| &r[idx])
                .filter(|s| !is_missing(s))
                .all(|s| parse_number(s).is_some())
        })
        .collect();

    let records = raw
        .iter()
        .map(|record| {
            record
                .iter()
                .zip(&numeric)
                .map(|(s, &numeric)| parse_cell(s, numeric))
                .collect::<Vec<_>>()
        })
        .collect();

    debug!("parsed {} columns from {}", columns.len(), path.display());

    let num_columns = columns.len();
    let dataset = Dataset::new(columns, records).ok_or(LoadError::Ragged {
        line: 0,
        expected: num_columns,
        found: 0,
    })?;

    info!(
        "loaded {} records with {} columns from {}",
        dataset.num_records(),
        num_columns,
        path.display()
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::ColumnKind;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_numeric_and_categorical_columns() {
        let file = write_file("size, colour ,price\n1.5,red,10\n2,blue,NA\n,red,12\n");
        let dataset = load_dataset(file.path()).unwrap();

        assert_eq!(dataset.columns(), &["size", "colour", "price"]);
        assert_eq!(
            dataset.kinds(),
            &[ColumnKind::Numeric, ColumnKind::Categorical, ColumnKind::Numeric]
        );
        assert_eq!(dataset.num_records(), 3);
        assert_eq!(dataset.get(1, "price"), Some(&Value::Missing));
        assert_eq!(dataset.get(2, "size"), Some(&Value::Missing));
        assert_eq!(dataset.get(0, "colour"), Some(&Value::Category("red".into())));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_dataset(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn ragged_row_is_rejected() {
        let file = write_file("a,b\n1,2\n3\n");
        let err = load_dataset(file.path()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Ragged {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let file = write_file("a,a\n1,2\n");
        let err = load_dataset(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn empty_file_has_no_header() {
        let file = write_file("");
        let err = load_dataset(file.path()).unwrap_err();
        assert!(matches!(err, LoadError::MissingHeader { .. }));
    }

    #[test]
    fn infinite_values_are_categories() {
        assert_eq!(parse_cell("inf", true), Value::Category("inf".into()));
        assert_eq!(parse_cell("NaN", true), Value::Missing);
        assert_eq!(parse_cell("-3e2", true), Value::Number(-300.0));
        assert_eq!(parse_cell("-3e2", false), Value::Category("-3e2".into()));
    }

    #[test]
    fn categorical_columns_keep_number_like_labels_verbatim() {
        let file = write_file("code,y\n007,1\nabc,2\n1.50,3\n1e2,4\nNA,5\n");
        let dataset = load_dataset(file.path()).unwrap();

        assert_eq!(dataset.kinds(), &[ColumnKind::Categorical, ColumnKind::Numeric]);
        let codes: Vec<&Value> = (0..5).map(|row| dataset.get(row, "code").unwrap()).collect();
        assert_eq!(
            codes,
            vec![
                &Value::Category("007".into()),
                &Value::Category("abc".into()),
                &Value::Category("1.50".into()),
                &Value::Category("1e2".into()),
                &Value::Missing,
            ]
        );
    }
}
