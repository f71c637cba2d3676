use std::fmt;

pub mod tabular;

/// A single cell of a loaded table
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Category(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(x) => write!(f, "{}", x),
            Value::Category(s) => f.write_str(s),
            Value::Missing => f.write_str("NA"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => f.write_str("numeric"),
            ColumnKind::Categorical => f.write_str("categorical"),
        }
    }
}

/// Raw tabular data as read from disk.
/// Every record holds exactly one value per column, in header order.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    kinds: Vec<ColumnKind>,
    records: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset, inferring each column's kind from its values.
    /// Returns None if any record's width differs from the header's.
    pub fn new(columns: Vec<String>, records: Vec<Vec<Value>>) -> Option<Dataset> {
        if records.iter().any(|r| r.len() != columns.len()) {
            return None;
        }

        let kinds = (0..columns.len())
            .map(|idx| {
                let numeric = records
                    .iter()
                    .all(|r| matches!(r[idx], Value::Number(_) | Value::Missing));
                if numeric {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Categorical
                }
            })
            .collect::<Vec<_>>();

        // A categorical column keeps its numeric-looking cells as text
        let records = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .zip(kinds.iter())
                    .map(|(value, kind)| match (value, kind) {
                        (Value::Number(x), ColumnKind::Categorical) => {
                            Value::Category(x.to_string())
                        }
                        (value, _) => value,
                    })
                    .collect()
            })
            .collect();

        Some(Dataset {
            columns,
            kinds,
            records,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn records(&self) -> &[Vec<Value>] {
        &self.records
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Look up a single cell by row and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.records.get(row).map(|r| &r[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_column_becomes_categorical() {
        let dataset = Dataset::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Number(1.0), Value::Number(3.0)],
                vec![Value::Missing, Value::Category("x".into())],
            ],
        )
        .unwrap();

        assert_eq!(dataset.kinds(), &[ColumnKind::Numeric, ColumnKind::Categorical]);
        assert_eq!(dataset.get(0, "b"), Some(&Value::Category("3".into())));
        assert_eq!(dataset.get(1, "a"), Some(&Value::Missing));
    }

    #[test]
    fn ragged_records_are_refused() {
        let dataset = Dataset::new(vec!["a".into()], vec![vec![Value::Missing, Value::Missing]]);
        assert!(dataset.is_none());
    }
}
