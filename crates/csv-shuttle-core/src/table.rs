//! In-memory table model.
//!
//! A [`Table`] is a header plus an ordered list of rows. Every field is an
//! opaque string: no type inference happens anywhere. Rows are *expected*
//! to match the header width but this is not enforced; ragged rows travel
//! through untouched unless a column reconciliation forces a reindex.
//!
//! # Concatenation
//!
//! [`concat`] builds the union of all column sets in order of first
//! appearance. Tables whose columns already equal the union are appended
//! verbatim. Other tables are reindexed by header position:
//!
//! - a column the table lacks becomes an empty field,
//! - fields beyond the table's own header width are kept, appended after
//!   the mapped columns.
//!
//! Header names are made unique first (see [`unique_columns`]), so a
//! repeated or blank header cell never folds two fields into one slot.

use std::collections::{HashMap, HashSet};

/// A header-carrying table of string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Make header names unique, see [`unique_columns`].
    pub fn dedupe_columns(&mut self) {
        self.columns = unique_columns(&self.columns);
    }

    /// Remove every column for which `drop` returns true, from the header and
    /// from each row. Rows too short to hold a dropped position are left as is
    /// at that position.
    ///
    /// Returns the number of header columns removed.
    pub fn drop_columns_where<F>(&mut self, drop: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let doomed: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| drop(name))
            .map(|(i, _)| i)
            .collect();

        for &idx in doomed.iter().rev() {
            self.columns.remove(idx);
            for row in &mut self.rows {
                if idx < row.len() {
                    row.remove(idx);
                }
            }
        }
        doomed.len()
    }

    /// Append a column whose value is the same for every row.
    ///
    /// Rows shorter than the current header are padded with empty fields first
    /// so the new value lands under its own column.
    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        let width = self.columns.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
            row.push(value.to_string());
        }
        self.columns.push(name.to_string());
    }
}

/// Rename blank and repeated header names so every name is distinct.
///
/// A blank name at position `i` becomes `Unnamed: i`. The second and later
/// occurrences of a name become `name.1`, `name.2`, ..., skipping any
/// suffix already taken by another column.
pub fn unique_columns(columns: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(columns.len());

    for (i, name) in columns.iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name.clone()
        };
        let mut candidate = base.clone();
        if seen.contains(&candidate) {
            let counter = counters.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                candidate = format!("{}.{}", base, counter);
                if !seen.contains(&candidate) && !columns.contains(&candidate) {
                    break;
                }
            }
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Concatenate tables in order, reconciling differing column sets by union.
///
/// Row order within each table and table order are both preserved. An empty
/// input yields an empty table with no columns.
pub fn concat(tables: Vec<Table>) -> Table {
    let tables: Vec<Table> = tables
        .into_iter()
        .map(|mut table| {
            table.dedupe_columns();
            table
        })
        .collect();

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for table in &tables {
        for name in &table.columns {
            if !positions.contains_key(name) {
                positions.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
    }

    let total: usize = tables.iter().map(Table::row_count).sum();
    let mut rows = Vec::with_capacity(total);

    for table in tables {
        if table.columns == columns {
            rows.extend(table.rows);
            continue;
        }

        let mapping: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
        for row in table.rows {
            let mut out = vec![String::new(); columns.len()];
            let mut surplus = Vec::new();
            for (i, field) in row.into_iter().enumerate() {
                match mapping.get(i) {
                    Some(&pos) => out[pos] = field,
                    None => surplus.push(field),
                }
            }
            out.extend(surplus);
            rows.push(out);
        }
    }

    Table { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_concat_same_columns_keeps_order() {
        let a = table(&["id", "name"], &[&["1", "a"], &["2", "b"]]);
        let b = table(&["id", "name"], &[&["3", "c"]]);
        let merged = concat(vec![a, b]);
        assert_eq!(merged.columns, vec!["id", "name"]);
        let ids: Vec<&str> = merged.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_concat_unions_columns_in_first_seen_order() {
        let a = table(&["id", "name"], &[&["1", "a"]]);
        let b = table(&["name", "score"], &[&["b", "9"]]);
        let merged = concat(vec![a, b]);
        assert_eq!(merged.columns, vec!["id", "name", "score"]);
        assert_eq!(merged.rows[0], vec!["1", "a", ""]);
        assert_eq!(merged.rows[1], vec!["", "b", "9"]);
    }

    #[test]
    fn test_concat_superset_columns() {
        let a = table(&["id"], &[&["1"]]);
        let b = table(&["id", "extra"], &[&["2", "x"]]);
        let merged = concat(vec![a, b]);
        assert_eq!(merged.columns, vec!["id", "extra"]);
        assert_eq!(merged.rows, vec![vec!["1", ""], vec!["2", "x"]]);
    }

    #[test]
    fn test_concat_ragged_rows_pass_through_when_aligned() {
        let a = table(&["id", "name"], &[&["1"], &["2", "b", "surplus"]]);
        let merged = concat(vec![a]);
        assert_eq!(merged.rows[0], vec!["1"]);
        assert_eq!(merged.rows[1], vec!["2", "b", "surplus"]);
    }

    #[test]
    fn test_concat_reindex_keeps_surplus_fields() {
        let a = table(&["id", "name"], &[&["1", "a"]]);
        let b = table(&["name"], &[&["b", "stray"]]);
        let merged = concat(vec![a, b]);
        assert_eq!(merged.rows[1], vec!["", "b", "stray"]);
    }

    #[test]
    fn test_concat_keeps_every_field_of_repeated_header() {
        let a = table(&["a", "a", "b"], &[&["1", "2", "3"]]);
        let merged = concat(vec![a]);
        assert_eq!(merged.columns, vec!["a", "a.1", "b"]);
        assert_eq!(merged.rows[0], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_concat_blank_headers_from_trailing_commas() {
        let a = table(&["x", "", ""], &[&["1", "2", "3"]]);
        let b = table(&["x"], &[&["4"]]);
        let merged = concat(vec![a, b]);
        assert_eq!(merged.columns, vec!["x", "Unnamed: 1", "Unnamed: 2"]);
        assert_eq!(merged.rows[0], vec!["1", "2", "3"]);
        assert_eq!(merged.rows[1], vec!["4", "", ""]);
    }

    #[test]
    fn test_unique_columns_skips_taken_suffix() {
        let names: Vec<String> = ["a", "a.1", "a", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_columns(&names), vec!["a", "a.1", "a.2", "a.3"]);
    }

    #[test]
    fn test_concat_empty() {
        let merged = concat(Vec::new());
        assert!(merged.columns.is_empty());
        assert_eq!(merged.row_count(), 0);
    }

    #[test]
    fn test_drop_columns_where() {
        let mut t = table(&["a", "b", "c"], &[&["1", "2", "3"], &["4"]]);
        let removed = t.drop_columns_where(|c| c == "b" || c == "c");
        assert_eq!(removed, 2);
        assert_eq!(t.columns, vec!["a"]);
        assert_eq!(t.rows, vec![vec!["1"], vec!["4"]]);
    }

    #[test]
    fn test_push_constant_column_pads_short_rows() {
        let mut t = table(&["a", "b"], &[&["1"], &["2", "3"]]);
        t.push_constant_column("src", "f.csv");
        assert_eq!(t.columns, vec!["a", "b", "src"]);
        assert_eq!(t.rows[0], vec!["1", "", "f.csv"]);
        assert_eq!(t.rows[1], vec!["2", "3", "f.csv"]);
    }
}
