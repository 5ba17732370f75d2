//! Category-Trend Aggregator.
//!
//! Folds the term stream into a category × year count matrix. Accumulation is
//! a plain cell-wise sum, so the result does not depend on stream order and
//! partial matrices from separate shards merge by addition.

use crate::error::{Result, TrendsError};
use crate::pipeline::TermReducer;
use crate::store::StoreEntry;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

/// Column header of the year axis in the trend table
pub const YEAR_COLUMN: &str = "Year";

/// Table label of a category literally named [`YEAR_COLUMN`]
pub const YEAR_CATEGORY_LABEL: &str = "Year (category)";

/// Sparse category → year → count matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryYearMatrix {
    cells: BTreeMap<String, BTreeMap<i32, u64>>,
}

impl CategoryYearMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, category: &str, year: i32, n: u64) {
        if n == 0 {
            return;
        }
        match self.cells.get_mut(category) {
            Some(years) => *years.entry(year).or_insert(0) += n,
            None => {
                self.cells
                    .insert(category.to_string(), BTreeMap::from([(year, n)]));
            }
        }
    }

    /// Count for one cell; absent cells are 0
    pub fn get(&self, category: &str, year: i32) -> u64 {
        self.cells
            .get(category)
            .and_then(|years| years.get(&year))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Categories in sorted order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Sorted distinct years observed in any category
    pub fn years(&self) -> Vec<i32> {
        self.cells
            .values()
            .flat_map(|years| years.keys().copied())
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect()
    }

    pub fn category_total(&self, category: &str) -> u64 {
        self.cells
            .get(category)
            .map(|years| years.values().sum())
            .unwrap_or(0)
    }

    pub fn year_total(&self, year: i32) -> u64 {
        self.cells
            .values()
            .filter_map(|years| years.get(&year))
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.cells.values().flat_map(|years| years.values()).sum()
    }

    /// Copy of the matrix keeping only years ≤ `cutoff`.
    ///
    /// A category whose every year is past the cutoff disappears.
    pub fn restrict_to(&self, cutoff: i32) -> CategoryYearMatrix {
        let cells = self
            .cells
            .iter()
            .filter_map(|(category, years)| {
                let kept: BTreeMap<i32, u64> =
                    years.range(..=cutoff).map(|(y, n)| (*y, *n)).collect();
                (!kept.is_empty()).then(|| (category.clone(), kept))
            })
            .collect();
        CategoryYearMatrix { cells }
    }

    /// Cell-wise sum with another partial matrix
    pub fn merge(&mut self, other: CategoryYearMatrix) {
        for (category, years) in other.cells {
            for (year, n) in years {
                self.add(&category, year, n);
            }
        }
    }

    /// Dense table: one row per year ascending, one column per category.
    ///
    /// A category named like the year column is relabelled
    /// [`YEAR_CATEGORY_LABEL`].
    pub fn to_table(&self) -> TrendTable {
        let years = self.years();
        let rows = years
            .iter()
            .map(|year| self.categories().map(|c| self.get(c, *year)).collect())
            .collect();
        let categories = self
            .categories()
            .map(|c| match c {
                YEAR_COLUMN => YEAR_CATEGORY_LABEL.to_string(),
                other => other.to_string(),
            })
            .collect();
        TrendTable {
            years,
            categories,
            rows,
        }
    }
}

/// Dense year × category table, the on-disk form of the matrix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendTable {
    pub years: Vec<i32>,
    pub categories: Vec<String>,
    /// `rows[i][j]` is the count of `categories[j]` in `years[i]`
    pub rows: Vec<Vec<u64>>,
}

impl TrendTable {
    /// Write as CSV with a `Year` column followed by one column per category.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        let mut header = vec![YEAR_COLUMN.to_string()];
        header.extend(self.categories.iter().cloned());
        wtr.write_record(&header)?;
        for (year, row) in self.years.iter().zip(&self.rows) {
            let mut record = vec![year.to_string()];
            record.extend(row.iter().map(u64::to_string));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Parse a table previously written by [`TrendTable::write_csv`].
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        if headers.get(0) != Some(YEAR_COLUMN) {
            return Err(TrendsError::Validation(format!(
                "trend table must start with a '{}' column",
                YEAR_COLUMN
            )));
        }
        let categories: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut table = TrendTable {
            categories,
            ..Default::default()
        };
        for record in rdr.records() {
            let record = record?;
            let mut fields = record.iter();
            let year = fields
                .next()
                .and_then(|y| y.trim().parse::<i32>().ok())
                .ok_or_else(|| {
                    TrendsError::Validation("trend row without a valid year".to_string())
                })?;
            let row = fields
                .map(|n| {
                    n.trim()
                        .parse::<u64>()
                        .map_err(|e| TrendsError::Validation(format!("bad count '{}': {}", n, e)))
                })
                .collect::<Result<Vec<u64>>>()?;
            if row.len() != table.categories.len() {
                return Err(TrendsError::Validation(format!(
                    "row for {} has {} counts, expected {}",
                    year,
                    row.len(),
                    table.categories.len()
                )));
            }
            table.years.push(year);
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Rows as JSON objects `{Year, <category>: count, ...}` for years ≤ `cutoff`.
    pub fn records_through(&self, cutoff: i32) -> Vec<Map<String, Value>> {
        self.years
            .iter()
            .zip(&self.rows)
            .filter(|(year, _)| **year <= cutoff)
            .map(|(year, row)| {
                let mut obj = Map::new();
                obj.insert(YEAR_COLUMN.to_string(), Value::from(*year));
                for (category, n) in self.categories.iter().zip(row) {
                    obj.insert(category.clone(), Value::from(*n));
                }
                obj
            })
            .collect()
    }
}

/// Reducer building the [`CategoryYearMatrix`]
#[derive(Debug, Clone, Default)]
pub struct TrendAccumulator {
    min_year: Option<i32>,
    matrix: CategoryYearMatrix,
}

impl TrendAccumulator {
    pub fn new(min_year: Option<i32>) -> Self {
        Self {
            min_year,
            matrix: CategoryYearMatrix::new(),
        }
    }
}

impl TermReducer for TrendAccumulator {
    type Output = CategoryYearMatrix;

    fn observe(&mut self, entry: &StoreEntry) {
        for reference in &entry.record.references {
            if let Some(year) = reference.valid_year(self.min_year) {
                self.matrix.add(&entry.record.category, year, 1);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.matrix.merge(other.matrix);
    }

    fn finish(self) -> CategoryYearMatrix {
        self.matrix
    }
}
