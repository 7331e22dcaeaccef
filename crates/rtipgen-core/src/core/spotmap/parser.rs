use super::{ColumnMismatch, SpotMapError};
use csv::{ReaderBuilder, StringRecord, Trim};
use nalgebra::Point2;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column count of the canonical spot-map export.
pub const EXPECTED_COLUMNS: usize = 9;
pub const ENERGY_COLUMN: usize = 1;
pub const X_COLUMN: usize = 4;
pub const Y_COLUMN: usize = 5;
pub const WEIGHT_COLUMN: usize = 6;

const DESIGNATED_COLUMNS: [(usize, &str); 4] = [
    (ENERGY_COLUMN, "energy"),
    (X_COLUMN, "x"),
    (Y_COLUMN, "y"),
    (WEIGHT_COLUMN, "weight"),
];

/// A single planned delivery unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spot {
    /// Nominal proton energy in MeV.
    pub energy: f64,
    /// Lateral spot position in mm.
    pub position: Point2<f64>,
    /// Monitor units / dose weight delivered at this spot.
    pub weight: f64,
}

/// A parsed spot map: the complete numeric rows of the source table,
/// reduced to the designated energy, position and weight columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotMap {
    spots: Vec<Spot>,
    columns: usize,
    dropped_rows: usize,
    source: Option<PathBuf>,
}

impl SpotMap {
    /// Reads and parses a spot-map file.
    pub fn from_path(path: &Path) -> Result<Self, SpotMapError> {
        let file = File::open(path).map_err(|source| SpotMapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut map = Self::from_reader(file)?;
        map.source = Some(path.to_path_buf());
        Ok(map)
    }

    /// Parses a headerless delimited table.
    ///
    /// Rows with any missing, unparseable or non-finite field are dropped
    /// before validation. The table width is the most common width among
    /// the numeric rows, so rows of any other width are dropped as well.
    /// Spots without a positive energy or with a negative weight cannot be
    /// delivered and are dropped too.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SpotMapError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut records: Vec<StringRecord> = Vec::new();
        for (index, result) in csv_reader.records().enumerate() {
            let record = result.map_err(|source| SpotMapError::Csv {
                record: source
                    .position()
                    .map_or(index as u64, |position| position.record()),
                source,
            })?;
            records.push(record);
        }
        let total_rows = records.len();

        let numeric: Vec<Vec<f64>> = records.iter().filter_map(parse_numeric_row).collect();
        let columns = dominant_width(&numeric).ok_or(SpotMapError::NoValidRows)?;
        let rows: Vec<&Vec<f64>> = numeric.iter().filter(|row| row.len() == columns).collect();

        for (column, name) in DESIGNATED_COLUMNS {
            if column >= columns {
                return Err(SpotMapError::MissingColumn {
                    column,
                    name,
                    found: columns,
                });
            }
        }

        let spots: Vec<Spot> = rows
            .iter()
            .map(|row| Spot {
                energy: row[ENERGY_COLUMN],
                position: Point2::new(row[X_COLUMN], row[Y_COLUMN]),
                weight: row[WEIGHT_COLUMN],
            })
            .filter(|spot| spot.energy > 0.0 && spot.weight >= 0.0)
            .collect();

        let dropped_rows = total_rows - spots.len();
        if dropped_rows > 0 {
            debug!(
                "Dropped {} of {} spot-map rows (incomplete, off-width or non-physical).",
                dropped_rows, total_rows
            );
        }
        if spots.is_empty() {
            return Err(SpotMapError::NoValidRows);
        }

        let map = Self {
            spots,
            columns,
            dropped_rows,
            source: None,
        };
        if let Err(mismatch) = map.check_columns() {
            warn!("{}", mismatch);
        }
        Ok(map)
    }

    pub fn spots(&self) -> &[Spot] {
        &self.spots
    }

    pub fn into_spots(self) -> Vec<Spot> {
        self.spots
    }

    /// Number of retained rows.
    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Width of the source table.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Rows discarded because they were incomplete, had a different width
    /// than the table or described a non-physical spot.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Checks the table width against the canonical export format.
    pub fn check_columns(&self) -> Result<(), ColumnMismatch> {
        if self.columns == EXPECTED_COLUMNS {
            Ok(())
        } else {
            Err(ColumnMismatch {
                expected: EXPECTED_COLUMNS,
                found: self.columns,
            })
        }
    }

    /// Human-readable outcome of [`SpotMap::check_columns`].
    pub fn check_message(&self) -> String {
        match self.check_columns() {
            Ok(()) => format!("Spot map looks ok! It has {} rows.", self.len()),
            Err(mismatch) => mismatch.to_string(),
        }
    }

    /// Lower-left and upper-right corners of the spot positions.
    pub fn bounds(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = self.spots.first()?.position;
        Some(self.spots.iter().fold((first, first), |(lo, hi), spot| {
            (
                Point2::new(lo.x.min(spot.position.x), lo.y.min(spot.position.y)),
                Point2::new(hi.x.max(spot.position.x), hi.y.max(spot.position.y)),
            )
        }))
    }
}

/// Most frequent row width; ties favour the canonical width, then the wider.
fn dominant_width(rows: &[Vec<f64>]) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for row in rows {
        match counts.iter_mut().find(|(width, _)| *width == row.len()) {
            Some((_, count)) => *count += 1,
            None => counts.push((row.len(), 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(width, count)| (count, width == EXPECTED_COLUMNS, width))
        .map(|(width, _)| width)
}

fn parse_numeric_row(record: &StringRecord) -> Option<Vec<f64>> {
    record
        .iter()
        .map(|field| field.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}
