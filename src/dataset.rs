//! Immutable point collection and the delimited-text loader that fills it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::KnnError;

/// Dimensionality used when none is configured.
pub const DEFAULT_DIM: usize = 32;
/// Number of records consumed from the input when none is configured.
pub const DEFAULT_NUM_POINTS: usize = 1000;

/// An ordered set of points in `dim`-dimensional space.
///
/// Coordinates are stored row-major in one flat buffer. A point's index is its
/// identity for the lifetime of a computation; nothing mutates a `Dataset`
/// once it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    coords: Vec<f64>,
    dim: usize,
}

impl Dataset {
    /// Build from a flat row-major coordinate buffer.
    pub fn from_flat(coords: Vec<f64>, dim: usize) -> Result<Self, KnnError> {
        if dim == 0 {
            return Err(KnnError::InvalidDataset("dimension must be > 0".into()));
        }
        if coords.len() % dim != 0 {
            return Err(KnnError::InvalidDataset(format!(
                "{} coordinates do not divide into points of dimension {}",
                coords.len(),
                dim
            )));
        }
        Ok(Self { coords, dim })
    }

    /// Build from a slice of points (arrays, `Vec<f64>`, ...).
    ///
    /// The dimension is taken from the first point; every other point must match it.
    pub fn from_points<P: AsRef<[f64]>>(points: &[P]) -> Result<Self, KnnError> {
        let dim = points.first().map(|p| p.as_ref().len()).unwrap_or(0);
        let mut coords = Vec::with_capacity(points.len() * dim);
        for (i, p) in points.iter().enumerate() {
            let p = p.as_ref();
            if p.len() != dim {
                return Err(KnnError::InvalidDataset(format!(
                    "point {} has {} coordinates, expected {}",
                    i,
                    p.len(),
                    dim
                )));
            }
            coords.extend_from_slice(p);
        }
        Self::from_flat(coords, dim)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len() / self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Coordinates of point `i`.
    #[inline]
    pub fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate points in index order.
    #[inline]
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f64> {
        self.coords.chunks_exact(self.dim)
    }

    #[inline]
    pub fn as_flat(&self) -> &[f64] {
        &self.coords
    }

    pub fn into_flat(self) -> Vec<f64> {
        self.coords
    }
}

/// Shape of the records to read from a delimited file.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Coordinates per record.
    pub dim: usize,
    /// Number of records to consume. `None` reads every line.
    ///
    /// With `Some(n)`, a file holding fewer than `n` lines still yields `n`
    /// points; the missing rows stay at the origin.
    pub max_points: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            max_points: Some(DEFAULT_NUM_POINTS),
        }
    }
}

/// Load a comma-separated dataset from `path`.
pub fn load_csv(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Dataset, KnnError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| KnnError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_records(BufReader::new(file), options).map_err(|err| match err {
        KnnError::Io { source, .. } => KnnError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse comma-separated records from any buffered reader.
///
/// Parsing is lenient: empty fields are skipped, a field with trailing junk
/// reads as its leading number (`1.5abc` is `1.5`), a field with no leading
/// number reads as `0.0`, missing fields stay `0.0`, and fields past `dim` are
/// ignored.
pub fn read_records<R: BufRead>(reader: R, options: &LoadOptions) -> Result<Dataset, KnnError> {
    let dim = options.dim;
    if dim == 0 {
        return Err(KnnError::InvalidDataset("dimension must be > 0".into()));
    }

    let mut coords = match options.max_points {
        Some(n) => Vec::with_capacity(n * dim),
        None => Vec::new(),
    };
    let mut rows = 0usize;
    let mut malformed = 0usize;

    for line in reader.lines() {
        if options.max_points.is_some_and(|n| rows >= n) {
            break;
        }
        let line = line.map_err(|source| KnnError::Io {
            path: Default::default(),
            source,
        })?;

        let start = coords.len();
        coords.resize(start + dim, 0.0);
        let row = &mut coords[start..];
        let mut fields = line.split(',').filter(|f| !f.is_empty());
        for slot in row.iter_mut() {
            let Some(field) = fields.next() else {
                malformed += 1;
                break;
            };
            let field = field.trim();
            match field.parse::<f64>() {
                Ok(v) => *slot = v,
                Err(_) => {
                    malformed += 1;
                    if let Some(v) = leading_number(field) {
                        *slot = v;
                    }
                }
            }
        }
        rows += 1;
    }

    if malformed > 0 {
        log::debug!("{} missing or unparseable fields read as 0.0", malformed);
    }
    if let Some(n) = options.max_points {
        if rows < n {
            log::warn!(
                "input holds {} records, expected {}; remaining rows left at the origin",
                rows,
                n
            );
            coords.resize(n * dim, 0.0);
        }
    }

    Dataset::from_flat(coords, dim)
}

/// The longest prefix of `s` that reads as a decimal number, if any.
fn leading_number(s: &str) -> Option<f64> {
    let b = s.as_bytes();
    let digits_from = |i: usize| {
        b[i.min(b.len())..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count()
    };

    let mut end = usize::from(matches!(b.first(), Some(b'+' | b'-')));
    let int_digits = digits_from(end);
    end += int_digits;
    if b.get(end) == Some(&b'.') {
        let frac_digits = digits_from(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if end == 0 || !b[..end].iter().any(u8::is_ascii_digit) {
        return None;
    }
    if matches!(b.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(b.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits_from(exp);
        if exp_digits > 0 {
            end = exp + exp_digits;
        }
    }
    s[..end].parse().ok()
}
