//! Spectrum input and preprocessing helpers.
//!
//! Spectra are two-column delimited text files, x in the first column and y
//! in the second. The helpers here select sub-ranges, rescale intensities and
//! look up values at the abscissae closest to requested positions, e.g. to
//! place baseline nodes on the measured spectrum.

use std::path::Path;

use log::debug;
use ndarray::{s, Array1};

use crate::error::{PeakFitError, Result};

/// Delimiters tried, in order, when none is given.
const SNIFF_ORDER: [u8; 3] = [b',', b'\t', b';'];

/// Pick the delimiter of the first data line, falling back to whitespace.
fn sniff_delimiter(text: &str) -> Option<u8> {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;
    SNIFF_ORDER.into_iter().find(|d| first.as_bytes().contains(d))
}

fn check_lengths(x: &Array1<f64>, y: &Array1<f64>) -> Result<()> {
    if x.len() != y.len() {
        return Err(PeakFitError::Validation(format!(
            "x and y differ in length: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(PeakFitError::Validation("spectrum is empty".to_string()));
    }
    Ok(())
}

/// Read a two-column spectrum from a file. See [`read_ascii_str`].
pub fn read_ascii<P: AsRef<Path>>(path: P, delimiter: Option<u8>) -> Result<(Array1<f64>, Array1<f64>)> {
    let text = std::fs::read_to_string(path.as_ref())?;
    debug!("read {} bytes from {}", text.len(), path.as_ref().display());
    read_ascii_str(&text, delimiter)
}

/// Parse a two-column spectrum from text.
///
/// When `delimiter` is `None` the first data line decides among `,`, tab and
/// `;`; otherwise runs of whitespace separate the columns. Lines starting
/// with `#` are comments and a non-numeric first row is taken as a header.
/// Columns after the second are ignored. The result is sorted by x.
pub fn read_ascii_str(text: &str, delimiter: Option<u8>) -> Result<(Array1<f64>, Array1<f64>)> {
    let sniffed = delimiter.or_else(|| sniff_delimiter(text));

    // The csv reader splits on single bytes, so whitespace runs are collapsed
    let (source, delimiter) = match sniffed {
        Some(d) => (text.to_string(), d),
        None => {
            let collapsed: Vec<String> = text
                .lines()
                .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect();
            (collapsed.join("\n"), b' ')
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source.as_bytes());

    let mut points: Vec<(f64, f64)> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let x = record.get(0).and_then(|v| v.parse::<f64>().ok());
        let y = record.get(1).and_then(|v| v.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => points.push((x, y)),
            _ if points.is_empty() => {
                debug!("skipping header row {:?}", record.iter().collect::<Vec<_>>());
            }
            _ => {
                return Err(PeakFitError::Validation(format!(
                    "row {} is not a pair of numbers: {:?}",
                    row + 1,
                    record.iter().collect::<Vec<_>>()
                )));
            }
        }
    }

    if points.is_empty() {
        return Err(PeakFitError::Validation("no numeric rows found".to_string()));
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    Ok((Array1::from(x), Array1::from(y)))
}

/// Index of the first abscissa closest to `x0`.
fn nearest_index(x: &Array1<f64>, x0: f64) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, &xv) in x.iter().enumerate() {
        let distance = (xv - x0).abs();
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

/// Keep the points from the one nearest `range.0` up to, but not
/// including, the one nearest `range.1`.
pub fn crop(x: &Array1<f64>, y: &Array1<f64>, range: (f64, f64)) -> Result<(Array1<f64>, Array1<f64>)> {
    check_lengths(x, y)?;
    let start = nearest_index(x, range.0);
    let end = nearest_index(x, range.1).max(start);
    Ok((x.slice(s![start..end]).to_owned(), y.slice(s![start..end]).to_owned()))
}

/// Rescale `y` linearly so that its minimum maps to 0 and its maximum to 1.
///
/// With a `range`, minimum and maximum are taken over the points selected by
/// [`crop`] with that range, and the whole of `y` is rescaled with them.
pub fn normalize(x: &Array1<f64>, y: &Array1<f64>, range: Option<(f64, f64)>) -> Result<Array1<f64>> {
    check_lengths(x, y)?;
    let reference = match range {
        Some(range) => crop(x, y, range)?.1,
        None => y.clone(),
    };
    if reference.is_empty() {
        return Err(PeakFitError::Validation(format!(
            "normalization range {:?} selects no points",
            range
        )));
    }

    let min = reference.iter().copied().fold(f64::INFINITY, f64::min);
    let max = reference.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max > min) {
        return Err(PeakFitError::Validation(
            "cannot normalize a flat spectrum".to_string(),
        ));
    }

    Ok(y.mapv(|v| (v - min) / (max - min)))
}

/// The y value at the abscissa closest to `x0`.
pub fn nearest(x: &Array1<f64>, y: &Array1<f64>, x0: f64) -> Result<f64> {
    check_lengths(x, y)?;
    Ok(y[nearest_index(x, x0)])
}

/// [`nearest`] for each position in `x0`.
pub fn nearest_points(x: &Array1<f64>, y: &Array1<f64>, x0: &[f64]) -> Result<Array1<f64>> {
    check_lengths(x, y)?;
    Ok(x0.iter().map(|&v| y[nearest_index(x, v)]).collect())
}
