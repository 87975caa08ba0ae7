//! Loading spectra from disk and preparing them for a fit

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_relative_eq;
use peakfit_rs::spectrum::{crop, nearest_points, normalize, read_ascii};
use peakfit_rs::{Deconvolution, IdentityBaseline, LmConfig, Peak, PiecewiseLinearBaseline};

use crate::test_helpers::{amide_axis, amide_peaks, init_logging, synthesize};

/// A file in the system temp directory removed on drop.
struct TempFile(PathBuf);

impl TempFile {
    fn new(name: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        Self(path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn test_load_crop_normalize_and_fit() {
    init_logging();
    let x = amide_axis();
    let y = synthesize(&amide_peaks(), &IdentityBaseline, &x).mapv(|v| 3.0 * v + 0.4);

    // Written in descending order with a header, as some instruments export
    let mut contents = String::from("# synthetic amide I band\nwavenumber;absorbance\n");
    for (xv, yv) in x.iter().zip(y.iter()).rev() {
        writeln!(contents, "{};{}", xv, yv).unwrap();
    }
    let file = TempFile::new("amide.csv", &contents);

    let (wx, wy) = read_ascii(&file.0, None).unwrap();
    assert_eq!(wx.len(), x.len());
    assert_eq!(wx[0], 1550.0);
    assert_relative_eq!(wy[10], y[10], max_relative = 1e-12);

    let (cx, cy) = crop(&wx, &wy, (1570.0, 1730.0)).unwrap();
    assert_eq!(cx[0], 1570.0);
    assert_eq!(cx[cx.len() - 1], 1729.5);

    let normalized = normalize(&cx, &cy, None).unwrap();
    let max = normalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = normalized.iter().copied().fold(f64::INFINITY, f64::min);
    assert_relative_eq!(max, 1.0);
    assert_relative_eq!(min, 0.0);

    // Baseline through the normalized spectrum at the ends of the window
    let ends = [1570.0, 1729.5];
    let levels = nearest_points(&cx, &normalized, &ends).unwrap();
    let baseline = Arc::new(PiecewiseLinearBaseline::new(&ends, levels.as_slice().unwrap()).unwrap());

    let guesses = [
        Peak::gaussian(8.0, 0.5, 1615.0),
        Peak::gaussian(8.0, 0.5, 1655.0),
        Peak::gaussian(8.0, 0.3, 1700.0),
    ];
    let mut deconvolution = Deconvolution::new(&guesses).with_baseline(baseline);
    deconvolution.fit(&cx, &normalized).unwrap();

    for (fitted, expected) in deconvolution.peaks().iter().zip([1618.0, 1650.0, 1698.0]) {
        assert!((fitted.position() - expected).abs() < 1.0, "{}", fitted.position());
    }
}

#[test]
fn test_config_file_drives_the_fit() {
    let file = TempFile::new(
        "lm.json",
        r#"{ "max_iterations": 500, "ftol": 1e-12, "parallel_jacobian": true }"#,
    );
    let json = std::fs::read_to_string(&file.0).unwrap();
    let config = LmConfig::from_json(&json).unwrap();
    assert_eq!(config.max_iterations, 500);
    assert!(config.parallel_jacobian);
    assert_eq!(config.xtol, LmConfig::default().xtol);

    let x = amide_axis();
    let y = synthesize(&amide_peaks(), &IdentityBaseline, &x);
    let mut deconvolution = Deconvolution::new(&[
        Peak::gaussian(9.0, 0.9, 1620.0),
        Peak::gaussian(11.0, 0.7, 1648.0),
        Peak::gaussian(9.0, 0.5, 1696.0),
    ])
    .with_config(config);
    let summary = deconvolution.fit(&x, &y).unwrap();
    assert!(summary.iterations <= 500);

    let snapshot: serde_json::Value = serde_json::from_str(&deconvolution.to_json().unwrap()).unwrap();
    assert_eq!(snapshot["baseline"], "identity");
    assert_eq!(snapshot["config"]["max_iterations"], 500);
    assert_eq!(snapshot["peaks"].as_array().unwrap().len(), 3);
    assert_eq!(snapshot["summary"]["nvarys"], 9);

    let bad = LmConfig::from_json(r#"{ "lambda_up_factor": 0.5 }"#).unwrap_err();
    assert!(bad.is_validation());
}
