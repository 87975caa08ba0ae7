//! Bounds and fixed parameters during a fit

use approx::assert_relative_eq;
use ndarray::Array1;
use peakfit_rs::{Deconvolution, IdentityBaseline, LmConfig, ParamKind, Peak, PeakFitError};

use crate::test_helpers::{add_noise, synthesize};

fn single_peak_data() -> (Array1<f64>, Array1<f64>) {
    let x = Array1::linspace(1580.0, 1660.0, 321);
    let y = synthesize(&[Peak::gaussian(6.0, 1.0, 1618.0)], &IdentityBaseline, &x);
    (x, y)
}

#[test]
fn test_fixed_parameters_stay_fixed() {
    let x = Array1::linspace(0.0, 40.0, 401);
    let truth = [Peak::gaussian(2.0, 1.0, 12.0), Peak::lorentzian(1.5, 0.5, 25.0)];
    let y = add_noise(&synthesize(&truth, &IdentityBaseline, &x), 0.005, 5);

    let guesses = [
        Peak::gaussian(2.0, 0.7, 11.0).with_fixed(ParamKind::Width),
        Peak::lorentzian(2.5, 0.7, 25.0).with_fixed(ParamKind::Position),
    ];
    let mut deconvolution = Deconvolution::new(&guesses);
    let summary = deconvolution.fit(&x, &y).unwrap();

    assert_eq!(summary.nvarys, 4);
    assert_eq!(
        summary.labels,
        vec!["p0.amplitude", "p0.position", "p1.width", "p1.amplitude"]
    );
    assert_eq!(summary.covariance.dim(), (4, 4));

    let first = &deconvolution.peaks()[0];
    assert_eq!(first.width(), 2.0);
    assert_eq!(first.stderr(ParamKind::Width), None);
    assert!(first.stderr(ParamKind::Position).unwrap() > 0.0);
    assert_relative_eq!(first.position(), 12.0, epsilon = 1e-2);

    let second = &deconvolution.peaks()[1];
    assert_eq!(second.position(), 25.0);
    assert_eq!(second.stderr(ParamKind::Position), None);
    let block = second.covariance().unwrap();
    assert_eq!(block[[2, 2]], 0.0);
    assert_eq!(block[[0, 2]], 0.0);
}

#[test]
fn test_active_bound_is_respected() {
    let (x, y) = single_peak_data();
    let config = LmConfig {
        max_iterations: 1000,
        ftol: 1e-8,
        ..LmConfig::default()
    };
    let guess = Peak::gaussian(5.0, 0.8, 1610.0)
        .with_position_bounds(1600.0, 1616.0)
        .unwrap();
    let mut deconvolution = Deconvolution::new(&[guess]).with_config(config);
    deconvolution.fit(&x, &y).unwrap();

    let position = deconvolution.peaks()[0].position();
    assert!(position <= 1616.0 && position >= 1600.0, "position = {}", position);
    assert!(position > 1615.0, "position = {}", position);
}

#[test]
fn test_out_of_bounds_start_is_clamped() {
    let (x, y) = single_peak_data();
    let guess = Peak::gaussian(5.0, 0.8, 1640.0)
        .with_position_bounds(1605.0, 1630.0)
        .unwrap();
    // Construction keeps the out-of-range value
    assert_eq!(guess.position(), 1640.0);

    let mut deconvolution = Deconvolution::new(&[guess]);
    let summary = deconvolution.fit(&x, &y).unwrap();
    let index = summary.index_of("p0.position").unwrap();
    assert_eq!(summary.initial_params[index], 1630.0);
    assert_relative_eq!(summary.params[index], 1618.0, epsilon = 1e-6);
}

#[test]
fn test_fully_fixed_model_is_rejected() {
    let (x, y) = single_peak_data();
    let guess = Peak::gaussian(6.0, 1.0, 1618.0)
        .with_fixed(ParamKind::Width)
        .with_fixed(ParamKind::Amplitude)
        .with_fixed(ParamKind::Position);
    let mut deconvolution = Deconvolution::new(&[guess]);
    assert!(deconvolution.fit(&x, &y).unwrap_err().is_validation());
    assert!(!deconvolution.is_fit());
}

#[test]
fn test_invalid_inputs_are_validation_errors() {
    let (x, y) = single_peak_data();
    let mut deconvolution = Deconvolution::new(&[Peak::gaussian(5.0, 1.0, 1615.0)]);

    let short = y.slice(ndarray::s![..10]).to_owned();
    assert!(deconvolution.fit(&x, &short).unwrap_err().is_validation());

    let mut nan = y.clone();
    nan[3] = f64::NAN;
    assert!(deconvolution.fit(&x, &nan).unwrap_err().is_validation());

    let mut zero_width = Deconvolution::new(&[Peak::gaussian(0.0, 1.0, 1615.0)]);
    assert!(zero_width.fit(&x, &y).unwrap_err().is_validation());

    let mut empty = Deconvolution::new(&[]);
    assert!(matches!(empty.fit(&x, &y), Err(PeakFitError::Validation(_))));
}
