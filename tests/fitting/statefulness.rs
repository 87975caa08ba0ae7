//! State carried between fits

use approx::assert_relative_eq;
use ndarray::Array1;
use peakfit_rs::{Deconvolution, IdentityBaseline, LmConfig, Peak, PeakFitError};

use crate::test_helpers::{add_noise, init_logging, synthesize};

fn data() -> (Array1<f64>, Array1<f64>) {
    let x = Array1::linspace(0.0, 60.0, 301);
    let truth = [Peak::gaussian(3.0, 2.0, 20.0), Peak::lorentzian(2.0, 1.0, 38.0)];
    let y = add_noise(&synthesize(&truth, &IdentityBaseline, &x), 0.01, 99);
    (x, y)
}

fn guesses() -> Vec<Peak> {
    vec![Peak::gaussian(4.0, 1.5, 22.0), Peak::lorentzian(3.0, 0.8, 36.0)]
}

#[test]
fn test_refit_starts_from_previous_solution() {
    init_logging();
    let (x, y) = data();
    let mut deconvolution = Deconvolution::new(&guesses());

    let first = deconvolution.fit(&x, &y).unwrap().clone();
    assert_eq!(first.initial_params, vec![4.0, 1.5, 22.0, 3.0, 0.8, 36.0]);

    // A second spectrum with both bands shifted and reshaped
    let shifted = [Peak::gaussian(3.3, 1.8, 21.0), Peak::lorentzian(2.2, 1.1, 37.0)];
    let y_shifted = add_noise(&synthesize(&shifted, &IdentityBaseline, &x), 0.01, 100);

    let second = deconvolution.fit(&x, &y_shifted).unwrap().clone();
    assert_eq!(second.initial_params, first.params);
    assert_ne!(second.params, first.params);

    let expected = [3.3, 1.8, 21.0, 2.2, 1.1, 37.0];
    for (i, (got, want)) in second.params.iter().zip(expected.iter()).enumerate() {
        assert!(
            (got - want).abs() < 5.0 * second.stderr[i] + 1e-3,
            "{} = {} but expected {} +/- {}",
            second.labels[i],
            got,
            want,
            second.stderr[i]
        );
    }

    // The committed peaks describe spectrum B, not spectrum A
    let peaks = deconvolution.peaks();
    assert!((peaks[0].position() - 21.0).abs() < 0.1);
    assert!((peaks[1].position() - 37.0).abs() < 0.1);

    // Refitting a converged solution does not move it
    let third = deconvolution.fit(&x, &y_shifted).unwrap().clone();
    assert_eq!(third.initial_params, second.params);
    for (a, b) in second.params.iter().zip(third.params.iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-6);
    }
}

#[test]
fn test_editing_a_fitted_peak_drops_its_band() {
    let (x, y) = data();
    let mut deconvolution = Deconvolution::new(&guesses());
    deconvolution.fit(&x, &y).unwrap();
    assert!(deconvolution.fit_error(1, &x).is_ok());

    if let Some(peak) = deconvolution.peak_mut(1) {
        let amplitude = peak.amplitude();
        peak.set_amplitude(1.1 * amplitude);
    }
    assert!(matches!(deconvolution.fit_error(1, &x), Err(PeakFitError::State(_))));
    assert!(deconvolution.fit_error(0, &x).is_ok());

    // The next fit restores it
    deconvolution.fit(&x, &y).unwrap();
    assert!(deconvolution.fit_error(1, &x).is_ok());
}

#[test]
fn test_caller_peaks_are_copied() {
    let (x, y) = data();
    let mut peaks = guesses();
    let before = peaks.clone();

    let mut deconvolution = Deconvolution::new(&peaks);
    deconvolution.fit(&x, &y).unwrap();
    assert_eq!(peaks, before);
    assert!(!peaks[0].is_fit());
    assert!(deconvolution.peaks()[0].is_fit());

    // Later edits to the caller's peaks do not reach the fitted ones
    peaks[0].set_position(0.0);
    assert!(deconvolution.peaks()[0].position() > 10.0);
}

#[test]
fn test_non_convergence_leaves_state_untouched() {
    init_logging();
    let (x, y) = data();
    let mut deconvolution = Deconvolution::new(&guesses());
    let converged = deconvolution.fit(&x, &y).unwrap().clone();
    let fitted = deconvolution.peaks().to_vec();

    let starved = LmConfig {
        max_iterations: 1,
        ..LmConfig::default()
    };
    let mut deconvolution = deconvolution.with_config(starved);
    if let Some(peak) = deconvolution.peak_mut(0) {
        peak.set_position(10.0);
        peak.set_width(8.0);
    }
    let perturbed = deconvolution.peaks().to_vec();

    match deconvolution.fit(&x, &y) {
        Err(PeakFitError::Convergence { iterations, cost, .. }) => {
            assert_eq!(iterations, 1);
            assert!(cost.is_finite() && cost > 0.0);
        }
        other => panic!("expected a convergence error, got {:?}", other),
    }

    assert_eq!(deconvolution.peaks(), perturbed.as_slice());
    assert_ne!(deconvolution.peaks(), fitted.as_slice());
    assert_eq!(deconvolution.summary(), Some(&converged));
}

#[test]
fn test_zero_iteration_budget_reports_failure() {
    let (x, y) = data();
    let config = LmConfig {
        max_iterations: 0,
        ..LmConfig::default()
    };
    let mut deconvolution = Deconvolution::new(&guesses()).with_config(config);
    let err = deconvolution.fit(&x, &y).unwrap_err();
    assert!(matches!(err, PeakFitError::Convergence { iterations: 0, .. }));
    assert!(!deconvolution.is_fit());
    assert!(deconvolution.peaks().iter().all(|p| !p.is_fit()));
}

#[test]
fn test_state_errors_before_fit() {
    let deconvolution = Deconvolution::new(&guesses());
    let x = Array1::linspace(0.0, 10.0, 11);
    assert!(matches!(deconvolution.fit_error(0, &x), Err(PeakFitError::State(_))));
    assert!(deconvolution.covariance().is_none());
    assert!(deconvolution.summary().is_none());
    assert!(deconvolution.report_with_errors().contains("Peak Type"));
}
