//! Tests for parameter uncertainties and error bands
//!
//! These check the covariance estimate against the injected noise level and
//! compare the first-order error band with the Monte Carlo one.

use approx::assert_relative_eq;
use ndarray::Array1;
use peakfit_rs::uncertainty::propagate_error;
use peakfit_rs::{Deconvolution, IdentityBaseline, ParamKind, Peak, PeakFitError};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{add_noise, synthesize};

const NOISE: f64 = 0.01;

fn fitted() -> (Deconvolution, Array1<f64>) {
    let x = Array1::linspace(0.0, 40.0, 801);
    let truth = [Peak::gaussian(2.5, 1.0, 15.0), Peak::lorentzian(2.0, 0.6, 26.0)];
    let y = add_noise(&synthesize(&truth, &IdentityBaseline, &x), NOISE, 2024);

    let mut deconvolution = Deconvolution::new(&[
        Peak::gaussian(2.0, 0.8, 14.0),
        Peak::lorentzian(2.5, 0.5, 27.0),
    ]);
    deconvolution.fit(&x, &y).unwrap();
    (deconvolution, x)
}

#[test]
fn test_reduced_chi_square_tracks_noise() {
    let (deconvolution, _) = fitted();
    let summary = deconvolution.summary().unwrap();
    assert_eq!(summary.ndata, 801);
    assert_relative_eq!(summary.redchi, summary.rss / (801.0 - 6.0));
    assert_relative_eq!(summary.redchi, NOISE * NOISE, max_relative = 0.2);
}

#[test]
fn test_stderr_matches_covariance() {
    let (deconvolution, _) = fitted();
    let summary = deconvolution.summary().unwrap();
    let covariance = deconvolution.covariance().unwrap();

    for i in 0..summary.nvarys {
        assert_relative_eq!(summary.stderr[i], covariance[[i, i]].sqrt());
        for j in 0..summary.nvarys {
            assert_relative_eq!(covariance[[i, j]], covariance[[j, i]]);
        }
    }

    let correlation = summary.correlation();
    for i in 0..summary.nvarys {
        assert_relative_eq!(correlation[[i, i]], 1.0, epsilon = 1e-12);
    }

    // Per-peak blocks are slices of the full matrix
    let block = deconvolution.peaks()[1].covariance().unwrap();
    assert_relative_eq!(block[[0, 2]], covariance[[3, 5]]);
    assert_eq!(
        deconvolution.peaks()[1].stderr(ParamKind::Amplitude),
        Some(summary.stderr[4])
    );
}

#[test]
fn test_first_order_band_is_symmetric() {
    let (deconvolution, x) = fitted();
    for (i, peak) in deconvolution.peaks().iter().enumerate() {
        let curve = peak.evaluate(&x).unwrap();
        let (upper, lower) = deconvolution.fit_error(i, &x).unwrap();
        for k in 0..x.len() {
            assert!(upper[k] >= curve[k] && curve[k] >= lower[k]);
            assert_relative_eq!(upper[k] - curve[k], curve[k] - lower[k], epsilon = 1e-12);
        }
    }

    // At the peak maximum only the amplitude contributes
    let first = &deconvolution.peaks()[0];
    let center = Array1::from(vec![first.position()]);
    let (upper, _) = first.fit_error(&center).unwrap();
    let sigma = first.stderr(ParamKind::Amplitude).unwrap();
    assert_relative_eq!(upper[0] - first.amplitude(), sigma, max_relative = 1e-9);

    let gradient = first.partial_derivatives(&center).unwrap();
    let propagated = propagate_error(&gradient, first.covariance().unwrap()).unwrap();
    assert_relative_eq!(propagated[0], sigma, max_relative = 1e-9);
}

#[test]
fn test_monte_carlo_band_agrees_with_first_order() {
    let (deconvolution, x) = fitted();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let band = deconvolution.monte_carlo_fit_error(0, &x, 4000, &mut rng).unwrap();
    assert_eq!(band.n_used, 4000);

    let (upper, lower) = deconvolution.fit_error(0, &x).unwrap();
    let center = x.iter().position(|&v| (v - 15.0).abs() < 1e-9).unwrap();
    let first_order = (upper[center] - lower[center]) / 2.0;
    let sampled = (band.upper[center] - band.lower[center]) / 2.0;
    assert_relative_eq!(sampled, first_order, max_relative = 0.1);

    let again = deconvolution
        .monte_carlo_fit_error(0, &x, 4000, &mut ChaCha8Rng::seed_from_u64(42))
        .unwrap();
    assert_eq!(again.lower, band.lower);
    assert_eq!(again.upper, band.upper);
}

#[test]
fn test_band_index_out_of_range() {
    let (deconvolution, x) = fitted();
    let err = deconvolution.fit_error(2, &x).unwrap_err();
    assert!(matches!(err, PeakFitError::Validation(_)));

    let mut rng = ChaCha8Rng::seed_from_u64(0);
    assert!(deconvolution.monte_carlo_fit_error(5, &x, 100, &mut rng).is_err());
}
