//! Parameter recovery on synthetic spectra

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::Array1;
use peakfit_rs::{
    CubicSplineBaseline, Deconvolution, FnBaseline, IdentityBaseline, LmConfig, ParamKind, Peak,
    PiecewiseLinearBaseline,
};

use crate::test_helpers::{add_noise, amide_axis, amide_peaks, init_logging, synthesize};

fn amide_guesses() -> Vec<Peak> {
    vec![
        Peak::gaussian(8.0, 0.5, 1615.0),
        Peak::gaussian(8.0, 0.5, 1655.0),
        Peak::gaussian(8.0, 0.5, 1700.0),
    ]
}

#[test]
fn test_noise_free_recovery_with_baseline() {
    init_logging();
    let x = amide_axis();
    let truth = vec![
        Peak::gaussian(10.0, 1.0, 1618.0),
        Peak::lorentzian(6.0, 0.7, 1652.0),
        Peak::gaussian(8.0, 0.6, 1698.0),
    ];
    let baseline = Arc::new(PiecewiseLinearBaseline::new(&[1550.0, 1750.0], &[0.05, 0.25]).unwrap());
    let y = synthesize(&truth, baseline.as_ref(), &x);

    let guesses = vec![
        Peak::gaussian(8.0, 0.8, 1615.0),
        Peak::lorentzian(8.0, 0.5, 1655.0),
        Peak::gaussian(10.0, 0.5, 1700.0),
    ];
    let mut deconvolution = Deconvolution::new(&guesses).with_baseline(baseline);
    let summary = deconvolution.fit(&x, &y).unwrap();
    assert!(summary.rss < 1e-12, "rss = {}", summary.rss);
    assert_eq!(summary.ndata, x.len());
    assert_eq!(summary.nvarys, 9);

    for (fitted, expected) in deconvolution.peaks().iter().zip(truth.iter()) {
        assert_eq!(fitted.shape(), expected.shape());
        for kind in ParamKind::ALL {
            assert_relative_eq!(
                fitted.param(kind).value(),
                expected.param(kind).value(),
                max_relative = 1e-6
            );
        }
    }

    let residuals = deconvolution.residuals(&x, &y).unwrap();
    assert!(residuals.iter().all(|r| r.abs() < 1e-7));
}

#[test]
fn test_three_band_amide_region() {
    init_logging();
    let x = amide_axis();
    let baseline = Arc::new(PiecewiseLinearBaseline::new(&[1550.0, 1750.0], &[0.05, 0.25]).unwrap());
    let clean = synthesize(&amide_peaks(), baseline.as_ref(), &x);
    let y = add_noise(&clean, 0.005, 7);

    let guesses: Vec<Peak> = amide_guesses()
        .into_iter()
        .map(|peak| {
            let p = peak.position();
            peak.with_position_bounds(p - 10.0, p + 10.0)
                .unwrap()
                .with_width_bounds(1.0, 30.0)
                .unwrap()
        })
        .collect();

    let mut deconvolution = Deconvolution::new(&guesses).with_baseline(baseline);
    let summary = deconvolution.fit(&x, &y).unwrap();
    assert!(summary.rss < 0.02, "rss = {}", summary.rss);

    for (fitted, expected) in deconvolution.peaks().iter().zip([1618.0, 1650.0, 1698.0]) {
        assert!(
            (fitted.position() - expected).abs() < 1.0,
            "position {} too far from {}",
            fitted.position(),
            expected
        );
    }
}

#[test]
fn test_spline_baseline_recovery() {
    let x = Array1::linspace(0.0, 100.0, 301);
    let baseline = Arc::new(CubicSplineBaseline::new(&[0.0, 40.0, 100.0], &[0.2, 0.1, 0.3]).unwrap());
    let truth = [Peak::lorentzian(3.0, 2.0, 35.0), Peak::gaussian(5.0, 1.0, 70.0)];
    let y = synthesize(&truth, baseline.as_ref(), &x);

    let guesses = [Peak::lorentzian(5.0, 1.0, 33.0), Peak::gaussian(3.0, 1.5, 72.0)];
    let mut deconvolution = Deconvolution::new(&guesses).with_baseline(baseline);
    deconvolution.fit(&x, &y).unwrap();

    assert_relative_eq!(deconvolution.peaks()[0].position(), 35.0, epsilon = 1e-6);
    assert_relative_eq!(deconvolution.peaks()[1].width(), 5.0, epsilon = 1e-6);
}

#[test]
fn test_stderr_shrinks_with_point_density() {
    let truth = [Peak::gaussian(2.0, 1.0, 10.0)];
    let mut errors = Vec::new();
    for (n, seed) in [(50, 11), (200, 12), (800, 13)] {
        let x = Array1::linspace(0.0, 20.0, n);
        let y = add_noise(&synthesize(&truth, &IdentityBaseline, &x), 0.01, seed);

        let mut deconvolution = Deconvolution::new(&[Peak::gaussian(1.5, 0.8, 9.5)]);
        deconvolution.fit(&x, &y).unwrap();
        let peak = &deconvolution.peaks()[0];
        errors.push([
            peak.stderr(ParamKind::Width).unwrap(),
            peak.stderr(ParamKind::Amplitude).unwrap(),
            peak.stderr(ParamKind::Position).unwrap(),
        ]);
    }

    for kind in 0..3 {
        assert!(errors[1][kind] < errors[0][kind], "{:?}", errors);
        assert!(errors[2][kind] < errors[1][kind], "{:?}", errors);
    }
}

#[test]
fn test_identity_baseline_matches_zero_baseline() {
    let x = Array1::linspace(0.0, 50.0, 251);
    let y = add_noise(&synthesize(&[Peak::gaussian(4.0, 3.0, 20.0)], &IdentityBaseline, &x), 0.02, 3);
    let guess = [Peak::gaussian(3.0, 2.0, 22.0)];

    let mut implicit = Deconvolution::new(&guess);
    let mut explicit = Deconvolution::new(&guess).with_baseline(Arc::new(FnBaseline(|_: f64| 0.0)));
    let a = implicit.fit(&x, &y).unwrap().clone();
    let b = explicit.fit(&x, &y).unwrap().clone();

    for (pa, pb) in a.params.iter().zip(b.params.iter()) {
        assert_relative_eq!(*pa, *pb, epsilon = 1e-12);
    }
    assert_relative_eq!(a.rss, b.rss, epsilon = 1e-15);
    assert_eq!(implicit.evaluate(&x).unwrap(), explicit.evaluate(&x).unwrap());
}

#[test]
fn test_parallel_jacobian_matches_serial() {
    let x = amide_axis();
    let y = add_noise(&synthesize(&amide_peaks(), &IdentityBaseline, &x), 0.005, 21);

    let mut serial = Deconvolution::new(&amide_guesses());
    let parallel_config = LmConfig {
        parallel_jacobian: true,
        ..LmConfig::default()
    };
    let mut parallel = Deconvolution::new(&amide_guesses()).with_config(parallel_config);

    let a = serial.fit(&x, &y).unwrap().clone();
    let b = parallel.fit(&x, &y).unwrap().clone();
    assert_eq!(a.iterations, b.iterations);
    for (pa, pb) in a.params.iter().zip(b.params.iter()) {
        assert_relative_eq!(*pa, *pb, epsilon = 1e-12);
    }
}
