//! Deconvolution of a synthetic amide I band.
//!
//! Three overlapping Gaussians on a sloped baseline are fitted from rough
//! guesses; the fitted table, the fit statistics and the error band of the
//! middle peak are printed. Run with `RUST_LOG=debug` to follow the solver.

use std::sync::Arc;

use ndarray::Array1;
use peakfit_rs::{Baseline, Deconvolution, Peak, PiecewiseLinearBaseline};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Three peak deconvolution example");
    println!("================================\n");

    let x = Array1::range(1550.0, 1750.25, 0.5);
    let baseline = Arc::new(PiecewiseLinearBaseline::new(&[1550.0, 1750.0], &[0.05, 0.25])?);
    let truth = [
        Peak::gaussian(10.0, 1.0, 1618.0),
        Peak::gaussian(12.0, 0.8, 1650.0),
        Peak::gaussian(8.0, 0.6, 1698.0),
    ];

    let mut y = baseline.evaluate(&x);
    for peak in &truth {
        y += &peak.evaluate(&x)?;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let noise = Normal::new(0.0, 0.005)?;
    let y = y.mapv(|v| v + noise.sample(&mut rng));

    let guesses = [
        Peak::gaussian(8.0, 0.5, 1615.0).with_position_bounds(1600.0, 1630.0)?,
        Peak::gaussian(8.0, 0.5, 1655.0).with_position_bounds(1640.0, 1670.0)?,
        Peak::gaussian(8.0, 0.5, 1700.0).with_position_bounds(1685.0, 1715.0)?,
    ];
    println!("Initial guesses:\n{}", Deconvolution::new(&guesses));

    let mut deconvolution = Deconvolution::new(&guesses).with_baseline(baseline);
    let summary = deconvolution.fit(&x, &y)?;
    println!("Solver: {}", summary.message);
    println!("Fitted peaks:\n{}", deconvolution.report_with_errors());

    for (peak, expected) in deconvolution.peaks().iter().zip(truth.iter()) {
        println!(
            "{:>10} at {:8.3} (true {:7.1}), FWHM {:6.3}, area {:6.3}",
            peak.shape(),
            peak.position(),
            expected.position(),
            peak.fwhm(),
            peak.area()
        );
    }

    let window = Array1::linspace(1640.0, 1660.0, 5);
    let curve = deconvolution.peaks()[1].evaluate(&window)?;
    let (upper, lower) = deconvolution.fit_error(1, &window)?;
    let band = deconvolution.monte_carlo_fit_error(1, &window, 2000, &mut rng)?;

    println!("\nError band of peak 1:");
    println!("{:>10} {:>10} {:>22} {:>22}", "x", "y", "first order", "monte carlo");
    for i in 0..window.len() {
        println!(
            "{:>10.2} {:>10.5} [{:>9.5}, {:>9.5}] [{:>9.5}, {:>9.5}]",
            window[i], curve[i], lower[i], upper[i], band.lower[i], band.upper[i]
        );
    }

    Ok(())
}
