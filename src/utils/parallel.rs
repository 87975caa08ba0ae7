//! Optional data parallelism for the expensive per-item work of a fit.
//!
//! Per-peak Jacobian blocks and Monte Carlo curve evaluations are independent,
//! so they can be spread over the rayon pool. The serial and parallel paths
//! return identical results in the same order.

use rayon::prelude::*;

use crate::error::Result;

/// Map a fallible function over `items`, in parallel when `parallel` is set.
///
/// The first error encountered (in item order for the serial path) is
/// returned.
pub fn try_map<T, R, F>(items: &[T], parallel: bool, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    if parallel {
        items.par_iter().map(|item| f(item)).collect()
    } else {
        items.iter().map(f).collect()
    }
}
