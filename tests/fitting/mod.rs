//! Tests for fitting peaks with the deconvolution engine

mod constraints;
mod recovery;
mod statefulness;
