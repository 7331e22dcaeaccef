//! Approximate proton dosimetry.
//!
//! [`stopping`] integrates a power-law stopping power to obtain the residual
//! energy and deposited dose along depth for a single initial energy.
//! [`bragg`] weights those depth profiles by layer dose and sums them into a
//! composite curve.

pub mod bragg;
pub mod stopping;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Initial proton energy must be a positive finite value (got {0} MeV)")]
    NonPositiveEnergy(f64),

    #[error("Cannot compose a Bragg curve without any energy layers")]
    EmptyLayerSet,

    #[error("Composition buffer must hold at least one sample")]
    EmptyBuffer,
}
