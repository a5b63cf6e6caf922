//! Error types for schedule, pyramid and volume construction
//!
//! Build-time failures never terminate the process: the caller keeps
//! the last valid product and decides what to report.

use thiserror::Error;

/// Cone schedule construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Base standard deviation is not a finite positive number
    #[error("Invalid base sigma: {0}")]
    InvalidSigma(f64),

    /// Section and interval sequences lost their `sections == intervals + 1` shape
    #[error("Section/interval mismatch: {sections} sections, {intervals} intervals")]
    SectionIntervalMismatch {
        /// Number of sections produced
        sections: usize,
        /// Number of intervals produced
        intervals: usize,
    },

    /// A section used fewer sub-rays than the one before it
    #[error("Ray count decreased at section {index}: {previous} -> {current}")]
    RayCountDecreased {
        /// Index of the offending section
        index: usize,
        /// Ray count of the previous section
        previous: u32,
        /// Ray count of the offending section
        current: u32,
    },

    /// Sigma was doubled too many times without fitting a section
    #[error("Sigma overflow at distance {distance}: no packing fits after {doublings} doublings")]
    SigmaOverflow {
        /// Distance along the cone axis
        distance: f64,
        /// Number of doublings attempted
        doublings: u32,
    },
}

/// Extinction pyramid construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PyramidError {
    /// Base standard deviation is not a finite positive number
    #[error("Invalid base sigma: {0}")]
    InvalidSigma(f32),

    /// Requested level-0 resolution has a zero axis
    #[error("Empty resolution: {0:?}")]
    EmptyResolution([u32; 3]),
}

/// Scalar field / grid errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VolumeError {
    /// Sample buffer does not match the resolution
    #[error("Data length mismatch: expected {expected} voxels, got {actual}")]
    LengthMismatch {
        /// Voxel count implied by the resolution
        expected: usize,
        /// Length of the supplied buffer
        actual: usize,
    },

    /// Resolution has a zero axis
    #[error("Empty resolution: {0:?}")]
    EmptyResolution([u32; 3]),

    /// Voxel spacing must be positive on every axis
    #[error("Invalid voxel spacing: {0:?}")]
    InvalidSpacing([f32; 3]),

    /// A density sample is NaN or infinite
    #[error("Non-finite density sample at voxel {index}")]
    NonFiniteSample {
        /// Flat Z-major index of the first offending voxel
        index: usize,
    },
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Umbrella error for session-level operations
#[derive(Error, Debug)]
pub enum Error {
    /// Cone schedule failure
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Extinction pyramid failure
    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    /// Volume failure
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}
