//! Error types for the Ignis engine
//!
//! This module defines the recoverable error types used throughout the
//! engine: device bring-up, GPU allocation, submission and presentation.
//! Contract violations (stale handles, recording outside `begin`/`end`,
//! drawing without a bound pipeline) are not errors, they panic.

use std::fmt;

/// Result type for Ignis engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ignis engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, image, shader, out-of-range write, etc.)
    InvalidResource(String),

    /// Initialization failed (instance, device, swapchain)
    InitializationFailed(String),

    /// A device feature listed as required is not available
    MissingFeature(String),

    /// The swapchain no longer matches its surface (resize, minimize).
    /// Swapchains are never recreated, so this is terminal for the swapchain.
    SwapchainOutOfDate,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::MissingFeature(name) => write!(f, "Missing required device feature: {}", name),
            Error::SwapchainOutOfDate => write!(f, "Swapchain is out of date"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
