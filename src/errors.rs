//! Error Types
//!
//! This module defines the error types used throughout the device layer.
//!
//! # Overview
//!
//! The main error type [`GlimmerError`] covers all failure modes including:
//! - Draws attempted without required prerequisite state
//! - Shader program link failures
//! - Native API errors (checked in debug builds only)
//! - Missing context capabilities
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GlimmerError>`.

use thiserror::Error;

/// The main error type for the glimmer device layer.
///
/// Cache-miss failures (link failures, incomplete framebuffers) always
/// propagate to the caller; the caches never substitute a different
/// working object for a failed one.
#[derive(Error, Debug)]
pub enum GlimmerError {
    // ========================================================================
    // State Errors
    // ========================================================================
    /// A draw or clear was attempted without required prerequisite state.
    #[error("Invalid device state: {0}")]
    InvalidState(&'static str),

    // ========================================================================
    // Shader & Program Errors
    // ========================================================================
    /// Native program linking failed. Carries the native link log.
    #[error("Failed to link shader program: {log}")]
    ShaderLink {
        /// Diagnostic log reported by the native linker.
        log: String,
    },

    // ========================================================================
    // Native API Errors
    // ========================================================================
    /// A native call reported an error code. Only raised in debug builds,
    /// and treated as a programming-error signal rather than a condition
    /// to recover from.
    #[error("Native API error 0x{code:04X} during {context}")]
    NativeApi {
        /// The native error code.
        code: u32,
        /// The operation that was being checked.
        context: &'static str,
    },

    /// The active context lacks a capability the requested operation needs.
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    /// A freshly built framebuffer failed its completeness check.
    #[error("Framebuffer incomplete: {reason}")]
    FramebufferIncomplete {
        /// Human-readable completeness failure reason.
        reason: &'static str,
    },
}

/// Alias for `Result<T, GlimmerError>`.
pub type Result<T> = std::result::Result<T, GlimmerError>;
