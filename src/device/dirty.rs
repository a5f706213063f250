//! Dirty-state tracking.
//!
//! One bit per independent state group. A bit is set whenever the
//! corresponding public state changes and cleared exactly when that group's
//! native application runs, so between two draws with no intervening
//! mutation no redundant native call is issued.

use bitflags::bitflags;

bitflags! {
    /// Pending state groups awaiting native application.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u16 {
        const SCISSOR = 1 << 0;
        const BLEND = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const RASTERIZER = 1 << 3;
        const INDEX_BUFFER = 1 << 4;
        const VERTEX_BUFFER = 1 << 5;
        const VERTEX_SHADER = 1 << 6;
        const FRAGMENT_SHADER = 1 << 7;

        /// Both shader stages.
        const SHADERS = Self::VERTEX_SHADER.bits() | Self::FRAGMENT_SHADER.bits();
    }
}
