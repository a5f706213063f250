//! Context capability snapshot.
//!
//! Limits and extension support are queried exactly once when the device is
//! created and never re-queried; the native values cannot change for the
//! lifetime of a context.

use crate::gl::context::{DeviceLimit, GlContext};

/// Limits and feature support of the active context.
#[derive(Debug, Clone)]
pub struct GlCapabilities {
    pub max_texture_units: u32,
    pub max_vertex_attributes: u32,
    pub max_draw_buffers: u32,
    pub max_texture_size: u32,
    pub supports_framebuffer_objects: bool,
    pub supports_blit_framebuffer: bool,
    pub supports_invalidate_framebuffer: bool,
    pub extensions: Vec<String>,
}

impl GlCapabilities {
    /// Queries the context once.
    ///
    /// Texture units are clamped to 32 and vertex attributes to 64 so the
    /// device can track both in fixed-width bitmasks.
    pub fn query<G: GlContext>(gl: &G) -> Self {
        let extensions = gl.extensions();
        for extension in &extensions {
            log::debug!("supported extension: {extension}");
        }

        let supports_framebuffer_objects = extensions.iter().any(|e| {
            e.contains("ARB_framebuffer_object")
                || e.contains("EXT_framebuffer_object")
                || e.contains("OES_framebuffer_object")
        });

        Self {
            max_texture_units: query_limit(gl, DeviceLimit::MaxTextureUnits, 16).min(32),
            max_vertex_attributes: query_limit(gl, DeviceLimit::MaxVertexAttributes, 16).min(64),
            max_draw_buffers: query_limit(gl, DeviceLimit::MaxDrawBuffers, 1),
            max_texture_size: query_limit(gl, DeviceLimit::MaxTextureSize, 2048),
            supports_framebuffer_objects,
            supports_blit_framebuffer: gl.supports_blit_framebuffer(),
            supports_invalidate_framebuffer: gl.supports_invalidate_framebuffer(),
            extensions,
        }
    }
}

fn query_limit<G: GlContext>(gl: &G, limit: DeviceLimit, fallback: u32) -> u32 {
    let value = gl.get_limit(limit);
    if value > 0 { value as u32 } else { fallback }
}
