//! Pipeline state groups.
//!
//! Each group is a plain value type whose `apply` pushes it to the native
//! API, diffed field-by-field against the device-held last-applied copy so
//! that even a dirty group only issues the calls whose values actually
//! changed. `force` bypasses the diff (device init and reset).

use crate::errors::Result;
use crate::gl::{
    BlendEquation, BlendFactor, Capability, CompareFunc, CullFace, FrontFace, GlContext, StencilOp,
    check_error,
};

// ─── Rectangles & Viewport ───────────────────────────────────────────────────

/// An integer rectangle in the logical top-left coordinate convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// The active viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, min_depth: 0.0, max_depth: 1.0 }
    }

    /// The viewport rectangle.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width as i32, self.height as i32)
    }
}

// ─── Blend State ─────────────────────────────────────────────────────────────

/// Output-merger blend configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub color_source: BlendFactor,
    pub color_destination: BlendFactor,
    pub alpha_source: BlendFactor,
    pub alpha_destination: BlendFactor,
    pub color_function: BlendEquation,
    pub alpha_function: BlendEquation,
    pub blend_color: [f32; 4],
}

impl BlendState {
    /// No blending: source overwrites destination.
    pub const OPAQUE: Self = Self::with_factors(BlendFactor::One, BlendFactor::Zero);

    /// Premultiplied alpha blending.
    pub const ALPHA_BLEND: Self =
        Self::with_factors(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);

    /// Additive blending.
    pub const ADDITIVE: Self = Self::with_factors(BlendFactor::SrcAlpha, BlendFactor::One);

    /// Straight (non-premultiplied) alpha blending.
    pub const NON_PREMULTIPLIED: Self =
        Self::with_factors(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

    const fn with_factors(source: BlendFactor, destination: BlendFactor) -> Self {
        Self {
            color_source: source,
            color_destination: destination,
            alpha_source: source,
            alpha_destination: destination,
            color_function: BlendEquation::Add,
            alpha_function: BlendEquation::Add,
            blend_color: [0.0; 4],
        }
    }

    /// Blending is disabled when the factors form the passthrough pair.
    #[must_use]
    pub fn blending_enabled(&self) -> bool {
        !(self.color_source == BlendFactor::One
            && self.color_destination == BlendFactor::Zero
            && self.alpha_source == BlendFactor::One
            && self.alpha_destination == BlendFactor::Zero)
    }

    pub(crate) fn apply<G: GlContext>(
        &self,
        gl: &G,
        last: &mut BlendState,
        force: bool,
    ) -> Result<()> {
        let enabled = self.blending_enabled();
        if force || enabled != last.blending_enabled() {
            if enabled {
                gl.enable(Capability::Blend);
            } else {
                gl.disable(Capability::Blend);
            }
            check_error(gl, "blend toggle")?;
        }

        if enabled {
            if force
                || self.color_function != last.color_function
                || self.alpha_function != last.alpha_function
            {
                gl.blend_equation_separate(self.color_function, self.alpha_function);
                check_error(gl, "blend equation")?;
            }
            if force
                || self.color_source != last.color_source
                || self.color_destination != last.color_destination
                || self.alpha_source != last.alpha_source
                || self.alpha_destination != last.alpha_destination
            {
                gl.blend_func_separate(
                    self.color_source,
                    self.color_destination,
                    self.alpha_source,
                    self.alpha_destination,
                );
                check_error(gl, "blend func")?;
            }
            if force || self.blend_color != last.blend_color {
                gl.blend_color(self.blend_color);
                check_error(gl, "blend color")?;
            }
        }

        *last = *self;
        Ok(())
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

// ─── Depth/Stencil State ─────────────────────────────────────────────────────

/// Depth and stencil test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_function: CompareFunc,
    pub stencil_enabled: bool,
    pub stencil_function: CompareFunc,
    pub stencil_reference: i32,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub stencil_fail: StencilOp,
    pub stencil_depth_fail: StencilOp,
    pub stencil_pass: StencilOp,
}

impl DepthStencilState {
    /// Depth test and write enabled, stencil disabled.
    pub const DEFAULT: Self = Self {
        depth_enabled: true,
        depth_write_enabled: true,
        depth_function: CompareFunc::LessEqual,
        stencil_enabled: false,
        stencil_function: CompareFunc::Always,
        stencil_reference: 0,
        stencil_read_mask: u32::MAX,
        stencil_write_mask: u32::MAX,
        stencil_fail: StencilOp::Keep,
        stencil_depth_fail: StencilOp::Keep,
        stencil_pass: StencilOp::Keep,
    };

    /// Depth test enabled, depth write disabled.
    pub const DEPTH_READ: Self =
        Self { depth_write_enabled: false, ..Self::DEFAULT };

    /// Both tests disabled.
    pub const NONE: Self = Self { depth_enabled: false, ..Self::DEFAULT };

    /// State used while clearing. Some drivers refuse to clear the stencil
    /// plane with the stencil test disabled, so it is kept enabled.
    pub(crate) const CLEAR: Self = Self { stencil_enabled: true, ..Self::DEFAULT };

    pub(crate) fn apply<G: GlContext>(
        &self,
        gl: &G,
        last: &mut DepthStencilState,
        force: bool,
    ) -> Result<()> {
        if force || self.depth_enabled != last.depth_enabled {
            if self.depth_enabled {
                gl.enable(Capability::DepthTest);
            } else {
                gl.disable(Capability::DepthTest);
            }
            check_error(gl, "depth test toggle")?;
        }
        if self.depth_enabled && (force || self.depth_function != last.depth_function) {
            gl.depth_func(self.depth_function);
            check_error(gl, "depth func")?;
        }
        if force || self.depth_write_enabled != last.depth_write_enabled {
            gl.depth_mask(self.depth_write_enabled);
            check_error(gl, "depth mask")?;
        }

        if force || self.stencil_enabled != last.stencil_enabled {
            if self.stencil_enabled {
                gl.enable(Capability::StencilTest);
            } else {
                gl.disable(Capability::StencilTest);
            }
            check_error(gl, "stencil test toggle")?;
        }
        if self.stencil_enabled {
            if force
                || self.stencil_function != last.stencil_function
                || self.stencil_reference != last.stencil_reference
                || self.stencil_read_mask != last.stencil_read_mask
            {
                gl.stencil_func(self.stencil_function, self.stencil_reference, self.stencil_read_mask);
                check_error(gl, "stencil func")?;
            }
            if force
                || self.stencil_fail != last.stencil_fail
                || self.stencil_depth_fail != last.stencil_depth_fail
                || self.stencil_pass != last.stencil_pass
            {
                gl.stencil_op(self.stencil_fail, self.stencil_depth_fail, self.stencil_pass);
                check_error(gl, "stencil op")?;
            }
            if force || self.stencil_write_mask != last.stencil_write_mask {
                gl.stencil_mask(self.stencil_write_mask);
                check_error(gl, "stencil mask")?;
            }
        }

        *last = *self;
        Ok(())
    }
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─── Rasterizer State ────────────────────────────────────────────────────────

/// Which faces to cull, in the logical (top-left, y-down) convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    CullClockwiseFace,
    CullCounterClockwiseFace,
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub scissor_test_enabled: bool,
    pub depth_bias: f32,
    pub slope_scale_depth_bias: f32,
}

impl RasterizerState {
    /// Counter-clockwise culling, no scissor, no bias.
    pub const CULL_COUNTER_CLOCKWISE: Self = Self {
        cull_mode: CullMode::CullCounterClockwiseFace,
        scissor_test_enabled: false,
        depth_bias: 0.0,
        slope_scale_depth_bias: 0.0,
    };

    /// Clockwise culling.
    pub const CULL_CLOCKWISE: Self =
        Self { cull_mode: CullMode::CullClockwiseFace, ..Self::CULL_COUNTER_CLOCKWISE };

    /// No culling.
    pub const CULL_NONE: Self =
        Self { cull_mode: CullMode::None, ..Self::CULL_COUNTER_CLOCKWISE };

    /// `offscreen` flips the winding: rendering into a framebuffer object
    /// inverts vertex order relative to the default surface.
    pub(crate) fn apply<G: GlContext>(
        &self,
        gl: &G,
        last: &mut RasterizerState,
        last_offscreen: &mut bool,
        force: bool,
        offscreen: bool,
    ) -> Result<()> {
        if force || self.cull_mode != last.cull_mode || *last_offscreen != offscreen {
            match self.cull_mode {
                CullMode::None => {
                    gl.disable(Capability::CullFace);
                    check_error(gl, "cull face toggle")?;
                }
                CullMode::CullClockwiseFace | CullMode::CullCounterClockwiseFace => {
                    gl.enable(Capability::CullFace);
                    check_error(gl, "cull face toggle")?;
                    gl.cull_face(CullFace::Back);
                    check_error(gl, "cull face")?;

                    let mut winding = match self.cull_mode {
                        CullMode::CullClockwiseFace => FrontFace::CounterClockwise,
                        _ => FrontFace::Clockwise,
                    };
                    if offscreen {
                        winding = match winding {
                            FrontFace::Clockwise => FrontFace::CounterClockwise,
                            FrontFace::CounterClockwise => FrontFace::Clockwise,
                        };
                    }
                    gl.front_face(winding);
                    check_error(gl, "front face")?;
                }
            }
            *last_offscreen = offscreen;
        }

        if force || self.scissor_test_enabled != last.scissor_test_enabled {
            if self.scissor_test_enabled {
                gl.enable(Capability::ScissorTest);
            } else {
                gl.disable(Capability::ScissorTest);
            }
            check_error(gl, "scissor test toggle")?;
        }

        if force
            || self.depth_bias != last.depth_bias
            || self.slope_scale_depth_bias != last.slope_scale_depth_bias
        {
            if self.depth_bias == 0.0 && self.slope_scale_depth_bias == 0.0 {
                gl.disable(Capability::PolygonOffsetFill);
                check_error(gl, "polygon offset toggle")?;
            } else {
                gl.enable(Capability::PolygonOffsetFill);
                check_error(gl, "polygon offset toggle")?;
                gl.polygon_offset(self.slope_scale_depth_bias, self.depth_bias);
                check_error(gl, "polygon offset")?;
            }
        }

        *last = *self;
        Ok(())
    }
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self::CULL_COUNTER_CLOCKWISE
    }
}
