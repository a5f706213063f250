//! Native Call Surface
//!
//! [`GlContext`] is the typed, opaque call surface the device drives. It
//! covers exactly the calls the caching layer issues: object creation and
//! deletion, framebuffer attachment, blitting, completeness checks,
//! attribute pointers, state toggles, uniform upload and error query.
//!
//! Implementations wrap a real OpenGL / OpenGL ES function loader; the
//! device never sees raw function pointers or integer enums. Handles are
//! newtypes over native object names so they cannot be mixed up.

use bitflags::bitflags;

use crate::errors::{GlimmerError, Result};

// ─── Object Handles ──────────────────────────────────────────────────────────

/// Native shader object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlShader(pub u32);

/// Native program object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlProgram(pub u32);

/// Native framebuffer object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlFramebuffer(pub u32);

impl GlFramebuffer {
    /// The window-system-provided framebuffer.
    pub const DEFAULT: Self = Self(0);
}

/// Native renderbuffer object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlRenderbuffer(pub u32);

/// Native texture object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTexture(pub u32);

impl GlTexture {
    /// The "no texture bound" name.
    pub const NONE: Self = Self(0);
}

/// Native buffer object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlBuffer(pub u32);

impl GlBuffer {
    /// The "no buffer bound" name.
    pub const NONE: Self = Self(0);
}

/// A resolved uniform location within a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

// ─── Call-Surface Enums ──────────────────────────────────────────────────────

/// Server-side capabilities toggled through `enable`/`disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    ScissorTest,
    CullFace,
    PolygonOffsetFill,
}

/// Buffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Array buffer (vertex data).
    Vertex,
    /// Element array buffer (index data).
    Index,
}

/// Texture binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    D3,
    Cube,
}

/// Framebuffer binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferTarget {
    /// Both read and draw.
    Both,
    Read,
    Draw,
}

/// Framebuffer attachment points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Color(u32),
    Depth,
    Stencil,
}

/// Renderbuffer storage formats used by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderbufferFormat {
    Rgba8,
    Depth16,
    Depth24,
    Depth24Stencil8,
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    IncompleteMissingAttachment,
    IncompleteDimensions,
    IncompleteMultisample,
    Unsupported,
    Unknown,
}

impl FramebufferStatus {
    /// Human-readable reason, mirroring the native status descriptions.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Complete => "framebuffer complete",
            Self::IncompleteAttachment => {
                "not all framebuffer attachment points are framebuffer attachment complete"
            }
            Self::IncompleteMissingAttachment => "no images are attached to the framebuffer",
            Self::IncompleteDimensions => {
                "not all attached images have the same width and height"
            }
            Self::IncompleteMultisample => {
                "not all attached images have the same number of samples"
            }
            Self::Unsupported => {
                "the combination of internal formats of the attached images violates \
                 an implementation-dependent set of restrictions"
            }
            Self::Unknown => "framebuffer incomplete",
        }
    }
}

/// Comparison functions for depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

/// Blend equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Stencil operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Incr,
    IncrWrap,
    Decr,
    DecrWrap,
    Invert,
}

/// Face selection for culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    Front,
    Back,
}

/// Polygon winding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// Primitive topologies accepted by the draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

impl PrimitiveKind {
    /// Number of vertices (or indices) consumed by `primitive_count`
    /// primitives of this topology.
    #[must_use]
    pub fn element_count(self, primitive_count: u32) -> u32 {
        match self {
            Self::Points => primitive_count,
            Self::Lines => primitive_count * 2,
            Self::LineStrip => primitive_count + 1,
            Self::Triangles => primitive_count * 3,
            Self::TriangleStrip => primitive_count + 2,
        }
    }
}

/// Index element widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    U16,
    U32,
}

impl IndexKind {
    /// Size of one index element in bytes.
    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Component types accepted by attribute pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttribType {
    F32,
    F16,
    U8,
    I16,
    U16,
}

/// Integer limits queried once at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLimit {
    MaxTextureUnits,
    MaxVertexAttributes,
    MaxDrawBuffers,
    MaxTextureSize,
}

bitflags! {
    /// Buffer selection mask for clear and blit operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

// ─── The Call Surface ────────────────────────────────────────────────────────

/// The native graphics call surface the device drives.
///
/// All methods take `&self`: the underlying API is a hidden-state C surface
/// and implementations are expected to use interior mutability where they
/// track anything at all. The device guarantees every call happens on the
/// owning thread.
pub trait GlContext {
    // ── Queries ──────────────────────────────────────────────────────────────

    /// Returns the oldest pending error code, `0` when none is pending.
    fn get_error(&self) -> u32;
    fn get_limit(&self, limit: DeviceLimit) -> i32;
    fn extensions(&self) -> Vec<String>;
    fn supports_blit_framebuffer(&self) -> bool;
    fn supports_invalidate_framebuffer(&self) -> bool;

    // ── Capability toggles ───────────────────────────────────────────────────

    fn enable(&self, cap: Capability);
    fn disable(&self, cap: Capability);

    // ── Fixed-function state ─────────────────────────────────────────────────

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn depth_range(&self, near: f32, far: f32);
    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool);
    fn depth_mask(&self, enabled: bool);
    fn depth_func(&self, func: CompareFunc);
    fn stencil_mask(&self, mask: u32);
    fn stencil_func(&self, func: CompareFunc, reference: i32, mask: u32);
    fn stencil_op(&self, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);
    fn blend_color(&self, color: [f32; 4]);
    fn blend_equation_separate(&self, color: BlendEquation, alpha: BlendEquation);
    fn blend_func_separate(
        &self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn cull_face(&self, face: CullFace);
    fn front_face(&self, winding: FrontFace);
    fn polygon_offset(&self, slope_factor: f32, units: f32);

    // ── Clears ───────────────────────────────────────────────────────────────

    fn clear_color(&self, color: [f32; 4]);
    fn clear_depth(&self, depth: f32);
    fn clear_stencil(&self, stencil: i32);
    fn clear(&self, mask: ClearMask);

    // ── Buffers ──────────────────────────────────────────────────────────────

    fn bind_buffer(&self, kind: BufferKind, buffer: GlBuffer);

    // ── Framebuffers & renderbuffers ─────────────────────────────────────────

    fn gen_framebuffer(&self) -> GlFramebuffer;
    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: GlFramebuffer);
    fn delete_framebuffer(&self, framebuffer: GlFramebuffer);
    fn gen_renderbuffer(&self) -> GlRenderbuffer;
    fn bind_renderbuffer(&self, renderbuffer: GlRenderbuffer);
    fn delete_renderbuffer(&self, renderbuffer: GlRenderbuffer);
    /// Allocates renderbuffer storage; `samples == 0` selects the
    /// single-sample allocation path.
    fn renderbuffer_storage(&self, samples: u32, format: RenderbufferFormat, width: u32, height: u32);
    fn framebuffer_texture_2d(
        &self,
        attachment: Attachment,
        kind: TextureKind,
        texture: GlTexture,
        level: u32,
    );
    fn framebuffer_renderbuffer(&self, attachment: Attachment, renderbuffer: GlRenderbuffer);
    fn check_framebuffer_status(&self) -> FramebufferStatus;
    fn invalidate_framebuffer(&self, target: FramebufferTarget, attachments: &[Attachment]);
    fn read_buffer(&self, color_attachment: u32);
    fn draw_buffer(&self, color_attachment: u32);
    /// Maps fragment outputs to color attachments; `None` disables a slot.
    fn draw_buffers(&self, buffers: &[Option<u32>]);
    /// Blits the `(0,0)..(width,height)` region from the read framebuffer to
    /// the draw framebuffer with nearest filtering.
    fn blit_framebuffer(&self, width: u32, height: u32, mask: ClearMask);

    // ── Textures ─────────────────────────────────────────────────────────────

    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, kind: TextureKind, texture: GlTexture);
    fn generate_mipmap(&self, kind: TextureKind);

    // ── Programs & uniforms ──────────────────────────────────────────────────

    fn create_program(&self) -> GlProgram;
    fn attach_shader(&self, program: GlProgram, shader: GlShader);
    fn detach_shader(&self, program: GlProgram, shader: GlShader);
    fn link_program(&self, program: GlProgram);
    fn link_status(&self, program: GlProgram) -> bool;
    fn program_info_log(&self, program: GlProgram) -> String;
    fn use_program(&self, program: GlProgram);
    fn delete_program(&self, program: GlProgram);
    fn uniform_location(&self, program: GlProgram, name: &str) -> Option<UniformLocation>;
    fn attrib_location(&self, program: GlProgram, name: &str) -> Option<u32>;
    fn uniform1i(&self, location: UniformLocation, value: i32);
    fn uniform4fv(&self, location: UniformLocation, values: &[f32]);

    // ── Vertex attributes ────────────────────────────────────────────────────

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: u32,
        ty: AttribType,
        normalized: bool,
        stride: u32,
        offset: usize,
    );
    fn enable_vertex_attrib_array(&self, location: u32);
    fn disable_vertex_attrib_array(&self, location: u32);

    // ── Draws ────────────────────────────────────────────────────────────────

    fn draw_arrays(&self, mode: PrimitiveKind, first: i32, count: i32);
    fn draw_elements(&self, mode: PrimitiveKind, count: i32, index: IndexKind, offset: usize);
}

/// Queries the pending native error after a state-mutating call.
///
/// Compiled to a no-op in release builds; completeness of the error check
/// is a development aid, not a recovery mechanism.
pub(crate) fn check_error<G: GlContext>(gl: &G, context: &'static str) -> Result<()> {
    if cfg!(debug_assertions) {
        let code = gl.get_error();
        if code != 0 {
            return Err(GlimmerError::NativeApi { code, context });
        }
    }
    Ok(())
}
