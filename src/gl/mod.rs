//! Native graphics API abstraction: the typed call surface and the
//! capability snapshot queried at device creation.

mod capabilities;
mod context;

pub use capabilities::GlCapabilities;
pub use context::{
    AttribType, Attachment, BlendEquation, BlendFactor, BufferKind, Capability, ClearMask,
    CompareFunc, CullFace, DeviceLimit, FramebufferStatus, FramebufferTarget, FrontFace, GlBuffer,
    GlContext, GlFramebuffer, GlProgram, GlRenderbuffer, GlShader, GlTexture, IndexKind,
    PrimitiveKind, RenderbufferFormat, StencilOp, TextureKind, UniformLocation,
};

pub(crate) use context::check_error;
