//! Glimmer, a caching device layer for OpenGL-style graphics APIs.
//!
//! The crate provides the state-application and resource-caching
//! discipline between a high-level draw call and the native calls it
//! triggers: framebuffer objects deduplicated per render-target
//! combination, shader pairs linked at most once, attribute bindings
//! cached per (layout, shader pair), dirty-flag gated state flushes, and
//! a cross-thread queue for deferred resource disposal.
//!
//! The native API is consumed through the [`gl::GlContext`] trait; the
//! crate never touches a function loader itself.

pub mod device;
pub mod errors;
pub mod gl;

pub use device::{
    BlendState, ConstantBuffer, CullMode, DepthFormat, DepthStencilState, DeviceConfig,
    DisposeQueue, FragmentShader, GraphicsDevice, RasterizerState, Rect, RenderTargetBinding,
    RenderTargetDescriptor, RenderTargetId, RenderTargetUsage, SamplerBinding, ShaderAttribute,
    TextureBinding, VertexElement, VertexElementUsage, VertexFormat, VertexLayout, VertexShader,
    Viewport,
};
pub use errors::{GlimmerError, Result};
pub use gl::{GlCapabilities, GlContext};
