//! The caching graphics device.
//!
//! [`GraphicsDevice`] sits between a high-level draw call and the native
//! API: it tracks which pipeline state groups changed since the last draw
//! and pushes only those, deduplicates framebuffer objects per
//! render-target combination, links each shader pair at most once, and
//! skips redundant attribute-pointer and enable/disable work for batched
//! draws.
//!
//! Every method of the device belongs to the single thread that created
//! it. The one exception is the [`DisposeQueue`], which any thread may
//! enqueue into; the device drains it in [`GraphicsDevice::present`].

mod constants;
mod dirty;
mod dispose;
mod framebuffer;
mod ids;
mod program;
mod state;
mod textures;
mod vertex;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::errors::{GlimmerError, Result};
use crate::gl::{
    Attachment, BufferKind, Capability, ClearMask, FramebufferTarget, GlBuffer, GlCapabilities,
    GlContext, GlFramebuffer, GlProgram, GlTexture, IndexKind, PrimitiveKind, RenderbufferFormat,
    TextureKind, check_error,
};

use framebuffer::{FramebufferCache, RenderTarget};
use ids::next_raw_id;

pub use constants::{ConstantBuffer, ConstantBufferCollection};
pub use dirty::DirtyFlags;
pub use dispose::{DisposeAction, DisposeQueue};
pub use framebuffer::{
    DepthFormat, MAX_RENDER_TARGETS, RenderTargetBinding, RenderTargetBindingSet, RenderTargetId,
    RenderTargetUsage,
};
pub use program::{
    FragmentShader, ProgramCache, ProgramKey, SamplerBinding, ShaderAttribute, ShaderProgram,
    VertexShader,
};
pub use state::{BlendState, CullMode, DepthStencilState, RasterizerState, Rect, Viewport};
pub use textures::{TextureBinding, TextureUnits};
pub use vertex::{
    LayoutId, VertexElement, VertexElementUsage, VertexFormat, VertexLayout,
};

use vertex::AttributeBindingCache;

/// Constant buffer slots per shader stage.
const CONSTANT_BUFFER_SLOTS: usize = 16;

/// Back-buffer description the device is created against.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
}

/// Everything needed to register a render target with the device.
///
/// The texture object itself is created and owned by the caller's texture
/// layer; the device only allocates the renderbuffers that back
/// multisampled color and depth/stencil storage.
#[derive(Debug, Clone, Copy)]
pub struct RenderTargetDescriptor {
    pub texture: GlTexture,
    pub texture_kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub level_count: u32,
    pub usage: RenderTargetUsage,
    pub multisample_count: u32,
    pub depth_format: DepthFormat,
}

/// The caching graphics device.
///
/// Owns the native context, the capability snapshot taken at creation, and
/// the four caches. All state mutation goes through setters that mark the
/// corresponding dirty flag; [`apply_state`](Self::apply_state) flushes
/// pending groups in a fixed order immediately before each draw or clear.
#[derive(Debug)]
pub struct GraphicsDevice<G: GlContext> {
    gl: G,
    capabilities: GlCapabilities,
    config: DeviceConfig,
    dispose_queue: Arc<DisposeQueue>,

    dirty: DirtyFlags,

    blend_state: BlendState,
    depth_stencil_state: DepthStencilState,
    rasterizer_state: RasterizerState,
    last_blend_state: BlendState,
    last_depth_stencil_state: DepthStencilState,
    last_rasterizer_state: RasterizerState,
    last_rasterizer_offscreen: bool,

    scissor_rect: Rect,
    viewport: Viewport,

    vertex_buffer: Option<(GlBuffer, Arc<VertexLayout>)>,
    index_buffer: Option<(GlBuffer, IndexKind)>,

    vertex_shader: Option<Arc<VertexShader>>,
    fragment_shader: Option<Arc<FragmentShader>>,
    /// Key and handle of the program bound by the last activation.
    active_program: Option<(ProgramKey, GlProgram)>,

    program_cache: ProgramCache,
    attribute_cache: AttributeBindingCache,
    framebuffer_cache: FramebufferCache,
    /// Attribute slots currently enabled, device-wide.
    enabled_attributes: u64,

    textures: TextureUnits,
    vertex_constants: ConstantBufferCollection,
    fragment_constants: ConstantBufferCollection,

    render_targets: FxHashMap<RenderTargetId, RenderTarget>,
    current_targets: RenderTargetBindingSet,

    last_clear_color: [f32; 4],
    last_clear_depth: f32,
    last_clear_stencil: i32,
}

impl<G: GlContext> GraphicsDevice<G> {
    /// Creates the device, querying capabilities once and forcing the
    /// initial pipeline state into the context.
    pub fn new(gl: G, config: DeviceConfig) -> Result<Self> {
        let capabilities = GlCapabilities::query(&gl);
        if !capabilities.supports_framebuffer_objects {
            return Err(GlimmerError::UnsupportedCapability("framebuffer objects"));
        }

        let texture_units = capabilities.max_texture_units;
        let viewport = Viewport::new(0, 0, config.back_buffer_width, config.back_buffer_height);

        let mut device = Self {
            gl,
            capabilities,
            config,
            dispose_queue: DisposeQueue::new(),
            dirty: DirtyFlags::all(),
            blend_state: BlendState::OPAQUE,
            depth_stencil_state: DepthStencilState::DEFAULT,
            rasterizer_state: RasterizerState::CULL_COUNTER_CLOCKWISE,
            last_blend_state: BlendState::OPAQUE,
            last_depth_stencil_state: DepthStencilState::DEFAULT,
            last_rasterizer_state: RasterizerState::CULL_COUNTER_CLOCKWISE,
            last_rasterizer_offscreen: false,
            scissor_rect: viewport.bounds(),
            viewport,
            vertex_buffer: None,
            index_buffer: None,
            vertex_shader: None,
            fragment_shader: None,
            active_program: None,
            program_cache: ProgramCache::new(),
            attribute_cache: AttributeBindingCache::new(),
            framebuffer_cache: FramebufferCache::new(),
            enabled_attributes: 0,
            textures: TextureUnits::new(texture_units),
            vertex_constants: ConstantBufferCollection::new(CONSTANT_BUFFER_SLOTS),
            fragment_constants: ConstantBufferCollection::new(CONSTANT_BUFFER_SLOTS),
            render_targets: FxHashMap::default(),
            current_targets: RenderTargetBindingSet::new(),
            last_clear_color: [0.0; 4],
            last_clear_depth: 1.0,
            last_clear_stencil: 0,
        };

        device.force_apply_state()?;
        device.apply_viewport()?;
        Ok(device)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// The underlying native call surface.
    pub fn context(&self) -> &G {
        &self.gl
    }

    /// The capability snapshot taken at creation.
    #[must_use]
    pub fn capabilities(&self) -> &GlCapabilities {
        &self.capabilities
    }

    /// Handle to the dispose queue, for sharing with resource wrappers on
    /// other threads.
    #[must_use]
    pub fn dispose_queue(&self) -> Arc<DisposeQueue> {
        Arc::clone(&self.dispose_queue)
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn scissor_rect(&self) -> Rect {
        self.scissor_rect
    }

    #[must_use]
    pub fn blend_state(&self) -> BlendState {
        self.blend_state
    }

    #[must_use]
    pub fn depth_stencil_state(&self) -> DepthStencilState {
        self.depth_stencil_state
    }

    #[must_use]
    pub fn rasterizer_state(&self) -> RasterizerState {
        self.rasterizer_state
    }

    /// Whether a custom render-target set is currently bound.
    #[must_use]
    pub fn is_render_target_bound(&self) -> bool {
        !self.current_targets.is_empty()
    }

    /// Number of cached shader programs.
    #[must_use]
    pub fn program_count(&self) -> usize {
        self.program_cache.len()
    }

    /// Number of cached framebuffer objects.
    #[must_use]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffer_cache.len()
    }

    /// Number of cached multisample-resolve framebuffer objects.
    #[must_use]
    pub fn resolve_framebuffer_count(&self) -> usize {
        self.framebuffer_cache.resolve_len()
    }

    /// Number of cached attribute descriptor sets.
    #[must_use]
    pub fn attribute_set_count(&self) -> usize {
        self.attribute_cache.len()
    }

    /// Constant buffers fed to the vertex stage.
    pub fn vertex_constants_mut(&mut self) -> &mut ConstantBufferCollection {
        &mut self.vertex_constants
    }

    /// Constant buffers fed to the fragment stage.
    pub fn fragment_constants_mut(&mut self) -> &mut ConstantBufferCollection {
        &mut self.fragment_constants
    }

    // ── State setters ────────────────────────────────────────────────────────

    pub fn set_blend_state(&mut self, state: BlendState) {
        if self.blend_state != state {
            self.blend_state = state;
            self.dirty.insert(DirtyFlags::BLEND);
        }
    }

    pub fn set_depth_stencil_state(&mut self, state: DepthStencilState) {
        if self.depth_stencil_state != state {
            self.depth_stencil_state = state;
            self.dirty.insert(DirtyFlags::DEPTH_STENCIL);
        }
    }

    pub fn set_rasterizer_state(&mut self, state: RasterizerState) {
        if self.rasterizer_state != state {
            self.rasterizer_state = state;
            self.dirty.insert(DirtyFlags::RASTERIZER);
        }
    }

    pub fn set_scissor_rect(&mut self, rect: Rect) {
        if self.scissor_rect != rect {
            self.scissor_rect = rect;
            self.dirty.insert(DirtyFlags::SCISSOR);
        }
    }

    /// Sets the viewport. Applied to the context immediately rather than at
    /// the next draw; the position fixup depends on the viewport size, so
    /// the vertex shader group is marked dirty.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.viewport = viewport;
        self.apply_viewport()
    }

    pub fn set_vertex_buffer(&mut self, binding: Option<(GlBuffer, Arc<VertexLayout>)>) {
        let changed = match (&self.vertex_buffer, &binding) {
            (None, None) => false,
            (Some((current, current_layout)), Some((new, new_layout))) => {
                current != new || current_layout.id() != new_layout.id()
            }
            _ => true,
        };
        if changed {
            self.vertex_buffer = binding;
            self.dirty.insert(DirtyFlags::VERTEX_BUFFER);
        }
    }

    pub fn set_index_buffer(&mut self, binding: Option<(GlBuffer, IndexKind)>) {
        if self.index_buffer != binding {
            self.index_buffer = binding;
            self.dirty.insert(DirtyFlags::INDEX_BUFFER);
        }
    }

    pub fn set_vertex_shader(&mut self, shader: Option<Arc<VertexShader>>) {
        let changed = match (&self.vertex_shader, &shader) {
            (None, None) => false,
            (Some(current), Some(new)) => current.key() != new.key(),
            _ => true,
        };
        if changed {
            self.vertex_shader = shader;
            self.dirty.insert(DirtyFlags::VERTEX_SHADER);
        }
    }

    pub fn set_fragment_shader(&mut self, shader: Option<Arc<FragmentShader>>) {
        let changed = match (&self.fragment_shader, &shader) {
            (None, None) => false,
            (Some(current), Some(new)) => current.key() != new.key(),
            _ => true,
        };
        if changed {
            self.fragment_shader = shader;
            self.dirty.insert(DirtyFlags::FRAGMENT_SHADER);
        }
    }

    /// Sets (or clears) the texture wanted on a unit.
    pub fn set_texture(&mut self, unit: usize, binding: Option<TextureBinding>) {
        self.textures.set(unit, binding);
    }

    // ── State application ────────────────────────────────────────────────────

    /// Flushes every dirty state group to the context, in a fixed order:
    /// scissor, blend, depth/stencil, rasterizer, then (only with
    /// `apply_shaders`) index buffer, vertex buffer, shader program,
    /// constant buffers and textures.
    ///
    /// Clear operations pass `apply_shaders == false`; the shader-related
    /// groups stay dirty for the next draw. With `apply_shaders == true`
    /// both a vertex and a fragment shader must be set.
    pub fn apply_state(&mut self, apply_shaders: bool) -> Result<()> {
        if self.dirty.contains(DirtyFlags::SCISSOR) {
            let mut rect = self.scissor_rect;
            // The native origin is bottom-left; the logical convention is
            // top-left. The default surface needs the flip, a framebuffer
            // object does not.
            if self.current_targets.is_empty() {
                rect.y = self.viewport.height as i32 - rect.y - rect.height;
            }
            self.gl.scissor(rect.x, rect.y, rect.width, rect.height);
            check_error(&self.gl, "scissor")?;
            self.dirty.remove(DirtyFlags::SCISSOR);
        }

        if self.dirty.contains(DirtyFlags::BLEND) {
            self.blend_state.apply(&self.gl, &mut self.last_blend_state, false)?;
            self.dirty.remove(DirtyFlags::BLEND);
        }

        if self.dirty.contains(DirtyFlags::DEPTH_STENCIL) {
            self.depth_stencil_state.apply(&self.gl, &mut self.last_depth_stencil_state, false)?;
            self.dirty.remove(DirtyFlags::DEPTH_STENCIL);
        }

        if self.dirty.contains(DirtyFlags::RASTERIZER) {
            let offscreen = !self.current_targets.is_empty();
            self.rasterizer_state.apply(
                &self.gl,
                &mut self.last_rasterizer_state,
                &mut self.last_rasterizer_offscreen,
                false,
                offscreen,
            )?;
            self.dirty.remove(DirtyFlags::RASTERIZER);
        }

        if !apply_shaders {
            return Ok(());
        }

        if self.dirty.contains(DirtyFlags::INDEX_BUFFER) {
            if let Some((buffer, _)) = self.index_buffer {
                self.gl.bind_buffer(BufferKind::Index, buffer);
                check_error(&self.gl, "bind index buffer")?;
            }
            self.dirty.remove(DirtyFlags::INDEX_BUFFER);
        }

        if self.dirty.contains(DirtyFlags::VERTEX_BUFFER) {
            if let Some((buffer, _)) = &self.vertex_buffer {
                self.gl.bind_buffer(BufferKind::Vertex, *buffer);
                check_error(&self.gl, "bind vertex buffer")?;
            }
            self.dirty.remove(DirtyFlags::VERTEX_BUFFER);
        }

        if self.vertex_shader.is_none() {
            return Err(GlimmerError::InvalidState("a vertex shader must be set"));
        }
        if self.fragment_shader.is_none() {
            return Err(GlimmerError::InvalidState("a fragment shader must be set"));
        }

        if self.dirty.intersects(DirtyFlags::SHADERS) {
            self.activate_program()?;
            self.dirty.remove(DirtyFlags::SHADERS);
        }

        let Some((key, _)) = self.active_program else {
            return Err(GlimmerError::InvalidState("no shader program is active"));
        };
        let program = self
            .program_cache
            .get_mut(key)
            .ok_or(GlimmerError::InvalidState("active shader program left the cache"))?;
        self.vertex_constants.apply(&self.gl, program)?;
        self.fragment_constants.apply(&self.gl, program)?;

        self.textures.apply(&self.gl)
    }

    /// Links (or fetches) the program for the current shader pair, binds it
    /// when it differs from the active one and re-uploads the position
    /// fixup when the program wants it.
    fn activate_program(&mut self) -> Result<()> {
        let (Some(vs), Some(fs)) = (self.vertex_shader.clone(), self.fragment_shader.clone())
        else {
            return Err(GlimmerError::InvalidState("both shader stages must be set"));
        };

        let program = self.program_cache.get_or_link(&self.gl, &vs, &fs)?;
        let key = program.key();
        let handle = program.program();

        if self.active_program.map(|(_, active)| active) != Some(handle) {
            self.gl.use_program(handle);
            check_error(&self.gl, "use program")?;
        }
        self.active_program = Some((key, handle));

        // The fixup shifts clip coordinates by slightly less than half a
        // pixel to keep the top-left fill convention, and flips Y when
        // rendering into a framebuffer object. Programs without the
        // uniform skip the upload.
        if let Some(location) = program.uniform_location(&self.gl, "posFixup")? {
            let mut fixup = [
                1.0,
                1.0,
                (63.0 / 64.0) / self.viewport.width as f32,
                -(63.0 / 64.0) / self.viewport.height as f32,
            ];
            if !self.current_targets.is_empty() {
                fixup[1] = -fixup[1];
                fixup[3] = -fixup[3];
            }
            self.gl.uniform4fv(location, &fixup);
            check_error(&self.gl, "position fixup upload")?;
        }
        Ok(())
    }

    fn force_apply_state(&mut self) -> Result<()> {
        let offscreen = !self.current_targets.is_empty();
        self.blend_state.apply(&self.gl, &mut self.last_blend_state, true)?;
        self.depth_stencil_state.apply(&self.gl, &mut self.last_depth_stencil_state, true)?;
        self.rasterizer_state.apply(
            &self.gl,
            &mut self.last_rasterizer_state,
            &mut self.last_rasterizer_offscreen,
            true,
            offscreen,
        )?;
        self.dirty
            .remove(DirtyFlags::BLEND | DirtyFlags::DEPTH_STENCIL | DirtyFlags::RASTERIZER);
        Ok(())
    }

    fn apply_viewport(&mut self) -> Result<()> {
        let vp = self.viewport;
        if self.current_targets.is_empty() {
            let flipped = self.config.back_buffer_height as i32 - vp.y - vp.height as i32;
            self.gl.viewport(vp.x, flipped, vp.width as i32, vp.height as i32);
        } else {
            self.gl.viewport(vp.x, vp.y, vp.width as i32, vp.height as i32);
        }
        check_error(&self.gl, "viewport")?;
        self.gl.depth_range(vp.min_depth, vp.max_depth);
        check_error(&self.gl, "depth range")?;

        // The position fixup scales with the viewport.
        self.dirty.insert(DirtyFlags::VERTEX_SHADER);
        Ok(())
    }

    // ── Clears & draws ───────────────────────────────────────────────────────

    /// Clears the selected buffers of the bound surface.
    ///
    /// The native clear obeys the scissor rectangle, the write masks and
    /// the depth/stencil state, so those are overridden for the duration
    /// and restored afterwards. Clear values are cached; unchanged values
    /// issue no native call.
    pub fn clear(&mut self, options: ClearMask, color: [f32; 4], depth: f32, stencil: i32) -> Result<()> {
        let saved_scissor = self.scissor_rect;
        let saved_depth_stencil = self.depth_stencil_state;
        let saved_blend = self.blend_state;

        self.set_scissor_rect(self.viewport.bounds());
        self.set_depth_stencil_state(DepthStencilState::CLEAR);
        self.set_blend_state(BlendState::OPAQUE);
        self.apply_state(false)?;

        let mut mask = ClearMask::empty();
        if options.contains(ClearMask::COLOR) {
            if color != self.last_clear_color {
                self.gl.clear_color(color);
                check_error(&self.gl, "clear color")?;
                self.last_clear_color = color;
            }
            mask |= ClearMask::COLOR;
        }
        if options.contains(ClearMask::STENCIL) {
            if stencil != self.last_clear_stencil {
                self.gl.clear_stencil(stencil);
                check_error(&self.gl, "clear stencil")?;
                self.last_clear_stencil = stencil;
            }
            mask |= ClearMask::STENCIL;
        }
        if options.contains(ClearMask::DEPTH) {
            if depth != self.last_clear_depth {
                self.gl.clear_depth(depth);
                check_error(&self.gl, "clear depth")?;
                self.last_clear_depth = depth;
            }
            mask |= ClearMask::DEPTH;
        }

        self.gl.clear(mask);
        check_error(&self.gl, "clear")?;

        self.set_scissor_rect(saved_scissor);
        self.set_depth_stencil_state(saved_depth_stencil);
        self.set_blend_state(saved_blend);
        Ok(())
    }

    /// Draws unindexed primitives from the bound vertex buffer.
    pub fn draw_primitives(
        &mut self,
        primitive: PrimitiveKind,
        vertex_start: i32,
        primitive_count: u32,
    ) -> Result<()> {
        if self.vertex_buffer.is_none() {
            return Err(GlimmerError::InvalidState("a vertex buffer must be set"));
        }

        self.apply_state(true)?;
        self.apply_vertex_attributes(0)?;

        let count = primitive.element_count(primitive_count);
        self.gl.draw_arrays(primitive, vertex_start, count as i32);
        check_error(&self.gl, "draw arrays")
    }

    /// Draws indexed primitives from the bound vertex and index buffers.
    pub fn draw_indexed_primitives(
        &mut self,
        primitive: PrimitiveKind,
        base_vertex: u32,
        start_index: u32,
        primitive_count: u32,
    ) -> Result<()> {
        let Some((_, index_kind)) = self.index_buffer else {
            return Err(GlimmerError::InvalidState("an index buffer must be set for indexed draws"));
        };
        let stride = match &self.vertex_buffer {
            Some((_, layout)) => layout.stride(),
            None => return Err(GlimmerError::InvalidState("a vertex buffer must be set")),
        };

        self.apply_state(true)?;
        self.apply_vertex_attributes(stride as usize * base_vertex as usize)?;

        let count = primitive.element_count(primitive_count);
        let offset = start_index as usize * index_kind.byte_size();
        self.gl.draw_elements(primitive, count as i32, index_kind, offset);
        check_error(&self.gl, "draw elements")
    }

    fn apply_vertex_attributes(&mut self, base_offset: usize) -> Result<()> {
        let Some((key, _)) = self.active_program else {
            return Err(GlimmerError::InvalidState("no shader program is active"));
        };
        let Some((buffer, layout)) = &self.vertex_buffer else {
            return Err(GlimmerError::InvalidState("a vertex buffer must be set"));
        };
        let Some(program) = self.program_cache.get(key) else {
            return Err(GlimmerError::InvalidState("active shader program left the cache"));
        };
        self.attribute_cache.apply(
            &self.gl,
            program,
            layout.as_ref(),
            base_offset,
            Some(*buffer),
            &mut self.enabled_attributes,
        )
    }

    // ── Render targets ───────────────────────────────────────────────────────

    /// Registers a render target, allocating its backing renderbuffers.
    ///
    /// A multisample request on a context without framebuffer blitting
    /// degrades to a single-sampled target with a warning, so the resolve
    /// path never meets an unresolvable target.
    pub fn create_render_target(&mut self, desc: &RenderTargetDescriptor) -> Result<RenderTargetId> {
        let mut samples = desc.multisample_count;
        if samples > 0 && !self.capabilities.supports_blit_framebuffer {
            log::warn!(
                "multisampling requested without framebuffer blit support; \
                 creating a single-sampled target"
            );
            samples = 0;
        }

        let color_renderbuffer = if samples > 0 {
            let renderbuffer = self.gl.gen_renderbuffer();
            check_error(&self.gl, "gen color renderbuffer")?;
            self.gl.bind_renderbuffer(renderbuffer);
            check_error(&self.gl, "bind color renderbuffer")?;
            self.gl.renderbuffer_storage(samples, RenderbufferFormat::Rgba8, desc.width, desc.height);
            check_error(&self.gl, "color renderbuffer storage")?;
            Some(renderbuffer)
        } else {
            None
        };

        let (depth_renderbuffer, stencil_renderbuffer) = match desc.depth_format {
            DepthFormat::None => (None, None),
            format => {
                let storage = match format {
                    DepthFormat::Depth16 => RenderbufferFormat::Depth16,
                    DepthFormat::Depth24 => RenderbufferFormat::Depth24,
                    _ => RenderbufferFormat::Depth24Stencil8,
                };
                let renderbuffer = self.gl.gen_renderbuffer();
                check_error(&self.gl, "gen depth renderbuffer")?;
                self.gl.bind_renderbuffer(renderbuffer);
                check_error(&self.gl, "bind depth renderbuffer")?;
                self.gl.renderbuffer_storage(samples, storage, desc.width, desc.height);
                check_error(&self.gl, "depth renderbuffer storage")?;

                // Combined formats share one renderbuffer between the depth
                // and stencil attachment points.
                let stencil = (format == DepthFormat::Depth24Stencil8).then_some(renderbuffer);
                (Some(renderbuffer), stencil)
            }
        };

        let id = RenderTargetId(next_raw_id());
        self.render_targets.insert(
            id,
            RenderTarget {
                texture: desc.texture,
                texture_kind: desc.texture_kind,
                width: desc.width,
                height: desc.height,
                level_count: desc.level_count,
                usage: desc.usage,
                multisample_count: samples,
                color_renderbuffer,
                depth_renderbuffer,
                stencil_renderbuffer,
            },
        );
        log::debug!("created render target {id:?} ({}x{}, {samples} samples)", desc.width, desc.height);
        Ok(id)
    }

    /// Unregisters a render target and releases its backing renderbuffers.
    ///
    /// Every cached framebuffer referencing the target is destroyed first,
    /// so no cache entry ever points at released storage.
    pub fn delete_render_target(&mut self, id: RenderTargetId) {
        self.framebuffer_cache.delete_for_target(&self.gl, id);

        if let Some(target) = self.render_targets.remove(&id) {
            if let Some(color) = target.color_renderbuffer {
                self.gl.delete_renderbuffer(color);
            }
            if let Some(stencil) = target.stencil_renderbuffer
                && target.depth_renderbuffer != Some(stencil)
            {
                self.gl.delete_renderbuffer(stencil);
            }
            if let Some(depth) = target.depth_renderbuffer {
                self.gl.delete_renderbuffer(depth);
            }
        }
    }

    /// Binds a render-target set, or the default surface when `bindings`
    /// is empty. The outgoing set is resolved before the switch.
    pub fn set_render_targets(&mut self, bindings: &[RenderTargetBinding]) -> Result<()> {
        if bindings.len() > MAX_RENDER_TARGETS
            || bindings.len() > self.capabilities.max_draw_buffers as usize
        {
            return Err(GlimmerError::UnsupportedCapability("simultaneous render target count"));
        }

        if !self.current_targets.is_empty() {
            self.resolve_render_targets()?;
        }

        self.current_targets = RenderTargetBindingSet::from_slice(bindings);

        if bindings.is_empty() {
            self.gl.bind_framebuffer(FramebufferTarget::Both, GlFramebuffer::DEFAULT);
            check_error(&self.gl, "bind default framebuffer")?;

            // Winding flips back for on-screen rendering, and sampled
            // textures need rebinding under the new surface.
            self.dirty.insert(DirtyFlags::RASTERIZER);
            self.textures.mark_all_dirty();

            let viewport =
                Viewport::new(0, 0, self.config.back_buffer_width, self.config.back_buffer_height);
            self.set_scissor_rect(viewport.bounds());
            return self.set_viewport(viewport);
        }

        self.framebuffer_cache.get_or_create(&self.gl, bindings, &self.render_targets)?;

        // Restore the draw-buffer mapping and color mask so a following
        // clear reaches every bound attachment.
        let buffers: SmallVec<[Option<u32>; MAX_RENDER_TARGETS]> =
            (0..bindings.len() as u32).map(Some).collect();
        self.gl.draw_buffers(&buffers);
        check_error(&self.gl, "draw buffers")?;
        self.gl.color_mask(true, true, true, true);
        check_error(&self.gl, "color mask")?;

        self.dirty
            .insert(DirtyFlags::BLEND | DirtyFlags::DEPTH_STENCIL | DirtyFlags::RASTERIZER);
        self.textures.mark_all_dirty();

        let (width, height) = {
            let first = self.target(bindings[0].target)?;
            (first.width, first.height)
        };
        let viewport = Viewport::new(0, 0, width, height);
        self.set_scissor_rect(viewport.bounds());
        self.set_viewport(viewport)
    }

    /// Binds (creating on first use) the framebuffer for a binding set.
    pub fn get_or_create_framebuffer(
        &mut self,
        bindings: &[RenderTargetBinding],
    ) -> Result<GlFramebuffer> {
        self.framebuffer_cache.get_or_create(&self.gl, bindings, &self.render_targets)
    }

    /// Binds (creating on first use) the resolve framebuffer for a binding
    /// set.
    pub fn get_or_create_resolve_framebuffer(
        &mut self,
        bindings: &[RenderTargetBinding],
    ) -> Result<GlFramebuffer> {
        self.framebuffer_cache.get_or_create_resolve(&self.gl, bindings, &self.render_targets)
    }

    /// Copies the multisampled content of the outgoing set into its resolve
    /// textures and refreshes mipmap chains.
    fn resolve_render_targets(&mut self) -> Result<()> {
        let bindings = self.current_targets.clone();
        if bindings.is_empty() {
            return Ok(());
        }

        let (multisampled, first_usage) = {
            let first = self.target(bindings[0].target)?;
            (first.multisample_count > 0, first.usage)
        };

        if multisampled {
            if !self.capabilities.supports_blit_framebuffer {
                return Err(GlimmerError::UnsupportedCapability("framebuffer blit"));
            }

            // Binds the resolve framebuffer as the blit destination.
            self.framebuffer_cache.get_or_create_resolve(&self.gl, &bindings, &self.render_targets)?;

            // The scissor test applies to blits; a stale rectangle must
            // not clip the resolve.
            let scissored = self.last_rasterizer_state.scissor_test_enabled;
            if scissored {
                self.gl.disable(Capability::ScissorTest);
                check_error(&self.gl, "scissor toggle")?;
            }

            let Some(source) = self.framebuffer_cache.get(&bindings) else {
                return Err(GlimmerError::InvalidState("resolving a set that was never bound"));
            };
            self.gl.bind_framebuffer(FramebufferTarget::Read, source);
            check_error(&self.gl, "bind read framebuffer")?;

            for (slot, binding) in bindings.iter().enumerate() {
                let target = self.target(binding.target)?;
                let (width, height) = (target.width, target.height);
                self.gl.read_buffer(slot as u32);
                check_error(&self.gl, "read buffer")?;
                self.gl.draw_buffer(slot as u32);
                check_error(&self.gl, "draw buffer")?;
                self.gl.blit_framebuffer(width, height, ClearMask::COLOR);
                check_error(&self.gl, "resolve blit")?;
            }

            if first_usage == RenderTargetUsage::DiscardContents
                && self.capabilities.supports_invalidate_framebuffer
            {
                let attachments: SmallVec<[Attachment; MAX_RENDER_TARGETS]> =
                    (0..bindings.len() as u32).map(Attachment::Color).collect();
                self.gl.invalidate_framebuffer(FramebufferTarget::Read, &attachments);
                check_error(&self.gl, "invalidate framebuffer")?;
            }

            if scissored {
                self.gl.enable(Capability::ScissorTest);
                check_error(&self.gl, "scissor toggle")?;
            }
        }

        // Mipmap chains refresh once per resolve, multisampled or not.
        let mut rebound_textures = false;
        for binding in &bindings {
            let target = self.target(binding.target)?;
            if target.level_count > 1 {
                let (kind, texture) = (target.texture_kind, target.texture);
                self.gl.bind_texture(kind, texture);
                check_error(&self.gl, "bind texture")?;
                self.gl.generate_mipmap(kind);
                check_error(&self.gl, "generate mipmap")?;
                rebound_textures = true;
            }
        }
        if rebound_textures {
            // The direct binds above bypassed the unit tracker.
            self.textures.mark_all_dirty();
        }
        Ok(())
    }

    fn target(&self, id: RenderTargetId) -> Result<&RenderTarget> {
        self.render_targets
            .get(&id)
            .ok_or(GlimmerError::InvalidState("binding references a disposed render target"))
    }

    // ── Presentation & reset ─────────────────────────────────────────────────

    /// The device's part of presentation: the dispose drain point. The
    /// buffer swap itself belongs to the windowing layer.
    pub fn present(&mut self) {
        self.dispose_queue.drain_pending();
    }

    /// Drops every cache and forces all state back into the context, as
    /// after a context loss. Programs deleted here may be re-linked by
    /// subsequent draws.
    pub fn reset(&mut self) -> Result<()> {
        self.program_cache.clear(&self.gl);
        self.framebuffer_cache.clear(&self.gl);
        self.attribute_cache.clear();
        self.active_program = None;
        self.enabled_attributes = 0;
        self.vertex_constants.invalidate_programs();
        self.fragment_constants.invalidate_programs();
        self.textures.reset();
        self.current_targets.clear();

        self.viewport =
            Viewport::new(0, 0, self.config.back_buffer_width, self.config.back_buffer_height);
        self.dirty = DirtyFlags::all();
        self.force_apply_state()?;
        self.apply_viewport()
    }
}
