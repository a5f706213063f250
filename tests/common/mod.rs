//! Shared test support: a recording implementation of [`GlContext`].
//!
//! `RecordingGl` hands out sequential object names, keeps live-object sets
//! for programs, framebuffers and renderbuffers, and appends one line per
//! native call to an inspectable log. Uniform and attribute lookup tables
//! and link failures are programmable per test.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glimmer::device::{
    DepthFormat, FragmentShader, RenderTargetDescriptor, RenderTargetUsage, SamplerBinding,
    ShaderAttribute, VertexElementUsage, VertexShader,
};
use glimmer::gl::{
    AttribType, Attachment, BlendEquation, BlendFactor, BufferKind, Capability, ClearMask,
    CompareFunc, CullFace, DeviceLimit, FramebufferStatus, FramebufferTarget, FrontFace, GlBuffer,
    GlContext, GlFramebuffer, GlProgram, GlRenderbuffer, GlShader, GlTexture, IndexKind,
    PrimitiveKind, RenderbufferFormat, StencilOp, TextureKind, UniformLocation,
};
use glimmer::{DeviceConfig, GraphicsDevice};

/// A `GlContext` that records every call instead of talking to a driver.
#[derive(Debug)]
pub struct RecordingGl {
    next_name: Cell<u32>,
    calls: RefCell<Vec<String>>,
    live_programs: RefCell<HashSet<u32>>,
    live_framebuffers: RefCell<HashSet<u32>>,
    live_renderbuffers: RefCell<HashSet<u32>>,
    uniforms: RefCell<HashMap<String, i32>>,
    attributes: RefCell<HashMap<String, u32>>,
    pending_link_failures: Cell<u32>,
    failed_programs: RefCell<HashSet<u32>>,
    framebuffer_status: Cell<FramebufferStatus>,
    fbo_supported: Cell<bool>,
    blit_supported: Cell<bool>,
    invalidate_supported: Cell<bool>,
}

impl RecordingGl {
    pub fn new() -> Self {
        Self {
            next_name: Cell::new(1),
            calls: RefCell::new(Vec::new()),
            live_programs: RefCell::new(HashSet::new()),
            live_framebuffers: RefCell::new(HashSet::new()),
            live_renderbuffers: RefCell::new(HashSet::new()),
            uniforms: RefCell::new(HashMap::new()),
            attributes: RefCell::new(HashMap::new()),
            pending_link_failures: Cell::new(0),
            failed_programs: RefCell::new(HashSet::new()),
            framebuffer_status: Cell::new(FramebufferStatus::Complete),
            fbo_supported: Cell::new(true),
            blit_supported: Cell::new(true),
            invalidate_supported: Cell::new(true),
        }
    }

    // ── Programming the double ───────────────────────────────────────────────

    /// Makes `uniform_location` resolve `name`.
    pub fn define_uniform(&self, name: &str, location: i32) {
        self.uniforms.borrow_mut().insert(name.to_owned(), location);
    }

    /// Makes `attrib_location` resolve `name`.
    pub fn define_attribute(&self, name: &str, location: u32) {
        self.attributes.borrow_mut().insert(name.to_owned(), location);
    }

    /// The next `link_program` call reports failure.
    pub fn fail_next_link(&self) {
        self.pending_link_failures.set(self.pending_link_failures.get() + 1);
    }

    pub fn set_framebuffer_status(&self, status: FramebufferStatus) {
        self.framebuffer_status.set(status);
    }

    pub fn set_framebuffer_objects_supported(&self, supported: bool) {
        self.fbo_supported.set(supported);
    }

    pub fn set_blit_supported(&self, supported: bool) {
        self.blit_supported.set(supported);
    }

    pub fn set_invalidate_supported(&self, supported: bool) {
        self.invalidate_supported.set(supported);
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Number of recorded calls whose line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.borrow().iter().filter(|call| call.starts_with(prefix)).count()
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Index of the first call starting with `prefix`, if any.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|call| call.starts_with(prefix))
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn live_program_count(&self) -> usize {
        self.live_programs.borrow().len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.live_framebuffers.borrow().len()
    }

    pub fn live_renderbuffer_count(&self) -> usize {
        self.live_renderbuffers.borrow().len()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> u32 {
        let name = self.next_name.get();
        self.next_name.set(name + 1);
        name
    }
}

impl GlContext for RecordingGl {
    fn get_error(&self) -> u32 {
        0
    }

    fn get_limit(&self, limit: DeviceLimit) -> i32 {
        match limit {
            DeviceLimit::MaxTextureUnits | DeviceLimit::MaxVertexAttributes => 16,
            DeviceLimit::MaxDrawBuffers => 4,
            DeviceLimit::MaxTextureSize => 4096,
        }
    }

    fn extensions(&self) -> Vec<String> {
        if self.fbo_supported.get() {
            vec!["GL_ARB_framebuffer_object".to_owned()]
        } else {
            Vec::new()
        }
    }

    fn supports_blit_framebuffer(&self) -> bool {
        self.blit_supported.get()
    }

    fn supports_invalidate_framebuffer(&self) -> bool {
        self.invalidate_supported.get()
    }

    fn enable(&self, cap: Capability) {
        self.log(format!("enable {cap:?}"));
    }

    fn disable(&self, cap: Capability) {
        self.log(format!("disable {cap:?}"));
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(format!("scissor {x} {y} {width} {height}"));
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.log(format!("viewport {x} {y} {width} {height}"));
    }

    fn depth_range(&self, near: f32, far: f32) {
        self.log(format!("depth_range {near} {far}"));
    }

    fn color_mask(&self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.log(format!("color_mask {red} {green} {blue} {alpha}"));
    }

    fn depth_mask(&self, enabled: bool) {
        self.log(format!("depth_mask {enabled}"));
    }

    fn depth_func(&self, func: CompareFunc) {
        self.log(format!("depth_func {func:?}"));
    }

    fn stencil_mask(&self, mask: u32) {
        self.log(format!("stencil_mask {mask}"));
    }

    fn stencil_func(&self, func: CompareFunc, reference: i32, mask: u32) {
        self.log(format!("stencil_func {func:?} {reference} {mask}"));
    }

    fn stencil_op(&self, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.log(format!("stencil_op {stencil_fail:?} {depth_fail:?} {pass:?}"));
    }

    fn blend_color(&self, color: [f32; 4]) {
        self.log(format!("blend_color {color:?}"));
    }

    fn blend_equation_separate(&self, color: BlendEquation, alpha: BlendEquation) {
        self.log(format!("blend_equation_separate {color:?} {alpha:?}"));
    }

    fn blend_func_separate(
        &self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.log(format!(
            "blend_func_separate {src_color:?} {dst_color:?} {src_alpha:?} {dst_alpha:?}"
        ));
    }

    fn cull_face(&self, face: CullFace) {
        self.log(format!("cull_face {face:?}"));
    }

    fn front_face(&self, winding: FrontFace) {
        self.log(format!("front_face {winding:?}"));
    }

    fn polygon_offset(&self, slope_factor: f32, units: f32) {
        self.log(format!("polygon_offset {slope_factor} {units}"));
    }

    fn clear_color(&self, color: [f32; 4]) {
        self.log(format!("clear_color {color:?}"));
    }

    fn clear_depth(&self, depth: f32) {
        self.log(format!("clear_depth {depth}"));
    }

    fn clear_stencil(&self, stencil: i32) {
        self.log(format!("clear_stencil {stencil}"));
    }

    fn clear(&self, mask: ClearMask) {
        self.log(format!("clear {mask:?}"));
    }

    fn bind_buffer(&self, kind: BufferKind, buffer: GlBuffer) {
        self.log(format!("bind_buffer {kind:?} {}", buffer.0));
    }

    fn gen_framebuffer(&self) -> GlFramebuffer {
        let name = self.allocate();
        self.live_framebuffers.borrow_mut().insert(name);
        self.log(format!("gen_framebuffer {name}"));
        GlFramebuffer(name)
    }

    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: GlFramebuffer) {
        self.log(format!("bind_framebuffer {target:?} {}", framebuffer.0));
    }

    fn delete_framebuffer(&self, framebuffer: GlFramebuffer) {
        self.live_framebuffers.borrow_mut().remove(&framebuffer.0);
        self.log(format!("delete_framebuffer {}", framebuffer.0));
    }

    fn gen_renderbuffer(&self) -> GlRenderbuffer {
        let name = self.allocate();
        self.live_renderbuffers.borrow_mut().insert(name);
        self.log(format!("gen_renderbuffer {name}"));
        GlRenderbuffer(name)
    }

    fn bind_renderbuffer(&self, renderbuffer: GlRenderbuffer) {
        self.log(format!("bind_renderbuffer {}", renderbuffer.0));
    }

    fn delete_renderbuffer(&self, renderbuffer: GlRenderbuffer) {
        self.live_renderbuffers.borrow_mut().remove(&renderbuffer.0);
        self.log(format!("delete_renderbuffer {}", renderbuffer.0));
    }

    fn renderbuffer_storage(&self, samples: u32, format: RenderbufferFormat, width: u32, height: u32) {
        self.log(format!("renderbuffer_storage samples={samples} {format:?} {width} {height}"));
    }

    fn framebuffer_texture_2d(
        &self,
        attachment: Attachment,
        kind: TextureKind,
        texture: GlTexture,
        level: u32,
    ) {
        self.log(format!("framebuffer_texture_2d {attachment:?} {kind:?} {} {level}", texture.0));
    }

    fn framebuffer_renderbuffer(&self, attachment: Attachment, renderbuffer: GlRenderbuffer) {
        self.log(format!("framebuffer_renderbuffer {attachment:?} {}", renderbuffer.0));
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        self.log("check_framebuffer_status".to_owned());
        self.framebuffer_status.get()
    }

    fn invalidate_framebuffer(&self, target: FramebufferTarget, attachments: &[Attachment]) {
        self.log(format!("invalidate_framebuffer {target:?} {}", attachments.len()));
    }

    fn read_buffer(&self, color_attachment: u32) {
        self.log(format!("read_buffer {color_attachment}"));
    }

    fn draw_buffer(&self, color_attachment: u32) {
        self.log(format!("draw_buffer {color_attachment}"));
    }

    fn draw_buffers(&self, buffers: &[Option<u32>]) {
        self.log(format!("draw_buffers {}", buffers.len()));
    }

    fn blit_framebuffer(&self, width: u32, height: u32, mask: ClearMask) {
        self.log(format!("blit_framebuffer {width} {height} {mask:?}"));
    }

    fn active_texture(&self, unit: u32) {
        self.log(format!("active_texture {unit}"));
    }

    fn bind_texture(&self, kind: TextureKind, texture: GlTexture) {
        self.log(format!("bind_texture {kind:?} {}", texture.0));
    }

    fn generate_mipmap(&self, kind: TextureKind) {
        self.log(format!("generate_mipmap {kind:?}"));
    }

    fn create_program(&self) -> GlProgram {
        let name = self.allocate();
        self.live_programs.borrow_mut().insert(name);
        self.log(format!("create_program {name}"));
        GlProgram(name)
    }

    fn attach_shader(&self, program: GlProgram, shader: GlShader) {
        self.log(format!("attach_shader {} {}", program.0, shader.0));
    }

    fn detach_shader(&self, program: GlProgram, shader: GlShader) {
        self.log(format!("detach_shader {} {}", program.0, shader.0));
    }

    fn link_program(&self, program: GlProgram) {
        let pending = self.pending_link_failures.get();
        if pending > 0 {
            self.pending_link_failures.set(pending - 1);
            self.failed_programs.borrow_mut().insert(program.0);
        }
        self.log(format!("link_program {}", program.0));
    }

    fn link_status(&self, program: GlProgram) -> bool {
        !self.failed_programs.borrow().contains(&program.0)
    }

    fn program_info_log(&self, program: GlProgram) -> String {
        if self.failed_programs.borrow().contains(&program.0) {
            "forced link failure".to_owned()
        } else {
            String::new()
        }
    }

    fn use_program(&self, program: GlProgram) {
        self.log(format!("use_program {}", program.0));
    }

    fn delete_program(&self, program: GlProgram) {
        self.live_programs.borrow_mut().remove(&program.0);
        self.log(format!("delete_program {}", program.0));
    }

    fn uniform_location(&self, program: GlProgram, name: &str) -> Option<UniformLocation> {
        self.log(format!("uniform_location {} {name}", program.0));
        self.uniforms.borrow().get(name).map(|&location| UniformLocation(location))
    }

    fn attrib_location(&self, program: GlProgram, name: &str) -> Option<u32> {
        self.log(format!("attrib_location {} {name}", program.0));
        self.attributes.borrow().get(name).copied()
    }

    fn uniform1i(&self, location: UniformLocation, value: i32) {
        self.log(format!("uniform1i {} {value}", location.0));
    }

    fn uniform4fv(&self, location: UniformLocation, values: &[f32]) {
        self.log(format!("uniform4fv {} {:?}", location.0, values));
    }

    fn vertex_attrib_pointer(
        &self,
        location: u32,
        components: u32,
        ty: AttribType,
        normalized: bool,
        stride: u32,
        offset: usize,
    ) {
        self.log(format!(
            "vertex_attrib_pointer {location} {components} {ty:?} {normalized} {stride} {offset}"
        ));
    }

    fn enable_vertex_attrib_array(&self, location: u32) {
        self.log(format!("enable_vertex_attrib_array {location}"));
    }

    fn disable_vertex_attrib_array(&self, location: u32) {
        self.log(format!("disable_vertex_attrib_array {location}"));
    }

    fn draw_arrays(&self, mode: PrimitiveKind, first: i32, count: i32) {
        self.log(format!("draw_arrays {mode:?} {first} {count}"));
    }

    fn draw_elements(&self, mode: PrimitiveKind, count: i32, index: IndexKind, offset: usize) {
        self.log(format!("draw_elements {mode:?} {count} {index:?} {offset}"));
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

static NEXT_SHADER_NAME: AtomicU32 = AtomicU32::new(1000);

fn next_shader_name() -> u32 {
    NEXT_SHADER_NAME.fetch_add(1, Ordering::Relaxed)
}

/// A device over a fresh recording context with the call log cleared of
/// setup noise.
pub fn test_device() -> GraphicsDevice<RecordingGl> {
    let device = GraphicsDevice::new(
        RecordingGl::new(),
        DeviceConfig { back_buffer_width: 640, back_buffer_height: 480 },
    )
    .expect("device creation");
    device.context().reset_calls();
    device
}

/// A vertex shader description over fabricated source; each call yields a
/// distinct cache identity unless `source` repeats.
pub fn vertex_shader(
    source: &str,
    attributes: &[(&str, VertexElementUsage, u32)],
) -> Arc<VertexShader> {
    let attributes = attributes
        .iter()
        .map(|&(name, usage, usage_index)| ShaderAttribute {
            usage,
            usage_index,
            name: name.to_owned(),
        })
        .collect();
    Arc::new(VertexShader::new(GlShader(next_shader_name()), source.as_bytes(), attributes))
}

pub fn fragment_shader(source: &str, samplers: &[(&str, u32)]) -> Arc<FragmentShader> {
    let samplers = samplers
        .iter()
        .map(|&(name, texture_unit)| SamplerBinding { name: name.to_owned(), texture_unit })
        .collect();
    Arc::new(FragmentShader::new(GlShader(next_shader_name()), source.as_bytes(), samplers))
}

/// A single-sampled 128x128 target descriptor with a combined
/// depth/stencil buffer.
pub fn target_descriptor(texture: u32) -> RenderTargetDescriptor {
    RenderTargetDescriptor {
        texture: GlTexture(texture),
        texture_kind: TextureKind::D2,
        width: 128,
        height: 128,
        level_count: 1,
        usage: RenderTargetUsage::PreserveContents,
        multisample_count: 0,
        depth_format: DepthFormat::Depth24Stencil8,
    }
}
