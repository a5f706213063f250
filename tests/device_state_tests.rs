//! Dirty-State Application Tests
//!
//! Covers the fixed flush order, dirty-flag clearing (a second apply with
//! no mutation issues zero native calls), the scissor Y flip, diffed state
//! application, the clear save/override/restore dance, the position-fixup
//! re-upload on viewport changes, and constant buffer upload gating.

mod common;

use common::{RecordingGl, fragment_shader, target_descriptor, test_device, vertex_shader};

use glimmer::device::{ConstantBuffer, RenderTargetBinding, TextureBinding};
use glimmer::gl::{ClearMask, CompareFunc, GlBuffer, GlTexture, IndexKind, TextureKind};
use glimmer::{
    BlendState, DepthStencilState, DeviceConfig, GlimmerError, GraphicsDevice, RasterizerState,
    Rect, VertexElementUsage, VertexFormat, VertexLayout, Viewport,
};

/// A device with shaders and buffers set, ready to draw a positioned
/// triangle list.
fn draw_ready() -> GraphicsDevice<RecordingGl> {
    let mut device = test_device();
    device.context().define_attribute("a_position", 0);

    let vs = vertex_shader("vs-state", &[("a_position", VertexElementUsage::Position, 0)]);
    let fs = fragment_shader("fs-state", &[]);
    device.set_vertex_shader(Some(vs));
    device.set_fragment_shader(Some(fs));

    let layout = VertexLayout::packed(&[(VertexElementUsage::Position, 0, VertexFormat::Vector3)]);
    device.set_vertex_buffer(Some((GlBuffer(10), layout)));
    device.set_index_buffer(Some((GlBuffer(11), IndexKind::U16)));
    device
}

#[test]
fn device_creation_requires_framebuffer_objects() {
    let gl = RecordingGl::new();
    gl.set_framebuffer_objects_supported(false);
    let err = GraphicsDevice::new(
        gl,
        DeviceConfig { back_buffer_width: 640, back_buffer_height: 480 },
    )
    .expect_err("no framebuffer objects");
    assert!(matches!(err, GlimmerError::UnsupportedCapability(_)));
}

#[test]
fn applying_shaders_without_a_shader_pair_fails() {
    let mut device = test_device();
    let err = device.apply_state(true).expect_err("no shaders set");
    assert!(matches!(err, GlimmerError::InvalidState(_)));
}

#[test]
fn clearing_does_not_require_shaders() {
    let mut device = test_device();
    device.clear(ClearMask::COLOR, [0.5, 0.0, 0.0, 1.0], 1.0, 0).expect("clear");
    assert_eq!(device.context().count("clear ClearMask(COLOR)"), 1);
}

#[test]
fn second_apply_with_no_mutation_issues_zero_calls() {
    let mut device = draw_ready();
    device.set_blend_state(BlendState::ALPHA_BLEND);
    device.set_scissor_rect(Rect::new(10, 20, 100, 50));

    device.apply_state(true).expect("first flush");
    assert!(device.context().total_calls() > 0);

    device.context().reset_calls();
    device.apply_state(true).expect("second flush");
    assert_eq!(
        device.context().total_calls(),
        0,
        "no state changed between flushes, so no native call may be issued"
    );
}

#[test]
fn state_groups_flush_in_fixed_order() {
    let mut device = draw_ready();
    device.set_scissor_rect(Rect::new(1, 2, 3, 4));
    device.set_blend_state(BlendState::ALPHA_BLEND);
    device.set_depth_stencil_state(DepthStencilState::DEPTH_READ);
    device.set_rasterizer_state(RasterizerState::CULL_NONE);

    device.apply_state(true).expect("flush");

    let gl = device.context();
    let scissor = gl.position("scissor").expect("scissor applied");
    let blend = gl.position("enable Blend").expect("blend applied");
    let depth = gl.position("depth_mask false").expect("depth applied");
    let raster = gl.position("disable CullFace").expect("rasterizer applied");
    let index = gl.position("bind_buffer Index").expect("index buffer bound");
    let vertex = gl.position("bind_buffer Vertex").expect("vertex buffer bound");
    let program = gl.position("use_program").expect("program bound");

    assert!(scissor < blend, "scissor before blend");
    assert!(blend < depth, "blend before depth/stencil");
    assert!(depth < raster, "depth/stencil before rasterizer");
    assert!(raster < index, "rasterizer before index buffer");
    assert!(index < vertex, "index buffer before vertex buffer");
    assert!(vertex < program, "vertex buffer before program");
}

#[test]
fn apply_without_shaders_leaves_shader_groups_dirty() {
    let mut device = draw_ready();
    device.set_blend_state(BlendState::ALPHA_BLEND);

    device.apply_state(false).expect("raster-only flush");
    assert_eq!(device.context().count("enable Blend"), 1);
    assert_eq!(device.context().count("bind_buffer"), 0);
    assert_eq!(device.context().count("use_program"), 0);

    device.context().reset_calls();
    device.apply_state(true).expect("full flush");
    assert_eq!(device.context().count("enable Blend"), 0, "blend already flushed");
    assert_eq!(device.context().count("bind_buffer"), 2, "buffer groups stayed dirty");
    assert_eq!(device.context().count("use_program"), 1);
}

#[test]
fn scissor_rect_flips_y_on_the_default_surface() {
    let mut device = test_device();
    device.set_scissor_rect(Rect::new(10, 20, 100, 50));
    device.apply_state(false).expect("flush");
    assert_eq!(device.context().count("scissor 10 410 100 50"), 1, "480 - 20 - 50 = 410");
}

#[test]
fn scissor_rect_is_unflipped_on_a_render_target() {
    let mut device = test_device();
    let target = device.create_render_target(&target_descriptor(50)).expect("target");
    device.set_render_targets(&[RenderTargetBinding::new(target)]).expect("bind");

    device.set_scissor_rect(Rect::new(10, 20, 50, 30));
    device.context().reset_calls();
    device.apply_state(false).expect("flush");
    assert_eq!(device.context().count("scissor 10 20 50 30"), 1);
}

#[test]
fn setting_an_unchanged_state_marks_nothing_dirty() {
    let mut device = draw_ready();
    device.set_blend_state(BlendState::ALPHA_BLEND);
    device.apply_state(true).expect("flush");

    device.set_blend_state(BlendState::ALPHA_BLEND);
    device.set_scissor_rect(device.scissor_rect());
    device.context().reset_calls();
    device.apply_state(true).expect("flush");
    assert_eq!(device.context().total_calls(), 0);
}

#[test]
fn dirty_groups_reapply_only_changed_fields() {
    let mut device = test_device();
    device.set_depth_stencil_state(DepthStencilState {
        depth_function: CompareFunc::Less,
        ..DepthStencilState::DEFAULT
    });

    device.apply_state(false).expect("flush");
    assert_eq!(device.context().count("depth_func Less"), 1);
    assert_eq!(device.context().count("depth_mask"), 0, "write flag did not change");
    assert_eq!(device.context().count("enable DepthTest"), 0, "enable did not change");
}

#[test]
fn clear_overrides_and_restores_surrounding_state() {
    let mut device = test_device();
    device.set_scissor_rect(Rect::new(5, 5, 10, 10));
    device.set_blend_state(BlendState::ALPHA_BLEND);
    device.apply_state(false).expect("pre-flush");
    device.context().reset_calls();

    device.clear(ClearMask::COLOR, [0.2, 0.2, 0.2, 1.0], 1.0, 0).expect("clear");

    let gl = device.context();
    // The clear runs under a viewport-sized scissor, opaque blend and a
    // stencil-enabled depth state.
    assert_eq!(gl.count("scissor 0 0 640 480"), 1);
    assert_eq!(gl.count("disable Blend"), 1);
    assert_eq!(gl.count("enable StencilTest"), 1);
    assert_eq!(gl.count("clear_color"), 1);

    // The public state is untouched and flows back on the next flush.
    assert_eq!(device.scissor_rect(), Rect::new(5, 5, 10, 10));
    assert_eq!(device.blend_state(), BlendState::ALPHA_BLEND);
    device.context().reset_calls();
    device.apply_state(false).expect("post-flush");
    assert_eq!(device.context().count("scissor 5 465 10 10"), 1);
    assert_eq!(device.context().count("enable Blend"), 1);
}

#[test]
fn clear_values_are_cached_between_clears() {
    let mut device = test_device();
    let everything = ClearMask::COLOR | ClearMask::DEPTH | ClearMask::STENCIL;

    device.clear(everything, [0.1, 0.2, 0.3, 1.0], 0.5, 7).expect("clear");
    device.clear(everything, [0.1, 0.2, 0.3, 1.0], 0.5, 7).expect("clear");

    assert_eq!(device.context().count("clear_color"), 1);
    assert_eq!(device.context().count("clear_depth"), 1);
    assert_eq!(device.context().count("clear_stencil"), 1);
    assert_eq!(device.context().count("clear ClearMask"), 2, "the clear itself always runs");

    device.clear(everything, [0.9, 0.2, 0.3, 1.0], 0.5, 7).expect("clear");
    assert_eq!(device.context().count("clear_color"), 2, "a changed color re-uploads");
    assert_eq!(device.context().count("clear_depth"), 1);
}

#[test]
fn viewport_changes_reupload_the_position_fixup() {
    let mut device = draw_ready();
    device.context().define_uniform("posFixup", 7);

    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 7"), 1);

    device.context().reset_calls();
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 7"), 0, "unchanged viewport, no re-upload");

    device.set_viewport(Viewport::new(0, 0, 320, 240)).expect("viewport");
    device.context().reset_calls();
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 7"), 1);
    assert_eq!(device.context().count("use_program"), 0, "same program stays bound");
}

#[test]
fn position_fixup_flips_y_on_a_render_target() {
    let mut device = draw_ready();
    device.context().define_uniform("posFixup", 7);
    let target = device.create_render_target(&target_descriptor(50)).expect("target");
    device.set_render_targets(&[RenderTargetBinding::new(target)]).expect("bind");

    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(
        device.context().count("uniform4fv 7 [1.0, -1.0"),
        1,
        "offscreen rendering negates the Y scale"
    );
}

#[test]
fn constant_buffers_upload_once_until_changed() {
    let mut device = draw_ready();
    device.context().define_uniform("Globals", 3);
    device.vertex_constants_mut().set(0, Some(ConstantBuffer::new("Globals", 4)));

    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 3"), 1);

    device.context().reset_calls();
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 3"), 0, "clean buffer skips the upload");

    if let Some(buffer) = device.vertex_constants_mut().get_mut(0) {
        buffer.set_data(0, &[1.0, 2.0, 3.0, 4.0]);
    }
    device.context().reset_calls();
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("uniform4fv 3"), 1);
}

#[test]
fn constant_buffers_without_a_matching_uniform_are_skipped() {
    let mut device = draw_ready();
    device.fragment_constants_mut().set(0, Some(ConstantBuffer::new("Missing", 4)));

    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");

    assert_eq!(device.context().count("uniform4fv"), 0);
    assert_eq!(
        device.context().count("uniform_location"),
        2,
        "one lookup each for the block and the absent position fixup"
    );
}

#[test]
fn texture_bindings_touch_only_dirty_units() {
    let mut device = draw_ready();
    device.set_texture(0, Some(TextureBinding { kind: TextureKind::D2, texture: GlTexture(70) }));
    device.set_texture(2, Some(TextureBinding { kind: TextureKind::Cube, texture: GlTexture(71) }));

    device.apply_state(true).expect("flush");
    assert_eq!(device.context().count("bind_texture D2 70"), 1);
    assert_eq!(device.context().count("bind_texture Cube 71"), 1);
    assert_eq!(device.context().count("active_texture"), 2, "empty units are left alone");

    device.set_texture(2, Some(TextureBinding { kind: TextureKind::Cube, texture: GlTexture(71) }));
    device.context().reset_calls();
    device.apply_state(true).expect("flush");
    assert_eq!(device.context().total_calls(), 0, "re-setting the same binding stays clean");
}

#[test]
fn switching_texture_kind_unbinds_the_previous_target() {
    let mut device = draw_ready();
    device.set_texture(0, Some(TextureBinding { kind: TextureKind::Cube, texture: GlTexture(70) }));
    device.apply_state(true).expect("flush");

    device.set_texture(0, Some(TextureBinding { kind: TextureKind::D2, texture: GlTexture(71) }));
    device.context().reset_calls();
    device.apply_state(true).expect("flush");

    assert_eq!(device.context().count("bind_texture Cube 0"), 1, "the cube map is unbound first");
    assert_eq!(device.context().count("bind_texture D2 71"), 1);
}

#[test]
fn vertex_draws_require_a_vertex_buffer() {
    let mut device = draw_ready();
    device.set_vertex_buffer(None);
    let err = device
        .draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1)
        .expect_err("no vertex buffer");
    assert!(matches!(err, GlimmerError::InvalidState(_)));
}

#[test]
fn indexed_draw_requires_an_index_buffer() {
    let mut device = draw_ready();
    device.set_index_buffer(None);
    let err = device
        .draw_indexed_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 0, 1)
        .expect_err("no index buffer");
    assert!(matches!(err, GlimmerError::InvalidState(_)));
}

#[test]
fn indexed_draw_computes_counts_and_offsets() {
    let mut device = draw_ready();
    device.draw_indexed_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 6, 2).expect("draw");
    // 2 triangles = 6 indices, starting 6 u16 indices (12 bytes) in.
    assert_eq!(device.context().count("draw_elements Triangles 6 U16 12"), 1);
}

#[test]
fn reset_drops_every_cache_and_permits_relinking() {
    let mut device = draw_ready();
    let target = device.create_render_target(&target_descriptor(50)).expect("target");
    device.get_or_create_framebuffer(&[RenderTargetBinding::new(target)]).expect("create");
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.program_count(), 1);
    assert_eq!(device.framebuffer_count(), 1);
    assert_eq!(device.attribute_set_count(), 1);

    device.reset().expect("reset");

    assert_eq!(device.program_count(), 0);
    assert_eq!(device.framebuffer_count(), 0);
    assert_eq!(device.attribute_set_count(), 0);
    assert_eq!(device.context().live_program_count(), 0, "cached programs are destroyed");
    assert_eq!(device.context().live_framebuffer_count(), 0, "cached framebuffers are destroyed");

    // The next draw relinks the pair and rebuilds the attribute set.
    device.context().reset_calls();
    device.draw_primitives(glimmer::gl::PrimitiveKind::Triangles, 0, 1).expect("draw");
    assert_eq!(device.context().count("link_program"), 1);
    assert_eq!(device.context().count("vertex_attrib_pointer"), 1);
    assert_eq!(device.context().count("enable_vertex_attrib_array"), 1);
}
