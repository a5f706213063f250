//! Framebuffer Object Cache
//!
//! One framebuffer object is created per distinct render-target binding
//! combination and reused for every subsequent bind of the same
//! combination. Binding order is significant: `[A, B]` and `[B, A]` are
//! different combinations and get different framebuffers.
//!
//! A parallel table caches the single-sampled framebuffers multisample
//! targets resolve into. Disposing a render target removes and destroys
//! every framebuffer in either table whose key mentions it; that purge
//! must run before the target's backing storage is released so no cached
//! framebuffer is ever left referencing a dangling attachment.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{GlimmerError, Result};
use crate::gl::{
    Attachment, FramebufferStatus, FramebufferTarget, GlContext, GlFramebuffer, GlRenderbuffer,
    GlTexture, TextureKind, check_error,
};

/// Maximum simultaneous render targets the device supports.
pub const MAX_RENDER_TARGETS: usize = 4;

/// Identity of a registered render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub(crate) u64);

/// What the device may assume about a target's contents across binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetUsage {
    /// Contents survive; resolved framebuffers are never invalidated.
    PreserveContents,
    /// Contents may be discarded once resolved.
    DiscardContents,
}

/// Depth/stencil storage attached to the first bound target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFormat {
    None,
    Depth16,
    Depth24,
    Depth24Stencil8,
}

/// Association of a render target (and array slice) with an output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBinding {
    pub target: RenderTargetId,
    pub slice: u32,
}

impl RenderTargetBinding {
    #[must_use]
    pub fn new(target: RenderTargetId) -> Self {
        Self { target, slice: 0 }
    }

    #[must_use]
    pub fn with_slice(target: RenderTargetId, slice: u32) -> Self {
        Self { target, slice }
    }
}

/// The live, mutable set of bound targets. Cache keys are frozen clones.
pub type RenderTargetBindingSet = SmallVec<[RenderTargetBinding; MAX_RENDER_TARGETS]>;

/// Registry record for a render target. The device owns the record; the
/// texture object itself belongs to the caller's texture layer.
#[derive(Debug)]
pub(crate) struct RenderTarget {
    pub texture: GlTexture,
    pub texture_kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub level_count: u32,
    pub usage: RenderTargetUsage,
    /// Effective sample count after capability clamping.
    pub multisample_count: u32,
    /// Multisampled color storage; `None` means the texture is attached
    /// directly.
    pub color_renderbuffer: Option<GlRenderbuffer>,
    pub depth_renderbuffer: Option<GlRenderbuffer>,
    /// May alias `depth_renderbuffer` for combined depth/stencil formats.
    pub stencil_renderbuffer: Option<GlRenderbuffer>,
}

// ─── Cache ───────────────────────────────────────────────────────────────────

type FramebufferTable = FxHashMap<Box<[RenderTargetBinding]>, GlFramebuffer>;

/// Cache of framebuffer objects keyed by frozen binding sets.
#[derive(Debug)]
pub(crate) struct FramebufferCache {
    framebuffers: FramebufferTable,
    resolve_framebuffers: FramebufferTable,
}

impl FramebufferCache {
    pub fn new() -> Self {
        Self {
            framebuffers: FxHashMap::default(),
            resolve_framebuffers: FxHashMap::default(),
        }
    }

    /// Binds the framebuffer for the binding set, creating and wiring the
    /// attachments on first use. A cache hit performs no attachment work.
    pub fn get_or_create<G: GlContext>(
        &mut self,
        gl: &G,
        bindings: &[RenderTargetBinding],
        targets: &FxHashMap<RenderTargetId, RenderTarget>,
    ) -> Result<GlFramebuffer> {
        if bindings.is_empty() {
            return Err(GlimmerError::InvalidState("an empty binding set has no framebuffer"));
        }
        if let Some(&framebuffer) = self.framebuffers.get(bindings) {
            gl.bind_framebuffer(FramebufferTarget::Both, framebuffer);
            check_error(gl, "bind framebuffer")?;
            return Ok(framebuffer);
        }

        let framebuffer = gl.gen_framebuffer();
        check_error(gl, "gen framebuffer")?;
        gl.bind_framebuffer(FramebufferTarget::Both, framebuffer);
        check_error(gl, "bind framebuffer")?;

        match Self::attach(gl, bindings, targets) {
            Ok(()) => {}
            Err(err) => {
                gl.delete_framebuffer(framebuffer);
                return Err(err);
            }
        }

        log::debug!("created framebuffer {framebuffer:?} for {} target(s)", bindings.len());
        self.framebuffers.insert(bindings.into(), framebuffer);
        Ok(framebuffer)
    }

    /// Binds the resolve framebuffer for a multisampled binding set,
    /// creating it with direct texture attachments on first use.
    pub fn get_or_create_resolve<G: GlContext>(
        &mut self,
        gl: &G,
        bindings: &[RenderTargetBinding],
        targets: &FxHashMap<RenderTargetId, RenderTarget>,
    ) -> Result<GlFramebuffer> {
        if bindings.is_empty() {
            return Err(GlimmerError::InvalidState("an empty binding set has no framebuffer"));
        }
        if let Some(&framebuffer) = self.resolve_framebuffers.get(bindings) {
            gl.bind_framebuffer(FramebufferTarget::Both, framebuffer);
            check_error(gl, "bind resolve framebuffer")?;
            return Ok(framebuffer);
        }

        let framebuffer = gl.gen_framebuffer();
        check_error(gl, "gen resolve framebuffer")?;
        gl.bind_framebuffer(FramebufferTarget::Both, framebuffer);
        check_error(gl, "bind resolve framebuffer")?;

        for (slot, binding) in bindings.iter().enumerate() {
            let target = lookup(targets, binding.target)?;
            gl.framebuffer_texture_2d(
                Attachment::Color(slot as u32),
                target.texture_kind,
                target.texture,
                0,
            );
            check_error(gl, "resolve color attachment")?;
        }

        self.resolve_framebuffers.insert(bindings.into(), framebuffer);
        Ok(framebuffer)
    }

    /// The cached main framebuffer for a binding set, without binding it.
    pub fn get(&self, bindings: &[RenderTargetBinding]) -> Option<GlFramebuffer> {
        self.framebuffers.get(bindings).copied()
    }

    /// Removes and destroys every framebuffer (main and resolve) whose key
    /// set references the target. Must run before the target's backing
    /// storage is released.
    pub fn delete_for_target<G: GlContext>(&mut self, gl: &G, target: RenderTargetId) {
        purge(gl, &mut self.framebuffers, target);
        purge(gl, &mut self.resolve_framebuffers, target);
    }

    /// Destroys every cached framebuffer.
    pub fn clear<G: GlContext>(&mut self, gl: &G) {
        for (_, framebuffer) in self.framebuffers.drain() {
            gl.delete_framebuffer(framebuffer);
        }
        for (_, framebuffer) in self.resolve_framebuffers.drain() {
            gl.delete_framebuffer(framebuffer);
        }
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn resolve_len(&self) -> usize {
        self.resolve_framebuffers.len()
    }

    fn attach<G: GlContext>(
        gl: &G,
        bindings: &[RenderTargetBinding],
        targets: &FxHashMap<RenderTargetId, RenderTarget>,
    ) -> Result<()> {
        // Depth and stencil come from the first bound target.
        let first = lookup(targets, bindings[0].target)?;
        if let Some(depth) = first.depth_renderbuffer {
            gl.framebuffer_renderbuffer(Attachment::Depth, depth);
            check_error(gl, "depth attachment")?;
        }
        if let Some(stencil) = first.stencil_renderbuffer {
            gl.framebuffer_renderbuffer(Attachment::Stencil, stencil);
            check_error(gl, "stencil attachment")?;
        }

        for (slot, binding) in bindings.iter().enumerate() {
            let target = lookup(targets, binding.target)?;
            let attachment = Attachment::Color(slot as u32);
            if let Some(color) = target.color_renderbuffer {
                gl.framebuffer_renderbuffer(attachment, color);
            } else {
                gl.framebuffer_texture_2d(attachment, target.texture_kind, target.texture, 0);
            }
            check_error(gl, "color attachment")?;
        }

        // The completeness check is comparatively expensive, so it only
        // runs in debug builds.
        if cfg!(debug_assertions) {
            let status = gl.check_framebuffer_status();
            if status != FramebufferStatus::Complete {
                return Err(GlimmerError::FramebufferIncomplete { reason: status.reason() });
            }
        }
        Ok(())
    }
}

fn lookup<'a>(
    targets: &'a FxHashMap<RenderTargetId, RenderTarget>,
    id: RenderTargetId,
) -> Result<&'a RenderTarget> {
    targets
        .get(&id)
        .ok_or(GlimmerError::InvalidState("binding set references a disposed render target"))
}

fn purge<G: GlContext>(gl: &G, table: &mut FramebufferTable, target: RenderTargetId) {
    table.retain(|bindings, framebuffer| {
        if bindings.iter().any(|binding| binding.target == target) {
            gl.delete_framebuffer(*framebuffer);
            false
        } else {
            true
        }
    });
}
