//! Texture unit bindings.
//!
//! Tracks which texture is wanted on each unit and which target kind is
//! actually bound there, so applying touches only dirty units and unbinds
//! a unit's previous target when the kind changes (binding a 2D texture
//! does not implicitly unbind a cube map on the same unit).

use crate::errors::Result;
use crate::gl::{GlContext, GlTexture, TextureKind, check_error};

/// A texture bound to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub kind: TextureKind,
    pub texture: GlTexture,
}

/// Per-unit texture bindings with a dirty bitmask.
#[derive(Debug)]
pub struct TextureUnits {
    bindings: Vec<Option<TextureBinding>>,
    /// Target kind actually bound on each unit.
    applied: Vec<Option<TextureKind>>,
    dirty: u32,
}

impl TextureUnits {
    pub(crate) fn new(units: u32) -> Self {
        let units = units as usize;
        Self { bindings: vec![None; units], applied: vec![None; units], dirty: 0 }
    }

    /// Number of tracked units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Sets the wanted binding for a unit; no-op when unchanged.
    pub fn set(&mut self, unit: usize, binding: Option<TextureBinding>) {
        if self.bindings[unit] != binding {
            self.bindings[unit] = binding;
            self.dirty |= 1 << unit;
        }
    }

    /// Marks every unit dirty. Switching render targets invalidates the
    /// sampled state of everything bound.
    pub(crate) fn mark_all_dirty(&mut self) {
        if !self.bindings.is_empty() {
            self.dirty = mask_for(self.bindings.len());
        }
    }

    /// Forgets what is natively bound (device reset).
    pub(crate) fn reset(&mut self) {
        for applied in &mut self.applied {
            *applied = None;
        }
        self.mark_all_dirty();
    }

    pub(crate) fn apply<G: GlContext>(&mut self, gl: &G) -> Result<()> {
        if self.dirty == 0 {
            return Ok(());
        }

        for unit in 0..self.bindings.len() {
            let mask = 1u32 << unit;
            if self.dirty & mask == 0 {
                continue;
            }

            let binding = self.bindings[unit];

            // An empty unit with nothing natively bound needs no work.
            if binding.is_none() && self.applied[unit].is_none() {
                self.dirty &= !mask;
                continue;
            }

            gl.active_texture(unit as u32);
            check_error(gl, "active texture")?;

            // Unbind the previous target when the kind changes or the unit
            // goes empty.
            if let Some(previous) = self.applied[unit]
                && binding.is_none_or(|b| b.kind != previous)
            {
                gl.bind_texture(previous, GlTexture::NONE);
                check_error(gl, "unbind texture")?;
                self.applied[unit] = None;
            }

            if let Some(binding) = binding {
                gl.bind_texture(binding.kind, binding.texture);
                check_error(gl, "bind texture")?;
                self.applied[unit] = Some(binding.kind);
            }

            self.dirty &= !mask;
            if self.dirty == 0 {
                break;
            }
        }

        self.dirty = 0;
        Ok(())
    }
}

fn mask_for(units: usize) -> u32 {
    if units >= 32 { u32::MAX } else { (1u32 << units) - 1 }
}
