//! Shader constant buffers.
//!
//! A constant buffer is a named block of vec4 registers uploaded through a
//! single uniform. The upload is skipped when the buffer is clean *and*
//! was the last one applied to the program's resolved location; a program
//! change forces a location re-lookup through the program's lazy uniform
//! cache.

use crate::errors::Result;
use crate::gl::{GlContext, UniformLocation, check_error};

use super::ids::next_raw_id;
use super::program::{ProgramKey, ShaderProgram};

/// A named uniform block of vec4 registers.
#[derive(Debug)]
pub struct ConstantBuffer {
    id: u64,
    name: String,
    data: Vec<f32>,
    dirty: bool,
    /// Program the cached location was resolved against.
    program_key: Option<ProgramKey>,
    location: Option<UniformLocation>,
}

impl ConstantBuffer {
    /// Creates a zero-filled buffer of `register_count` vec4 registers.
    #[must_use]
    pub fn new(name: impl Into<String>, register_count: usize) -> Self {
        Self {
            id: next_raw_id(),
            name: name.into(),
            data: vec![0.0; register_count * 4],
            dirty: true,
            program_key: None,
            location: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes values starting at a float offset and marks the buffer dirty.
    pub fn set_data(&mut self, float_offset: usize, values: &[f32]) {
        self.data[float_offset..float_offset + values.len()].copy_from_slice(values);
        self.dirty = true;
    }

    pub(crate) fn invalidate_program(&mut self) {
        self.program_key = None;
    }

    pub(crate) fn apply<G: GlContext>(&mut self, gl: &G, program: &mut ShaderProgram) -> Result<()> {
        // A different program means a different location and stale uniform
        // contents.
        if self.program_key != Some(program.key()) {
            self.location = program.uniform_location(gl, &self.name)?;
            self.program_key = Some(program.key());
            self.dirty = true;
        }

        let Some(location) = self.location else {
            return Ok(());
        };

        // Another buffer may have been uploaded to the same location since
        // our last apply.
        if program.last_constant(location) != Some(self.id) {
            self.dirty = true;
        }

        if !self.dirty {
            return Ok(());
        }

        gl.uniform4fv(location, &self.data);
        check_error(gl, "constant buffer upload")?;

        self.dirty = false;
        program.note_constant_applied(location, self.id);
        Ok(())
    }
}

/// The constant buffers of one shader stage, by slot.
#[derive(Debug)]
pub struct ConstantBufferCollection {
    slots: Vec<Option<ConstantBuffer>>,
}

impl ConstantBufferCollection {
    pub(crate) fn new(slots: usize) -> Self {
        Self { slots: (0..slots).map(|_| None).collect() }
    }

    /// Installs (or clears) the buffer in a slot.
    pub fn set(&mut self, slot: usize, buffer: Option<ConstantBuffer>) {
        self.slots[slot] = buffer;
    }

    /// Mutable access for data updates.
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut ConstantBuffer> {
        self.slots[slot].as_mut()
    }

    pub(crate) fn apply<G: GlContext>(&mut self, gl: &G, program: &mut ShaderProgram) -> Result<()> {
        for buffer in self.slots.iter_mut().flatten() {
            buffer.apply(gl, program)?;
        }
        Ok(())
    }

    pub(crate) fn invalidate_programs(&mut self) {
        for buffer in self.slots.iter_mut().flatten() {
            buffer.invalidate_program();
        }
    }
}
