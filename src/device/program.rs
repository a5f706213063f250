//! Shader Program Link Cache
//!
//! Links a (vertex, fragment) shader pair into a native program object at
//! most once per distinct pair for the lifetime of the device. Re-linking
//! only happens after the whole cache is cleared on a device reset.
//!
//! Each cached program carries a lazy uniform-location map: the first
//! lookup of a name performs the native query and memoizes the result,
//! including a "not found" sentinel so repeated lookups of absent uniforms
//! never repeat the failed query.

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{GlimmerError, Result};
use crate::gl::{GlContext, GlProgram, GlShader, UniformLocation, check_error};

use super::vertex::VertexElementUsage;

/// Combined identity of a linked shader pair.
pub type ProgramKey = (u64, u64);

// ─── Shader Descriptions ─────────────────────────────────────────────────────

/// A vertex input the vertex shader consumes, named as it appears in the
/// translated shader source.
#[derive(Debug, Clone)]
pub struct ShaderAttribute {
    pub usage: VertexElementUsage,
    pub usage_index: u32,
    pub name: String,
}

/// A sampler the fragment shader reads, pinned to a fixed texture unit.
#[derive(Debug, Clone)]
pub struct SamplerBinding {
    pub name: String,
    pub texture_unit: u32,
}

/// A compiled vertex shader object plus the attribute interface the layout
/// cache matches vertex elements against.
#[derive(Debug)]
pub struct VertexShader {
    key: u64,
    handle: GlShader,
    attributes: Vec<ShaderAttribute>,
}

impl VertexShader {
    /// `source` is the translated shader source the object was compiled
    /// from; its hash is the shader's cache identity.
    #[must_use]
    pub fn new(handle: GlShader, source: &[u8], attributes: Vec<ShaderAttribute>) -> Self {
        Self { key: xxh3_64(source), handle, attributes }
    }

    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[must_use]
    pub fn handle(&self) -> GlShader {
        self.handle
    }

    #[must_use]
    pub fn attributes(&self) -> &[ShaderAttribute] {
        &self.attributes
    }
}

/// A compiled fragment shader object plus its sampler interface.
#[derive(Debug)]
pub struct FragmentShader {
    key: u64,
    handle: GlShader,
    samplers: Vec<SamplerBinding>,
}

impl FragmentShader {
    #[must_use]
    pub fn new(handle: GlShader, source: &[u8], samplers: Vec<SamplerBinding>) -> Self {
        Self { key: xxh3_64(source), handle, samplers }
    }

    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[must_use]
    pub fn handle(&self) -> GlShader {
        self.handle
    }

    #[must_use]
    pub fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }
}

// ─── Program Entry ───────────────────────────────────────────────────────────

/// A linked program and its per-program lookup state.
#[derive(Debug)]
pub struct ShaderProgram {
    program: GlProgram,
    key: ProgramKey,
    /// Lazy uniform lookups; `None` memoizes "not found".
    uniforms: FxHashMap<String, Option<UniformLocation>>,
    /// Attribute locations resolved at link time.
    attributes: FxHashMap<(VertexElementUsage, u32), u32>,
    /// Per-location id of the last constant buffer uploaded there.
    last_constants: FxHashMap<i32, u64>,
}

impl ShaderProgram {
    #[must_use]
    pub fn program(&self) -> GlProgram {
        self.program
    }

    #[must_use]
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    /// Looks up a uniform location, performing the native query at most
    /// once per name for the lifetime of the program.
    pub fn uniform_location<G: GlContext>(
        &mut self,
        gl: &G,
        name: &str,
    ) -> Result<Option<UniformLocation>> {
        if let Some(cached) = self.uniforms.get(name) {
            return Ok(*cached);
        }
        let location = gl.uniform_location(self.program, name);
        check_error(gl, "uniform location query")?;
        self.uniforms.insert(name.to_owned(), location);
        Ok(location)
    }

    /// Attribute location for a vertex element usage, if the vertex shader
    /// exposes one.
    #[must_use]
    pub fn attribute_location(&self, usage: VertexElementUsage, usage_index: u32) -> Option<u32> {
        self.attributes.get(&(usage, usage_index)).copied()
    }

    pub(crate) fn last_constant(&self, location: UniformLocation) -> Option<u64> {
        self.last_constants.get(&location.0).copied()
    }

    pub(crate) fn note_constant_applied(&mut self, location: UniformLocation, buffer_id: u64) {
        self.last_constants.insert(location.0, buffer_id);
    }
}

// ─── Program Cache ───────────────────────────────────────────────────────────

/// Cache of linked programs keyed by shader-pair identity.
#[derive(Debug)]
pub struct ProgramCache {
    programs: FxHashMap<ProgramKey, ShaderProgram>,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self { programs: FxHashMap::default() }
    }

    /// Returns the cached program for the pair, linking it on first use.
    ///
    /// On link failure the half-created program is destroyed before the
    /// error propagates and no entry is stored, so the next lookup fails
    /// the same way instead of returning a broken program.
    pub fn get_or_link<G: GlContext>(
        &mut self,
        gl: &G,
        vertex_shader: &VertexShader,
        fragment_shader: &FragmentShader,
    ) -> Result<&mut ShaderProgram> {
        let key = (vertex_shader.key(), fragment_shader.key());
        match self.programs.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let program = Self::link(gl, key, vertex_shader, fragment_shader)?;
                log::debug!(
                    "linked shader program {:?} for pair ({:#x}, {:#x})",
                    program.program,
                    key.0,
                    key.1
                );
                Ok(entry.insert(program))
            }
        }
    }

    /// Cached entry for a pair key, if one exists.
    #[must_use]
    pub fn get(&self, key: ProgramKey) -> Option<&ShaderProgram> {
        self.programs.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: ProgramKey) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(&key)
    }

    /// Destroys all cached programs. Safe to call with zero entries.
    pub fn clear<G: GlContext>(&mut self, gl: &G) {
        for (_, program) in self.programs.drain() {
            gl.delete_program(program.program);
        }
    }

    /// Number of cached programs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    fn link<G: GlContext>(
        gl: &G,
        key: ProgramKey,
        vertex_shader: &VertexShader,
        fragment_shader: &FragmentShader,
    ) -> Result<ShaderProgram> {
        let program = gl.create_program();
        check_error(gl, "create program")?;

        match Self::link_inner(gl, program, key, vertex_shader, fragment_shader) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                gl.delete_program(program);
                Err(err)
            }
        }
    }

    fn link_inner<G: GlContext>(
        gl: &G,
        program: GlProgram,
        key: ProgramKey,
        vertex_shader: &VertexShader,
        fragment_shader: &FragmentShader,
    ) -> Result<ShaderProgram> {
        gl.attach_shader(program, vertex_shader.handle());
        check_error(gl, "attach vertex shader")?;
        gl.attach_shader(program, fragment_shader.handle());
        check_error(gl, "attach fragment shader")?;

        gl.link_program(program);
        if !gl.link_status(program) {
            let log = gl.program_info_log(program);
            log::error!("shader program link failed: {log}");
            gl.detach_shader(program, vertex_shader.handle());
            gl.detach_shader(program, fragment_shader.handle());
            return Err(GlimmerError::ShaderLink { log });
        }

        gl.use_program(program);
        check_error(gl, "use program")?;

        // Attribute locations the vertex shader actually got assigned;
        // usages the linker dropped simply stay unmapped.
        let mut attributes = FxHashMap::default();
        for attribute in vertex_shader.attributes() {
            if let Some(location) = gl.attrib_location(program, &attribute.name) {
                attributes.insert((attribute.usage, attribute.usage_index), location);
            }
        }

        // Samplers are pinned to their texture units once, here.
        for sampler in fragment_shader.samplers() {
            if let Some(location) = gl.uniform_location(program, &sampler.name) {
                gl.uniform1i(location, sampler.texture_unit as i32);
                check_error(gl, "sampler texture unit")?;
            }
        }

        Ok(ShaderProgram {
            program,
            key,
            uniforms: FxHashMap::default(),
            attributes,
            last_constants: FxHashMap::default(),
        })
    }
}
