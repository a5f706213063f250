//! Vertex layouts and the attribute binding cache.
//!
//! For every (shader pair, vertex layout) combination the cache builds the
//! list of attribute-pointer descriptors once: component count, type,
//! normalization and byte offset per matched attribute, plus the mask of
//! attribute slots the combination enables. Layout elements the vertex
//! shader has no matching attribute for are skipped without error, which
//! mirrors the legacy runtime this layer is modeled on.
//!
//! A second-level cache remembers the last applied (descriptor set, base
//! offset, vertex buffer) triple; batched draws reusing the same geometry
//! skip the native pointer calls entirely.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::errors::Result;
use crate::gl::{AttribType, GlBuffer, GlContext, check_error};

use super::ids::next_raw_id;
use super::program::{ProgramKey, ShaderProgram};

// ─── Vertex Formats ──────────────────────────────────────────────────────────

/// Per-element data formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Single,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Byte4,
    Short2,
    Short4,
    NormalizedShort2,
    NormalizedShort4,
    HalfVector2,
    HalfVector4,
}

impl VertexFormat {
    /// Number of components the attribute pointer reads.
    #[must_use]
    pub fn components(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Vector2 | Self::Short2 | Self::NormalizedShort2 | Self::HalfVector2 => 2,
            Self::Vector3 => 3,
            Self::Vector4
            | Self::Color
            | Self::Byte4
            | Self::Short4
            | Self::NormalizedShort4
            | Self::HalfVector4 => 4,
        }
    }

    /// Component type passed to the attribute pointer.
    #[must_use]
    pub fn attrib_type(self) -> AttribType {
        match self {
            Self::Single | Self::Vector2 | Self::Vector3 | Self::Vector4 => AttribType::F32,
            Self::Color | Self::Byte4 => AttribType::U8,
            Self::Short2 | Self::Short4 | Self::NormalizedShort2 | Self::NormalizedShort4 => {
                AttribType::I16
            }
            Self::HalfVector2 | Self::HalfVector4 => AttribType::F16,
        }
    }

    /// Whether fixed-point data is normalized into `[0, 1]` / `[-1, 1]`.
    #[must_use]
    pub fn normalized(self) -> bool {
        matches!(self, Self::Color | Self::NormalizedShort2 | Self::NormalizedShort4)
    }

    /// Size of one element in bytes.
    #[must_use]
    pub fn byte_size(self) -> u32 {
        match self {
            Self::Single | Self::Color | Self::Byte4 | Self::Short2 | Self::NormalizedShort2
            | Self::HalfVector2 => 4,
            Self::Vector2 | Self::Short4 | Self::NormalizedShort4 | Self::HalfVector4 => 8,
            Self::Vector3 => 12,
            Self::Vector4 => 16,
        }
    }
}

/// Semantic a vertex element carries, matched against the vertex shader's
/// attribute interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementUsage {
    Position,
    Color,
    Normal,
    TextureCoordinate,
    Tangent,
    Binormal,
    BlendIndices,
    BlendWeight,
}

/// One element of a vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub offset: u32,
    pub format: VertexFormat,
    pub usage: VertexElementUsage,
    pub usage_index: u32,
}

/// Identity of a vertex layout; stable for the layout's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(u64);

/// An immutable vertex layout with a stable cache identity.
#[derive(Debug)]
pub struct VertexLayout {
    id: LayoutId,
    stride: u32,
    elements: Vec<VertexElement>,
}

impl VertexLayout {
    #[must_use]
    pub fn new(stride: u32, elements: Vec<VertexElement>) -> Arc<Self> {
        Arc::new(Self { id: LayoutId(next_raw_id()), stride, elements })
    }

    /// Builds a layout with tightly packed elements in declaration order.
    #[must_use]
    pub fn packed(elements: &[(VertexElementUsage, u32, VertexFormat)]) -> Arc<Self> {
        let mut offset = 0;
        let elements = elements
            .iter()
            .map(|&(usage, usage_index, format)| {
                let element = VertexElement { offset, format, usage, usage_index };
                offset += format.byte_size();
                element
            })
            .collect();
        Self::new(offset, elements)
    }

    #[must_use]
    pub fn id(&self) -> LayoutId {
        self.id
    }

    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[must_use]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }
}

// ─── Attribute Binding Cache ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct AttributePointer {
    location: u32,
    components: u32,
    ty: AttribType,
    normalized: bool,
    offset: u32,
}

#[derive(Debug)]
struct AttributeSet {
    /// Identity used by the last-applied fast path.
    id: u64,
    stride: u32,
    pointers: SmallVec<[AttributePointer; 8]>,
    enabled_mask: u64,
}

/// Cache of attribute descriptor sets keyed by (shader pair, layout).
#[derive(Debug)]
pub struct AttributeBindingCache {
    sets: FxHashMap<(ProgramKey, LayoutId), AttributeSet>,
    /// (set id, base offset, vertex buffer) applied by the previous call.
    last_applied: Option<(u64, usize, Option<GlBuffer>)>,
}

impl Default for AttributeBindingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeBindingCache {
    #[must_use]
    pub fn new() -> Self {
        Self { sets: FxHashMap::default(), last_applied: None }
    }

    /// Applies attribute pointers for the layout under the given program.
    ///
    /// `enabled` is the device-wide set of currently enabled attribute
    /// slots; only slots that differ are toggled.
    pub(crate) fn apply<G: GlContext>(
        &mut self,
        gl: &G,
        program: &ShaderProgram,
        layout: &VertexLayout,
        base_offset: usize,
        vertex_buffer: Option<GlBuffer>,
        enabled: &mut u64,
    ) -> Result<()> {
        let set = match self.sets.entry((program.key(), layout.id())) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Self::build(program, layout)),
        };

        if self.last_applied == Some((set.id, base_offset, vertex_buffer)) {
            return Ok(());
        }
        self.last_applied = Some((set.id, base_offset, vertex_buffer));

        for pointer in &set.pointers {
            gl.vertex_attrib_pointer(
                pointer.location,
                pointer.components,
                pointer.ty,
                pointer.normalized,
                set.stride,
                base_offset + pointer.offset as usize,
            );
            check_error(gl, "vertex attrib pointer")?;
        }
        apply_enabled_mask(gl, set.enabled_mask, enabled)
    }

    /// Drops every cached set and the fast-path record.
    pub fn clear(&mut self) {
        self.sets.clear();
        self.last_applied = None;
    }

    /// Number of cached descriptor sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn build(program: &ShaderProgram, layout: &VertexLayout) -> AttributeSet {
        let mut set = AttributeSet {
            id: next_raw_id(),
            stride: layout.stride(),
            pointers: SmallVec::new(),
            enabled_mask: 0,
        };
        for element in layout.elements() {
            // Usages the shader has no attribute for are dropped, matching
            // the legacy runtime.
            let Some(location) = program.attribute_location(element.usage, element.usage_index)
            else {
                continue;
            };
            set.pointers.push(AttributePointer {
                location,
                components: element.format.components(),
                ty: element.format.attrib_type(),
                normalized: element.format.normalized(),
                offset: element.offset,
            });
            set.enabled_mask |= 1 << location;
        }
        set
    }
}

/// Reconciles the wanted enabled-attribute mask against the currently
/// enabled set, toggling only the slots that differ.
pub(crate) fn apply_enabled_mask<G: GlContext>(
    gl: &G,
    wanted: u64,
    enabled: &mut u64,
) -> Result<()> {
    let mut diff = wanted ^ *enabled;
    while diff != 0 {
        let location = diff.trailing_zeros();
        if wanted & (1 << location) != 0 {
            gl.enable_vertex_attrib_array(location);
        } else {
            gl.disable_vertex_attrib_array(location);
        }
        check_error(gl, "vertex attrib array toggle")?;
        diff &= diff - 1;
    }
    *enabled = wanted;
    Ok(())
}
