//! Transient texture descriptions and usage flags.

use bitflags::bitflags;

use super::{Extent2d, GraphSize};

/// Texture format enumeration.
///
/// Only the formats the frame core schedules transient targets in; asset
/// formats live with the asset pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit BGRA channels, sRGB.
    Bgra8UnormSrgb,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit red channel, float.
    R32Float,
    /// 11/11/10-bit RGB channels, float.
    Rg11B10Float,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }
}

bitflags! {
    /// Usage flags for transient textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be bound as a render target.
        const RENDER_TARGET = 1 << 0;
        /// Texture can be written randomly from shaders (UAV / storage).
        const RANDOM_WRITE = 1 << 1;
        /// Texture can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Texture uses a caller-fixed size instead of a policy-derived one.
        const CUSTOM_SIZE = 1 << 3;
        /// Texture can be copied from.
        const COPY_SRC = 1 << 4;
        /// Texture can be copied to.
        const COPY_DST = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Width/height policy of a transient texture.
///
/// Policy-derived variants are expressed as a shift-right of one of the
/// graph's reference sizes, so a half-resolution bloom chain is
/// `Render { shift: 1 }` and needs no explicit pixel sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizePolicy {
    /// Explicit size, independent of the graph's reference sizes.
    Fixed(Extent2d),
    /// Derived from the internal rendering resolution.
    Render {
        /// Right-shift applied to the reference size.
        shift: u8,
    },
    /// Derived from the UI resolution.
    Ui {
        /// Right-shift applied to the reference size.
        shift: u8,
    },
    /// Derived from the post-upscale resolution.
    Upscaled {
        /// Right-shift applied to the reference size.
        shift: u8,
    },
}

impl SizePolicy {
    /// Resolve the policy to a concrete extent against `size`.
    pub fn resolve(self, size: &GraphSize) -> Extent2d {
        match self {
            Self::Fixed(extent) => extent,
            Self::Render { shift } => size.render.shifted(shift),
            Self::Ui { shift } => size.ui.shifted(shift),
            Self::Upscaled { shift } => size.upscaled.shifted(shift),
        }
    }
}

/// Semantic description of a transient render texture.
///
/// Descriptions are pure bookkeeping: nothing is allocated until the owning
/// context's allocate phase. Immutable once submitted to a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTextureDescription {
    /// Debug name, also used for the physical resource when not aliased.
    pub name: String,
    /// Pixel format.
    pub format: TextureFormat,
    /// Width/height policy.
    pub size: SizePolicy,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl RenderTextureDescription {
    /// Create a description.
    pub fn new(
        name: impl Into<String>,
        format: TextureFormat,
        size: SizePolicy,
        usage: TextureUsage,
    ) -> Self {
        let name = name.into();
        let usage = match size {
            SizePolicy::Fixed(_) => usage | TextureUsage::CUSTOM_SIZE,
            _ => usage,
        };
        Self {
            name,
            format,
            size,
            usage,
        }
    }

    /// Resolve this description's concrete extent for a graph size.
    pub fn resolve_extent(&self, size: &GraphSize) -> Extent2d {
        self.size.resolve(size)
    }

    /// Whether this description can be backed by a physical allocation of
    /// `format` and `extent`, resolving size policies against `size`.
    ///
    /// The single compatibility predicate behind aliasing decisions.
    pub fn compatible_with(
        &self,
        format: TextureFormat,
        extent: Extent2d,
        size: &GraphSize,
    ) -> bool {
        self.format == format && self.resolve_extent(size) == extent
    }

    /// Whether `self` may share physical backing with `other`.
    ///
    /// Two descriptions are aliasable when their formats match and their
    /// resolved dimensions agree; usage flags are folded by union on the
    /// shared group, so they never block aliasing by themselves.
    pub fn aliasable_with(
        &self,
        other: &Self,
        self_size: &GraphSize,
        other_size: &GraphSize,
    ) -> bool {
        self.compatible_with(other.format, other.resolve_extent(other_size), self_size)
    }
}
