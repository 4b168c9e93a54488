//! Common value types shared across the frame core.

mod texture;

pub use texture::{RenderTextureDescription, SizePolicy, TextureFormat, TextureUsage};

/// Two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise maximum of two extents.
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }

    /// Halve the extent `shift` times (floor, clamped to at least 1x1).
    pub fn shifted(self, shift: u8) -> Self {
        Self {
            width: (self.width >> shift).max(1),
            height: (self.height >> shift).max(1),
        }
    }
}

/// Per-frame reference sizes a graph renders at.
///
/// A graph topology can be shared by several viewports with different sizes;
/// [`GraphSize::max`] folds them into the smallest common superset used to
/// resolve policy-derived resource extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphSize {
    /// Internal rendering resolution.
    pub render: Extent2d,
    /// UI / presentation resolution.
    pub ui: Extent2d,
    /// Post-upscale resolution.
    pub upscaled: Extent2d,
}

impl GraphSize {
    /// Create a graph size where all three references share one extent.
    pub fn uniform(extent: Extent2d) -> Self {
        Self {
            render: extent,
            ui: extent,
            upscaled: extent,
        }
    }

    /// Component-wise maximum of two graph sizes.
    pub fn max(self, other: Self) -> Self {
        Self {
            render: self.render.max(other.render),
            ui: self.ui.max(other.ui),
            upscaled: self.upscaled.max(other.upscaled),
        }
    }
}
