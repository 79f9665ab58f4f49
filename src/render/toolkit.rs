//! Drawing toolkit boundary: surface handles, draw primitives and the `Toolkit` trait

use crate::geometry::{Color, Point, Rect};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

/// Handle to an onscreen window or offscreen buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SurfaceId(pub u32);

/// Handle to a texture created on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TextureId(pub u32);

/// Errors reported by a toolkit backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolkitError {
    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("{0}")]
    Backend(String),
}

/// Presentation flags for a flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlipOptions {
    /// Keep the back buffer contents after presenting
    pub dont_clear: bool,
    /// Present immediately instead of waiting for vertical retrace
    pub dont_sync: bool,
}

/// A single draw primitive issued against a surface
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    /// Fill `rect`, or the whole surface when `None`
    Fill { color: Color, rect: Option<Rect> },
    FrameRect { color: Color, rect: Rect, pen_width: f64 },
    FillOval { color: Color, rect: Rect },
    FrameOval { color: Color, rect: Rect, pen_width: f64 },
    /// Segments between consecutive point pairs, colors per vertex
    Lines { points: Vec<Point>, colors: Vec<Color>, width: f64 },
    Dots { points: Vec<Point>, colors: Vec<Color>, size: f64 },
    Text { text: String, at: Point, color: Color },
    /// Upload an RGBA pixel buffer as a texture
    MakeTexture { width: u32, height: u32, pixels: Vec<u8> },
    DrawTexture { texture: TextureId, dest: Option<Rect> },
    Flip(FlipOptions),
}

impl DrawCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fill { .. } => "Fill",
            Self::FrameRect { .. } => "FrameRect",
            Self::FillOval { .. } => "FillOval",
            Self::FrameOval { .. } => "FrameOval",
            Self::Lines { .. } => "Lines",
            Self::Dots { .. } => "Dots",
            Self::Text { .. } => "Text",
            Self::MakeTexture { .. } => "MakeTexture",
            Self::DrawTexture { .. } => "DrawTexture",
            Self::Flip(_) => "Flip",
        }
    }

    /// Whether the call allocates a resource whose handle subscribers need
    pub fn creates_resource(&self) -> bool {
        matches!(self, Self::MakeTexture { .. })
    }

    pub fn is_flip(&self) -> bool {
        matches!(self, Self::Flip(_))
    }

    pub fn flip() -> Self {
        Self::Flip(FlipOptions::default())
    }
}

/// Result of executing a draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOutcome {
    Done,
    Texture(TextureId),
    Flipped { at: Instant },
}

impl DrawOutcome {
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Self::Texture(id) => Some(*id),
            _ => None,
        }
    }
}

/// Window system and drawing backend.
///
/// Opening windows, uploading pixels and presenting frames all go through this
/// trait; the session never talks to a graphics API directly.
pub trait Toolkit {
    /// Open a fullscreen window on the given screen index
    fn open_window(&mut self, screen: usize) -> Result<SurfaceId, ToolkitError>;

    /// Open an offscreen buffer
    fn open_offscreen(&mut self, width: u32, height: u32) -> Result<SurfaceId, ToolkitError>;

    fn surface_size(&self, surface: SurfaceId) -> Result<(u32, u32), ToolkitError>;

    fn execute(&mut self, surface: SurfaceId, call: &DrawCall) -> Result<DrawOutcome, ToolkitError>;

    /// Copy `src_rect` of `from` into `dst_rect` of `to`; `None` means the whole surface
    fn copy_region(
        &mut self,
        from: SurfaceId,
        to: SurfaceId,
        src_rect: Option<Rect>,
        dst_rect: Option<Rect>,
    ) -> Result<(), ToolkitError>;

    /// Request a flip that returns immediately
    fn begin_async_flip(&mut self, surface: SurfaceId) -> Result<(), ToolkitError>;

    /// Poll a pending asynchronous flip; `true` once it has completed
    fn async_flip_done(&mut self, surface: SurfaceId) -> Result<bool, ToolkitError>;

    fn close(&mut self, surface: SurfaceId) -> Result<(), ToolkitError>;
}
