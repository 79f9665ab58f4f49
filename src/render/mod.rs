//! Drawing: toolkit boundary, primary-surface dispatch and the status overlay

mod dispatch;
pub mod headless;
mod overlay;
mod toolkit;

pub use dispatch::{Dispatched, Dispatcher, Mirror};
pub use headless::{FlipCheck, HeadlessToolkit, Journal, JournalEntry, Operation};
pub use overlay::{
    Compositor, DirtyFlags, GazeSource, OverlayContent, OverlayLayout, OverlayStyle,
};
pub use toolkit::{
    DrawCall, DrawOutcome, FlipOptions, SurfaceId, TextureId, Toolkit, ToolkitError,
};
