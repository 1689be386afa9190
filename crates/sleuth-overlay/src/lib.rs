//! sleuth-overlay: draws findings over the analysed image.
//!
//! [`OverlayEngine`] tracks the selected finding of one surface, turns it
//! into [`Frame`]s of draw primitives at the current pulse opacity, and
//! keeps a background loop requesting redraws of the finding's dirty
//! rectangle through a [`RedrawSink`]. [`GlyphCache`] renders the small
//! per-finding icons used by list views. [`render`] rasterises frames with
//! `tiny-skia` for headless output.

pub mod animation;
pub mod config;
pub mod engine;
pub mod glyph;
pub mod primitive;
pub mod pulse;
pub mod redraw;
pub mod render;

pub use animation::AnimationHandle;
pub use config::{OverlayConfig, PulseConfig};
pub use engine::OverlayEngine;
pub use glyph::{GLYPH_SIZE, Glyph, GlyphCache, GlyphKind, render_glyph};
pub use primitive::{Arrow, Frame, Image, Primitive, Shape, ShapeOutline, frame_for};
pub use pulse::opacity_at;
pub use redraw::{FnRedrawSink, RedrawSink, redraw_fn};
pub use render::{RenderError, checkerboard, render_frame, render_region};
pub use sleuth_core::clock;
