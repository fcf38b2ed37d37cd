//! GPU frame scaling for the conversion pipeline.
//!
//! The pipeline hands decoded frames from the decoder's texture surface to
//! the encoder's input surface through a GLSL program:
//!
//! - [`shaders`] generates the fragment shader for a given scale ratio
//!   (identity up to 2x, box filter beyond)
//! - [`OutputSurface`] / [`InputSurface`] abstract the EGL surfaces a
//!   platform backend provides
//! - [`render_frame`] runs the per-frame await/draw/timestamp/swap sequence

mod error;
pub mod shaders;
mod surface;

pub use error::{GpuError, Result};
pub use shaders::{box_filter, fragment_shader, BoxFilter};
pub use surface::{install_shader, render_frame, InputSurface, OutputSurface, ScaleGeometry};
