//! Render surfaces between the video decoder and the video encoder.
//!
//! The decoder renders into an [`OutputSurface`] (an external texture); each
//! frame is drawn with the scaling shader onto the encoder's [`InputSurface`]
//! and submitted with its presentation time.

use crate::error::Result;
use crate::shaders;
use tracing::{debug, trace};

/// Texture-backed surface the video decoder renders into.
pub trait OutputSurface {
    /// Block until the decoder has produced a new frame on the texture.
    fn await_new_image(&mut self) -> Result<()>;

    /// Draw the latest frame into the current GL context.
    fn draw_image(&mut self) -> Result<()>;

    /// Replace the fragment shader used by [`draw_image`](Self::draw_image).
    fn change_fragment_shader(&mut self, source: &str) -> Result<()>;

    /// Free the texture and GL program.
    fn release(&mut self) -> Result<()>;
}

/// Window surface feeding an encoder.
pub trait InputSurface {
    /// Bind the surface's EGL context to the calling thread.
    fn make_current(&mut self) -> Result<()>;

    /// Timestamp of the next submitted frame, in nanoseconds.
    fn set_presentation_time(&mut self, nanos: i64) -> Result<()>;

    /// Submit the drawn frame to the encoder.
    fn swap_buffers(&mut self) -> Result<()>;

    /// Free the EGL surface and context.
    fn release(&mut self) -> Result<()>;
}

/// Source and target geometry for the frame blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleGeometry {
    /// Decoded frame width.
    pub src_width: u32,
    /// Decoded frame height.
    pub src_height: u32,
    /// Encoder width.
    pub dst_width: u32,
    /// Encoder height.
    pub dst_height: u32,
}

impl ScaleGeometry {
    /// Fragment shader source for this geometry.
    pub fn fragment_shader(&self) -> Result<String> {
        shaders::fragment_shader(self.src_width, self.src_height, self.dst_width, self.dst_height)
    }
}

/// Install the scaling shader on a freshly created output surface.
pub fn install_shader(surface: &mut dyn OutputSurface, geometry: ScaleGeometry) -> Result<()> {
    let source = geometry.fragment_shader()?;
    debug!(
        src = %format!("{}x{}", geometry.src_width, geometry.src_height),
        dst = %format!("{}x{}", geometry.dst_width, geometry.dst_height),
        identity = source == shaders::IDENTITY_FRAGMENT_SHADER,
        "installing fragment shader"
    );
    surface.change_fragment_shader(&source)
}

/// Move one decoded frame from `output` to the encoder through `input`.
pub fn render_frame(
    output: &mut dyn OutputSurface,
    input: &mut dyn InputSurface,
    presentation_time_us: i64,
) -> Result<()> {
    output.await_new_image()?;
    output.draw_image()?;
    input.set_presentation_time(presentation_time_us * 1000)?;
    input.swap_buffers()?;
    trace!(pts_us = presentation_time_us, "frame submitted to encoder surface");
    Ok(())
}
