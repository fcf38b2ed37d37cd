//! GLSL sources for drawing decoded frames onto the encoder surface.
//!
//! Decoded frames arrive as external OES textures. When the target is at most
//! half the source size on each axis the texture is sampled directly and the
//! GPU's bilinear filtering suffices. For larger reductions a box filter
//! averages a `(2rx+1) x (2ry+1)` grid of texels per output pixel.

use crate::error::{GpuError, Result};

/// Vertex shader shared by every program.
pub const VERTEX_SHADER: &str = "uniform mat4 uMVPMatrix;
uniform mat4 uSTMatrix;
attribute vec4 aPosition;
attribute vec4 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = uMVPMatrix * aPosition;
    vTextureCoord = (uSTMatrix * aTextureCoord).xy;
}
";

/// Pass-through fragment shader for external textures.
pub const IDENTITY_FRAGMENT_SHADER: &str = "#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTextureCoord;
uniform samplerExternalOES sTexture;
void main() {
    gl_FragColor = texture2D(sTexture, vTextureCoord);
}
";

/// Box filter parameters for one scaling operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxFilter {
    /// Horizontal radius in taps.
    pub radius_x: i32,
    /// Vertical radius in taps.
    pub radius_y: i32,
    /// Horizontal tap spacing in normalised texture coordinates.
    pub step_x: f32,
    /// Vertical tap spacing in normalised texture coordinates.
    pub step_y: f32,
}

impl BoxFilter {
    /// Number of texels averaged per output pixel.
    pub fn taps(&self) -> i32 {
        (2 * self.radius_x + 1) * (2 * self.radius_y + 1)
    }
}

/// Pick the filter for scaling `src` to `dst`, or `None` for the identity shader.
pub fn box_filter(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Result<Option<BoxFilter>> {
    for (width, height) in [(src_width, src_height), (dst_width, dst_height)] {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidDimensions { width, height });
        }
    }
    let kx = src_width as f32 / dst_width as f32;
    let ky = src_height as f32 / dst_height as f32;
    if kx <= 2.0 && ky <= 2.0 {
        return Ok(None);
    }
    let radius_x = (kx - 0.1).ceil() as i32 / 2;
    let radius_y = (ky - 0.1).ceil() as i32 / 2;
    Ok(Some(BoxFilter {
        radius_x,
        radius_y,
        step_x: kx / (1 + 2 * radius_x) as f32 * (1.0 / src_width as f32),
        step_y: ky / (1 + 2 * radius_y) as f32 * (1.0 / src_height as f32),
    }))
}

/// Generate the fragment shader for scaling `src` to `dst`.
pub fn fragment_shader(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Result<String> {
    let Some(filter) = box_filter(src_width, src_height, dst_width, dst_height)? else {
        return Ok(IDENTITY_FRAGMENT_SHADER.to_string());
    };
    Ok(format!(
        "#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTextureCoord;
uniform samplerExternalOES sTexture;
void main() {{
    vec3 finalColor = vec3(0.0);
    float stepX = {step_x:.8};
    float stepY = {step_y:.8};
    for (int i = -{rx}; i <= {rx}; ++i) {{
        for (int j = -{ry}; j <= {ry}; ++j) {{
            finalColor += texture2D(sTexture, (vTextureCoord.xy + vec2(float(i)*stepX, float(j)*stepY))).rgb;
        }}
    }}
    gl_FragColor = vec4(finalColor / {taps:.1}, 1.0);
}}
",
        step_x = filter.step_x,
        step_y = filter.step_y,
        rx = filter.radius_x,
        ry = filter.radius_y,
        taps = filter.taps() as f32,
    ))
}
