//! OpenGL rendering of the composited scene

use anyhow::{Context, Result};
use std::ffi::CString;
use std::ptr;
use tracing::{info, trace, warn};

use crate::shared::RectF;

/// One textured quad, in scene (X11, top-left origin) coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub window: u32,
    pub texture: u32,
    pub rect: RectF,
    pub opacity: f32,
    /// Texture row 0 is the top of the window
    pub inverted: bool,
    /// Rows hidden from the top of the window (status bar crop)
    pub crop_top: f64,
    pub z: i32,
}

struct Uniforms {
    position: i32,
    size: i32,
    opacity: i32,
    texture: i32,
}

/// OpenGL renderer for compositing windows
pub struct Renderer {
    program: u32,
    vao: u32,
    vbo: u32,
    uniforms: Uniforms,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        unsafe {
            gl::Enable(gl::BLEND);
            gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);

            let program = Self::create_shader_program()?;

            let mut vao = 0;
            let mut vbo = 0;
            gl::GenVertexArrays(1, &mut vao);
            gl::GenBuffers(1, &mut vbo);

            gl::BindVertexArray(vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);

            // position (vec2) and texcoord (vec2)
            let stride = 4 * std::mem::size_of::<f32>() as i32;
            gl::VertexAttribPointer(0, 2, gl::FLOAT, gl::FALSE, stride, ptr::null());
            gl::EnableVertexAttribArray(0);
            gl::VertexAttribPointer(1, 2, gl::FLOAT, gl::FALSE, stride, (2 * std::mem::size_of::<f32>()) as *const _);
            gl::EnableVertexAttribArray(1);

            gl::BindVertexArray(0);

            let uniforms = Uniforms {
                position: gl::GetUniformLocation(program, b"uPosition\0".as_ptr() as *const _),
                size: gl::GetUniformLocation(program, b"uSize\0".as_ptr() as *const _),
                opacity: gl::GetUniformLocation(program, b"uOpacity\0".as_ptr() as *const _),
                texture: gl::GetUniformLocation(program, b"uTexture\0".as_ptr() as *const _),
            };

            info!("OpenGL renderer initialized");
            Ok(Self { program, vao, vbo, uniforms })
        }
    }

    fn create_shader_program() -> Result<u32> {
        let vertex_shader = r#"
            #version 330 core
            layout (location = 0) in vec2 aPos;
            layout (location = 1) in vec2 aTexCoord;

            uniform vec2 uPosition;
            uniform vec2 uSize;

            out vec2 TexCoord;

            void main() {
                vec2 pos = aPos * uSize + uPosition;
                gl_Position = vec4(pos.x, pos.y, 0.0, 1.0);
                TexCoord = aTexCoord;
            }
        "#;

        let fragment_shader = r#"
            #version 330 core
            out vec4 FragColor;

            in vec2 TexCoord;

            uniform sampler2D uTexture;
            uniform float uOpacity;

            void main() {
                vec4 texColor = texture(uTexture, TexCoord);
                FragColor = vec4(texColor.rgb, texColor.a * uOpacity);
            }
        "#;

        unsafe {
            let vs = Self::compile_shader(vertex_shader, gl::VERTEX_SHADER)?;
            let fs = Self::compile_shader(fragment_shader, gl::FRAGMENT_SHADER)?;
            let program = Self::link_program(vs, fs);

            gl::DeleteShader(vs);
            gl::DeleteShader(fs);

            program
        }
    }

    fn compile_shader(source: &str, shader_type: u32) -> Result<u32> {
        let c_str = CString::new(source).context("Shader source contains a NUL byte")?;
        unsafe {
            let shader = gl::CreateShader(shader_type);
            gl::ShaderSource(shader, 1, &c_str.as_ptr(), ptr::null());
            gl::CompileShader(shader);

            let mut success = 0;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut success);
            if success == 0 {
                let mut len = 0;
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
                let mut buffer = vec![0u8; len.max(0) as usize];
                gl::GetShaderInfoLog(shader, len, ptr::null_mut(), buffer.as_mut_ptr() as *mut _);
                let error = String::from_utf8_lossy(&buffer);
                gl::DeleteShader(shader);
                return Err(anyhow::anyhow!("Shader compilation failed: {}", error));
            }

            Ok(shader)
        }
    }

    fn link_program(vs: u32, fs: u32) -> Result<u32> {
        unsafe {
            let program = gl::CreateProgram();
            gl::AttachShader(program, vs);
            gl::AttachShader(program, fs);
            gl::LinkProgram(program);

            let mut success = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut success);
            if success == 0 {
                let mut len = 0;
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
                let mut buffer = vec![0u8; len.max(0) as usize];
                gl::GetProgramInfoLog(program, len, ptr::null_mut(), buffer.as_mut_ptr() as *mut _);
                let error = String::from_utf8_lossy(&buffer);
                gl::DeleteProgram(program);
                return Err(anyhow::anyhow!("Program linking failed: {}", error));
            }

            Ok(program)
        }
    }

    /// Clear and draw `items` bottom to top
    pub fn render(&self, items: &[DrawItem], screen_width: f32, screen_height: f32) {
        unsafe {
            gl::Viewport(0, 0, screen_width as i32, screen_height as i32);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT);
            gl::UseProgram(self.program);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::Uniform1i(self.uniforms.texture, 0);
            gl::BindVertexArray(self.vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, self.vbo);
        }

        for item in items {
            if item.texture == 0 || item.rect.is_empty() || item.opacity <= 0.0 {
                continue;
            }
            trace!("Drawing 0x{:x} with texture {} at {:?}", item.window, item.texture, item.rect);
            let (x, y, w, h) = gl_rect(item, screen_width, screen_height);
            let vertices = quad_vertices(item);
            unsafe {
                gl::Uniform2f(self.uniforms.position, x, y);
                gl::Uniform2f(self.uniforms.size, w, h);
                gl::Uniform1f(self.uniforms.opacity, item.opacity.clamp(0.0, 1.0));
                gl::BindTexture(gl::TEXTURE_2D, item.texture);
                gl::BufferData(
                    gl::ARRAY_BUFFER,
                    std::mem::size_of_val(&vertices) as isize,
                    vertices.as_ptr() as *const _,
                    gl::DYNAMIC_DRAW,
                );
                gl::DrawArrays(gl::TRIANGLE_FAN, 0, 4);
            }
        }

        unsafe {
            gl::BindVertexArray(0);
            gl::BindTexture(gl::TEXTURE_2D, 0);
            let err = gl::GetError();
            if err != gl::NO_ERROR {
                warn!("OpenGL error after rendering: 0x{:x}", err);
            }
        }
    }
}

/// Visible part of the item in normalized device coordinates
fn gl_rect(item: &DrawItem, screen_width: f32, screen_height: f32) -> (f32, f32, f32, f32) {
    let crop = item.crop_top.clamp(0.0, item.rect.height) as f32;
    let x = item.rect.x as f32;
    let y = item.rect.y as f32 + crop;
    let width = item.rect.width as f32;
    let height = item.rect.height as f32 - crop;

    // X11 has a top-left origin, GL a bottom-left one
    let x_gl = (x / screen_width) * 2.0 - 1.0;
    let y_gl = 1.0 - ((y + height) / screen_height) * 2.0;
    (x_gl, y_gl, (width / screen_width) * 2.0, (height / screen_height) * 2.0)
}

/// Unit quad with texture coordinates for the item's orientation and crop
fn quad_vertices(item: &DrawItem) -> [f32; 16] {
    let crop = if item.rect.height > 0.0 {
        (item.crop_top.clamp(0.0, item.rect.height) / item.rect.height) as f32
    } else {
        0.0
    };
    // texture v of the window's top and bottom rows
    let (top, bottom) = if item.inverted { (crop, 1.0) } else { (1.0 - crop, 0.0) };
    [
        0.0, 0.0, 0.0, bottom,
        1.0, 0.0, 1.0, bottom,
        1.0, 1.0, 1.0, top,
        0.0, 1.0, 0.0, top,
    ]
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            gl::DeleteBuffers(1, &self.vbo);
            gl::DeleteVertexArrays(1, &self.vao);
            gl::DeleteProgram(self.program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> DrawItem {
        DrawItem {
            window: 1,
            texture: 1,
            rect: RectF::new(0.0, 0.0, 400.0, 200.0),
            opacity: 1.0,
            inverted: true,
            crop_top: 0.0,
            z: 0,
        }
    }

    #[test]
    fn test_full_screen_rect() {
        let mut item = item();
        item.rect = RectF::new(0.0, 0.0, 800.0, 400.0);
        assert_eq!(gl_rect(&item, 800.0, 400.0), (-1.0, -1.0, 2.0, 2.0));
    }

    #[test]
    fn test_inverted_texture_keeps_row_zero_on_top() {
        let v = quad_vertices(&item());
        // bottom-left vertex samples the last row, top-left the first
        assert_eq!((v[1], v[3]), (0.0, 1.0));
        assert_eq!((v[13], v[15]), (1.0, 0.0));

        let mut upright = item();
        upright.inverted = false;
        let v = quad_vertices(&upright);
        assert_eq!(v[3], 0.0);
        assert_eq!(v[15], 1.0);
    }

    #[test]
    fn test_crop_hides_top_rows() {
        let mut item = item();
        item.crop_top = 50.0;
        let v = quad_vertices(&item);
        assert_eq!(v[15], 0.25);
        let (_, y, _, h) = gl_rect(&item, 400.0, 200.0);
        assert_eq!(y, -1.0);
        assert_eq!(h, 1.5);
    }
}
