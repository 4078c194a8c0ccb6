//! ### English
//! Framebuffer-object backend: offscreen targets on the application's current GL context.
//!
//! Avoids a second full GL context and the driver quirks of pbuffers/pixmaps.
//!
//! ### 中文
//! FBO 后端：在应用当前的 GL 上下文上创建离屏渲染目标。
//!
//! 无需第二个完整 GL 上下文，也避开了 pbuffer/pixmap 的驱动差异问题。

use std::rc::Rc;

use dpi::PhysicalSize;
use gleam::gl::{self, Gl};
use glow::HasContext as _;

use super::gl::{HostGlContext, drain_gl_errors, read_bound_framebuffer};
use super::{
    BackendKind, ContextProvider, ContextState, OffscreenContext, PixelFormat, PixelOrigin,
    ProviderId, is_valid_size,
};
use crate::engine::error::ContextError;

/// ### English
/// Framebuffer binding and viewport that were active before `make_current`.
///
/// ### 中文
/// `make_current` 之前处于激活状态的 framebuffer 绑定与 viewport。
#[derive(Clone, Copy, Debug)]
struct SavedBinding {
    framebuffer: gl::GLuint,
    viewport: [i32; 4],
}

impl SavedBinding {
    fn capture(glow: &glow::Context) -> Self {
        let mut viewport = [0i32; 4];
        let framebuffer = unsafe {
            glow.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport);
            glow.get_parameter_i32(glow::FRAMEBUFFER_BINDING)
        };
        Self {
            framebuffer: framebuffer.max(0) as gl::GLuint,
            viewport,
        }
    }

    fn apply(&self, gl: &Rc<dyn Gl>) {
        gl.bind_framebuffer(gl::FRAMEBUFFER, self.framebuffer);
        let [x, y, w, h] = self.viewport;
        gl.viewport(x, y, w, h);
    }
}

/// ### English
/// One offscreen target: FBO with colour and depth-stencil renderbuffers.
///
/// ### 中文
/// 一个离屏目标：带颜色与深度/模板 renderbuffer 的 FBO。
struct FboTarget {
    framebuffer_id: gl::GLuint,
    color_rb: gl::GLuint,
    depth_stencil_rb: gl::GLuint,
    /// ### English
    /// Binding to restore; `Some` only while the target is current.
    ///
    /// ### 中文
    /// 待恢复的绑定；仅在目标为 current 时为 `Some`。
    saved: Option<SavedBinding>,
}

impl FboTarget {
    /// ### English
    /// Creates the FBO and its renderbuffers. Leaves the previous framebuffer bound.
    ///
    /// #### Parameters
    /// - `host`: Host context used to create resources.
    /// - `size`: Renderbuffer size.
    ///
    /// ### 中文
    /// 创建 FBO 及其 renderbuffer。完成后恢复之前绑定的 framebuffer。
    ///
    /// #### 参数
    /// - `host`：用于创建资源的宿主上下文。
    /// - `size`：renderbuffer 尺寸。
    fn new(host: &HostGlContext, size: PhysicalSize<u32>) -> Option<Self> {
        let gl = host.gleam();
        let previous = SavedBinding::capture(host.glow());

        let framebuffer_ids = gl.gen_framebuffers(1);
        let renderbuffer_ids = gl.gen_renderbuffers(2);
        let target = Self {
            framebuffer_id: framebuffer_ids[0],
            color_rb: renderbuffer_ids[0],
            depth_stencil_rb: renderbuffer_ids[1],
            saved: None,
        };

        gl.bind_renderbuffer(gl::RENDERBUFFER, target.color_rb);
        gl.renderbuffer_storage(
            gl::RENDERBUFFER,
            gl::RGBA8,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
        );
        gl.bind_renderbuffer(gl::RENDERBUFFER, target.depth_stencil_rb);
        gl.renderbuffer_storage(
            gl::RENDERBUFFER,
            gl::DEPTH24_STENCIL8,
            size.width as gl::GLsizei,
            size.height as gl::GLsizei,
        );
        gl.bind_renderbuffer(gl::RENDERBUFFER, 0);

        gl.bind_framebuffer(gl::FRAMEBUFFER, target.framebuffer_id);
        gl.framebuffer_renderbuffer(
            gl::FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            gl::RENDERBUFFER,
            target.color_rb,
        );
        gl.framebuffer_renderbuffer(
            gl::FRAMEBUFFER,
            gl::DEPTH_STENCIL_ATTACHMENT,
            gl::RENDERBUFFER,
            target.depth_stencil_rb,
        );
        let status = gl.check_frame_buffer_status(gl::FRAMEBUFFER);
        previous.apply(gl);

        if status != gl::FRAMEBUFFER_COMPLETE {
            tracing::warn!(status, "offscreen framebuffer incomplete");
            target.delete(gl);
            return None;
        }
        Some(target)
    }

    fn bind(&self, gl: &Rc<dyn Gl>) {
        gl.bind_framebuffer(gl::FRAMEBUFFER, self.framebuffer_id);
    }

    fn delete(&self, gl: &Rc<dyn Gl>) {
        gl.delete_framebuffers(&[self.framebuffer_id]);
        gl.delete_renderbuffers(&[self.color_rb, self.depth_stencil_rb]);
    }
}

/// ### English
/// Context provider rendering into framebuffer objects on a host context.
///
/// Every context minted here lives in the host's share group, so several may be live at
/// once; the host context must be current whenever this provider is used.
///
/// ### 中文
/// 在宿主上下文上渲染到 framebuffer 对象的上下文 provider。
///
/// 此处创建的上下文都属于宿主的 share group，因此可同时存在多个；使用本 provider 时宿主上下文必须为 current。
pub struct FboProvider {
    id: ProviderId,
    host: Rc<HostGlContext>,
}

impl FboProvider {
    /// ### English
    /// Wraps `host`. The provider reports itself invalid when FBOs were not detected.
    ///
    /// ### 中文
    /// 封装 `host`。若未探测到 FBO 支持，provider 会报告自身无效。
    pub fn new(host: Rc<HostGlContext>) -> Self {
        Self {
            id: ProviderId::next(),
            host,
        }
    }

    /// ### English
    /// Like [`FboProvider::new`] but fails when the host lacks FBO support.
    ///
    /// ### 中文
    /// 与 [`FboProvider::new`] 相同，但宿主不支持 FBO 时返回错误。
    pub fn try_new(host: Rc<HostGlContext>) -> Result<Self, ContextError> {
        let caps = host.capabilities();
        if !caps.framebuffer_objects {
            return Err(ContextError::FboUnsupported {
                major: caps.major,
                minor: caps.minor,
            });
        }
        Ok(Self::new(host))
    }
}

impl ContextProvider for FboProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Fbo
    }

    fn is_valid(&self) -> bool {
        self.host.capabilities().framebuffer_objects
    }

    fn max_size(&self) -> PhysicalSize<u32> {
        let (width, height) = self.host.capabilities().max_fbo_size();
        PhysicalSize::new(width, height)
    }

    fn pixel_origin(&self) -> PixelOrigin {
        PixelOrigin::BottomLeft
    }

    fn supports_concurrent_contexts(&self) -> bool {
        true
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext> {
        if !self.is_valid() || !is_valid_size(size) {
            return None;
        }
        let max = self.max_size();
        if size.width > max.width || size.height > max.height {
            return None;
        }

        let target = FboTarget::new(&self.host, size)?;
        Some(OffscreenContext::new(self.id, size, target))
    }

    fn make_current(&self, context: &mut OffscreenContext) -> bool {
        let size = context.size();
        let gl = self.host.gleam();
        let Some(target) = context.backend_mut::<FboTarget>(self.id) else {
            return false;
        };

        if target.saved.is_none() {
            target.saved = Some(SavedBinding::capture(self.host.glow()));
        }
        let stale = drain_gl_errors(|| gl.get_error());
        if stale > 0 {
            tracing::debug!(stale, "discarded pending host GL errors before fbo bind");
        }
        target.bind(gl);
        gl.viewport(0, 0, size.width as i32, size.height as i32);

        if gl.get_error() != gl::NO_ERROR {
            if let Some(saved) = target.saved.take() {
                saved.apply(gl);
            }
            return false;
        }
        context.set_state(ContextState::Current);
        true
    }

    fn restore_previous(&self, context: &mut OffscreenContext) {
        let Some(target) = context.backend_mut::<FboTarget>(self.id) else {
            return;
        };
        if let Some(saved) = target.saved.take() {
            saved.apply(self.host.gleam());
        }
        context.set_state(ContextState::Created);
    }

    fn destroy(&self, context: OffscreenContext) {
        match context.into_backend::<FboTarget>(self.id) {
            Ok(target) => {
                let gl = self.host.gleam();
                if let Some(saved) = target.saved {
                    saved.apply(gl);
                }
                target.delete(gl);
            }
            Err(context) => {
                tracing::warn!(
                    owner = ?context.owner(),
                    "fbo provider asked to destroy a foreign context"
                );
            }
        }
    }

    fn clear(&self, context: &mut OffscreenContext, rgba: [f32; 4]) {
        if !context.is_current() {
            return;
        }
        let gl = self.host.gleam();
        gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
        gl.clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT);
    }

    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>> {
        if !context.is_current() {
            return None;
        }
        let size = context.size();
        let target = context.backend::<FboTarget>(self.id)?;
        target.bind(self.host.gleam());
        read_bound_framebuffer(self.host.glow(), size.width, size.height, format)
    }
}
