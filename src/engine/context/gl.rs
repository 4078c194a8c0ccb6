//! ### English
//! Host GL context wrapper and capability probing.
//!
//! The FBO backend renders on a context the application already made current; this module
//! loads the GL entry points for it and probes what the driver supports.
//!
//! ### 中文
//! 宿主 GL 上下文封装与能力探测。
//!
//! FBO 后端在应用已设为 current 的上下文上渲染；本模块为其加载 GL 函数入口并探测驱动能力。

use std::collections::HashSet;
use std::ffi::c_void;
use std::rc::Rc;

use gleam::gl::{self, Gl};
use glow::HasContext as _;

use crate::engine::error::ContextError;

/// ### English
/// Extracts `(major, minor)` from a `GL_VERSION` string.
///
/// Expected forms: `"4.6.0 ..."` or `"OpenGL ES 3.2 ..."`. Unparsable input yields `(0, 0)`.
///
/// ### 中文
/// 从 `GL_VERSION` 字符串中解析 `(major, minor)`。
///
/// 期望的形式：`"4.6.0 ..."` 或 `"OpenGL ES 3.2 ..."`。无法解析时返回 `(0, 0)`。
pub fn parse_gl_version(version: &str) -> (u32, u32) {
    let mut major = 0u32;
    let mut minor = 0u32;
    let number_token = version.split_whitespace().find(|t| {
        t.chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
    });
    if let Some(token) = number_token {
        let mut parts = token.split('.');
        if let Some(m) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            major = m;
        }
        if let Some(n) = parts.next().and_then(|s| s.parse::<u32>().ok()) {
            minor = n;
        }
    }
    (major, minor)
}

/// ### English
/// What the host driver supports, as far as offscreen rendering cares.
///
/// ### 中文
/// 与离屏渲染相关的宿主驱动能力。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlCapabilities {
    pub major: u32,
    pub minor: u32,
    pub is_gles: bool,
    /// ### English
    /// Framebuffer objects are usable (core since GL 3.0 / GLES 2.0, or via extension).
    ///
    /// ### 中文
    /// framebuffer 对象可用（GL 3.0 / GLES 2.0 起为核心特性，或通过扩展）。
    pub framebuffer_objects: bool,
    pub max_renderbuffer_size: u32,
    pub max_viewport: (u32, u32),
}

impl GlCapabilities {
    /// ### English
    /// Derives capabilities from the raw query results.
    ///
    /// ### 中文
    /// 根据原始查询结果推导能力。
    pub fn from_probe(
        version: &str,
        has_extension: impl Fn(&str) -> bool,
        max_renderbuffer_size: i32,
        max_viewport: [i32; 2],
    ) -> Self {
        let is_gles = version.starts_with("OpenGL ES");
        let (major, minor) = parse_gl_version(version);
        let core_fbo = if is_gles { major >= 2 } else { major >= 3 };
        let framebuffer_objects = core_fbo
            || has_extension("GL_ARB_framebuffer_object")
            || has_extension("GL_EXT_framebuffer_object");

        Self {
            major,
            minor,
            is_gles,
            framebuffer_objects,
            max_renderbuffer_size: max_renderbuffer_size.max(0) as u32,
            max_viewport: (max_viewport[0].max(0) as u32, max_viewport[1].max(0) as u32),
        }
    }

    /// ### English
    /// Largest FBO edge lengths: bounded by both the renderbuffer and viewport limits.
    ///
    /// ### 中文
    /// FBO 的最大边长：同时受 renderbuffer 与 viewport 上限约束。
    pub fn max_fbo_size(&self) -> (u32, u32) {
        (
            self.max_renderbuffer_size.min(self.max_viewport.0),
            self.max_renderbuffer_size.min(self.max_viewport.1),
        )
    }
}

/// ### English
/// GL entry points of a context that the application owns and keeps current on the
/// rendering thread.
///
/// ### 中文
/// 应用持有并在渲染线程上保持 current 的上下文的 GL 函数入口。
pub struct HostGlContext {
    /// ### English
    /// gleam GL API wrapper used for framebuffer object management.
    ///
    /// ### 中文
    /// 用于 framebuffer 对象管理的 gleam GL API 封装。
    gl: Rc<dyn Gl>,
    /// ### English
    /// glow GL API used for state queries and readback.
    ///
    /// ### 中文
    /// 用于状态查询与读回的 glow GL API。
    glow: glow::Context,
    capabilities: GlCapabilities,
}

impl HostGlContext {
    /// ### English
    /// Loads GL entry points through `loader` and probes the driver.
    ///
    /// # Safety
    /// The host context must be current on the calling thread and `loader` must return valid
    /// entry points for it (or null for missing ones).
    ///
    /// ### 中文
    /// 通过 `loader` 加载 GL 函数入口并探测驱动。
    ///
    /// # Safety
    /// 宿主上下文必须在调用线程上为 current，且 `loader` 必须返回其有效的函数入口（缺失时为 null）。
    pub unsafe fn from_loader<F>(mut loader: F) -> Result<Rc<Self>, ContextError>
    where
        F: FnMut(&str) -> *const c_void,
    {
        if loader("glGetString").is_null() {
            return Err(ContextError::GlLoader {
                symbol: "glGetString",
            });
        }

        let glow = unsafe { glow::Context::from_loader_function(&mut loader) };
        let version = unsafe { glow.get_parameter_string(glow::VERSION) };
        let is_gles = version.starts_with("OpenGL ES");

        let gl: Rc<dyn Gl> = unsafe {
            if is_gles {
                gl::GlesFns::load_with(&mut loader)
            } else {
                gl::GlFns::load_with(&mut loader)
            }
        };

        let capabilities = unsafe { probe(&glow, &version) };
        tracing::debug!(
            version = %version,
            fbo = capabilities.framebuffer_objects,
            max_renderbuffer = capabilities.max_renderbuffer_size,
            "probed host GL context"
        );

        Ok(Rc::new(Self {
            gl,
            glow,
            capabilities,
        }))
    }

    pub fn capabilities(&self) -> &GlCapabilities {
        &self.capabilities
    }

    pub(super) fn gleam(&self) -> &Rc<dyn Gl> {
        &self.gl
    }

    pub(super) fn glow(&self) -> &glow::Context {
        &self.glow
    }
}

unsafe fn probe(glow: &glow::Context, version: &str) -> GlCapabilities {
    let extensions: &HashSet<String> = glow.supported_extensions();
    let max_renderbuffer = unsafe { glow.get_parameter_i32(glow::MAX_RENDERBUFFER_SIZE) };
    let mut max_viewport = [0i32; 2];
    unsafe { glow.get_parameter_i32_slice(glow::MAX_VIEWPORT_DIMS, &mut max_viewport) };
    GlCapabilities::from_probe(
        version,
        |name| extensions.contains(name),
        max_renderbuffer,
        max_viewport,
    )
}

/// ### English
/// Discards errors already pending on the context so the next `get_error` reports only the
/// calls that follow. Returns how many were discarded.
///
/// ### 中文
/// 丢弃上下文上已挂起的错误，使下一次 `get_error` 只反映之后的调用。返回丢弃的数量。
pub(super) fn drain_gl_errors(mut get_error: impl FnMut() -> u32) -> usize {
    // A lost context may keep reporting errors.
    const MAX_PENDING: usize = 16;
    let mut drained = 0;
    while drained < MAX_PENDING && get_error() != glow::NO_ERROR {
        drained += 1;
    }
    drained
}

/// ### English
/// Reads the currently bound read framebuffer with byte packing alignment 1.
///
/// ### 中文
/// 以 1 字节对齐读取当前绑定的读 framebuffer。
pub(super) fn read_bound_framebuffer(
    glow: &glow::Context,
    width: u32,
    height: u32,
    format: super::PixelFormat,
) -> Option<Vec<u8>> {
    let len = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(format.components())?;
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).ok()?;
    pixels.resize(len, 0);
    drain_gl_errors(|| unsafe { glow.get_error() });
    unsafe {
        glow.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
        glow.read_pixels(
            0,
            0,
            width as i32,
            height as i32,
            format.gl_format(),
            glow::UNSIGNED_BYTE,
            glow::PixelPackData::Slice(Some(&mut pixels)),
        );
        if glow.get_error() != glow::NO_ERROR {
            return None;
        }
    }
    Some(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_desktop_and_es_versions() {
        assert_eq!(parse_gl_version("4.6.0 NVIDIA 535.54"), (4, 6));
        assert_eq!(parse_gl_version("OpenGL ES 3.2 Mesa 23.1"), (3, 2));
        assert_eq!(parse_gl_version("2.1 Mesa"), (2, 1));
        assert_eq!(parse_gl_version("garbage"), (0, 0));
    }

    #[test]
    fn fbo_support_comes_from_version_or_extension() {
        let none = |_: &str| false;
        let ext = |name: &str| name == "GL_EXT_framebuffer_object";
        let dims = [2048, 2048];

        assert!(GlCapabilities::from_probe("3.0 Mesa", none, 4096, dims).framebuffer_objects);
        assert!(!GlCapabilities::from_probe("2.1 Mesa", none, 0, dims).framebuffer_objects);
        assert!(GlCapabilities::from_probe("2.1 Mesa", ext, 2048, dims).framebuffer_objects);
        assert!(GlCapabilities::from_probe("OpenGL ES 2.0", none, 1024, dims).framebuffer_objects);
    }

    #[test]
    fn pending_errors_are_drained_before_checks() {
        let mut pending = vec![glow::INVALID_OPERATION, glow::INVALID_ENUM];
        let drained = drain_gl_errors(|| pending.pop().unwrap_or(glow::NO_ERROR));
        assert_eq!(drained, 2);
        assert!(pending.is_empty());

        assert_eq!(drain_gl_errors(|| glow::NO_ERROR), 0);
        assert_eq!(drain_gl_errors(|| glow::OUT_OF_MEMORY), 16);
    }

    #[test]
    fn fbo_size_is_bounded_by_both_limits() {
        let caps = GlCapabilities::from_probe("4.5", |_| false, 8192, [16384, 4096]);
        assert_eq!(caps.max_fbo_size(), (8192, 4096));
    }
}
