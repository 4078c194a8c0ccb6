//! ### English
//! C ABI surface for `coin_offscreen`.
//!
//! All exported symbols are `extern "C"` functions; structs are `#[repr(C)]`.
//! Renderer handles are not thread-safe: use each one from the thread that created it,
//! since the GL contexts it drives are bound to that thread.
//!
//! ### 中文
//! `coin_offscreen` 的 C ABI 接口层。
//!
//! 所有导出符号均为 `extern "C"` 函数；结构体使用 `#[repr(C)]`。
//! 渲染器句柄不是线程安全的：只能在创建它的线程上使用，因为其驱动的 GL 上下文与该线程绑定。
mod abi;
mod callbacks;
mod renderer;

use std::ffi::{CString, c_char, c_void};

use crate::engine::OffscreenRenderer;

/// ### English
/// C ABI version for `coin_offscreen`.
///
/// ### 中文
/// `coin_offscreen` 的 C ABI 版本号。
const COIN_OFFSCREEN_ABI_VERSION: u32 = 1;

/// ### English
/// Backend selectors for `coin_offscreen_renderer_new`.
///
/// ### 中文
/// `coin_offscreen_renderer_new` 的后端选择值。
pub const COIN_OFFSCREEN_BACKEND_CALLBACKS: u32 = 0;
pub const COIN_OFFSCREEN_BACKEND_SOFTWARE: u32 = 1;
pub const COIN_OFFSCREEN_BACKEND_NATIVE: u32 = 2;
pub const COIN_OFFSCREEN_BACKEND_FBO: u32 = 3;

/// ### English
/// GL entry-point lookup supplied by the host (e.g. `glXGetProcAddress`).
///
/// ### 中文
/// 由宿主提供的 GL 函数入口查询（例如 `glXGetProcAddress`）。
pub type CoinOffscreenGlLoader = unsafe extern "C" fn(name: *const c_char) -> *const c_void;

/// ### English
/// Scene traversal callback. Return `false` to abort the render.
///
/// ### 中文
/// 场景遍历回调。返回 `false` 以中止渲染。
pub type CoinOffscreenTraverseFn =
    unsafe extern "C" fn(user_data: *mut c_void, region: *const CoinOffscreenRegion) -> bool;

/// ### English
/// Opaque renderer handle.
///
/// ### 中文
/// 不透明的渲染器句柄。
pub struct CoinOffscreenRenderer {
    renderer: OffscreenRenderer,
    /// ### English
    /// Message of the last failure, kept alive for `coin_offscreen_renderer_last_error`.
    ///
    /// ### 中文
    /// 上一次失败的消息，为 `coin_offscreen_renderer_last_error` 保持存活。
    last_error: Option<CString>,
}

#[repr(C)]
/// ### English
/// Region passed to the traversal callback; the tile origin is bottom-left in GL window
/// coordinates of the full image.
///
/// ### 中文
/// 传给遍历回调的区域；分块原点为完整图像 GL 窗口坐标中的左下角。
pub struct CoinOffscreenRegion {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

#[repr(C)]
/// ### English
/// Borrowed view of the last rendered buffer (top row first, tightly packed).
///
/// `pixels` stays valid until the next render or `coin_offscreen_renderer_free`.
///
/// ### 中文
/// 上一次渲染缓冲区的借用视图（首行为顶部，紧密排列）。
///
/// `pixels` 在下一次渲染或 `coin_offscreen_renderer_free` 之前有效。
pub struct CoinOffscreenImage {
    pub pixels: *const u8,
    pub width: u32,
    pub height: u32,
    /// ### English
    /// 3 for RGB, 4 for RGBA.
    ///
    /// ### 中文
    /// RGB 为 3，RGBA 为 4。
    pub components: u32,
}

impl From<&crate::engine::ViewportRegion> for CoinOffscreenRegion {
    fn from(region: &crate::engine::ViewportRegion) -> Self {
        let image = region.image_size();
        let origin = region.tile_origin();
        let tile = region.tile_size();
        Self {
            image_width: image.width,
            image_height: image.height,
            tile_x: origin.x,
            tile_y: origin.y,
            tile_width: tile.width,
            tile_height: tile.height,
        }
    }
}

/// ### English
/// Adapts a C loader to the `&str` lookup the GL wrappers expect.
///
/// ### 中文
/// 将 C 加载函数适配为 GL 封装所需的 `&str` 查询。
fn gl_lookup(loader: CoinOffscreenGlLoader) -> impl FnMut(&str) -> *const c_void + 'static {
    move |name| match CString::new(name) {
        Ok(name) => unsafe { loader(name.as_ptr()) },
        Err(_) => std::ptr::null(),
    }
}

/// ### English
/// Serializes tests that touch the process-wide callback registry.
///
/// ### 中文
/// 串行化会访问进程级回调注册表的测试。
#[cfg(test)]
static REGISTRY_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
