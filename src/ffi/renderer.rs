//! ### English
//! C ABI bindings for the offscreen renderer (create/render/read/free).
//!
//! ### 中文
//! 离屏渲染器的 C ABI 绑定（create/render/read/free）。

use std::ffi::{CString, c_char, c_void};
use std::rc::Rc;

use dpi::PhysicalSize;

use super::{
    COIN_OFFSCREEN_BACKEND_CALLBACKS, COIN_OFFSCREEN_BACKEND_FBO, COIN_OFFSCREEN_BACKEND_NATIVE,
    COIN_OFFSCREEN_BACKEND_SOFTWARE, CoinOffscreenGlLoader, CoinOffscreenImage,
    CoinOffscreenRegion, CoinOffscreenRenderer, CoinOffscreenTraverseFn, gl_lookup,
};
use crate::engine::{
    ContextError, ContextProvider, ContextRegistry, FboProvider, HostGlContext, NativeAdapter,
    OffscreenRenderer, PixelFormat, ProviderSet, SoftwareProvider, SurfmanProvider,
    ViewportRegion,
};

/// ### English
/// Builds the provider set for a backend selector.
///
/// ### 中文
/// 根据后端选择值构建 provider 集合。
fn providers_for(
    backend: u32,
    gl_loader: Option<CoinOffscreenGlLoader>,
) -> Result<ProviderSet, ContextError> {
    let set = ProviderSet::new();
    let set = match backend {
        COIN_OFFSCREEN_BACKEND_CALLBACKS => {
            let Some(provider) = ContextRegistry::global().callback_provider() else {
                return Ok(set);
            };
            let provider = match gl_loader {
                Some(loader) => unsafe { provider.with_gl_loader(gl_lookup(loader)) },
                None => provider,
            };
            set.with_native(Rc::new(provider))
        }
        COIN_OFFSCREEN_BACKEND_SOFTWARE => set.with_native(Rc::new(SoftwareProvider::new())),
        COIN_OFFSCREEN_BACKEND_NATIVE => {
            set.with_native(Rc::new(SurfmanProvider::new(NativeAdapter::Hardware)?))
        }
        COIN_OFFSCREEN_BACKEND_FBO => {
            let Some(loader) = gl_loader else {
                return Err(ContextError::GlLoader { symbol: "glGetString" });
            };
            let host = unsafe { HostGlContext::from_loader(gl_lookup(loader))? };
            let fbo: Rc<dyn ContextProvider> = Rc::new(FboProvider::new(host));
            set.with_fbo(fbo)
        }
        _ => set,
    };
    Ok(set)
}

#[unsafe(no_mangle)]
/// ### English
/// Creates a renderer for `width`×`height` pixels using one of the
/// `COIN_OFFSCREEN_BACKEND_*` selectors. Configuration is read from the environment.
///
/// - `CALLBACKS` snapshots the table registered with `coin_offscreen_set_callbacks`;
///   `gl_loader` (optional) enables GL readback from those contexts.
/// - `FBO` requires `gl_loader` and a host GL context current on the calling thread.
///
/// Returns NULL when the backend cannot be set up. A renderer whose backend has nothing
/// registered is still created; its renders fail with a "no provider" error.
///
/// ### 中文
/// 使用某个 `COIN_OFFSCREEN_BACKEND_*` 选择值创建 `width`×`height` 像素的渲染器。
/// 配置从环境变量读取。
///
/// - `CALLBACKS` 对 `coin_offscreen_set_callbacks` 注册的回调表做快照；
///   `gl_loader`（可选）用于从这些上下文进行 GL 读回。
/// - `FBO` 需要 `gl_loader`，且调用线程上必须已有 current 的宿主 GL 上下文。
///
/// 后端无法初始化时返回 NULL。若后端没有任何注册项，渲染器仍会被创建，但其渲染会以“无 provider”错误失败。
pub unsafe extern "C" fn coin_offscreen_renderer_new(
    backend: u32,
    width: u32,
    height: u32,
    gl_loader: Option<CoinOffscreenGlLoader>,
) -> *mut CoinOffscreenRenderer {
    let providers = match providers_for(backend, gl_loader) {
        Ok(providers) => providers,
        Err(err) => {
            tracing::warn!(backend, %err, "offscreen renderer setup failed");
            return std::ptr::null_mut();
        }
    };

    let mut renderer = OffscreenRenderer::from_env(providers);
    renderer.set_viewport(PhysicalSize::new(width, height));
    Box::into_raw(Box::new(CoinOffscreenRenderer {
        renderer,
        last_error: None,
    }))
}

#[unsafe(no_mangle)]
/// ### English
/// Sets the clear colour (RGBA in `0.0..=1.0`) and whether the buffer carries alpha.
///
/// ### 中文
/// 设置清屏颜色（RGBA，范围 `0.0..=1.0`）以及缓冲区是否带 alpha 通道。
pub unsafe extern "C" fn coin_offscreen_renderer_configure(
    renderer: *mut CoinOffscreenRenderer,
    red: f32,
    green: f32,
    blue: f32,
    alpha: f32,
    with_alpha: bool,
) {
    let Some(renderer) = (unsafe { renderer.as_mut() }) else {
        return;
    };
    renderer.renderer.set_background([red, green, blue, alpha]);
    renderer.renderer.set_format(if with_alpha {
        PixelFormat::Rgba
    } else {
        PixelFormat::Rgb
    });
}

#[unsafe(no_mangle)]
/// ### English
/// Renders once, calling `traverse` for every tile while the offscreen context is current.
/// Returns `false` on failure; `coin_offscreen_renderer_last_error` then describes why.
///
/// ### 中文
/// 执行一次渲染，在离屏上下文为 current 期间对每个分块调用 `traverse`。
/// 失败时返回 `false`，之后可通过 `coin_offscreen_renderer_last_error` 获取原因。
pub unsafe extern "C" fn coin_offscreen_renderer_render(
    renderer: *mut CoinOffscreenRenderer,
    traverse: Option<CoinOffscreenTraverseFn>,
    user_data: *mut c_void,
) -> bool {
    let Some(renderer) = (unsafe { renderer.as_mut() }) else {
        return false;
    };
    let mut scene = |region: &ViewportRegion| {
        let Some(traverse) = traverse else {
            return true;
        };
        let region = CoinOffscreenRegion::from(region);
        unsafe { traverse(user_data, &region) }
    };

    match renderer.renderer.render(&mut scene) {
        Ok(_) => {
            renderer.last_error = None;
            true
        }
        Err(err) => {
            renderer.last_error = CString::new(err.to_string()).ok();
            false
        }
    }
}

#[unsafe(no_mangle)]
/// ### English
/// Describes the last successful render's buffer in `out`. Returns `false` (leaving `out`
/// untouched) when the last render failed or none ran yet.
///
/// ### 中文
/// 将上一次成功渲染的缓冲区描述写入 `out`。若上一次渲染失败或尚未渲染，返回 `false`
/// 且不修改 `out`。
pub unsafe extern "C" fn coin_offscreen_renderer_buffer(
    renderer: *const CoinOffscreenRenderer,
    out: *mut CoinOffscreenImage,
) -> bool {
    let Some(renderer) = (unsafe { renderer.as_ref() }) else {
        return false;
    };
    let Some(image) = renderer.renderer.buffer() else {
        return false;
    };
    if out.is_null() {
        return false;
    }
    unsafe {
        out.write(CoinOffscreenImage {
            pixels: image.pixels().as_ptr(),
            width: image.width(),
            height: image.height(),
            components: image.format().components() as u32,
        });
    }
    true
}

#[unsafe(no_mangle)]
/// ### English
/// NUL-terminated message of the last render failure, or NULL. Valid until the next render
/// or free.
///
/// ### 中文
/// 上一次渲染失败的 NUL 结尾消息，没有则为 NULL。在下一次渲染或释放之前有效。
pub unsafe extern "C" fn coin_offscreen_renderer_last_error(
    renderer: *const CoinOffscreenRenderer,
) -> *const c_char {
    unsafe { renderer.as_ref() }
        .and_then(|renderer| renderer.last_error.as_ref())
        .map_or(std::ptr::null(), |message| message.as_ptr())
}

#[unsafe(no_mangle)]
/// ### English
/// Destroys a renderer created by `coin_offscreen_renderer_new`.
///
/// ### 中文
/// 销毁由 `coin_offscreen_renderer_new` 创建的渲染器。
pub unsafe extern "C" fn coin_offscreen_renderer_free(renderer: *mut CoinOffscreenRenderer) {
    if renderer.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(renderer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    use super::super::REGISTRY_TEST_LOCK;
    use super::super::callbacks::coin_offscreen_set_callbacks;

    unsafe extern "C" fn count_tiles(
        user_data: *mut c_void,
        region: *const CoinOffscreenRegion,
    ) -> bool {
        let tiles = unsafe { &mut *user_data.cast::<Vec<(u32, u32)>>() };
        let region = unsafe { &*region };
        tiles.push((region.image_width, region.image_height));
        true
    }

    unsafe extern "C" fn abort_traversal(
        _user_data: *mut c_void,
        _region: *const CoinOffscreenRegion,
    ) -> bool {
        false
    }

    fn last_error(renderer: *const CoinOffscreenRenderer) -> Option<String> {
        let message = unsafe { coin_offscreen_renderer_last_error(renderer) };
        if message.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned())
    }

    fn buffer(renderer: *const CoinOffscreenRenderer) -> Option<CoinOffscreenImage> {
        let mut out = CoinOffscreenImage {
            pixels: std::ptr::null(),
            width: 0,
            height: 0,
            components: 0,
        };
        unsafe { coin_offscreen_renderer_buffer(renderer, &mut out) }.then_some(out)
    }

    #[test]
    fn software_backend_renders_into_a_readable_buffer() {
        let renderer =
            unsafe { coin_offscreen_renderer_new(COIN_OFFSCREEN_BACKEND_SOFTWARE, 3, 2, None) };
        assert!(!renderer.is_null());
        unsafe { coin_offscreen_renderer_configure(renderer, 0.0, 0.0, 1.0, 1.0, true) };

        let mut tiles: Vec<(u32, u32)> = Vec::new();
        let rendered = unsafe {
            coin_offscreen_renderer_render(
                renderer,
                Some(count_tiles),
                (&mut tiles as *mut Vec<(u32, u32)>).cast(),
            )
        };
        assert!(rendered);
        assert_eq!(tiles, vec![(3, 2)]);
        assert!(last_error(renderer).is_none());

        let image = buffer(renderer).unwrap();
        assert_eq!((image.width, image.height, image.components), (3, 2, 4));
        let pixels = unsafe { std::slice::from_raw_parts(image.pixels, 3 * 2 * 4) };
        assert_eq!(pixels, &[0u8, 0, 255, 255].repeat(6)[..]);

        unsafe { coin_offscreen_renderer_free(renderer) };
    }

    #[test]
    fn failed_render_drops_the_buffer_and_reports_why() {
        let renderer =
            unsafe { coin_offscreen_renderer_new(COIN_OFFSCREEN_BACKEND_SOFTWARE, 4, 4, None) };
        assert!(unsafe { coin_offscreen_renderer_render(renderer, None, std::ptr::null_mut()) });
        assert!(buffer(renderer).is_some());

        let rendered = unsafe {
            coin_offscreen_renderer_render(renderer, Some(abort_traversal), std::ptr::null_mut())
        };
        assert!(!rendered);
        assert!(buffer(renderer).is_none());
        assert_eq!(last_error(renderer).as_deref(), Some("scene traversal reported failure"));

        assert!(unsafe { coin_offscreen_renderer_render(renderer, None, std::ptr::null_mut()) });
        assert!(last_error(renderer).is_none());

        unsafe { coin_offscreen_renderer_free(renderer) };
    }

    #[test]
    fn callback_backend_without_registration_fails_to_render() {
        let _registry = REGISTRY_TEST_LOCK.lock();
        assert!(unsafe { coin_offscreen_set_callbacks(std::ptr::null()) });

        let renderer =
            unsafe { coin_offscreen_renderer_new(COIN_OFFSCREEN_BACKEND_CALLBACKS, 8, 8, None) };
        assert!(!renderer.is_null());
        assert!(!unsafe { coin_offscreen_renderer_render(renderer, None, std::ptr::null_mut()) });
        assert!(buffer(renderer).is_none());
        let message = last_error(renderer).unwrap();
        assert!(message.starts_with("no offscreen context provider"));

        unsafe { coin_offscreen_renderer_free(renderer) };
    }

    #[test]
    fn fbo_backend_requires_a_loader() {
        let renderer =
            unsafe { coin_offscreen_renderer_new(COIN_OFFSCREEN_BACKEND_FBO, 8, 8, None) };
        assert!(renderer.is_null());
    }

    #[test]
    fn null_handles_are_tolerated() {
        let renderer: *mut CoinOffscreenRenderer = std::ptr::null_mut();
        assert!(!unsafe { coin_offscreen_renderer_render(renderer, None, std::ptr::null_mut()) });
        assert!(buffer(renderer).is_none());
        assert!(last_error(renderer).is_none());
        unsafe {
            coin_offscreen_renderer_configure(renderer, 1.0, 1.0, 1.0, 1.0, false);
            coin_offscreen_renderer_free(renderer);
        }
    }

    #[test]
    fn zero_sized_renderer_reports_invalid_viewport() {
        let renderer =
            unsafe { coin_offscreen_renderer_new(COIN_OFFSCREEN_BACKEND_SOFTWARE, 0, 8, None) };
        assert!(!unsafe { coin_offscreen_renderer_render(renderer, None, std::ptr::null_mut()) });
        assert_eq!(last_error(renderer).as_deref(), Some("invalid viewport size 0x8"));
        unsafe { coin_offscreen_renderer_free(renderer) };
    }
}
