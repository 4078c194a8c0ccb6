//! ### English
//! Offscreen render coordinator.
//!
//! [`OffscreenRenderer`] drives one request through the provider lifecycle:
//! select backend → create → make current → clear + traverse (per tile) → read back →
//! restore previous → destroy. The last two steps run on every exit path once a context
//! exists, via [`ScopedContext`].
//!
//! ### 中文
//! 离屏渲染协调器。
//!
//! [`OffscreenRenderer`] 让一次请求走完 provider 生命周期：
//! 选择后端 → 创建 → 设为 current → 清屏 + 遍历（逐块）→ 读回 → 恢复之前的上下文 → 销毁。
//! 一旦上下文存在，最后两步会经由 [`ScopedContext`] 在所有退出路径上执行。

/// ### English
/// Context-setup diagnostics: `info` in verbose mode, `trace` otherwise.
///
/// ### 中文
/// 上下文初始化诊断：verbose 模式下为 `info`，否则为 `trace`。
macro_rules! setup_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

mod rendered;
mod scoped;
mod select;
mod tile;

use dpi::PhysicalSize;

pub use rendered::RenderedImage;
pub use scoped::ScopedContext;
pub use select::ProviderSet;
pub use tile::ViewportRegion;

use crate::engine::config::RendererConfig;
use crate::engine::context::{
    BackendKind, ContextProvider, PixelFormat, PixelOrigin, is_valid_size,
};
use crate::engine::error::RenderError;
use rendered::flip_rows;
use tile::{TilePlan, blit_tile};

/// ### English
/// Scene traversal invoked once per tile while the offscreen context is current.
///
/// Returning `false` aborts the render with [`RenderError::TraversalFailed`].
///
/// ### 中文
/// 在离屏上下文为 current 期间，每个分块调用一次的场景遍历。
///
/// 返回 `false` 会以 [`RenderError::TraversalFailed`] 中止渲染。
pub trait SceneRenderer {
    fn render(&mut self, region: &ViewportRegion) -> bool;
}

impl<F> SceneRenderer for F
where
    F: FnMut(&ViewportRegion) -> bool,
{
    fn render(&mut self, region: &ViewportRegion) -> bool {
        self(region)
    }
}

/// ### English
/// Renders scenes into memory through explicitly supplied providers.
///
/// ### 中文
/// 通过显式提供的 provider 将场景渲染到内存。
pub struct OffscreenRenderer {
    config: RendererConfig,
    providers: ProviderSet,
    viewport: PhysicalSize<u32>,
    format: PixelFormat,
    background: [f32; 4],
    buffer: Option<RenderedImage>,
    last_backend: Option<BackendKind>,
}

impl OffscreenRenderer {
    pub fn new(config: RendererConfig, providers: ProviderSet) -> Self {
        Self {
            config,
            providers,
            viewport: PhysicalSize::new(0, 0),
            format: PixelFormat::Rgb,
            background: [0.0, 0.0, 0.0, 0.0],
            buffer: None,
            last_backend: None,
        }
    }

    /// ### English
    /// Renderer configured from `COIN_OFFSCREEN_*` / `COIN_DEBUG_OFFSCREEN`.
    ///
    /// ### 中文
    /// 使用 `COIN_OFFSCREEN_*` / `COIN_DEBUG_OFFSCREEN` 配置的渲染器。
    pub fn from_env(providers: ProviderSet) -> Self {
        Self::new(RendererConfig::from_env(), providers)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn set_providers(&mut self, providers: ProviderSet) {
        self.providers = providers;
    }

    pub fn set_viewport(&mut self, size: PhysicalSize<u32>) {
        self.viewport = size;
    }

    pub fn viewport(&self) -> PhysicalSize<u32> {
        self.viewport
    }

    pub fn set_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// ### English
    /// Clear colour, RGBA in `0.0..=1.0`.
    ///
    /// ### 中文
    /// 清屏颜色，RGBA，取值范围 `0.0..=1.0`。
    pub fn set_background(&mut self, rgba: [f32; 4]) {
        self.background = rgba;
    }

    pub fn background(&self) -> [f32; 4] {
        self.background
    }

    /// ### English
    /// Result of the last render; `None` if it failed or nothing was rendered yet.
    ///
    /// ### 中文
    /// 上一次渲染的结果；若失败或尚未渲染则为 `None`。
    pub fn buffer(&self) -> Option<&RenderedImage> {
        self.buffer.as_ref()
    }

    pub fn take_buffer(&mut self) -> Option<RenderedImage> {
        self.buffer.take()
    }

    /// ### English
    /// Backend the last render attempt selected, even if that attempt failed later.
    ///
    /// ### 中文
    /// 上一次渲染尝试所选择的后端（即使该次尝试随后失败）。
    pub fn last_backend(&self) -> Option<BackendKind> {
        self.last_backend
    }

    pub fn render(&mut self, scene: &mut dyn SceneRenderer) -> Result<&RenderedImage, RenderError> {
        self.buffer = None;
        self.last_backend = None;

        let viewport = self.viewport;
        if !is_valid_size(viewport) {
            return Err(RenderError::InvalidViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }

        let provider = self.providers.select(&self.config)?;
        self.last_backend = Some(provider.kind());

        let image = self.render_with(provider.as_ref(), scene)?;
        let image: &RenderedImage = self.buffer.insert(image);
        Ok(image)
    }

    fn render_with(
        &self,
        provider: &dyn ContextProvider,
        scene: &mut dyn SceneRenderer,
    ) -> Result<RenderedImage, RenderError> {
        let backend = provider.kind();
        let viewport = self.viewport;
        let plan = TilePlan::new(viewport, self.tile_limit(provider));
        let context_size = plan.context_size();

        setup_event!(
            self.config.verbose,
            %backend,
            width = viewport.width,
            height = viewport.height,
            tiles = plan.len(),
            "starting offscreen render"
        );

        let format = self.format;
        let components = format.components();
        let Some(mut output) = alloc_output(viewport, components) else {
            tracing::warn!(
                width = viewport.width,
                height = viewport.height,
                "offscreen output buffer allocation failed"
            );
            return Err(RenderError::OutOfMemory {
                width: viewport.width,
                height: viewport.height,
            });
        };

        let Some(mut scoped) = ScopedContext::create(provider, context_size) else {
            tracing::warn!(
                %backend,
                width = context_size.width,
                height = context_size.height,
                "offscreen context creation failed"
            );
            return Err(RenderError::CreateFailed {
                backend,
                width: context_size.width,
                height: context_size.height,
            });
        };
        if !scoped.make_current() {
            tracing::warn!(%backend, "could not make offscreen context current");
            return Err(RenderError::MakeCurrentFailed { backend });
        }

        let context_stride = context_size.width as usize * components;

        for region in plan.regions() {
            scoped.clear(self.background);
            if !scene.render(&region) {
                return Err(RenderError::TraversalFailed);
            }
            let Some(mut pixels) = scoped
                .read_pixels(format)
                .filter(|pixels| pixels.len() == context_stride * context_size.height as usize)
            else {
                tracing::warn!(%backend, "offscreen readback failed");
                return Err(RenderError::ReadbackFailed { backend });
            };
            if provider.pixel_origin() == PixelOrigin::BottomLeft {
                flip_rows(&mut pixels, context_stride);
            }
            blit_tile(&mut output, &region, &pixels, context_size, components);
        }
        drop(scoped);

        RenderedImage::from_raw(viewport, format, output, PixelOrigin::TopLeft)
            .ok_or(RenderError::ReadbackFailed { backend })
    }

    fn tile_limit(&self, provider: &dyn ContextProvider) -> PhysicalSize<u32> {
        let limit = provider.max_size();
        match self.config.max_tile_size {
            Some(cap) => PhysicalSize::new(limit.width.min(cap), limit.height.min(cap)),
            None => limit,
        }
    }
}

/// ### English
/// Zeroed output buffer for the whole image, or `None` if it cannot be sized or allocated.
///
/// ### 中文
/// 整幅图像的清零输出缓冲区；无法计算大小或分配失败时为 `None`。
fn alloc_output(size: PhysicalSize<u32>, components: usize) -> Option<Vec<u8>> {
    let len = (size.width as usize)
        .checked_mul(size.height as usize)?
        .checked_mul(components)?;
    let mut output = Vec::new();
    output.try_reserve_exact(len).ok()?;
    output.resize(len, 0);
    Some(output)
}
