/// ### English
/// `coin_offscreen` crate root: offscreen-rendering context management for a scene-graph
/// renderer. Exposes the C ABI via `ffi`; core implementation lives under `engine`.
///
/// ### 中文
/// `coin_offscreen` 的 crate 根：场景图渲染器的离屏渲染上下文管理。
/// 通过 `ffi` 导出 C ABI；核心实现位于 `engine` 模块。
pub mod engine;
mod ffi;

pub use engine::{
    BackendKind, ContextError, ContextProvider, ContextRegistry, OffscreenCallbacks,
    OffscreenContext, OffscreenRenderer, PixelFormat, PixelOrigin, ProviderSet, RenderError,
    RenderedImage, RendererConfig, SceneRenderer, ViewportRegion,
};
