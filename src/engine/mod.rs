//! ### English
//! Engine internals: context providers, the render coordinator, concurrency primitives and
//! stream adapters.
//!
//! ### 中文
//! 引擎内部模块：上下文 provider、渲染协调器、并发原语与流适配器。
pub mod config;
pub mod context;
pub mod error;
pub mod io;
pub mod render;
pub mod sync;

pub use config::RendererConfig;
pub use context::{
    BackendKind, CallbackProvider, ContextProvider, ContextRegistry, ContextState,
    FboProvider, HostGlContext, NativeAdapter, OffscreenCallbacks, OffscreenContext,
    PixelFormat, PixelOrigin, ProviderId, SoftwareFramebuffer, SoftwareProvider,
    SurfmanProvider,
};
pub use error::{ContextError, RenderError};
pub use render::{
    OffscreenRenderer, ProviderSet, RenderedImage, SceneRenderer, ScopedContext, ViewportRegion,
};
