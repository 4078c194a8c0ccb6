use std::rc::Rc;

use crate::engine::config::RendererConfig;
use crate::engine::context::ContextProvider;
use crate::engine::error::RenderError;

/// ### English
/// Providers a renderer may draw with. Nothing is ever created implicitly: an empty set
/// makes every render fail with [`RenderError::NoProvider`].
///
/// ### 中文
/// 渲染器可以使用的 provider 集合。不会隐式创建任何上下文：
/// 空集合会使每次渲染都以 [`RenderError::NoProvider`] 失败。
#[derive(Clone, Default)]
pub struct ProviderSet {
    /// ### English
    /// Framebuffer-object provider on the host context, preferred when valid.
    ///
    /// ### 中文
    /// 宿主上下文上的 FBO provider；有效时优先使用。
    pub fbo: Option<Rc<dyn ContextProvider>>,
    /// ### English
    /// Fallback: native, software, or callback-backed provider.
    ///
    /// ### 中文
    /// 回退项：原生、软件或回调 provider。
    pub native: Option<Rc<dyn ContextProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fbo(mut self, provider: Rc<dyn ContextProvider>) -> Self {
        self.fbo = Some(provider);
        self
    }

    pub fn with_native(mut self, provider: Rc<dyn ContextProvider>) -> Self {
        self.native = Some(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fbo.is_none() && self.native.is_none()
    }

    /// ### English
    /// FBO first (when present, valid and preferred), then native (when present and valid).
    ///
    /// ### 中文
    /// 先选 FBO（存在、有效且被优先时），再选原生（存在且有效时）。
    pub fn select(&self, config: &RendererConfig) -> Result<Rc<dyn ContextProvider>, RenderError> {
        if let Some(fbo) = &self.fbo {
            if config.prefer_fbo && fbo.is_valid() {
                return Ok(fbo.clone());
            }
            setup_event!(
                config.verbose,
                preferred = config.prefer_fbo,
                valid = fbo.is_valid(),
                "skipping fbo provider"
            );
        }
        if let Some(native) = &self.native {
            if native.is_valid() {
                return Ok(native.clone());
            }
            tracing::warn!(backend = %native.kind(), "native provider reports itself unusable");
        }
        tracing::warn!("no usable offscreen context provider configured");
        Err(RenderError::NoProvider)
    }
}
