use dpi::PhysicalSize;

use crate::engine::context::{ContextProvider, OffscreenContext, PixelFormat};

/// ### English
/// A created offscreen context that is restored and destroyed when the guard drops.
///
/// Restore runs only if the context is current at that point, so a failed `make_current`
/// ends with just `destroy`.
///
/// ### 中文
/// 已创建的离屏上下文；guard 析构时自动恢复并销毁。
///
/// 仅当此时上下文为 current 才会执行恢复，因此 `make_current` 失败时只会执行 `destroy`。
pub struct ScopedContext<'a> {
    provider: &'a dyn ContextProvider,
    /// ### English
    /// Always `Some` until the guard drops.
    ///
    /// ### 中文
    /// 在 guard 析构之前始终为 `Some`。
    context: Option<OffscreenContext>,
}

impl<'a> ScopedContext<'a> {
    pub fn create(provider: &'a dyn ContextProvider, size: PhysicalSize<u32>) -> Option<Self> {
        let context = provider.create(size)?;
        Some(Self {
            provider,
            context: Some(context),
        })
    }

    pub fn make_current(&mut self) -> bool {
        let provider = self.provider;
        self.context
            .as_mut()
            .is_some_and(|context| provider.make_current(context))
    }

    /// ### English
    /// The guarded context; `None` only while the guard is being dropped.
    ///
    /// ### 中文
    /// 受保护的上下文；仅在 guard 析构期间为 `None`。
    pub fn context(&self) -> Option<&OffscreenContext> {
        self.context.as_ref()
    }

    pub fn clear(&mut self, rgba: [f32; 4]) {
        if let Some(context) = self.context.as_mut() {
            self.provider.clear(context, rgba);
        }
    }

    pub fn read_pixels(&mut self, format: PixelFormat) -> Option<Vec<u8>> {
        let context = self.context.as_mut()?;
        self.provider.read_pixels(context, format)
    }

    pub fn provider(&self) -> &'a dyn ContextProvider {
        self.provider
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        if context.is_current() {
            self.provider.restore_previous(&mut context);
        }
        self.provider.destroy(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::SoftwareProvider;

    #[test]
    fn drop_releases_current_context() {
        let provider = SoftwareProvider::new();
        {
            let mut scoped = ScopedContext::create(&provider, PhysicalSize::new(4, 4)).unwrap();
            assert!(scoped.make_current());
            assert!(scoped.context().is_some_and(OffscreenContext::is_current));
            assert!(SoftwareProvider::with_current_framebuffer(|_| ()).is_some());
            assert_eq!(scoped.read_pixels(PixelFormat::Rgba).map(|p| p.len()), Some(64));
        }
        assert_eq!(provider.live_contexts(), 0);
        assert!(SoftwareProvider::with_current_framebuffer(|_| ()).is_none());
    }

    #[test]
    fn drop_without_make_current_only_destroys() {
        let provider = SoftwareProvider::new();
        let scoped = ScopedContext::create(&provider, PhysicalSize::new(2, 2)).unwrap();
        assert!(scoped.context().is_some_and(|context| !context.is_current()));
        assert_eq!(provider.live_contexts(), 1);
        drop(scoped);
        assert_eq!(provider.live_contexts(), 0);
    }
}
