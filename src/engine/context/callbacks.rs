//! ### English
//! Application-supplied context management through a C callback table.
//!
//! [`OffscreenCallbacks`] is the four-function table non-Rust hosts register; a
//! [`ContextRegistry`] stores it, and [`CallbackProvider`] adapts one consistent snapshot of
//! it to the [`ContextProvider`] trait so the renderer never deals with raw tables.
//!
//! ### 中文
//! 通过 C 回调表由应用提供的上下文管理。
//!
//! [`OffscreenCallbacks`] 是非 Rust 宿主注册的四函数表；[`ContextRegistry`] 负责存储，
//! [`CallbackProvider`] 将其某一时刻的一致快照适配为 [`ContextProvider`] trait，
//! 使渲染器从不直接处理原始回调表。

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr::NonNull;

use dpi::PhysicalSize;
use glow::HasContext as _;
use parking_lot::RwLock;

use super::gl::read_bound_framebuffer;
use super::{
    BackendKind, ContextProvider, ContextState, OffscreenContext, PixelFormat, PixelOrigin,
    ProviderId, is_valid_size,
};
use crate::engine::error::ContextError;

pub type CreateOffscreenFn = unsafe extern "C" fn(width: u32, height: u32) -> *mut c_void;
pub type MakeCurrentFn = unsafe extern "C" fn(context: *mut c_void) -> bool;
pub type ReinstatePreviousFn = unsafe extern "C" fn(context: *mut c_void);
pub type DestructFn = unsafe extern "C" fn(context: *mut c_void);

/// ### English
/// Readback used when the callback contexts are not GL contexts this crate can query.
///
/// ### 中文
/// 当回调上下文不是本 crate 可查询的 GL 上下文时使用的读回函数。
pub type ReadbackHook = Box<dyn Fn(*mut c_void, PhysicalSize<u32>, PixelFormat) -> Option<Vec<u8>>>;

type GlLoader = Box<dyn FnMut(&str) -> *const c_void>;

/// ### English
/// C-compatible table of the four context-management callbacks.
///
/// Either all four entries are set or none is; partial tables are rejected on registration.
///
/// ### 中文
/// 四个上下文管理回调组成的 C 兼容表。
///
/// 要么四项全部设置，要么全部为空；部分填充的表在注册时会被拒绝。
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct OffscreenCallbacks {
    /// ### English
    /// Allocates a context of `width`×`height`; returns NULL on failure.
    ///
    /// ### 中文
    /// 分配 `width`×`height` 的上下文；失败时返回 NULL。
    pub create_offscreen: Option<CreateOffscreenFn>,
    /// ### English
    /// Binds the context to the calling thread; `false` on failure.
    ///
    /// ### 中文
    /// 将上下文绑定到调用线程；失败时返回 `false`。
    pub make_current: Option<MakeCurrentFn>,
    /// ### English
    /// Returns the thread to whatever was current before `make_current`.
    ///
    /// ### 中文
    /// 将线程恢复到 `make_current` 之前的 current 上下文。
    pub reinstate_previous: Option<ReinstatePreviousFn>,
    /// ### English
    /// Releases the context.
    ///
    /// ### 中文
    /// 释放上下文。
    pub destruct: Option<DestructFn>,
}

impl OffscreenCallbacks {
    pub const EMPTY: Self = Self {
        create_offscreen: None,
        make_current: None,
        reinstate_previous: None,
        destruct: None,
    };

    pub fn populated(&self) -> usize {
        [
            self.create_offscreen.is_some(),
            self.make_current.is_some(),
            self.reinstate_previous.is_some(),
            self.destruct.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.populated() == 4
    }

    fn complete(&self) -> Option<CompleteTable> {
        Some(CompleteTable {
            create_offscreen: self.create_offscreen?,
            make_current: self.make_current?,
            reinstate_previous: self.reinstate_previous?,
            destruct: self.destruct?,
        })
    }
}

#[derive(Clone, Copy)]
struct CompleteTable {
    create_offscreen: CreateOffscreenFn,
    make_current: MakeCurrentFn,
    reinstate_previous: ReinstatePreviousFn,
    destruct: DestructFn,
}

/// ### English
/// Holder of the registered callback table.
///
/// The table is replaced as a whole under a write lock, so a render racing a registration
/// sees either the old or the new table, never a mix. Registering before rendering starts is
/// still the expected usage.
///
/// ### 中文
/// 已注册回调表的持有者。
///
/// 回调表在写锁下整体替换，因此与注册并发的渲染只会看到旧表或新表，不会看到混合状态。
/// 预期用法仍然是在渲染开始前完成注册。
pub struct ContextRegistry {
    table: RwLock<OffscreenCallbacks>,
}

static GLOBAL_REGISTRY: ContextRegistry = ContextRegistry::new();

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    pub const fn new() -> Self {
        Self {
            table: RwLock::new(OffscreenCallbacks::EMPTY),
        }
    }

    /// ### English
    /// Process-wide registry backing the C ABI.
    ///
    /// ### 中文
    /// 支撑 C ABI 的进程级注册表。
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// ### English
    /// Replaces the table. An all-empty table unregisters; a partial one is rejected and the
    /// previous table stays in place.
    ///
    /// ### 中文
    /// 替换回调表。全空表表示取消注册；部分填充的表会被拒绝，并保留之前的表。
    pub fn set_offscreen_callbacks(&self, table: OffscreenCallbacks) -> Result<(), ContextError> {
        let populated = table.populated();
        if populated != 0 && populated != 4 {
            tracing::warn!(populated, "rejected partial offscreen callback table");
            return Err(ContextError::PartialCallbackTable { populated });
        }
        *self.table.write() = table;
        tracing::debug!(registered = populated == 4, "offscreen callback table replaced");
        Ok(())
    }

    /// ### English
    /// Copy of the current table (all-empty when nothing is registered).
    ///
    /// ### 中文
    /// 当前回调表的副本（未注册时为全空）。
    pub fn offscreen_callbacks(&self) -> OffscreenCallbacks {
        *self.table.read()
    }

    /// ### English
    /// Provider over a snapshot of the current table; `None` when nothing is registered.
    ///
    /// ### 中文
    /// 基于当前回调表快照的 provider；未注册时返回 `None`。
    pub fn callback_provider(&self) -> Option<CallbackProvider> {
        CallbackProvider::new(self.offscreen_callbacks()).ok()
    }
}

struct CallbackHandle {
    raw: NonNull<c_void>,
}

/// ### English
/// [`ContextProvider`] that forwards the lifecycle to a callback table.
///
/// ### 中文
/// 将生命周期转发给回调表的 [`ContextProvider`]。
pub struct CallbackProvider {
    id: ProviderId,
    table: CompleteTable,
    loader: RefCell<Option<GlLoader>>,
    glow: RefCell<Option<glow::Context>>,
    readback: Option<ReadbackHook>,
    live: Cell<usize>,
}

impl CallbackProvider {
    /// ### English
    /// Fails unless all four callbacks are set.
    ///
    /// ### 中文
    /// 仅当四个回调全部设置时才会成功。
    pub fn new(table: OffscreenCallbacks) -> Result<Self, ContextError> {
        let populated = table.populated();
        let table = table
            .complete()
            .ok_or(ContextError::PartialCallbackTable { populated })?;
        Ok(Self {
            id: ProviderId::next(),
            table,
            loader: RefCell::new(None),
            glow: RefCell::new(None),
            readback: None,
            live: Cell::new(0),
        })
    }

    /// ### English
    /// Enables GL readback/clear: entry points are loaded through `loader` the first time a
    /// context becomes current.
    ///
    /// # Safety
    /// `loader` must return valid GL entry points for the contexts the callbacks create.
    ///
    /// ### 中文
    /// 启用 GL 读回/清屏：首次有上下文变为 current 时通过 `loader` 加载函数入口。
    ///
    /// # Safety
    /// `loader` 必须为回调所创建的上下文返回有效的 GL 函数入口。
    pub unsafe fn with_gl_loader(
        self,
        loader: impl FnMut(&str) -> *const c_void + 'static,
    ) -> Self {
        *self.loader.borrow_mut() = Some(Box::new(loader));
        self
    }

    /// ### English
    /// Readback used instead of GL; receives the raw handle the create callback returned.
    ///
    /// ### 中文
    /// 代替 GL 的读回函数；参数为 create 回调返回的原始句柄。
    pub fn with_readback(mut self, hook: ReadbackHook) -> Self {
        self.readback = Some(hook);
        self
    }

    pub fn live_contexts(&self) -> usize {
        self.live.get()
    }

    fn ensure_glow(&self) {
        if self.glow.borrow().is_some() {
            return;
        }
        let mut loader = self.loader.borrow_mut();
        if let Some(loader) = loader.as_mut() {
            let glow = unsafe { glow::Context::from_loader_function(loader) };
            *self.glow.borrow_mut() = Some(glow);
        }
    }
}

impl ContextProvider for CallbackProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Callback
    }

    fn pixel_origin(&self) -> PixelOrigin {
        PixelOrigin::BottomLeft
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext> {
        if !is_valid_size(size) {
            return None;
        }
        let raw = unsafe { (self.table.create_offscreen)(size.width, size.height) };
        let raw = NonNull::new(raw)?;
        self.live.set(self.live.get() + 1);
        Some(OffscreenContext::new(self.id, size, CallbackHandle { raw }))
    }

    fn make_current(&self, context: &mut OffscreenContext) -> bool {
        let Some(handle) = context.backend::<CallbackHandle>(self.id) else {
            return false;
        };
        if context.is_current() {
            return true;
        }
        if !unsafe { (self.table.make_current)(handle.raw.as_ptr()) } {
            return false;
        }
        self.ensure_glow();
        context.set_state(ContextState::Current);
        true
    }

    fn restore_previous(&self, context: &mut OffscreenContext) {
        let Some(handle) = context.backend::<CallbackHandle>(self.id) else {
            return;
        };
        if !context.is_current() {
            return;
        }
        unsafe { (self.table.reinstate_previous)(handle.raw.as_ptr()) };
        context.set_state(ContextState::Created);
    }

    fn destroy(&self, mut context: OffscreenContext) {
        self.restore_previous(&mut context);
        let Ok(handle) = context.into_backend::<CallbackHandle>(self.id) else {
            tracing::warn!("callback provider asked to destroy a foreign context");
            return;
        };
        unsafe { (self.table.destruct)(handle.raw.as_ptr()) };
        self.live.set(self.live.get().saturating_sub(1));
    }

    fn clear(&self, context: &mut OffscreenContext, rgba: [f32; 4]) {
        if !context.is_current() {
            return;
        }
        if let Some(glow) = self.glow.borrow().as_ref() {
            unsafe {
                glow.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
                glow.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            }
        }
    }

    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>> {
        if !context.is_current() {
            return None;
        }
        let size = context.size();
        let handle = context.backend::<CallbackHandle>(self.id)?;
        if let Some(hook) = &self.readback {
            let pixels = hook(handle.raw.as_ptr(), size, format)?;
            let expected = size.width as usize * size.height as usize * format.components();
            return (pixels.len() == expected).then_some(pixels);
        }
        let glow = self.glow.borrow();
        read_bound_framebuffer(glow.as_ref()?, size.width, size.height, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATED: AtomicUsize = AtomicUsize::new(0);
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn create(width: u32, height: u32) -> *mut c_void {
        CREATED.fetch_add(1, Ordering::SeqCst);
        Box::into_raw(Box::new((width, height))).cast()
    }

    unsafe extern "C" fn refuse(_width: u32, _height: u32) -> *mut c_void {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn make_current(_context: *mut c_void) -> bool {
        true
    }

    unsafe extern "C" fn reinstate(_context: *mut c_void) {}

    unsafe extern "C" fn destruct(context: *mut c_void) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
        drop(unsafe { Box::from_raw(context.cast::<(u32, u32)>()) });
    }

    fn table() -> OffscreenCallbacks {
        OffscreenCallbacks {
            create_offscreen: Some(create),
            make_current: Some(make_current),
            reinstate_previous: Some(reinstate),
            destruct: Some(destruct),
        }
    }

    #[test]
    fn partial_tables_are_rejected_and_keep_previous() {
        let registry = ContextRegistry::new();
        registry.set_offscreen_callbacks(table()).unwrap();

        let partial = OffscreenCallbacks {
            destruct: None,
            ..table()
        };
        let err = registry.set_offscreen_callbacks(partial).unwrap_err();
        assert!(matches!(err, ContextError::PartialCallbackTable { populated: 3 }));
        assert!(registry.offscreen_callbacks().is_complete());

        registry
            .set_offscreen_callbacks(OffscreenCallbacks::EMPTY)
            .unwrap();
        assert!(registry.offscreen_callbacks().is_empty());
        assert!(registry.callback_provider().is_none());
    }

    #[test]
    fn create_destroy_pairs_reach_the_callbacks() {
        let provider = CallbackProvider::new(table()).unwrap();
        let created = CREATED.load(Ordering::SeqCst);
        let destroyed = DESTROYED.load(Ordering::SeqCst);

        let context = provider.create(PhysicalSize::new(64, 64)).unwrap();
        assert_eq!(provider.live_contexts(), 1);
        provider.destroy(context);

        assert_eq!(provider.live_contexts(), 0);
        assert!(CREATED.load(Ordering::SeqCst) > created);
        assert!(DESTROYED.load(Ordering::SeqCst) > destroyed);
    }

    #[test]
    fn null_create_yields_no_context() {
        let provider = CallbackProvider::new(OffscreenCallbacks {
            create_offscreen: Some(refuse),
            ..table()
        })
        .unwrap();
        let mut context = provider.create(PhysicalSize::new(8, 8));
        assert!(context.is_none());
        assert!(!super::super::make_current_if_created(&provider, context.as_mut()));
    }

    #[test]
    fn readback_hook_needs_a_current_context() {
        let hook: ReadbackHook = Box::new(|_, size, format| {
            Some(vec![7; size.width as usize * size.height as usize * format.components()])
        });
        let provider = CallbackProvider::new(table()).unwrap().with_readback(hook);
        let mut context = provider.create(PhysicalSize::new(2, 3)).unwrap();
        assert!(provider.read_pixels(&mut context, PixelFormat::Rgb).is_none());
        assert!(provider.make_current(&mut context));
        let pixels = provider.read_pixels(&mut context, PixelFormat::Rgb).unwrap();
        assert_eq!(pixels.len(), 18);
        provider.restore_previous(&mut context);
        provider.restore_previous(&mut context);
        provider.destroy(context);
    }
}
