//! ### English
//! Offscreen context providers.
//!
//! A [`ContextProvider`] implements the four-step lifecycle (create, make current, restore
//! previous, destroy) for one rendering backend. Contexts it mints are [`OffscreenContext`]
//! handles: typed, owned by value, and tagged with the minting provider so a handle from one
//! backend is never fed to another.
//!
//! ```text
//! create ──► Created ──make_current──► Current
//!               ▲                         │
//!               └────restore_previous─────┘
//! destroy(ctx) consumes the handle from either state.
//! ```
//!
//! ### 中文
//! 离屏上下文 provider。
//!
//! [`ContextProvider`] 为某一渲染后端实现四步生命周期（创建、设为 current、恢复之前的上下文、销毁）。
//! 其创建的上下文为 [`OffscreenContext`] 句柄：强类型、按值持有，并带有创建者 provider 的标记，
//! 因此某个后端的句柄永远不会被交给另一个后端。

mod callbacks;
mod fbo;
mod gl;
mod native;
mod software;

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dpi::PhysicalSize;

pub use callbacks::{
    CallbackProvider, ContextRegistry, CreateOffscreenFn, DestructFn, MakeCurrentFn,
    OffscreenCallbacks, ReadbackHook, ReinstatePreviousFn,
};
pub use fbo::FboProvider;
pub use gl::{GlCapabilities, HostGlContext, parse_gl_version};
pub use native::{NativeAdapter, SurfmanProvider};
pub use software::{SoftwareFramebuffer, SoftwareProvider};

/// ### English
/// Which family of backend a provider belongs to.
///
/// ### 中文
/// provider 所属的后端类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// ### English
    /// Framebuffer objects on an already-current host context.
    ///
    /// ### 中文
    /// 基于已 current 的宿主上下文的 framebuffer 对象。
    Fbo,
    /// ### English
    /// Native platform contexts (GLX/EGL/WGL/CGL).
    ///
    /// ### 中文
    /// 原生平台上下文（GLX/EGL/WGL/CGL）。
    Native,
    /// ### English
    /// OSMesa-style CPU framebuffers.
    ///
    /// ### 中文
    /// OSMesa 风格的 CPU framebuffer。
    Software,
    /// ### English
    /// Application-supplied callback table.
    ///
    /// ### 中文
    /// 应用提供的回调表。
    Callback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fbo => "fbo",
            Self::Native => "native",
            Self::Software => "software",
            Self::Callback => "callback",
        })
    }
}

/// ### English
/// Row order of a backend's raw pixel readback.
///
/// ### 中文
/// 后端原始像素读回的行顺序。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOrigin {
    /// ### English
    /// First row in memory is the top of the image.
    ///
    /// ### 中文
    /// 内存中的第一行是图像顶部。
    TopLeft,
    /// ### English
    /// First row in memory is the bottom of the image (GL convention, "Y up").
    ///
    /// ### 中文
    /// 内存中的第一行是图像底部（GL 约定，“Y 向上”）。
    BottomLeft,
}

/// ### English
/// Pixel layout of a readback buffer: one byte per channel, tightly packed.
///
/// ### 中文
/// 读回缓冲区的像素布局：每通道一字节，紧密排列。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub const fn components(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    pub(crate) const fn gl_format(self) -> u32 {
        match self {
            Self::Rgb => glow::RGB,
            Self::Rgba => glow::RGBA,
        }
    }
}

/// ### English
/// Lifecycle state of a live offscreen context.
///
/// ### 中文
/// 存活离屏上下文的生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Current,
}

/// ### English
/// Process-unique identity of a provider instance.
///
/// ### 中文
/// provider 实例的进程内唯一标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

impl ProviderId {
    /// ### English
    /// Allocates a fresh id. Every provider calls this once at construction.
    ///
    /// ### 中文
    /// 分配一个新的 id。每个 provider 在构造时调用一次。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// ### English
/// Handle to one offscreen context.
///
/// The backend payload is private to the minting provider; nothing else inspects it.
/// Handles are not `Send`: GL contexts are bound to the thread that uses them.
///
/// ### 中文
/// 单个离屏上下文的句柄。
///
/// 后端负载只属于创建它的 provider，其它代码不会访问。
/// 句柄不是 `Send`：GL 上下文与使用它的线程绑定。
pub struct OffscreenContext {
    owner: ProviderId,
    size: PhysicalSize<u32>,
    state: ContextState,
    backend: Box<dyn Any>,
}

impl OffscreenContext {
    /// ### English
    /// Wraps a freshly created backend payload. The handle starts in [`ContextState::Created`].
    ///
    /// ### 中文
    /// 封装刚创建的后端负载。句柄初始状态为 [`ContextState::Created`]。
    pub fn new(owner: ProviderId, size: PhysicalSize<u32>, backend: impl Any) -> Self {
        Self {
            owner,
            size,
            state: ContextState::Created,
            backend: Box::new(backend),
        }
    }

    pub fn owner(&self) -> ProviderId {
        self.owner
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_current(&self) -> bool {
        self.state == ContextState::Current
    }

    /// ### English
    /// Records a state transition. Providers call this after the backend call succeeded.
    ///
    /// ### 中文
    /// 记录状态转换。provider 在后端调用成功后调用。
    pub fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    /// ### English
    /// Borrows the payload if this handle was minted by `provider` with payload type `T`.
    ///
    /// ### 中文
    /// 若该句柄由 `provider` 以负载类型 `T` 创建，则借用该负载。
    pub fn backend<T: Any>(&self, provider: ProviderId) -> Option<&T> {
        if self.owner != provider {
            return None;
        }
        self.backend.downcast_ref()
    }

    pub fn backend_mut<T: Any>(&mut self, provider: ProviderId) -> Option<&mut T> {
        if self.owner != provider {
            return None;
        }
        self.backend.downcast_mut()
    }

    /// ### English
    /// Consumes the handle and returns its payload; hands the handle back on mismatch.
    ///
    /// ### 中文
    /// 消耗句柄并返回其负载；类型或 provider 不匹配时原样返回句柄。
    pub fn into_backend<T: Any>(self, provider: ProviderId) -> Result<T, Self> {
        if self.owner != provider || !self.backend.is::<T>() {
            return Err(self);
        }
        let Self {
            owner,
            size,
            state,
            backend,
        } = self;
        backend.downcast::<T>().map(|boxed| *boxed).map_err(|backend| Self {
            owner,
            size,
            state,
            backend,
        })
    }
}

impl fmt::Debug for OffscreenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffscreenContext")
            .field("owner", &self.owner)
            .field("size", &self.size)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// ### English
/// One offscreen rendering backend.
///
/// Contract for implementors:
/// - `create` returns `None` on any failure (zero size, exhausted resources, driver refusal)
///   and never panics.
/// - `make_current` returns `false` for handles minted by another provider or on driver
///   errors, and is idempotent for a handle that is already current. On success the
///   handle is marked [`ContextState::Current`].
/// - `restore_previous` is best effort and safe to call repeatedly; afterwards the handle is
///   marked [`ContextState::Created`].
/// - `destroy` releases every backend resource, whether or not the handle was ever current.
///
/// A provider must outlive every context it has minted.
///
/// ### 中文
/// 一个离屏渲染后端。
///
/// 实现者约定：
/// - `create` 在任何失败情况下（零尺寸、资源耗尽、驱动拒绝）返回 `None`，且不会 panic。
/// - `make_current` 对其它 provider 创建的句柄或驱动错误返回 `false`；对已是 current 的句柄幂等。
///   成功后句柄被标记为 [`ContextState::Current`]。
/// - `restore_previous` 为 best-effort，可重复调用；之后句柄被标记为 [`ContextState::Created`]。
/// - `destroy` 释放所有后端资源，无论该句柄是否曾经 current。
///
/// provider 必须比其创建的所有上下文活得更久。
pub trait ContextProvider {
    fn id(&self) -> ProviderId;

    fn kind(&self) -> BackendKind;

    /// ### English
    /// Whether the backend can currently produce contexts (e.g. FBO support was probed).
    ///
    /// ### 中文
    /// 后端当前能否创建上下文（例如已探测到 FBO 支持）。
    fn is_valid(&self) -> bool {
        true
    }

    /// ### English
    /// Largest context the backend can create. Larger requests are rendered in tiles.
    ///
    /// ### 中文
    /// 后端可创建的最大上下文尺寸。更大的请求将分块渲染。
    fn max_size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(u32::MAX, u32::MAX)
    }

    fn pixel_origin(&self) -> PixelOrigin {
        PixelOrigin::BottomLeft
    }

    /// ### English
    /// Whether several contexts may be live and rendered from different threads at once.
    /// Backends returning `false` must be serialized by the caller.
    ///
    /// ### 中文
    /// 是否允许多个上下文同时存活并在不同线程上渲染。返回 `false` 的后端需由调用方串行化。
    fn supports_concurrent_contexts(&self) -> bool {
        false
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext>;

    fn make_current(&self, context: &mut OffscreenContext) -> bool;

    fn restore_previous(&self, context: &mut OffscreenContext);

    fn destroy(&self, context: OffscreenContext);

    /// ### English
    /// Clears the current context to `rgba`. Backends whose traversal clears on its own may
    /// leave this as a no-op.
    ///
    /// ### 中文
    /// 将 current 上下文清除为 `rgba`。若由遍历自行清屏，后端可保持为空操作。
    fn clear(&self, _context: &mut OffscreenContext, _rgba: [f32; 4]) {}

    /// ### English
    /// Reads back the whole context as tightly packed rows in the backend's
    /// [`PixelOrigin`]. The context must be current.
    ///
    /// ### 中文
    /// 以后端的 [`PixelOrigin`] 行序读回整个上下文（紧密排列）。上下文必须为 current。
    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>>;
}

/// ### English
/// `make_current` for the raw result of [`ContextProvider::create`]: a failed creation
/// (`None`) simply yields `false`.
///
/// ### 中文
/// 针对 [`ContextProvider::create`] 原始结果的 `make_current`：创建失败（`None`）直接返回 `false`。
pub fn make_current_if_created(
    provider: &dyn ContextProvider,
    context: Option<&mut OffscreenContext>,
) -> bool {
    context.is_some_and(|context| provider.make_current(context))
}

pub(crate) fn is_valid_size(size: PhysicalSize<u32>) -> bool {
    size.width > 0 && size.height > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_private_to_the_minting_provider() {
        let owner = ProviderId::next();
        let stranger = ProviderId::next();
        let mut ctx = OffscreenContext::new(owner, PhysicalSize::new(4, 4), 17u32);

        assert_eq!(ctx.backend::<u32>(owner), Some(&17));
        assert!(ctx.backend::<u32>(stranger).is_none());
        assert!(ctx.backend::<String>(owner).is_none());
        *ctx.backend_mut::<u32>(owner).unwrap() = 18;

        let ctx = ctx.into_backend::<u32>(stranger).unwrap_err();
        assert_eq!(ctx.into_backend::<u32>(owner).ok(), Some(18));
    }

    #[test]
    fn new_handles_start_created() {
        let ctx = OffscreenContext::new(ProviderId::next(), PhysicalSize::new(1, 2), ());
        assert_eq!(ctx.state(), ContextState::Created);
        assert!(!ctx.is_current());
        assert_eq!(ctx.size(), PhysicalSize::new(1, 2));
    }

    #[test]
    fn format_component_counts() {
        assert_eq!(PixelFormat::Rgb.components(), 3);
        assert_eq!(PixelFormat::Rgba.components(), 4);
        assert_eq!(BackendKind::Fbo.to_string(), "fbo");
    }
}
