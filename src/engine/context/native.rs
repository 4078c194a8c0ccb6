//! ### English
//! Native platform contexts through surfman (GLX/EGL on Unix, WGL on Windows, CGL on macOS).
//!
//! Each offscreen context is a full GL context with a generic surface of the requested size.
//! The provider keeps the live surfman contexts in a table so it can return the thread to
//! whichever of its contexts was current before (`restore_previous`).
//!
//! ### 中文
//! 通过 surfman 提供的原生平台上下文（Unix 上为 GLX/EGL，Windows 上为 WGL，macOS 上为 CGL）。
//!
//! 每个离屏上下文都是带有指定尺寸 generic surface 的完整 GL 上下文。
//! provider 将存活的 surfman 上下文保存在表中，以便把线程恢复到之前 current 的那个上下文（`restore_previous`）。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use dpi::PhysicalSize;
use euclid::default::Size2D;
use glow::HasContext as _;
use surfman::{
    Connection, Context, ContextAttributeFlags, ContextAttributes, ContextDescriptor, Device,
    GLVersion, SurfaceAccess, SurfaceType,
};

use super::gl::read_bound_framebuffer;
use super::{
    BackendKind, ContextProvider, ContextState, OffscreenContext, PixelFormat, PixelOrigin,
    ProviderId, is_valid_size,
};
use crate::engine::error::ContextError;

thread_local! {
    /// ### English
    /// Per-thread record of which native context is current, to avoid redundant
    /// `make_context_current` calls and to know what to restore.
    ///
    /// ### 中文
    /// 每线程记录当前 current 的原生上下文，用于避免重复的 `make_context_current` 调用，并确定需要恢复的对象。
    static CURRENT_NATIVE: Cell<Option<(ProviderId, u64)>> = const { Cell::new(None) };
}

/// ### English
/// Which adapter surfman should open.
///
/// ### 中文
/// surfman 需要打开的 adapter 类型。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NativeAdapter {
    #[default]
    Hardware,
    /// ### English
    /// CPU rasterizer (e.g. Mesa llvmpipe); useful on headless machines.
    ///
    /// ### 中文
    /// CPU 光栅化器（如 Mesa llvmpipe）；适用于无显示环境。
    Software,
}

struct NativeEntry {
    context: Context,
    glow: Option<glow::Context>,
}

/// ### English
/// Payload of an [`OffscreenContext`] minted by [`SurfmanProvider`].
///
/// ### 中文
/// [`SurfmanProvider`] 创建的 [`OffscreenContext`] 的负载。
struct NativeHandle {
    key: u64,
    /// ### English
    /// Thread's current native context before `make_current`; `Some` only while current.
    ///
    /// ### 中文
    /// `make_current` 之前线程的 current 原生上下文；仅在 current 期间为 `Some`。
    previous: Option<Option<(ProviderId, u64)>>,
}

/// ### English
/// Context provider backed by native platform GL contexts.
///
/// ### 中文
/// 基于原生平台 GL 上下文的 provider。
pub struct SurfmanProvider {
    id: ProviderId,
    device: RefCell<Device>,
    descriptor: ContextDescriptor,
    contexts: RefCell<HashMap<u64, NativeEntry>>,
    next_key: Cell<u64>,
}

impl SurfmanProvider {
    /// ### English
    /// Opens a display connection and device. Must be called on the rendering thread.
    ///
    /// ### 中文
    /// 打开显示连接与设备。必须在渲染线程上调用。
    pub fn new(adapter: NativeAdapter) -> Result<Self, ContextError> {
        let connection =
            Connection::new().map_err(|err| ContextError::surfman("Connection::new", err))?;
        let adapter = match adapter {
            NativeAdapter::Hardware => connection.create_adapter(),
            NativeAdapter::Software => connection.create_software_adapter(),
        }
        .map_err(|err| ContextError::surfman("create_adapter", err))?;
        let device = connection
            .create_device(&adapter)
            .map_err(|err| ContextError::surfman("create_device", err))?;

        let attributes = ContextAttributes {
            version: GLVersion::new(3, 0),
            flags: ContextAttributeFlags::ALPHA
                | ContextAttributeFlags::DEPTH
                | ContextAttributeFlags::STENCIL,
        };
        let descriptor = device
            .create_context_descriptor(&attributes)
            .map_err(|err| ContextError::surfman("create_context_descriptor", err))?;

        Ok(Self {
            id: ProviderId::next(),
            device: RefCell::new(device),
            descriptor,
            contexts: RefCell::new(HashMap::new()),
            next_key: Cell::new(1),
        })
    }

    /// ### English
    /// Number of native contexts created and not yet destroyed.
    ///
    /// ### 中文
    /// 已创建但尚未销毁的原生上下文数量。
    pub fn live_contexts(&self) -> usize {
        self.contexts.borrow().len()
    }

    fn bind(&self, key: u64) -> bool {
        if CURRENT_NATIVE.with(Cell::get) == Some((self.id, key)) {
            return true;
        }

        let device = self.device.borrow();
        let mut contexts = self.contexts.borrow_mut();
        let Some(entry) = contexts.get_mut(&key) else {
            return false;
        };
        if let Err(err) = device.make_context_current(&entry.context) {
            tracing::warn!(?err, "native make_context_current failed");
            return false;
        }

        if entry.glow.is_none() {
            let context = &entry.context;
            let glow = unsafe {
                glow::Context::from_loader_function(|name| device.get_proc_address(context, name))
            };
            entry.glow = Some(glow);
        }

        let framebuffer = match device.context_surface_info(&entry.context) {
            Ok(Some(info)) => info.framebuffer_object,
            _ => None,
        };
        if let Some(glow) = &entry.glow {
            unsafe { glow.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) };
        }

        CURRENT_NATIVE.with(|current| current.set(Some((self.id, key))));
        true
    }

    fn unbind(&self) {
        if let Err(err) = self.device.borrow().make_no_context_current() {
            tracing::warn!(?err, "native make_no_context_current failed");
        }
        CURRENT_NATIVE.with(|current| current.set(None));
    }

    fn release(&self, mut entry: NativeEntry) {
        let mut device = self.device.borrow_mut();
        if let Err(err) = device.destroy_context(&mut entry.context) {
            tracing::warn!(?err, "native destroy_context failed");
        }
    }
}

impl ContextProvider for SurfmanProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn pixel_origin(&self) -> PixelOrigin {
        PixelOrigin::BottomLeft
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext> {
        if !is_valid_size(size) || size.width > i32::MAX as u32 || size.height > i32::MAX as u32 {
            return None;
        }

        let mut device = self.device.borrow_mut();
        let mut context = match device.create_context(&self.descriptor, None) {
            Ok(context) => context,
            Err(err) => {
                tracing::warn!(?err, "native create_context failed");
                return None;
            }
        };

        let surface_type = SurfaceType::Generic {
            size: Size2D::new(size.width as i32, size.height as i32),
        };
        let surface = match device.create_surface(&context, SurfaceAccess::GPUOnly, surface_type) {
            Ok(surface) => surface,
            Err(err) => {
                tracing::warn!(?err, "native create_surface failed");
                let _ = device.destroy_context(&mut context);
                return None;
            }
        };
        if let Err((err, mut surface)) = device.bind_surface_to_context(&mut context, surface) {
            tracing::warn!(?err, "native bind_surface_to_context failed");
            let _ = device.destroy_surface(&mut context, &mut surface);
            let _ = device.destroy_context(&mut context);
            return None;
        }
        drop(device);

        let key = self.next_key.get();
        self.next_key.set(key.wrapping_add(1));
        self.contexts.borrow_mut().insert(
            key,
            NativeEntry {
                context,
                glow: None,
            },
        );

        Some(OffscreenContext::new(
            self.id,
            size,
            NativeHandle {
                key,
                previous: None,
            },
        ))
    }

    fn make_current(&self, context: &mut OffscreenContext) -> bool {
        let Some(handle) = context.backend_mut::<NativeHandle>(self.id) else {
            return false;
        };
        let previous = CURRENT_NATIVE.with(Cell::get);
        if !self.bind(handle.key) {
            return false;
        }
        if handle.previous.is_none() {
            handle.previous = Some(previous);
        }
        context.set_state(ContextState::Current);
        true
    }

    fn restore_previous(&self, context: &mut OffscreenContext) {
        let Some(handle) = context.backend_mut::<NativeHandle>(self.id) else {
            return;
        };
        let Some(previous) = handle.previous.take() else {
            return;
        };
        match previous {
            Some((owner, key)) if owner == self.id && self.contexts.borrow().contains_key(&key) => {
                if !self.bind(key) {
                    self.unbind();
                }
            }
            Some((owner, _)) if owner != self.id => {
                tracing::trace!("previous native context belongs to another provider");
                self.unbind();
            }
            _ => self.unbind(),
        }
        context.set_state(ContextState::Created);
    }

    fn destroy(&self, mut context: OffscreenContext) {
        if context.is_current() {
            self.restore_previous(&mut context);
        }
        let Ok(handle) = context.into_backend::<NativeHandle>(self.id) else {
            tracing::warn!("native provider asked to destroy a foreign context");
            return;
        };

        if CURRENT_NATIVE.with(Cell::get) == Some((self.id, handle.key)) {
            self.unbind();
        }
        let entry = self.contexts.borrow_mut().remove(&handle.key);
        if let Some(entry) = entry {
            self.release(entry);
        }
    }

    fn clear(&self, context: &mut OffscreenContext, rgba: [f32; 4]) {
        if !context.is_current() {
            return;
        }
        let Some(handle) = context.backend::<NativeHandle>(self.id) else {
            return;
        };
        let contexts = self.contexts.borrow();
        if let Some(glow) = contexts
            .get(&handle.key)
            .and_then(|entry| entry.glow.as_ref())
        {
            unsafe {
                glow.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
                glow.clear(
                    glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT,
                );
            }
        }
    }

    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>> {
        if !context.is_current() {
            return None;
        }
        let size = context.size();
        let handle = context.backend::<NativeHandle>(self.id)?;
        let contexts = self.contexts.borrow();
        let glow = contexts.get(&handle.key)?.glow.as_ref()?;
        read_bound_framebuffer(glow, size.width, size.height, format)
    }
}

impl Drop for SurfmanProvider {
    /// ### English
    /// surfman panics on contexts dropped without `destroy_context`; release leftovers.
    ///
    /// ### 中文
    /// surfman 在未调用 `destroy_context` 就 drop 上下文时会 panic；此处释放残留的上下文。
    fn drop(&mut self) {
        let leftovers: Vec<NativeEntry> = self
            .contexts
            .borrow_mut()
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        if leftovers.is_empty() {
            return;
        }
        tracing::warn!(count = leftovers.len(), "native provider dropped with live contexts");
        if CURRENT_NATIVE
            .with(Cell::get)
            .is_some_and(|(owner, _)| owner == self.id)
        {
            self.unbind();
        }
        for entry in leftovers {
            self.release(entry);
        }
    }
}
