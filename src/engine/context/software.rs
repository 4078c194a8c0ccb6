//! ### English
//! OSMesa-style software backend: contexts are plain CPU framebuffers.
//!
//! Like OSMesa, the "current" buffer is a per-thread global that the traversal draws into
//! (see [`SoftwareProvider::with_current_framebuffer`]), rows are stored bottom-up by default,
//! and there is no real previous context to return to, so `restore_previous` does nothing.
//!
//! ### 中文
//! OSMesa 风格的软件后端：上下文就是普通的 CPU framebuffer。
//!
//! 与 OSMesa 一样，“current” 缓冲区是每线程全局状态，遍历向其绘制
//!（见 [`SoftwareProvider::with_current_framebuffer`]）；默认按自下而上存储行；
//! 不存在真正的“之前的上下文”，因此 `restore_previous` 不做任何事。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use dpi::PhysicalSize;

use super::{
    BackendKind, ContextProvider, ContextState, OffscreenContext, PixelFormat, PixelOrigin,
    ProviderId, is_valid_size,
};

thread_local! {
    /// ### English
    /// Framebuffer made current on this thread by the software backend.
    ///
    /// ### 中文
    /// 软件后端在本线程上设为 current 的 framebuffer。
    static CURRENT_FRAMEBUFFER: RefCell<Option<Rc<RefCell<SoftwareFramebuffer>>>> =
        const { RefCell::new(None) };
}

/// ### English
/// RGBA8 framebuffer addressed in GL window coordinates (`y = 0` is the bottom row).
///
/// ### 中文
/// 以 GL 窗口坐标寻址的 RGBA8 framebuffer（`y = 0` 为最底行）。
#[derive(Debug)]
pub struct SoftwareFramebuffer {
    width: u32,
    height: u32,
    /// ### English
    /// Memory row order: `true` stores the bottom row first (OSMesa's `Y_UP` default).
    ///
    /// ### 中文
    /// 内存行顺序：`true` 表示先存储最底行（OSMesa `Y_UP` 默认值）。
    y_up: bool,
    pixels: Vec<u8>,
}

impl SoftwareFramebuffer {
    fn try_new(size: PhysicalSize<u32>, y_up: bool) -> Option<Self> {
        let len = (size.width as usize)
            .checked_mul(size.height as usize)?
            .checked_mul(4)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).ok()?;
        pixels.resize(len, 0);
        Some(Self {
            width: size.width,
            height: size.height,
            y_up,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = if self.y_up { y } else { self.height - 1 - y };
        Some((row as usize * self.width as usize + x as usize) * 4)
    }

    pub fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// ### English
    /// Writes one pixel; out-of-range coordinates are clipped (returns `false`).
    ///
    /// ### 中文
    /// 写入一个像素；越界坐标会被裁剪（返回 `false`）。
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        let Some(offset) = self.offset(x, y) else {
            return false;
        };
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
        true
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let offset = self.offset(x, y)?;
        let mut rgba = [0u8; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(rgba)
    }

    /// ### English
    /// Fills the rectangle with lower-left corner `(x, y)`, clipped to the buffer.
    ///
    /// ### 中文
    /// 填充左下角为 `(x, y)` 的矩形，超出部分会被裁剪。
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                self.set_pixel(px, py, rgba);
            }
        }
    }

    /// ### English
    /// Raw RGBA bytes in memory row order.
    ///
    /// ### 中文
    /// 按内存行顺序排列的原始 RGBA 字节。
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }
}

struct SoftwareTarget {
    buffer: Rc<RefCell<SoftwareFramebuffer>>,
}

/// ### English
/// Software context provider.
///
/// ### 中文
/// 软件上下文 provider。
pub struct SoftwareProvider {
    id: ProviderId,
    y_up: bool,
    max_size: PhysicalSize<u32>,
    live: Cell<usize>,
}

impl Default for SoftwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareProvider {
    /// ### English
    /// Default limits mirror common OSMesa builds (4096 pixels per edge).
    ///
    /// ### 中文
    /// 默认上限参照常见 OSMesa 构建（每边 4096 像素）。
    pub fn new() -> Self {
        Self {
            id: ProviderId::next(),
            y_up: true,
            max_size: PhysicalSize::new(4096, 4096),
            live: Cell::new(0),
        }
    }

    /// ### English
    /// Pixel-store flag: `false` stores rows top-down.
    ///
    /// ### 中文
    /// 像素存储标志：`false` 表示自上而下存储行。
    pub fn with_y_up(mut self, y_up: bool) -> Self {
        self.y_up = y_up;
        self
    }

    pub fn with_max_size(mut self, max_size: PhysicalSize<u32>) -> Self {
        self.max_size = max_size;
        self
    }

    /// ### English
    /// Number of contexts created and not yet destroyed.
    ///
    /// ### 中文
    /// 已创建但尚未销毁的上下文数量。
    pub fn live_contexts(&self) -> usize {
        self.live.get()
    }

    /// ### English
    /// Runs `f` on the framebuffer current on this thread, if any. This is how a traversal
    /// draws into a software context. A nested call from inside `f` returns `None`.
    ///
    /// ### 中文
    /// 若本线程存在 current framebuffer，则对其执行 `f`。遍历正是通过它向软件上下文绘制。
    /// 在 `f` 内部嵌套调用时返回 `None`。
    pub fn with_current_framebuffer<R>(f: impl FnOnce(&mut SoftwareFramebuffer) -> R) -> Option<R> {
        let buffer = CURRENT_FRAMEBUFFER.with(|current| current.borrow().clone())?;
        let mut buffer = buffer.try_borrow_mut().ok()?;
        Some(f(&mut buffer))
    }
}

impl ContextProvider for SoftwareProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn max_size(&self) -> PhysicalSize<u32> {
        self.max_size
    }

    fn pixel_origin(&self) -> PixelOrigin {
        if self.y_up {
            PixelOrigin::BottomLeft
        } else {
            PixelOrigin::TopLeft
        }
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext> {
        if !is_valid_size(size)
            || size.width > self.max_size.width
            || size.height > self.max_size.height
        {
            return None;
        }
        let buffer = SoftwareFramebuffer::try_new(size, self.y_up)?;
        self.live.set(self.live.get() + 1);
        Some(OffscreenContext::new(
            self.id,
            size,
            SoftwareTarget {
                buffer: Rc::new(RefCell::new(buffer)),
            },
        ))
    }

    fn make_current(&self, context: &mut OffscreenContext) -> bool {
        let Some(target) = context.backend::<SoftwareTarget>(self.id) else {
            return false;
        };
        let buffer = target.buffer.clone();
        CURRENT_FRAMEBUFFER.with(|current| *current.borrow_mut() = Some(buffer));
        context.set_state(ContextState::Current);
        true
    }

    fn restore_previous(&self, context: &mut OffscreenContext) {
        if context.owner() == self.id {
            context.set_state(ContextState::Created);
        }
    }

    fn destroy(&self, context: OffscreenContext) {
        let Ok(target) = context.into_backend::<SoftwareTarget>(self.id) else {
            tracing::warn!("software provider asked to destroy a foreign context");
            return;
        };
        CURRENT_FRAMEBUFFER.with(|current| {
            let mut current = current.borrow_mut();
            if current
                .as_ref()
                .is_some_and(|buffer| Rc::ptr_eq(buffer, &target.buffer))
            {
                *current = None;
            }
        });
        self.live.set(self.live.get().saturating_sub(1));
    }

    fn clear(&self, context: &mut OffscreenContext, rgba: [f32; 4]) {
        let Some(target) = context.backend::<SoftwareTarget>(self.id) else {
            return;
        };
        target.buffer.borrow_mut().clear(rgba.map(unit_to_byte));
    }

    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>> {
        if !context.is_current() {
            return None;
        }
        let target = context.backend::<SoftwareTarget>(self.id)?;
        let buffer = target.buffer.borrow();
        let pixels = match format {
            PixelFormat::Rgba => buffer.as_bytes().to_vec(),
            PixelFormat::Rgb => buffer
                .as_bytes()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        Some(pixels)
    }
}

fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_destroy_without_make_current() {
        let provider = SoftwareProvider::new();
        for (w, h) in [(1, 1), (64, 64), (3, 700)] {
            let context = provider.create(PhysicalSize::new(w, h)).unwrap();
            assert_eq!(provider.live_contexts(), 1);
            provider.destroy(context);
            assert_eq!(provider.live_contexts(), 0);
        }
    }

    #[test]
    fn nested_framebuffer_access_yields_none() {
        let provider = SoftwareProvider::new();
        let mut context = provider.create(PhysicalSize::new(2, 2)).unwrap();
        assert!(provider.make_current(&mut context));

        let nested = SoftwareProvider::with_current_framebuffer(|_| {
            SoftwareProvider::with_current_framebuffer(|fb| fb.width())
        });
        assert_eq!(nested, Some(None));

        provider.destroy(context);
    }

    #[test]
    fn invalid_sizes_are_refused() {
        let provider = SoftwareProvider::new().with_max_size(PhysicalSize::new(16, 16));
        assert!(provider.create(PhysicalSize::new(0, 4)).is_none());
        assert!(provider.create(PhysicalSize::new(17, 4)).is_none());
        assert_eq!(provider.live_contexts(), 0);
    }

    #[test]
    fn current_framebuffer_follows_make_current_and_destroy() {
        let provider = SoftwareProvider::new();
        let mut context = provider.create(PhysicalSize::new(2, 2)).unwrap();
        assert!(SoftwareProvider::with_current_framebuffer(|_| ()).is_none());

        assert!(provider.make_current(&mut context));
        assert!(provider.make_current(&mut context));
        assert!(context.is_current());
        let width = SoftwareProvider::with_current_framebuffer(|fb| fb.width());
        assert_eq!(width, Some(2));

        provider.restore_previous(&mut context);
        provider.restore_previous(&mut context);
        assert_eq!(context.state(), ContextState::Created);

        provider.destroy(context);
        assert!(SoftwareProvider::with_current_framebuffer(|_| ()).is_none());
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let a = SoftwareProvider::new();
        let b = SoftwareProvider::new();
        let mut context = a.create(PhysicalSize::new(1, 1)).unwrap();
        assert!(!b.make_current(&mut context));
        assert!(b.read_pixels(&mut context, PixelFormat::Rgba).is_none());
        a.destroy(context);
    }

    #[test]
    fn y_up_flag_controls_memory_row_order() {
        for (y_up, first_row) in [(true, [255, 0, 0, 255]), (false, [0, 0, 0, 0])] {
            let provider = SoftwareProvider::new().with_y_up(y_up);
            let mut context = provider.create(PhysicalSize::new(1, 2)).unwrap();
            assert!(provider.make_current(&mut context));
            SoftwareProvider::with_current_framebuffer(|fb| fb.set_pixel(0, 0, [255, 0, 0, 255]));

            let pixels = provider.read_pixels(&mut context, PixelFormat::Rgba).unwrap();
            assert_eq!(&pixels[..4], &first_row);
            provider.destroy(context);
        }
    }
}
