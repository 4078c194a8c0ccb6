//! Shared helpers for the integration tests.

#![allow(dead_code, reason = "Not every test binary uses every helper.")]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

use coin_offscreen::engine::{
    BackendKind, ContextProvider, ContextState, OffscreenContext, PixelFormat, PixelOrigin,
    ProviderId,
};
use dpi::PhysicalSize;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    });
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create(u32, u32),
    MakeCurrent,
    Clear,
    Traverse,
    ReadPixels,
    RestorePrevious,
    Destroy,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Provider that records every lifecycle call and can be told to fail.
pub struct RecordingProvider {
    id: ProviderId,
    kind: BackendKind,
    log: CallLog,
    pub valid: Cell<bool>,
    pub fail_create: Cell<bool>,
    pub fail_make_current: Cell<bool>,
    pub fail_readback: Cell<bool>,
    live: Cell<usize>,
}

impl RecordingProvider {
    pub fn new(kind: BackendKind, log: CallLog) -> Self {
        Self {
            id: ProviderId::next(),
            kind,
            log,
            valid: Cell::new(true),
            fail_create: Cell::new(false),
            fail_make_current: Cell::new(false),
            fail_readback: Cell::new(false),
            live: Cell::new(0),
        }
    }

    pub fn live_contexts(&self) -> usize {
        self.live.get()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl ContextProvider for RecordingProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn pixel_origin(&self) -> PixelOrigin {
        PixelOrigin::TopLeft
    }

    fn create(&self, size: PhysicalSize<u32>) -> Option<OffscreenContext> {
        self.record(Call::Create(size.width, size.height));
        if self.fail_create.get() {
            return None;
        }
        self.live.set(self.live.get() + 1);
        Some(OffscreenContext::new(self.id, size, ()))
    }

    fn make_current(&self, context: &mut OffscreenContext) -> bool {
        self.record(Call::MakeCurrent);
        if context.backend::<()>(self.id).is_none() || self.fail_make_current.get() {
            return false;
        }
        context.set_state(ContextState::Current);
        true
    }

    fn restore_previous(&self, context: &mut OffscreenContext) {
        self.record(Call::RestorePrevious);
        context.set_state(ContextState::Created);
    }

    fn destroy(&self, context: OffscreenContext) {
        self.record(Call::Destroy);
        if context.into_backend::<()>(self.id).is_ok() {
            self.live.set(self.live.get() - 1);
        }
    }

    fn clear(&self, _context: &mut OffscreenContext, _rgba: [f32; 4]) {
        self.record(Call::Clear);
    }

    fn read_pixels(&self, context: &mut OffscreenContext, format: PixelFormat) -> Option<Vec<u8>> {
        self.record(Call::ReadPixels);
        if self.fail_readback.get() {
            return None;
        }
        let size = context.size();
        Some(vec![0; size.width as usize * size.height as usize * format.components()])
    }
}
