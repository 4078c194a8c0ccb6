//! ### English
//! C ABI bindings for the process-wide offscreen callback table.
//!
//! ### 中文
//! 进程级离屏回调表的 C ABI 绑定。

use crate::engine::{ContextRegistry, OffscreenCallbacks};

#[unsafe(no_mangle)]
/// ### English
/// Registers the four context callbacks. Passing NULL, or a table with all entries NULL,
/// unregisters. Returns `false` (and keeps the previous table) for a partial table.
///
/// Register before starting any render; renderers snapshot the table when they are created.
///
/// ### 中文
/// 注册四个上下文回调。传入 NULL 或全部为 NULL 的表表示取消注册。
/// 对部分填充的表返回 `false`（并保留之前的表）。
///
/// 请在开始任何渲染之前注册；渲染器在创建时会对回调表做快照。
pub unsafe extern "C" fn coin_offscreen_set_callbacks(table: *const OffscreenCallbacks) -> bool {
    let table = if table.is_null() {
        OffscreenCallbacks::EMPTY
    } else {
        unsafe { *table }
    };
    ContextRegistry::global()
        .set_offscreen_callbacks(table)
        .is_ok()
}

#[unsafe(no_mangle)]
/// ### English
/// Copies the registered table into `out`. Returns whether a table is registered; `out` is
/// filled with NULL entries otherwise.
///
/// ### 中文
/// 将已注册的回调表复制到 `out`。返回是否已注册；未注册时 `out` 被填为全 NULL。
pub unsafe extern "C" fn coin_offscreen_get_callbacks(out: *mut OffscreenCallbacks) -> bool {
    let table = ContextRegistry::global().offscreen_callbacks();
    if !out.is_null() {
        unsafe { out.write(table) };
    }
    table.is_complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;

    unsafe extern "C" fn create(_width: u32, _height: u32) -> *mut c_void {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn make_current(_context: *mut c_void) -> bool {
        false
    }

    unsafe extern "C" fn reinstate(_context: *mut c_void) {}

    unsafe extern "C" fn destruct(_context: *mut c_void) {}

    fn table() -> OffscreenCallbacks {
        OffscreenCallbacks {
            create_offscreen: Some(create),
            make_current: Some(make_current),
            reinstate_previous: Some(reinstate),
            destruct: Some(destruct),
        }
    }

    #[test]
    fn register_query_and_unregister() {
        let _registry = super::super::REGISTRY_TEST_LOCK.lock();
        let mut out = table();

        assert!(unsafe { coin_offscreen_set_callbacks(std::ptr::null()) });
        assert!(!unsafe { coin_offscreen_get_callbacks(&mut out) });
        assert!(out.is_empty());

        let registered = table();
        assert!(unsafe { coin_offscreen_set_callbacks(&registered) });
        assert!(unsafe { coin_offscreen_get_callbacks(&mut out) });
        assert!(out.is_complete());

        let partial = OffscreenCallbacks {
            make_current: None,
            ..table()
        };
        assert!(!unsafe { coin_offscreen_set_callbacks(&partial) });
        assert!(unsafe { coin_offscreen_get_callbacks(std::ptr::null_mut()) });

        assert!(unsafe { coin_offscreen_set_callbacks(&OffscreenCallbacks::EMPTY) });
        assert!(!unsafe { coin_offscreen_get_callbacks(&mut out) });
        assert!(out.is_empty());
    }
}
