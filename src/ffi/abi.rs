#[unsafe(no_mangle)]
/// ### English
/// Returns the C ABI version.
///
/// ### 中文
/// 返回 C ABI 版本号。
pub extern "C" fn coin_offscreen_abi_version() -> u32 {
    super::COIN_OFFSCREEN_ABI_VERSION
}
