//! ### English
//! Environment-driven renderer configuration (read once per process, then cached).
//!
//! ### 中文
//! 由环境变量驱动的渲染器配置（每进程读取一次，随后缓存）。

use std::sync::OnceLock;

/// ### English
/// Boolean toggle: prefer the framebuffer-object backend over native contexts.
///
/// ### 中文
/// 布尔开关：是否优先使用 FBO 后端而非原生上下文。
pub const ENV_USE_FBO: &str = "COIN_OFFSCREEN_USE_FBO";

/// ### English
/// Boolean toggle: verbose diagnostics during context setup.
///
/// ### 中文
/// 布尔开关：上下文初始化期间输出详细诊断信息。
pub const ENV_DEBUG: &str = "COIN_DEBUG_OFFSCREEN";

/// ### English
/// Optional cap on the tile edge length used for large renders.
///
/// ### 中文
/// 可选：大尺寸渲染时分块边长的上限。
pub const ENV_MAX_TILESIZE: &str = "COIN_OFFSCREEN_MAX_TILESIZE";

static ENV_CONFIG: OnceLock<RendererConfig> = OnceLock::new();

/// ### English
/// Renderer configuration.
///
/// ### 中文
/// 渲染器配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    /// ### English
    /// Prefer the FBO backend when it is available.
    ///
    /// ### 中文
    /// FBO 后端可用时优先使用。
    pub prefer_fbo: bool,
    /// ### English
    /// Emit context-setup diagnostics at `info` instead of `trace`.
    ///
    /// ### 中文
    /// 以 `info` 而非 `trace` 级别输出上下文初始化诊断。
    pub verbose: bool,
    /// ### English
    /// Upper bound for one tile edge; `None` means the provider limit alone applies.
    ///
    /// ### 中文
    /// 单个分块边长上限；`None` 表示仅受 provider 限制。
    pub max_tile_size: Option<u32>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            prefer_fbo: true,
            verbose: false,
            max_tile_size: None,
        }
    }
}

impl RendererConfig {
    /// ### English
    /// Returns the process-wide configuration read from the environment.
    ///
    /// The environment is consulted on the first call only; later changes are ignored.
    ///
    /// ### 中文
    /// 返回从环境变量读取的进程级配置。
    ///
    /// 仅在首次调用时读取环境变量；之后的修改会被忽略。
    pub fn from_env() -> Self {
        *ENV_CONFIG.get_or_init(|| Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// ### English
    /// Builds a configuration from an arbitrary key lookup. Unset or unparsable values keep
    /// their defaults.
    ///
    /// ### 中文
    /// 通过任意键查找函数构建配置。未设置或无法解析的值保持默认。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let prefer_fbo = lookup(ENV_USE_FBO)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.prefer_fbo);
        let verbose = lookup(ENV_DEBUG)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.verbose);
        let max_tile_size = lookup(ENV_MAX_TILESIZE)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&v| v > 0);

        let config = Self {
            prefer_fbo,
            verbose,
            max_tile_size,
        };
        tracing::debug!(?config, "offscreen renderer configuration");
        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_environment_keeps_defaults() {
        let config = RendererConfig::from_lookup(|_| None);
        assert_eq!(config, RendererConfig::default());
        assert!(config.prefer_fbo);
        assert!(!config.verbose);
    }

    #[test]
    fn toggles_accept_common_spellings() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            (ENV_USE_FBO, "Off"),
            (ENV_DEBUG, " yes "),
            (ENV_MAX_TILESIZE, "512"),
        ]));
        assert!(!config.prefer_fbo);
        assert!(config.verbose);
        assert_eq!(config.max_tile_size, Some(512));
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            (ENV_USE_FBO, "maybe"),
            (ENV_MAX_TILESIZE, "0"),
        ]));
        assert!(config.prefer_fbo);
        assert_eq!(config.max_tile_size, None);
    }
}
