//! ### English
//! Error types surfaced by context setup and offscreen rendering.
//!
//! Provider operations report failure through `Option`/`bool`; the coordinator turns those
//! into [`RenderError`] so callers get one explicit failure value per render request.
//!
//! ### 中文
//! 上下文初始化与离屏渲染对外暴露的错误类型。
//!
//! Provider 操作通过 `Option`/`bool` 报告失败；协调器将其转换为 [`RenderError`]，
//! 使调用方每次渲染请求都能得到一个明确的失败值。

use crate::engine::context::BackendKind;

/// ### English
/// Errors raised while registering or constructing context providers.
///
/// ### 中文
/// 注册或构建上下文 provider 时产生的错误。
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("offscreen callback table is partially populated ({populated} of 4 entries set)")]
    PartialCallbackTable { populated: usize },

    #[error("surfman {operation} failed: {detail}")]
    Surfman {
        operation: &'static str,
        detail: String,
    },

    #[error("failed to load GL entry point `{symbol}`")]
    GlLoader { symbol: &'static str },

    #[error("framebuffer objects are not supported by GL {major}.{minor}")]
    FboUnsupported { major: u32, minor: u32 },
}

impl ContextError {
    pub(crate) fn surfman(operation: &'static str, err: impl std::fmt::Debug) -> Self {
        Self::Surfman {
            operation,
            detail: format!("{err:?}"),
        }
    }
}

/// ### English
/// Failure of one offscreen render request. A failed render never yields an image.
///
/// ### 中文
/// 单次离屏渲染请求的失败原因。失败的渲染永远不会产生图像。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("invalid viewport size {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error("no offscreen context provider configured; register one before rendering")]
    NoProvider,

    #[error("{backend} backend failed to create a {width}x{height} offscreen context")]
    CreateFailed {
        backend: BackendKind,
        width: u32,
        height: u32,
    },

    #[error("cannot allocate a {width}x{height} output buffer")]
    OutOfMemory { width: u32, height: u32 },

    #[error("{backend} backend could not make the offscreen context current")]
    MakeCurrentFailed { backend: BackendKind },

    #[error("scene traversal reported failure")]
    TraversalFailed,

    #[error("{backend} backend failed to read back the framebuffer")]
    ReadbackFailed { backend: BackendKind },
}
