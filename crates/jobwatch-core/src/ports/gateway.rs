//! ExecutionGateway port - リモート execution の正本（source of truth）
//!
//! Gateway は execution の状態遷移の権威です。
//! Job 側は Gateway から取得した DTO をキャッシュするだけで、遷移の妥当性を
//! 独自に判断しません（例外: confirm は Quoted のときだけ呼ぶ）。
//!
//! # 実装
//! - `impls::HttpExecutionGateway`: DeepOrigin Platform の REST API
//! - `impls::InMemoryExecutionGateway`: テスト / デモ用

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{ExecutionDto, ExecutionId};

/// Errors reported by a gateway implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Network hiccups and server-side errors may clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::Timeout => true,
            GatewayError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// One page request for the paged execution listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Zero-based page to start from.
    pub page: u32,
    pub page_size: u32,
    /// e.g. `"completedAt? desc"`.
    pub order: Option<String>,
    /// Server-side filter expression (JSON encoded).
    pub filter: Option<String>,
}

impl ListQuery {
    pub const DEFAULT_PAGE_SIZE: u32 = 1000;

    pub fn new() -> Self {
        Self {
            page: 0,
            page_size: Self::DEFAULT_PAGE_SIZE,
            order: None,
            filter: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of the listing. `count` is the total number of matching records,
/// `data` holds at most `page_size` of them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecutionPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub data: Vec<ExecutionDto>,
}

/// ExecutionGateway はリモートの execution を操作する
///
/// # Thread Safety
/// - `Send + Sync` を要求（Poller と一括操作から同時に呼ばれる）
/// - 実装側が接続プールの排他を担当し、core 側はロックしない
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn get(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError>;

    async fn list(&self, query: &ListQuery) -> Result<ExecutionPage, GatewayError>;

    async fn cancel(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError>;

    async fn confirm(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError>;
}
