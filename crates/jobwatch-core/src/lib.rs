//! jobwatch-core
//!
//! Tracking and polling of remote tool executions on the DeepOrigin Platform.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, DTO snapshot, errors, table rows）
//! - **ports**: 抽象化レイヤー（ExecutionGateway, Renderer, DisplaySink, Clock）
//! - **app**: アプリケーションロジック（Client, Job, JobList, Poller）
//! - **render**: TextRenderer とツール別の可視化（VizRegistry）
//! - **impls**: 実装（HTTP / in-memory gateway, display）
//! - **config**: 接続設定（環境変数から読み込み）
//!
//! # 使用例
//! ```ignore
//! let config = ClientConfig::from_env()?;
//! let client = Client::new(Arc::new(HttpExecutionGateway::new(&config)?));
//!
//! let job = client.job("exec-123").await?;
//! let handle = job.watch(
//!     Arc::new(TextRenderer::new()),
//!     Arc::new(TerminalDisplay::stdout()),
//!     WatchOptions::default(),
//! )?;
//! ```

pub mod domain;
pub mod ports;
pub mod app;
pub mod render;
pub mod impls;
pub mod config;

pub use self::app::{Client, Job, JobFilter, JobList, WatchHandle, WatchOptions};
pub use self::config::ClientConfig;
pub use self::domain::{ExecutionId, ExecutionStatus, JobError};
