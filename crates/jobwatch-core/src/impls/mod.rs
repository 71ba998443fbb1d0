//! Impls - ports の実装
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **HttpExecutionGateway**: DeepOrigin Platform の REST API（本番用）
//! - **InMemoryExecutionGateway**: テスト / デモ用の正本
//! - **TerminalDisplay / RecordingDisplay**: DisplaySink

pub mod http_gateway;
pub mod inmem_gateway;
pub mod display;

// 主要な型を再エクスポート
pub use self::http_gateway::HttpExecutionGateway;
pub use self::inmem_gateway::{GatewayCalls, InMemoryExecutionGateway};
pub use self::display::{DisplayEvent, RecordingDisplay, TerminalDisplay};
