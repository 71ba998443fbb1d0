//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! Job / JobList / Poller はここの trait だけに依存し、HTTP やディスプレイの
//! 実装の詳細を知りません。
//!
//! # 設計原則
//! - Execution Gateway が source of truth（正本）
//! - Renderer は成果物を作るだけ、DisplaySink は出力するだけ
//! - 時刻は Clock 経由（テストで固定できるように）

pub mod gateway;
pub mod renderer;
pub mod display;
pub mod clock;

// 主要な trait を再エクスポート
pub use self::gateway::{ExecutionGateway, ExecutionPage, GatewayError, ListQuery};
pub use self::renderer::{RenderError, Renderer};
pub use self::display::DisplaySink;
pub use self::clock::{Clock, FixedClock, SystemClock};
