//! DisplaySink port - 描画結果の出力先
//!
//! notebook のセル、ターミナル、テスト用の記録などを差し替えられるようにします。
//! Poller は `open` で得たハンドルを `update` し続け、終了時に `release` します。

use crate::domain::DisplayId;

pub trait DisplaySink: Send + Sync {
    /// One-shot output that will never be updated.
    fn show(&self, artifact: &str);

    /// Publish an updatable display and return its handle.
    fn open(&self, initial: &str) -> DisplayId;

    fn update(&self, id: &DisplayId, artifact: &str);

    /// The handle is not used again after this call.
    fn release(&self, id: DisplayId);
}
