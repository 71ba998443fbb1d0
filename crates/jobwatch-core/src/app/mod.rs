//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて Job のライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **Client / ClientBuilder**: gateway と可視化レジストリのワイヤリング
//! - **Job**: 1 つの execution の snapshot、sync / cancel / confirm
//! - **JobList**: filter、集計、一括操作、ページング取得
//! - **Poller**: `Job::watch` によるバックグラウンド更新

pub mod builder;
pub mod job;
pub mod job_list;
pub mod poller;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Client, ClientBuilder};
pub use self::job::Job;
pub use self::job_list::{DEFAULT_BULK_WORKERS, JobFilter, JobList};
pub use self::poller::{
    DEFAULT_WATCH_INTERVAL, INITIALIZING_PLACEHOLDER, MIN_WATCH_INTERVAL, NO_ACTIVE_JOB,
    NO_DATA_YET, WatchError, WatchHandle, WatchOptions,
};
