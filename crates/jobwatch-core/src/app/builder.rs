//! Client / ClientBuilder - 接続とツール可視化のワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバルな singleton の代わりに、明示的なハンドルを渡す
//!
//! エントリポイントが `Client` を一度だけ組み立て、Job / JobList に
//! 参照（clone は Arc のコピー）として渡します。

use std::fmt;
use std::sync::Arc;

use crate::domain::{ExecutionDto, ExecutionId, JobError};
use crate::ports::{ExecutionGateway, ListQuery};
use crate::render::{JobViz, RegistryError, VizRegistry};

use super::job::Job;
use super::job_list::JobList;

/// Shared handle to the execution gateway plus the tool visualization registry.
#[derive(Clone)]
pub struct Client {
    gateway: Arc<dyn ExecutionGateway>,
    viz: Arc<VizRegistry>,
}

impl Client {
    /// Client with the built-in tool visualizations.
    pub fn new(gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self {
            gateway,
            viz: Arc::new(VizRegistry::builtin()),
        }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn gateway(&self) -> &Arc<dyn ExecutionGateway> {
        &self.gateway
    }

    pub fn viz_registry(&self) -> &VizRegistry {
        &self.viz
    }

    /// Track an existing execution (one eager `get`).
    pub async fn job(&self, id: impl Into<ExecutionId>) -> Result<Job, JobError> {
        Job::from_id(self, id).await
    }

    pub fn job_from_dto(&self, dto: ExecutionDto) -> Result<Job, JobError> {
        Job::from_dto(self, dto)
    }

    pub async fn list_jobs(&self, query: &ListQuery) -> Result<JobList, JobError> {
        JobList::list(self, query).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("viz_tools", &self.viz.registered_tools())
            .finish_non_exhaustive()
    }
}

/// BuildError はクライアント構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no execution gateway configured")]
    MissingGateway,

    #[error("Missing visualizations for tools: {0:?}. These tools were expected but not registered.")]
    MissingVizTools(Vec<String>),
}

/// ClientBuilder は Client を構築
///
/// # 使用例
/// ```ignore
/// let client = Client::builder()
///     .gateway(Arc::new(HttpExecutionGateway::new(config)?))
///     .register_viz("acme.custom-tool", MyViz)?
///     .expect_tools(&["deeporigin.docking", "acme.custom-tool"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tools() で可視化が必要な tool key を宣言
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct ClientBuilder {
    gateway: Option<Arc<dyn ExecutionGateway>>,
    registry: VizRegistry,
    expected_tools: Option<Vec<String>>,
}

impl ClientBuilder {
    /// Starts from the built-in visualizations.
    pub fn new() -> Self {
        Self {
            gateway: None,
            registry: VizRegistry::builtin(),
            expected_tools: None,
        }
    }

    /// Start from an empty registry instead of the built-ins.
    pub fn without_builtin_viz(mut self) -> Self {
        self.registry = VizRegistry::new();
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ExecutionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn register_viz(
        mut self,
        tool_key: impl Into<String>,
        viz: impl JobViz + 'static,
    ) -> Result<Self, RegistryError> {
        self.registry.register(tool_key, viz)?;
        Ok(self)
    }

    pub fn expect_tools(mut self, tool_keys: &[&str]) -> Self {
        self.expected_tools = Some(tool_keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Client, BuildError> {
        let gateway = self.gateway.ok_or(BuildError::MissingGateway)?;
        if let Some(expected) = &self.expected_tools {
            let registered = self.registry.registered_tools();
            let missing: Vec<String> = expected
                .iter()
                .filter(|key| !registered.contains(key))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingVizTools(missing));
            }
        }
        Ok(Client {
            gateway,
            viz: Arc::new(self.registry),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
