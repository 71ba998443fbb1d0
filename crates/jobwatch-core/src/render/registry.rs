//! VizRegistry - ツールごとの可視化の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Arc による共有所有権（Job ごとに 1 度だけ resolve して保持）
//!
//! tool key（例: `deeporigin.docking`）から `JobViz` を引きます。
//! 未登録のツールはタイトル "Job" と汎用表示にフォールバックします。

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::Job;
use crate::ports::RenderError;

use super::viz::{
    ABFE_TOOL_KEY, AbfeViz, DOCKING_TOOL_KEY, DockingViz, RBFE_TOOL_KEY, RbfeViz,
    SYSTEM_PREP_TOOL_KEY, SystemPrepViz,
};

/// Tool-specific part of a job view.
pub trait JobViz: Send + Sync {
    fn title(&self, job: &Job) -> String;

    /// Status body for the job's current snapshot.
    fn body(&self, job: &Job) -> Result<String, RenderError>;
}

/// RegistryError は VizRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Visualization for tool '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// VizRegistry は tool key → 可視化の対応表
///
/// # 使用例
/// ```ignore
/// let mut registry = VizRegistry::builtin();
/// registry.register("acme.custom-tool", MyViz)?;
///
/// let viz = registry.resolve("acme.custom-tool");
/// ```
#[derive(Default)]
pub struct VizRegistry {
    visualizations: HashMap<String, Arc<dyn JobViz>>,
}

impl VizRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the docking, ABFE, RBFE and system-prep visualizations.
    pub fn builtin() -> Self {
        let builtins: [(&str, Arc<dyn JobViz>); 4] = [
            (DOCKING_TOOL_KEY, Arc::new(DockingViz)),
            (ABFE_TOOL_KEY, Arc::new(AbfeViz)),
            (RBFE_TOOL_KEY, Arc::new(RbfeViz)),
            (SYSTEM_PREP_TOOL_KEY, Arc::new(SystemPrepViz)),
        ];
        Self {
            visualizations: builtins
                .into_iter()
                .map(|(key, viz)| (key.to_string(), viz))
                .collect(),
        }
    }

    pub fn register(
        &mut self,
        tool_key: impl Into<String>,
        viz: impl JobViz + 'static,
    ) -> Result<(), RegistryError> {
        let tool_key = tool_key.into();
        if self.visualizations.contains_key(&tool_key) {
            return Err(RegistryError::AlreadyRegistered(tool_key));
        }
        self.visualizations.insert(tool_key, Arc::new(viz));
        Ok(())
    }

    pub fn resolve(&self, tool_key: &str) -> Option<Arc<dyn JobViz>> {
        self.visualizations.get(tool_key).cloned()
    }

    /// Registered tool keys, sorted.
    pub fn registered_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.visualizations.keys().cloned().collect();
        tools.sort();
        tools
    }
}
