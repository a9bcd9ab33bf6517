use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use turnstone_common::Result;

use crate::providers::ToolDefinition;

/// Context passed to every tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub thread_id: String,
}

/// Result of a tool execution. Failures that should flow back to the
/// model as text use `is_error`.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A callable tool exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutput>;
}

/// Registry of tools available during a turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Wire-format definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Reports the current UTC date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<ToolOutput> {
        Ok(ToolOutput::text(
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_exposes_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CurrentTimeTool));

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "current_time");
        assert!(registry.get("current_time").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn current_time_tool_returns_utc_stamp() {
        let ctx = ToolContext {
            thread_id: "t1".into(),
        };
        let out = CurrentTimeTool
            .execute(&ctx, serde_json::json!({}))
            .await
            .unwrap();
        assert!(!out.is_error);
        assert!(out.content.ends_with("UTC"));
    }
}
