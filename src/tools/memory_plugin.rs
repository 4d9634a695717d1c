//! Long-term memory functions over the persistent store.

use std::sync::Arc;

use serde_json::{Value, json};

use super::{FunctionSpec, ToolError, required_str};
use crate::memory::MemoryStore;

pub struct MemoryPlugin {
    store: Arc<MemoryStore>,
}

impl MemoryPlugin {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec {
                name: "Save",
                description: "Remember a fact under a short unique key, e.g. key 'owner-birthday'",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "key": { "type": "string", "description": "Short kebab-case identifier" },
                        "content": { "type": "string", "description": "The fact to remember" }
                    },
                    "required": ["key", "content"]
                }),
            },
            FunctionSpec {
                name: "Recall",
                description: "Look up a remembered fact by its exact key",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" }
                    },
                    "required": ["key"]
                }),
            },
            FunctionSpec {
                name: "Search",
                description: "Find remembered facts related to a free-text query",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" }
                    },
                    "required": ["query"]
                }),
            },
            FunctionSpec {
                name: "Forget",
                description: "Delete a remembered fact by key",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" }
                    },
                    "required": ["key"]
                }),
            },
            FunctionSpec {
                name: "ListKeys",
                description: "List the keys of everything currently remembered",
                parameters: json!({ "type": "object", "properties": {} }),
            },
        ]
    }

    pub async fn invoke(&self, function: &str, args: &Value) -> Result<Value, ToolError> {
        match function {
            "Save" => {
                let key = required_str(args, "key")?;
                let content = required_str(args, "content")?;
                self.store
                    .save(key, content)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(json!(format!("Remembered '{key}'.")))
            }
            "Recall" => {
                let key = required_str(args, "key")?;
                let item = self
                    .store
                    .recall(key)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(match item {
                    Some(item) => json!(item.content),
                    None => json!(format!("Nothing remembered under '{key}'.")),
                })
            }
            "Search" => {
                let query = required_str(args, "query")?;
                let results = self
                    .store
                    .search(query, 5)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                if results.is_empty() {
                    return Ok(json!("No related memories found."));
                }
                let hits: Vec<Value> = results
                    .into_iter()
                    .map(|(item, score)| json!({ "key": item.key, "content": item.content, "score": score }))
                    .collect();
                Ok(json!(hits))
            }
            "Forget" => {
                let key = required_str(args, "key")?;
                let existed = self
                    .store
                    .forget(key)
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(json!(if existed {
                    format!("Forgot '{key}'.")
                } else {
                    format!("Nothing remembered under '{key}'.")
                }))
            }
            "ListKeys" => {
                let keys: Vec<String> = self
                    .store
                    .list()
                    .await
                    .into_iter()
                    .map(|item| item.key)
                    .collect();
                Ok(json!(keys))
            }
            other => Err(ToolError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn plugin(dir: &tempfile::TempDir) -> MemoryPlugin {
        let store = MemoryStore::load(dir.path().join("memories.json"), 16, None)
            .await
            .unwrap();
        MemoryPlugin::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_save_and_recall() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin(&dir).await;

        plugin
            .invoke("Save", &json!({"key": "pet", "content": "a cat named Miso"}))
            .await
            .unwrap();
        let recalled = plugin.invoke("Recall", &json!({"key": "pet"})).await.unwrap();
        assert_eq!(recalled, json!("a cat named Miso"));
    }

    #[tokio::test]
    async fn test_recall_missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin(&dir).await;
        let result = plugin
            .invoke("Recall", &json!({"key": "ghost"}))
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("Nothing remembered"));
    }

    #[tokio::test]
    async fn test_forget_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin(&dir).await;
        plugin
            .invoke("Save", &json!({"key": "a", "content": "1"}))
            .await
            .unwrap();

        let keys = plugin.invoke("ListKeys", &json!({})).await.unwrap();
        assert_eq!(keys, json!(["a"]));

        plugin.invoke("Forget", &json!({"key": "a"})).await.unwrap();
        let keys = plugin.invoke("ListKeys", &json!({})).await.unwrap();
        assert_eq!(keys, json!([]));
    }

    #[tokio::test]
    async fn test_search_without_embedder_reports_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin(&dir).await;
        plugin
            .invoke("Save", &json!({"key": "a", "content": "1"}))
            .await
            .unwrap();
        let result = plugin
            .invoke("Search", &json!({"query": "anything"}))
            .await
            .unwrap();
        assert_eq!(result, json!("No related memories found."));
    }
}
