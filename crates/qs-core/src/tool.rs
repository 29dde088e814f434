use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::directive::ToolCall;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    /// Type tag shown to the model, e.g. `str` or `list[str]`.
    pub type_tag: String,
    pub description: String,
    pub required: bool,
}

impl ToolParameter {
    pub fn required(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, type_tag, description)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Function-call schema handed to the model, with parameters in
    /// declaration order.
    pub fn function_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.type_tag,
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. The returned observation is serialized into the
    /// conversation as-is.
    async fn call(&self, parameters: Map<String, Value>) -> Result<Value, Error>;
}

/// Ordered tool schemas plus a name → tool lookup.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    schemas: Vec<Value>,
    names: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe<I>(tools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one in
    /// place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let schema = tool.definition().function_schema();
        match self.names.iter().position(|n| *n == name) {
            Some(index) => self.schemas[index] = schema,
            None => {
                self.names.push(name.clone());
                self.schemas.push(schema);
            }
        }
        self.tools.insert(name, tool);
    }

    pub fn schemas(&self) -> &[Value] {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&Value> {
        let index = self.names.iter().position(|n| n == name)?;
        self.schemas.get(index)
    }

    /// One tool's schema serialized for prompt text.
    pub fn schema_text(&self, name: &str) -> Option<String> {
        self.schema(name).map(Value::to_string)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub async fn dispatch(&self, call: &ToolCall) -> Result<Value, Error> {
        let name = call
            .name
            .as_deref()
            .ok_or_else(|| Error::invalid_request("tool call has no name"))?;
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::tool(name, "unknown tool"))?;
        debug!(tool = name, "Dispatching tool call");
        tool.call(call.parameters.clone()).await
    }
}
