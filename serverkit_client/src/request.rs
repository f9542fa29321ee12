use ndarray::ArrayD;
use serde_json::{Map, Value};
use serverkit_proto::encode_array;

/// Parameters of a `process` call, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    values: Map<String, Value>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults of every property of `schema` that is not listed as required.
    pub fn from_schema_defaults(schema: &Value) -> Self {
        let required = required_fields(schema);
        let mut values = Map::new();

        if let Some(properties) = schema["properties"].as_object() {
            for (name, property) in properties {
                if required.contains(&name.as_str()) {
                    continue;
                }
                if let Some(default) = property.get("default") {
                    values.insert(name.clone(), default.clone());
                }
            }
        }

        Self { values }
    }

    pub fn image(mut self, name: &str, image: &ArrayD<f32>) -> Self {
        self.values
            .insert(name.to_string(), Value::String(encode_array(image)));
        self
    }

    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Properties of `schema` that have no value yet.
    pub fn missing(&self, schema: &Value) -> Vec<String> {
        schema["properties"]
            .as_object()
            .map(|properties| {
                properties
                    .keys()
                    .filter(|name| !self.values.contains_key(*name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.values
    }
}

fn required_fields(schema: &Value) -> Vec<&str> {
    schema["required"]
        .as_array()
        .map(|required| required.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
