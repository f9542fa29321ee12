//! Declarative parameter schemas.
//!
//! A [`ParameterSchema`] lists the inputs an algorithm accepts, with titles,
//! bounds and defaults. It validates raw JSON request payloads (decoding
//! encoded images on the way) as well as in-memory values, and renders a
//! JSON-schema document that clients use to build requests.

use ndarray::ArrayD;
use serde_json::{json, Map, Value};
use serverkit_proto::{decode_array, encode_array, FieldIssue};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Image(ArrayD<f32>),
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Image(_) => "image",
            ParamValue::Str(_) => "string",
            ParamValue::Float(_) => "number",
            ParamValue::Int(_) => "integer",
            ParamValue::Bool(_) => "boolean",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Image(array) => Value::String(encode_array(array)),
            ParamValue::Str(value) => json!(value),
            ParamValue::Float(value) => json!(value),
            ParamValue::Int(value) => json!(value),
            ParamValue::Bool(value) => json!(value),
        }
    }
}

impl From<ArrayD<f32>> for ParamValue {
    fn from(value: ArrayD<f32>) -> Self {
        ParamValue::Image(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<&FieldError> for FieldIssue {
    fn from(error: &FieldError) -> Self {
        FieldIssue {
            field: error.field.clone(),
            message: error.message.clone(),
        }
    }
}

/// Every field that failed validation, in schema order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|error| error.field.as_str())
    }
}

impl From<FieldError> for ValidationError {
    fn from(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Validated values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues(BTreeMap<String, ParamValue>);

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn take(&mut self, name: &str) -> Result<ParamValue, FieldError> {
        self.0
            .remove(name)
            .ok_or_else(|| FieldError::new(name, "field required"))
    }

    fn mismatch(name: &str, expected: &str, found: &ParamValue) -> FieldError {
        FieldError::new(name, format!("expected {}, got {}", expected, found.type_name()))
    }

    pub fn take_image(&mut self, name: &str) -> Result<ArrayD<f32>, FieldError> {
        match self.take(name)? {
            ParamValue::Image(array) => Ok(array),
            other => Err(Self::mismatch(name, "image", &other)),
        }
    }

    pub fn take_str(&mut self, name: &str) -> Result<String, FieldError> {
        match self.take(name)? {
            ParamValue::Str(value) => Ok(value),
            other => Err(Self::mismatch(name, "string", &other)),
        }
    }

    pub fn take_float(&mut self, name: &str) -> Result<f64, FieldError> {
        match self.take(name)? {
            ParamValue::Float(value) => Ok(value),
            ParamValue::Int(value) => Ok(value as f64),
            other => Err(Self::mismatch(name, "number", &other)),
        }
    }

    pub fn take_int(&mut self, name: &str) -> Result<i64, FieldError> {
        match self.take(name)? {
            ParamValue::Int(value) => Ok(value),
            other => Err(Self::mismatch(name, "integer", &other)),
        }
    }

    pub fn take_bool(&mut self, name: &str) -> Result<bool, FieldError> {
        match self.take(name)? {
            ParamValue::Bool(value) => Ok(value),
            other => Err(Self::mismatch(name, "boolean", &other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Image { dimensions: Vec<usize> },
    Choice { options: Vec<String> },
    Float { min: f64, max: f64, step: f64 },
    Int { min: i64, max: i64 },
    Bool,
}

impl ParamKind {
    fn widget_type(&self) -> &'static str {
        match self {
            ParamKind::Image { .. } => "image",
            ParamKind::Choice { .. } => "dropdown",
            ParamKind::Float { .. } => "float",
            ParamKind::Int { .. } => "int",
            ParamKind::Bool => "bool",
        }
    }

    fn json_type(&self) -> &'static str {
        match self {
            ParamKind::Image { .. } | ParamKind::Choice { .. } => "string",
            ParamKind::Float { .. } => "number",
            ParamKind::Int { .. } => "integer",
            ParamKind::Bool => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub title: String,
    pub description: String,
    pub kind: ParamKind,
    pub default: Option<ParamValue>,
}

impl ParameterSpec {
    fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            kind,
            default: None,
        }
    }

    /// A 2D or 3D image.
    pub fn image(name: &str) -> Self {
        Self::new(
            name,
            ParamKind::Image {
                dimensions: vec![2, 3],
            },
        )
    }

    pub fn choice<S: AsRef<str>>(name: &str, options: &[S]) -> Self {
        Self::new(
            name,
            ParamKind::Choice {
                options: options.iter().map(|o| o.as_ref().to_string()).collect(),
            },
        )
    }

    /// Inclusive bounds. The step only drives client widgets.
    pub fn float(name: &str, min: f64, max: f64) -> Self {
        Self::new(
            name,
            ParamKind::Float {
                min,
                max,
                step: 0.1,
            },
        )
    }

    pub fn int(name: &str, min: i64, max: i64) -> Self {
        Self::new(name, ParamKind::Int { min, max })
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        if let ParamKind::Float { step: current, .. } = &mut self.kind {
            *current = step;
        }
        self
    }

    pub fn dimensions(mut self, allowed: &[usize]) -> Self {
        if let ParamKind::Image { dimensions } = &mut self.kind {
            *dimensions = allowed.to_vec();
        }
        self
    }

    pub fn with_default(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn decode(&self, raw: &Value) -> Result<ParamValue, String> {
        match (&self.kind, raw) {
            (ParamKind::Image { .. }, Value::String(encoded)) => decode_array(encoded)
                .map(ParamValue::Image)
                .map_err(|e| format!("failed to decode image: {}", e)),
            (ParamKind::Choice { .. }, Value::String(value)) => Ok(ParamValue::Str(value.clone())),
            (ParamKind::Float { .. }, Value::Number(number)) => number
                .as_f64()
                .map(ParamValue::Float)
                .ok_or_else(|| format!("{} is not a valid number", number)),
            (ParamKind::Int { .. }, Value::Number(number)) => number
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| format!("{} is not a valid integer", number)),
            (ParamKind::Bool, Value::Bool(value)) => Ok(ParamValue::Bool(*value)),
            (kind, _) => Err(format!("expected {}", kind.json_type())),
        }
    }

    fn check(&self, value: ParamValue) -> Result<ParamValue, String> {
        match (&self.kind, value) {
            (ParamKind::Image { dimensions }, ParamValue::Image(array)) => {
                if dimensions.contains(&array.ndim()) {
                    Ok(ParamValue::Image(array))
                } else {
                    Err(format!(
                        "Array has the wrong dimensionality: expected one of {:?}, got {}",
                        dimensions,
                        array.ndim()
                    ))
                }
            }
            (ParamKind::Choice { options }, ParamValue::Str(value)) => {
                if options.iter().any(|option| option == &value) {
                    Ok(ParamValue::Str(value))
                } else {
                    Err(format!("'{}' is not one of {:?}", value, options))
                }
            }
            (ParamKind::Float { min, max, .. }, ParamValue::Float(value)) => {
                check_range(value, *min, *max).map(ParamValue::Float)
            }
            (ParamKind::Float { min, max, .. }, ParamValue::Int(value)) => {
                check_range(value as f64, *min, *max).map(ParamValue::Float)
            }
            (ParamKind::Int { min, max }, ParamValue::Int(value)) => {
                check_range(value, *min, *max).map(ParamValue::Int)
            }
            (ParamKind::Bool, ParamValue::Bool(value)) => Ok(ParamValue::Bool(value)),
            (kind, other) => Err(format!(
                "expected {}, got {}",
                kind.json_type(),
                other.type_name()
            )),
        }
    }

    fn json_schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("title".into(), json!(self.title));
        property.insert("description".into(), json!(self.description));
        property.insert("type".into(), json!(self.kind.json_type()));
        property.insert("widget_type".into(), json!(self.kind.widget_type()));

        match &self.kind {
            ParamKind::Image { dimensions } => {
                property.insert("dimensions".into(), json!(dimensions));
            }
            ParamKind::Choice { options } => {
                property.insert("enum".into(), json!(options));
            }
            ParamKind::Float { min, max, step } => {
                property.insert("minimum".into(), json!(min));
                property.insert("maximum".into(), json!(max));
                property.insert("step".into(), json!(step));
            }
            ParamKind::Int { min, max } => {
                property.insert("minimum".into(), json!(min));
                property.insert("maximum".into(), json!(max));
            }
            ParamKind::Bool => {}
        }

        if let Some(default) = &self.default {
            property.insert("default".into(), default.to_json());
        }

        Value::Object(property)
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(value: T, min: T, max: T) -> Result<T, String> {
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(format!("{} is outside [{}, {}]", value, min, max))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSchema {
    title: String,
    specs: Vec<ParameterSpec>,
}

impl ParameterSchema {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            specs: Vec::new(),
        }
    }

    pub fn field(mut self, spec: ParameterSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Decodes and checks a JSON object payload. Missing or null fields fall
    /// back to their default; unknown keys are ignored.
    pub fn validate(&self, raw: &Value) -> Result<ParamValues, ValidationError> {
        let Value::Object(payload) = raw else {
            return Err(FieldError::new("__root__", "expected a JSON object").into());
        };

        self.resolve(|spec| match payload.get(&spec.name) {
            None | Some(Value::Null) => None,
            Some(raw) => Some(spec.decode(raw)),
        })
    }

    /// Same checks as [`validate`](Self::validate), for values that never
    /// went through the transport encoding.
    pub fn validate_values(&self, mut values: ParamValues) -> Result<ParamValues, ValidationError> {
        self.resolve(|spec| values.0.remove(&spec.name).map(Ok))
    }

    fn resolve<F>(&self, mut lookup: F) -> Result<ParamValues, ValidationError>
    where
        F: FnMut(&ParameterSpec) -> Option<Result<ParamValue, String>>,
    {
        let mut values = ParamValues::new();
        let mut errors = Vec::new();

        for spec in &self.specs {
            let candidate = lookup(spec).unwrap_or_else(|| {
                spec.default
                    .clone()
                    .ok_or_else(|| "field required".to_string())
            });

            match candidate.and_then(|value| spec.check(value)) {
                Ok(value) => values.insert(&spec.name, value),
                Err(message) => errors.push(FieldError::new(&spec.name, message)),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Values for every field that declares a default.
    pub fn default_values(&self) -> ParamValues {
        let mut values = ParamValues::new();
        for spec in &self.specs {
            if let Some(default) = &spec.default {
                values.insert(&spec.name, default.clone());
            }
        }
        values
    }

    /// Fails if a declared default does not satisfy its own field.
    pub fn check_defaults(&self) -> Result<(), ValidationError> {
        let errors: Vec<FieldError> = self
            .specs
            .iter()
            .filter_map(|spec| {
                let default = spec.default.clone()?;
                spec.check(default)
                    .err()
                    .map(|message| FieldError::new(&spec.name, format!("invalid default: {}", message)))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .specs
            .iter()
            .filter(|spec| spec.is_required())
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "title": self.title,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn schema() -> ParameterSchema {
        ParameterSchema::new("Parameters")
            .field(ParameterSpec::image("image").title("Image"))
            .field(ParameterSpec::choice("model_name", &["model1", "model2"]).with_default("model1"))
            .field(
                ParameterSpec::float("threshold", 0.0, 1.0)
                    .step(0.05)
                    .with_default(0.5),
            )
            .field(ParameterSpec::int("iterations", 1, 10).with_default(3i64))
            .field(ParameterSpec::boolean("invert").with_default(false))
    }

    fn zeros(shape: &[usize]) -> Value {
        Value::String(encode_array(&Array::<f32, _>::zeros(IxDyn(shape))))
    }

    #[test]
    fn test_accepts_2d_and_3d_images() {
        for shape in [&[4, 5][..], &[4, 5, 3][..]] {
            let values = schema().validate(&json!({ "image": zeros(shape) })).unwrap();
            match values.get("image") {
                Some(ParamValue::Image(array)) => assert_eq!(array.shape(), shape),
                other => panic!("unexpected image value {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejects_1d_and_4d_images() {
        for shape in [&[4][..], &[2, 2, 2, 2][..]] {
            let err = schema().validate(&json!({ "image": zeros(shape) })).unwrap_err();
            assert_eq!(err.fields().collect::<Vec<_>>(), vec!["image"]);
            assert!(err.errors[0].message.contains("wrong dimensionality"));
        }
    }

    #[test]
    fn test_threshold_bounds_are_inclusive() {
        for threshold in [0.0, 0.25, 1.0] {
            let payload = json!({ "image": zeros(&[2, 2]), "threshold": threshold });
            assert!(schema().validate(&payload).is_ok(), "{} rejected", threshold);
        }
        for threshold in [-0.001, 1.001] {
            let payload = json!({ "image": zeros(&[2, 2]), "threshold": threshold });
            let err = schema().validate(&payload).unwrap_err();
            assert_eq!(err.fields().collect::<Vec<_>>(), vec!["threshold"]);
        }
    }

    #[test]
    fn test_model_name_must_be_declared_option() {
        let ok = json!({ "image": zeros(&[2, 2]), "model_name": "model2" });
        assert_eq!(
            schema().validate(&ok).unwrap().get("model_name"),
            Some(&ParamValue::Str("model2".into()))
        );

        let bad = json!({ "image": zeros(&[2, 2]), "model_name": "model3" });
        let err = schema().validate(&bad).unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), vec!["model_name"]);
    }

    #[test]
    fn test_reports_every_offending_field() {
        let payload = json!({
            "model_name": "nope",
            "threshold": "high",
            "iterations": 11,
            "invert": true,
        });

        let err = schema().validate(&payload).unwrap_err();

        assert_eq!(
            err.fields().collect::<Vec<_>>(),
            vec!["image", "model_name", "threshold", "iterations"]
        );
        assert_eq!(err.errors[0].message, "field required");
    }

    #[test]
    fn test_missing_and_null_fields_use_defaults() {
        let payload = json!({ "image": zeros(&[3, 3]), "threshold": null, "extra": 1 });

        let values = schema().validate(&payload).unwrap();

        assert_eq!(values.get("threshold"), Some(&ParamValue::Float(0.5)));
        assert_eq!(values.get("iterations"), Some(&ParamValue::Int(3)));
        assert!(!values.contains("extra"));
        assert_eq!(values.len(), 5);
        assert!(!values.is_empty());
        assert!(ParamValues::new().is_empty());
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.fields().collect::<Vec<_>>(), vec!["__root__"]);
    }

    #[test]
    fn test_undecodable_image_is_a_field_error() {
        let err = schema()
            .validate(&json!({ "image": "%%%" }))
            .unwrap_err();
        assert!(err.errors[0].message.starts_with("failed to decode image"));
    }

    #[test]
    fn test_validate_values_coerces_integers_to_float() {
        let mut values = ParamValues::new();
        values.insert("image", Array::<f32, _>::zeros(IxDyn(&[2, 2])));
        values.insert("threshold", 1i64);

        let mut values = schema().validate_values(values).unwrap();

        assert_eq!(values.take_float("threshold"), Ok(1.0));
        assert_eq!(values.take_str("model_name"), Ok("model1".to_string()));
        assert!(values.take_bool("invert").is_ok());
    }

    #[test]
    fn test_json_schema_lists_required_and_defaults() {
        let document = schema().json_schema();

        assert_eq!(document["required"], json!(["image"]));
        assert_eq!(document["properties"]["threshold"]["default"], json!(0.5));
        assert_eq!(document["properties"]["threshold"]["maximum"], json!(1.0));
        assert_eq!(document["properties"]["threshold"]["step"], json!(0.05));
        assert_eq!(
            document["properties"]["model_name"]["enum"],
            json!(["model1", "model2"])
        );
        assert_eq!(document["properties"]["image"]["widget_type"], json!("image"));
        assert!(document["properties"]["image"].get("default").is_none());
    }

    #[test]
    fn test_default_values_skip_required_fields() {
        let defaults = schema().default_values();
        assert_eq!(
            defaults.names().collect::<Vec<_>>(),
            vec!["invert", "iterations", "model_name", "threshold"]
        );
    }

    #[test]
    fn test_check_defaults_catches_out_of_range_default() {
        let schema = ParameterSchema::new("Broken")
            .field(ParameterSpec::float("threshold", 0.0, 1.0).with_default(2.0));

        let err = schema.check_defaults().unwrap_err();
        assert!(err.errors[0].message.starts_with("invalid default"));
    }
}
