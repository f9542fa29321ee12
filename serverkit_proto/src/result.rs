use crate::codec::{decode_array, encode_array, CodecError};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, VariantNames};

/// How a result array should be interpreted by a consumer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResultKind {
    Image,
    Labels,
    Mask,
    Points,
    Boxes,
    Vectors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One output artifact of an algorithm run.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmResult {
    pub data: ArrayD<f32>,
    pub metadata: Metadata,
    pub kind: ResultKind,
}

impl AlgorithmResult {
    pub fn new(data: ArrayD<f32>, kind: ResultKind) -> Self {
        Self {
            data,
            metadata: Metadata::new(),
            kind,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// `AlgorithmResult` as it travels over HTTP, with the array encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedResult {
    pub data: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub kind: ResultKind,
}

impl EncodedResult {
    pub fn decode(self) -> Result<AlgorithmResult, CodecError> {
        Ok(AlgorithmResult {
            data: decode_array(&self.data)?,
            metadata: self.metadata,
            kind: self.kind,
        })
    }
}

impl From<&AlgorithmResult> for EncodedResult {
    fn from(result: &AlgorithmResult) -> Self {
        Self {
            data: encode_array(&result.data),
            metadata: result.metadata.clone(),
            kind: result.kind,
        }
    }
}
