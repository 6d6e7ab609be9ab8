//! Format-neutral view of one variable read from a gridded file.
//!
//! Readers (grid JSON, NetCDF) only fill this structure; all validation and
//! interpretation happens in [`crate::io::ingest`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute value as stored in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDimension {
    pub name: String,
    pub len: usize,
}

/// A coordinate variable: numeric values and/or string labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCoord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl RawCoord {
    pub fn len(&self) -> Option<usize> {
        self.values
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.labels.as_ref().map(Vec::len))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub variable: String,
    pub dims: Vec<RawDimension>,
    /// Row-major over `dims`; missing samples are NaN.
    pub values: Vec<f64>,
    pub attrs: BTreeMap<String, AttrValue>,
    pub coords: BTreeMap<String, RawCoord>,
    pub global_attrs: BTreeMap<String, AttrValue>,
}

impl RawDataset {
    pub fn attr_text(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_text)
    }

    pub fn attr_number(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(AttrValue::as_number)
    }

    pub fn global(&self, key: &str) -> Option<&AttrValue> {
        self.global_attrs.get(key)
    }
}
