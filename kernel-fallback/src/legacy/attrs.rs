//! Kernel attributes.
//!
//! Op invocations carry an ordered [`OpAttrs`] list. Kernels consume the
//! sorted [`AttrValueMap`], whose JSON form is stable and doubles as the
//! attribute part of the runner cache key.
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::tensor::DType;

/// Attribute value of a legacy kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
    DType(DType),
    DTypeList(Vec<DType>),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Float(value) => write!(f, "{}", value),
            AttrValue::Double(value) => write!(f, "{}", value),
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::UInt(value) => write!(f, "{}", value),
            AttrValue::Bool(value) => write!(f, "{}", value),
            AttrValue::Str(value) => write!(f, "{:?}", value),
            AttrValue::IntList(values) => write!(f, "{:?}", values),
            AttrValue::DType(dtype) => write!(f, "{}", dtype),
            AttrValue::DTypeList(dtypes) => {
                let names = dtypes.iter().map(|dtype| dtype.as_str()).collect::<Vec<_>>();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

/// Attributes keyed by name, iterated in sorted order.
pub type AttrValueMap = BTreeMap<String, AttrValue>;

/// Builder callback that fills an attribute map.
pub type AttrBuilder<'a> = &'a dyn Fn(&mut AttrValueMap) -> Result<()>;

/// Named attribute for an op invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpAttr {
    pub name: String,
    pub value: AttrValue,
}

/// Collection of op attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpAttrs {
    pub items: Vec<OpAttr>,
}

impl OpAttrs {
    /// Build an empty attribute set.
    pub fn none() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.items.push(OpAttr {
            name: name.into(),
            value,
        });
        self
    }

    /// Copy every attribute into `map`, rejecting duplicate names.
    pub fn fill_attr_value_map(&self, map: &mut AttrValueMap) -> Result<()> {
        let mut seen = HashSet::new();
        for attr in &self.items {
            if !seen.insert(attr.name.as_str()) {
                return Err(anyhow!("duplicate attribute: {}", attr.name));
            }
            map.insert(attr.name.clone(), attr.value.clone());
        }
        Ok(())
    }
}

/// `name=value` pairs joined by `", "`.
pub fn attr_value_map_debug_string(attrs: &AttrValueMap) -> String {
    attrs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Look up a dtype attribute.
pub fn attr_dtype(attrs: &AttrValueMap, name: &str) -> Result<DType> {
    match attrs.get(name) {
        Some(AttrValue::DType(dtype)) => Ok(*dtype),
        Some(AttrValue::Str(ident)) => DType::from_ident(ident),
        Some(other) => Err(anyhow!("attribute {} must be a dtype, got {}", name, other)),
        None => Err(anyhow!("missing attribute: {}", name)),
    }
}
