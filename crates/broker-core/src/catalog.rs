//! Catalog metadata: bundle specs, plans, and parameter descriptors.
//!
//! Immutable from the broker core's point of view; written when the
//! catalog is bootstrapped and read when an instance is resolved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Specs keyed by spec ID, as produced by a catalog bootstrap.
pub type SpecManifest = HashMap<String, Spec>;

/// Whether a bundle's operations may, must, or cannot run asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncMode {
    Optional,
    #[default]
    Required,
    Unsupported,
}

/// A provisionable bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub id: String,
    pub runtime: i32,
    pub version: String,
    pub fq_name: String,
    pub image: String,
    pub tags: Vec<String>,
    pub bindable: bool,
    pub description: String,
    pub async_mode: AsyncMode,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub free: bool,
    pub bindable: bool,
    pub updates_to: Vec<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub bind_parameters: Vec<ParameterDescriptor>,
}

/// Describes one user-supplied parameter of a plan.
///
/// Numeric bounds are optional; `None` means unbounded, which is distinct
/// from a bound of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub default: Option<serde_json::Value>,
    pub deprecated_max_length: i32,
    pub max_length: i32,
    pub min_length: i32,
    pub pattern: String,
    pub multiple_of: f64,
    pub maximum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    #[serde(rename = "enum")]
    pub enum_values: Vec<String>,
    pub required: bool,
    pub updatable: bool,
    pub display_type: String,
    pub display_group: String,
}
