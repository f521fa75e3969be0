//! Declarative mask configuration.
//!
//! Masks are described as JSON objects tagged by `kind`:
//!
//! ```json
//! {
//!   "brain_mask": {"kind": "labelled_file", "suffix": "aseg", "scope": "dmriprep",
//!                  "exclusive_labels": [0]},
//!   "seed_mask": {"kind": "combined", "masks": [
//!       {"kind": "thresholded_scalar", "scalar": "dti_fa", "lower_bound": 0.2},
//!       {"kind": "thresholded_scalar", "scalar": "dti_md", "upper_bound": 0.002}
//!   ]}
//! }
//! ```
//!
//! Operators and scalar names stay strings until [`MaskConfig::build`], so a
//! bad value is reported as a [`MaskError`] naming the accepted values.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::combined::CombinedMask;
use crate::condition::Condition;
use crate::enums::{CombineOp, Scalar};
use crate::error::MaskError;
use crate::mask::{Mask, MaskBuilder};
use crate::source::DatasetQuery;

/// Every `kind` a mask node may carry.
pub const MASK_KINDS: [&str; 7] = [
    "file",
    "full",
    "labelled_file",
    "thresholded_file",
    "scalar",
    "thresholded_scalar",
    "combined",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskConfig {
    File {
        suffix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension: Option<String>,
    },
    Full,
    LabelledFile {
        suffix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension: Option<String>,
        #[serde(default)]
        inclusive_labels: Option<Vec<i64>>,
        #[serde(default)]
        exclusive_labels: Option<Vec<i64>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combine: Option<String>,
    },
    ThresholdedFile {
        suffix: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extension: Option<String>,
        #[serde(default)]
        lower_bound: Option<f64>,
        #[serde(default)]
        upper_bound: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combine: Option<String>,
    },
    Scalar {
        scalar: String,
    },
    ThresholdedScalar {
        scalar: String,
        #[serde(default)]
        lower_bound: Option<f64>,
        #[serde(default)]
        upper_bound: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combine: Option<String>,
    },
    Combined {
        masks: Vec<MaskConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combine: Option<String>,
    },
}

fn parse_combine(value: Option<&str>, default: CombineOp) -> Result<CombineOp, MaskError> {
    value.map_or(Ok(default), |op| op.parse())
}

fn file_builder(suffix: &str, scope: &Option<String>, extension: &Option<String>) -> MaskBuilder {
    let builder = MaskBuilder::file(suffix, scope.clone());
    match extension {
        Some(extension) => builder.extension(extension.as_str()),
        None => builder,
    }
}

impl MaskConfig {
    /// Validate a raw JSON node and deserialise it.
    pub fn from_value(value: Value, name: &str) -> Result<Self, MaskError> {
        check_mask_node(&value, name)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Build the mask this node describes.
    pub fn build(&self) -> Result<Box<dyn Mask>, MaskError> {
        let mask: Box<dyn Mask> = match self {
            MaskConfig::File {
                suffix,
                scope,
                extension,
            } => Box::new(file_builder(suffix, scope, extension).build()),
            MaskConfig::Full => Box::new(MaskBuilder::full().build()),
            MaskConfig::LabelledFile {
                suffix,
                scope,
                extension,
                inclusive_labels,
                exclusive_labels,
                combine,
            } => {
                let combine =
                    parse_combine(combine.as_deref(), Condition::DEFAULT_LABEL_COMBINE)?;
                Box::new(
                    file_builder(suffix, scope, extension)
                        .labels(inclusive_labels.clone(), exclusive_labels.clone())
                        .combine(combine)
                        .build(),
                )
            }
            MaskConfig::ThresholdedFile {
                suffix,
                scope,
                extension,
                lower_bound,
                upper_bound,
                combine,
            } => {
                let combine =
                    parse_combine(combine.as_deref(), Condition::DEFAULT_THRESHOLD_COMBINE)?;
                Box::new(
                    file_builder(suffix, scope, extension)
                        .threshold(*lower_bound, *upper_bound)
                        .combine(combine)
                        .build(),
                )
            }
            MaskConfig::Scalar { scalar } => {
                Box::new(MaskBuilder::scalar(scalar.parse::<Scalar>()?).build())
            }
            MaskConfig::ThresholdedScalar {
                scalar,
                lower_bound,
                upper_bound,
                combine,
            } => {
                let combine =
                    parse_combine(combine.as_deref(), Condition::DEFAULT_THRESHOLD_COMBINE)?;
                Box::new(
                    MaskBuilder::scalar(scalar.parse::<Scalar>()?)
                        .threshold(*lower_bound, *upper_bound)
                        .combine(combine)
                        .build(),
                )
            }
            MaskConfig::Combined { masks, combine } => {
                let combine = parse_combine(combine.as_deref(), CombinedMask::DEFAULT_COMBINE)?;
                let children = masks
                    .iter()
                    .map(MaskConfig::build)
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(CombinedMask::new(children, combine)?)
            }
        };
        Ok(mask)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Check that a JSON node can stand in for a mask.
///
/// The node must be an object whose `kind` is one of [`MASK_KINDS`]; combined
/// nodes are checked recursively. Errors name the offending node by path,
/// e.g. `seed_mask.masks[1]`.
pub fn check_mask_node(value: &Value, name: &str) -> Result<(), MaskError> {
    let invalid = |reason: String| MaskError::InvalidMaskNode {
        mask: name.to_string(),
        reason,
    };

    let Value::Object(node) = value else {
        return Err(invalid(format!(
            "expected an object, found {}",
            json_type(value)
        )));
    };
    let kind = match node.get("kind") {
        None => {
            return Err(invalid(format!(
                "missing 'kind', expected one of {}",
                MASK_KINDS.join(", ")
            )));
        }
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => {
            return Err(invalid(format!(
                "'kind' should be a string, found {}",
                json_type(other)
            )));
        }
    };
    if !MASK_KINDS.contains(&kind) {
        return Err(invalid(format!(
            "unknown kind '{kind}', expected one of {}",
            MASK_KINDS.join(", ")
        )));
    }

    if kind == "combined" {
        match node.get("masks") {
            Some(Value::Array(children)) => {
                for (index, child) in children.iter().enumerate() {
                    check_mask_node(child, &format!("{name}.masks[{index}]"))?;
                }
            }
            Some(other) => {
                return Err(invalid(format!(
                    "'masks' should be an array, found {}",
                    json_type(other)
                )));
            }
            None => return Err(invalid("missing 'masks'".to_string())),
        }
    }
    Ok(())
}

/// Mask roles used by the tracking pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaskSettings {
    /// Defaults to the full diffusion volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brain_mask: Option<MaskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_mask: Option<MaskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_mask: Option<MaskConfig>,
}

impl MaskSettings {
    pub const ROLES: [&'static str; 3] = ["brain_mask", "seed_mask", "stop_mask"];

    pub fn from_value(value: Value) -> Result<Self, MaskError> {
        if let Value::Object(roles) = &value {
            for role in Self::ROLES {
                match roles.get(role) {
                    None | Some(Value::Null) => {}
                    Some(node) => check_mask_node(node, role)?,
                }
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, MaskError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MaskError> {
        let path = path.as_ref();
        debug!(path = ?path, "loading mask settings");
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn build(&self) -> Result<MaskSet, MaskError> {
        let brain_mask = match &self.brain_mask {
            Some(config) => config.build()?,
            None => MaskConfig::Full.build()?,
        };
        Ok(MaskSet {
            brain_mask,
            seed_mask: self.seed_mask.as_ref().map(MaskConfig::build).transpose()?,
            stop_mask: self.stop_mask.as_ref().map(MaskConfig::build).transpose()?,
        })
    }
}

/// Built masks for each pipeline role.
#[derive(Debug)]
pub struct MaskSet {
    pub brain_mask: Box<dyn Mask>,
    pub seed_mask: Option<Box<dyn Mask>>,
    pub stop_mask: Option<Box<dyn Mask>>,
}

impl MaskSet {
    /// Masks that are configured, with their role.
    pub fn roles(&self) -> Vec<(&'static str, &dyn Mask)> {
        let mut roles: Vec<(&'static str, &dyn Mask)> = vec![("brain_mask", self.brain_mask.as_ref())];
        if let Some(mask) = &self.seed_mask {
            roles.push(("seed_mask", mask.as_ref()));
        }
        if let Some(mask) = &self.stop_mask {
            roles.push(("stop_mask", mask.as_ref()));
        }
        roles
    }

    pub fn find_paths(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError> {
        self.brain_mask.find_path(dataset, subject, session)?;
        if let Some(mask) = &mut self.seed_mask {
            mask.find_path(dataset, subject, session)?;
        }
        if let Some(mask) = &mut self.stop_mask {
            mask.find_path(dataset, subject, session)?;
        }
        Ok(())
    }
}
