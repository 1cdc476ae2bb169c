//! Transform filter configuration and presets.

use serde::{Deserialize, Serialize};
use vxform_core::{ColorFormat, ElementType, Result, VxError};
use vxform_native::Interpolation;

use crate::params::ParamVersion;

/// Default padding added to the canvas diagonal when bounding the ROI.
pub const DEFAULT_ROI_PADDING: u32 = 8;

/// Configuration fixed for the lifetime of one transform filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub version: ParamVersion,
    #[serde(with = "interpolation_name")]
    pub interpolation: Interpolation,
    /// Pixels added to the canvas diagonal to bound the scaled working size.
    pub roi_padding: u32,
    /// Wrap CPU buffers into native frames without copying.
    pub zero_copy: bool,
    /// Output layout; `None` keeps the input's.
    pub output_format: Option<(ColorFormat, ElementType)>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self::compensated()
    }
}

impl TransformConfig {
    /// Absolute crop/position, no ROI bounding.
    pub fn legacy() -> Self {
        Self {
            version: ParamVersion::V1,
            interpolation: Interpolation::Bilinear,
            roi_padding: 0,
            zero_copy: true,
            output_format: None,
        }
    }

    /// Ratio-based crop/position, no ROI bounding.
    pub fn windowed() -> Self {
        Self {
            version: ParamVersion::V2,
            ..Self::legacy()
        }
    }

    /// ROI bounding with rotation compensation.
    pub fn compensated() -> Self {
        Self {
            version: ParamVersion::V3,
            roi_padding: DEFAULT_ROI_PADDING,
            ..Self::legacy()
        }
    }

    /// Parse a configuration, filling missing fields from the default.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VxError::InvalidParameter(format!("transform config: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VxError::InvalidParameter(format!("transform config: {e}")))
    }
}

mod interpolation_name {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use vxform_native::Interpolation;

    pub fn serialize<S: Serializer>(value: &Interpolation, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Interpolation, D::Error> {
        let name = String::deserialize(deserializer)?;
        Interpolation::from_name(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown interpolation '{name}'")))
    }
}
