//! Transform parameters and their host-facing descriptors.

use serde::{Deserialize, Serialize};
use vxform_core::{normalize_degrees, Result, VxError};

/// How the cropped image is sized against the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleType {
    /// Scale to the smaller relative axis; the rest is letterboxed
    #[default]
    Fit,
    /// Scale to cover the canvas; positioning clips the overflow
    Fill,
    /// Scale to cover the canvas and only process what lands on it
    Crop,
    /// Scale each axis to the canvas exactly
    Stretch,
}

impl ScaleType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Crop => "crop",
            Self::Stretch => "stretch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fit" => Some(Self::Fit),
            "fill" => Some(Self::Fill),
            "crop" | "crop_to_fill" => Some(Self::Crop),
            "stretch" => Some(Self::Stretch),
            _ => None,
        }
    }
}

/// Parameter set generation.
///
/// V1 takes absolute crop and position only. V2 adds ratio-based crop and
/// position. V3 also bounds the scaled working size and compensates the
/// position for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ParamVersion {
    V1,
    V2,
    #[default]
    V3,
}

impl ParamVersion {
    pub fn supports_ratios(self) -> bool {
        self >= Self::V2
    }

    pub fn bounds_roi(self) -> bool {
        self >= Self::V3
    }
}

/// A crop margin, in pixels or as a fraction of the input dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Margin {
    Pixels(u32),
    Ratio(f64),
}

impl Default for Margin {
    fn default() -> Self {
        Self::Pixels(0)
    }
}

impl Margin {
    /// Margin in pixels against a dimension of `len`.
    pub fn resolve(self, len: u32) -> u32 {
        match self {
            Self::Pixels(px) => px,
            Self::Ratio(r) => (r * len as f64).round().clamp(0.0, u32::MAX as f64) as u32,
        }
    }

    pub fn is_ratio(self) -> bool {
        matches!(self, Self::Ratio(_))
    }

    fn validate(self, name: &str) -> Result<Self> {
        match self {
            Self::Ratio(r) if !(0.0..=1.0).contains(&r) => Err(VxError::InvalidParameter(format!(
                "{name} ratio {r} outside [0, 1]"
            ))),
            other => Ok(other),
        }
    }
}

/// A position offset, in canvas pixels or as a fraction of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    Pixels(i64),
    Ratio(f64),
}

impl Default for Offset {
    fn default() -> Self {
        Self::Pixels(0)
    }
}

impl Offset {
    /// Offset in pixels on a canvas dimension of `len`.
    pub fn resolve(self, len: u32) -> f64 {
        match self {
            Self::Pixels(px) => px as f64,
            Self::Ratio(r) => r * len as f64,
        }
    }

    pub fn is_ratio(self) -> bool {
        matches!(self, Self::Ratio(_))
    }

    fn validate(self, name: &str) -> Result<Self> {
        match self {
            Self::Ratio(r) if !r.is_finite() => Err(VxError::InvalidParameter(format!(
                "{name} ratio {r} is not finite"
            ))),
            other => Ok(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropMargins {
    pub left: Margin,
    pub top: Margin,
    pub right: Margin,
    pub bottom: Margin,
}

impl CropMargins {
    pub fn any_ratio(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .any(|m| m.is_ratio())
    }
}

/// Crop, scale, rotation and position settings of one transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParameters {
    pub scale_type: ScaleType,
    pub crop: CropMargins,
    /// Horizontal and vertical scale ratios applied on top of the scale type
    pub scale_h: f64,
    pub scale_v: f64,
    pub keep_aspect_ratio: bool,
    /// Clockwise rotation in degrees, normalized into [0, 360)
    pub rotation: f64,
    pub position_h: Offset,
    pub position_v: Offset,
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self {
            scale_type: ScaleType::Fit,
            crop: CropMargins::default(),
            scale_h: 1.0,
            scale_v: 1.0,
            keep_aspect_ratio: false,
            rotation: 0.0,
            position_h: Offset::default(),
            position_v: Offset::default(),
        }
    }
}

impl TransformParameters {
    /// Check every field against `version`, normalizing the rotation.
    pub fn validated(mut self, version: ParamVersion) -> Result<Self> {
        self.crop = CropMargins {
            left: self.crop.left.validate("crop_left")?,
            top: self.crop.top.validate("crop_top")?,
            right: self.crop.right.validate("crop_right")?,
            bottom: self.crop.bottom.validate("crop_bottom")?,
        };
        self.position_h = self.position_h.validate("position_h")?;
        self.position_v = self.position_v.validate("position_v")?;
        if !version.supports_ratios()
            && (self.crop.any_ratio() || self.position_h.is_ratio() || self.position_v.is_ratio())
        {
            return Err(VxError::InvalidParameter(format!(
                "{version:?} parameters take absolute crop and position only"
            )));
        }
        check_scale_ratio("scale_h", self.scale_h)?;
        check_scale_ratio("scale_v", self.scale_v)?;
        self.rotation = check_rotation(self.rotation)?;
        Ok(self)
    }
}

pub(crate) fn check_scale_ratio(name: &str, ratio: f64) -> Result<f64> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(VxError::InvalidParameter(format!("{name} must be positive, got {ratio}")))
    }
}

pub(crate) fn check_rotation(degrees: f64) -> Result<f64> {
    if degrees.is_finite() {
        Ok(normalize_degrees(degrees))
    } else {
        Err(VxError::InvalidParameter(format!("rotation {degrees} is not finite")))
    }
}

pub(crate) fn check_margin(name: &str, margin: Margin, version: ParamVersion) -> Result<Margin> {
    let margin = margin.validate(name)?;
    if margin.is_ratio() && !version.supports_ratios() {
        return Err(VxError::InvalidParameter(format!(
            "{name}: {version:?} takes pixel margins only"
        )));
    }
    Ok(margin)
}

pub(crate) fn check_offset(name: &str, offset: Offset, version: ParamVersion) -> Result<Offset> {
    let offset = offset.validate(name)?;
    if offset.is_ratio() && !version.supports_ratios() {
        return Err(VxError::InvalidParameter(format!(
            "{name}: {version:?} takes pixel offsets only"
        )));
    }
    Ok(offset)
}

// ── Pipeline stages ────────────────────────────────────────────────

/// A stage of the transform pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Crop,
    Scale,
    Rotate,
    Position,
}

/// Set of stages with pending parameter changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageSet(u8);

impl StageSet {
    pub const ALL: Self = Self(0b1111);

    fn bit(stage: Stage) -> u8 {
        match stage {
            Stage::Crop => 1,
            Stage::Scale => 2,
            Stage::Rotate => 4,
            Stage::Position => 8,
        }
    }

    /// Stages whose output depends on a change to `stage`'s parameters.
    pub fn affected_by(stage: Stage) -> Self {
        match stage {
            Stage::Crop => Self::ALL,
            Stage::Scale => Self::of(&[Stage::Scale, Stage::Rotate, Stage::Position]),
            Stage::Rotate => Self::of(&[Stage::Rotate, Stage::Position]),
            Stage::Position => Self::of(&[Stage::Scale, Stage::Position]),
        }
    }

    pub fn of(stages: &[Stage]) -> Self {
        Self(stages.iter().fold(0, |acc, &s| acc | Self::bit(s)))
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn contains(self, stage: Stage) -> bool {
        self.0 & Self::bit(stage) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

// ── Descriptors ────────────────────────────────────────────────────

/// Parameter value exchanged with hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Choice(String),
}

/// Parameter descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub display_name: String,
    pub default: ParamValue,
    pub min: Option<ParamValue>,
    pub max: Option<ParamValue>,
}

fn descriptor(
    name: &str,
    display_name: &str,
    default: ParamValue,
    min: Option<ParamValue>,
    max: Option<ParamValue>,
) -> ParamDescriptor {
    ParamDescriptor {
        name: name.into(),
        display_name: display_name.into(),
        default,
        min,
        max,
    }
}

/// Descriptors for every parameter of the transform filter.
///
/// Crop margins and position offsets take `Int` pixels or `Float` ratios.
pub fn descriptors() -> Vec<ParamDescriptor> {
    use ParamValue::{Bool, Choice, Float, Int};
    let mut list = vec![descriptor("scale_type", "Scale Type", Choice("fit".into()), None, None)];
    for (name, display) in [
        ("crop_left", "Crop Left"),
        ("crop_top", "Crop Top"),
        ("crop_right", "Crop Right"),
        ("crop_bottom", "Crop Bottom"),
    ] {
        list.push(descriptor(name, display, Int(0), Some(Int(0)), None));
    }
    list.push(descriptor("scale_h", "Scale Horizontal", Float(1.0), Some(Float(0.0)), None));
    list.push(descriptor("scale_v", "Scale Vertical", Float(1.0), Some(Float(0.0)), None));
    list.push(descriptor("keep_aspect_ratio", "Keep Aspect Ratio", Bool(false), None, None));
    list.push(descriptor(
        "rotation",
        "Rotation",
        Float(0.0),
        Some(Float(0.0)),
        Some(Float(360.0)),
    ));
    list.push(descriptor("position_h", "Position Horizontal", Int(0), None, None));
    list.push(descriptor("position_v", "Position Vertical", Int(0), None, None));
    list.push(descriptor(
        "interpolation",
        "Interpolation",
        Choice("bilinear".into()),
        None,
        None,
    ));
    list
}

/// Interpret a host value as a crop margin.
pub(crate) fn margin_from_value(name: &str, value: &ParamValue) -> Result<Margin> {
    match value {
        ParamValue::Int(px) => u32::try_from(*px).map(Margin::Pixels).map_err(|_| {
            VxError::InvalidParameter(format!("{name}: {px} is not a valid pixel margin"))
        }),
        ParamValue::Float(r) => Ok(Margin::Ratio(*r)),
        other => Err(VxError::InvalidParameter(format!("{name}: unexpected {other:?}"))),
    }
}

pub(crate) fn margin_to_value(margin: Margin) -> ParamValue {
    match margin {
        Margin::Pixels(px) => ParamValue::Int(px as i64),
        Margin::Ratio(r) => ParamValue::Float(r),
    }
}

/// Interpret a host value as a position offset.
pub(crate) fn offset_from_value(name: &str, value: &ParamValue) -> Result<Offset> {
    match value {
        ParamValue::Int(px) => Ok(Offset::Pixels(*px)),
        ParamValue::Float(r) => Ok(Offset::Ratio(*r)),
        other => Err(VxError::InvalidParameter(format!("{name}: unexpected {other:?}"))),
    }
}

pub(crate) fn offset_to_value(offset: Offset) -> ParamValue {
    match offset {
        Offset::Pixels(px) => ParamValue::Int(px),
        Offset::Ratio(r) => ParamValue::Float(r),
    }
}

pub(crate) fn float_from_value(name: &str, value: &ParamValue) -> Result<f64> {
    match value {
        ParamValue::Float(v) => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        other => Err(VxError::InvalidParameter(format!("{name}: unexpected {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_resolution() {
        assert_eq!(Margin::Pixels(12).resolve(100), 12);
        assert_eq!(Margin::Ratio(0.25).resolve(1920), 480);
        assert_eq!(Offset::Ratio(-0.5).resolve(720), -360.0);
    }

    #[test]
    fn test_validation_by_version() {
        let mut params = TransformParameters::default();
        params.crop.left = Margin::Ratio(0.1);
        assert!(params.clone().validated(ParamVersion::V1).is_err());
        assert!(params.clone().validated(ParamVersion::V2).is_ok());

        params.crop.left = Margin::Ratio(1.5);
        assert!(params.clone().validated(ParamVersion::V3).is_err());

        let params = TransformParameters {
            rotation: -90.0,
            ..Default::default()
        };
        assert_eq!(params.validated(ParamVersion::V3).unwrap().rotation, 270.0);
    }

    #[test]
    fn test_stage_dependencies() {
        let rotate = StageSet::affected_by(Stage::Rotate);
        assert!(rotate.contains(Stage::Position));
        assert!(!rotate.contains(Stage::Crop));
        let mut set = StageSet::default();
        assert!(set.is_empty());
        set.insert(StageSet::affected_by(Stage::Crop));
        assert_eq!(set, StageSet::ALL);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_parameters_serialize() {
        let params = TransformParameters {
            scale_type: ScaleType::Crop,
            rotation: 45.0,
            position_h: Offset::Ratio(0.1),
            ..Default::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"crop\""));
        let back: TransformParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_descriptors_cover_params() {
        let names: Vec<String> = descriptors().into_iter().map(|d| d.name).collect();
        for name in ["scale_type", "crop_bottom", "rotation", "position_v", "keep_aspect_ratio"] {
            assert!(names.iter().any(|n| n == name), "missing {name}");
        }
    }
}
