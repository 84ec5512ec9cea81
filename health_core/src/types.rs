//! Core domain types for health data.
//!
//! This module defines the typed records application code works with:
//! - Samples (quantity and category) and their metadata
//! - Correlations and workouts
//! - Statistics results
//! - Characteristics and authorization results

use crate::identifiers::*;
use crate::units::Unit;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// Time and Provenance
// ============================================================================

/// Closed time interval with `from <= to`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateInterval {
    /// Build an interval, rejecting an end before the start
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if to < from {
            return Err(Error::InvalidInterval {
                start: from.to_rfc3339(),
                end: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }

    /// Zero-length interval at a single instant
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { from: at, to: at }
    }
}

/// Device that recorded a sample
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

/// App and version that wrote a sample
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRevision {
    pub source_name: String,
    pub bundle_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ============================================================================
// Metadata
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsulinDeliveryReason {
    Basal,
    Bolus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodGlucoseMealTime {
    Preprandial,
    Postprandial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRateMotionContext {
    NotSet,
    Sedentary,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vo2MaxTestType {
    MaxExercise,
    PredictionSubMaxExercise,
    PredictionNonExercise,
}

/// Typed metadata value whose presence depends on the sample type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StructuredMetadata {
    InsulinDelivery(InsulinDeliveryReason),
    BloodGlucose(BloodGlucoseMealTime),
    HeartRate(HeartRateMotionContext),
    Vo2Max(Vo2MaxTestType),
    MenstrualCycle { cycle_start: bool },
    SexualActivity { protection_used: bool },
}

/// Sample metadata: an optional typed part plus free-form native keys
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredMetadata>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub entries: Map<String, Value>,
}

impl Metadata {
    pub fn with_structured(structured: StructuredMetadata) -> Self {
        Self {
            structured: Some(structured),
            entries: Map::new(),
        }
    }

    /// Add a free-form native key
    pub fn insert(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.structured.is_none() && self.entries.is_empty()
    }
}

// ============================================================================
// Samples
// ============================================================================

/// A single numeric measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantitySample {
    pub uuid: Uuid,
    pub quantity_type: QuantityTypeIdentifier,
    pub quantity: f64,
    pub unit: Unit,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A single enumerated measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySample {
    pub uuid: Uuid,
    pub category_type: CategoryTypeIdentifier,
    pub value: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CategorySample {
    /// Native name of the category value, if the registry knows it
    pub fn value_name(&self) -> Option<&'static str> {
        crate::registry::category_entry(self.category_type)
            .values
            .name_of(self.value)
    }
}

/// Either kind of sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sample {
    Quantity(QuantitySample),
    Category(CategorySample),
}

impl Sample {
    pub fn identifier(&self) -> SampleIdentifier {
        match self {
            Sample::Quantity(s) => SampleIdentifier::Quantity(s.quantity_type),
            Sample::Category(s) => SampleIdentifier::Category(s.category_type),
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Sample::Quantity(s) => s.uuid,
            Sample::Category(s) => s.uuid,
        }
    }

    pub fn interval(&self) -> DateInterval {
        match self {
            Sample::Quantity(s) => DateInterval {
                from: s.start_date,
                to: s.end_date,
            },
            Sample::Category(s) => DateInterval {
                from: s.start_date,
                to: s.end_date,
            },
        }
    }
}

// ============================================================================
// Correlations and Workouts
// ============================================================================

/// A group of samples sharing one time interval
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub uuid: Uuid,
    pub correlation_type: CorrelationTypeIdentifier,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub objects: Vec<Sample>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A constituent supplied when saving a correlation
#[derive(Clone, Debug, PartialEq)]
pub enum CorrelationObject {
    Quantity {
        quantity_type: QuantityTypeIdentifier,
        unit: Unit,
        quantity: f64,
        metadata: Metadata,
    },
    Category {
        category_type: CategoryTypeIdentifier,
        value: i32,
        metadata: Metadata,
    },
}

impl CorrelationObject {
    pub fn identifier(&self) -> SampleIdentifier {
        match self {
            CorrelationObject::Quantity { quantity_type, .. } => (*quantity_type).into(),
            CorrelationObject::Category { category_type, .. } => (*category_type).into(),
        }
    }
}

/// Numeric value paired with its unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub unit: Unit,
    pub quantity: f64,
}

impl Quantity {
    pub fn new(quantity: f64, unit: impl Into<Unit>) -> Self {
        Self {
            unit: unit.into(),
            quantity,
        }
    }
}

/// A timed activity record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub uuid: Uuid,
    pub workout_activity_type: WorkoutActivityType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Duration in seconds as reported by the service
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_energy_burned: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: Metadata,
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregations to request from a statistics query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatisticsOption {
    CumulativeSum,
    DiscreteAverage,
    DiscreteMin,
    DiscreteMax,
    MostRecent,
    Duration,
    SeparateBySource,
}

impl StatisticsOption {
    pub const ALL: &'static [StatisticsOption] = &[
        Self::CumulativeSum,
        Self::DiscreteAverage,
        Self::DiscreteMin,
        Self::DiscreteMax,
        Self::MostRecent,
        Self::Duration,
        Self::SeparateBySource,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::CumulativeSum => "cumulativeSum",
            Self::DiscreteAverage => "discreteAverage",
            Self::DiscreteMin => "discreteMin",
            Self::DiscreteMax => "discreteMax",
            Self::MostRecent => "mostRecent",
            Self::Duration => "duration",
            Self::SeparateBySource => "separateBySource",
        }
    }
}

impl std::str::FromStr for StatisticsOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|option| option.as_wire() == s)
            .ok_or_else(|| Error::UnexpectedValue {
                field: "statistics option".into(),
                value: s.to_string(),
            })
    }
}

/// Aggregated results for one quantity type over a time range
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_quantity_date_interval: Option<DateInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Quantity>,
}

// ============================================================================
// Characteristics and Authorization
// ============================================================================

/// Decode a native characteristic code into its typed value
pub trait CharacteristicCode: Sized {
    const FIELD: &'static str;
    fn from_code(code: i64) -> Option<Self>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BloodType {
    NotSet,
    APositive,
    ANegative,
    BPositive,
    BNegative,
    AbPositive,
    AbNegative,
    OPositive,
    ONegative,
}

impl CharacteristicCode for BloodType {
    const FIELD: &'static str = "blood type";

    fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NotSet,
            1 => Self::APositive,
            2 => Self::ANegative,
            3 => Self::BPositive,
            4 => Self::BNegative,
            5 => Self::AbPositive,
            6 => Self::AbNegative,
            7 => Self::OPositive,
            8 => Self::ONegative,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BiologicalSex {
    NotSet,
    Female,
    Male,
    Other,
}

impl CharacteristicCode for BiologicalSex {
    const FIELD: &'static str = "biological sex";

    fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NotSet,
            1 => Self::Female,
            2 => Self::Male,
            3 => Self::Other,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitzpatrickSkinType {
    #[serde(rename = "notSet")]
    NotSet,
    I,
    II,
    III,
    IV,
    V,
    VI,
}

impl CharacteristicCode for FitzpatrickSkinType {
    const FIELD: &'static str = "skin type";

    fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NotSet,
            1 => Self::I,
            2 => Self::II,
            3 => Self::III,
            4 => Self::IV,
            5 => Self::V,
            6 => Self::VI,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WheelchairUse {
    NotSet,
    No,
    Yes,
}

impl CharacteristicCode for WheelchairUse {
    const FIELD: &'static str = "wheelchair use";

    fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NotSet,
            1 => Self::No,
            2 => Self::Yes,
            _ => return None,
        })
    }
}

/// Whether asking for a permission set would show a prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationRequestStatus {
    Unknown,
    ShouldRequest,
    AlreadyRequested,
}

impl CharacteristicCode for AuthorizationRequestStatus {
    const FIELD: &'static str = "authorization request status";

    fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::ShouldRequest,
            2 => Self::AlreadyRequested,
            _ => return None,
        })
    }
}
