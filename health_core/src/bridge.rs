//! The request/response bridge to the native health service.
//!
//! Everything crossing this boundary is in wire form: identifier and unit
//! strings, ISO8601 date strings, flat JSON metadata maps and presence maps.
//! [`HealthBridge`] implementations report failures as [`BridgeError`],
//! which the client propagates unchanged.

use crate::error::BridgeError;
use crate::types::{Device, SourceRevision};
use crate::CharacteristicTypeIdentifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;

/// Result of a single bridge call
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Identifier → `true` presence map used for permission sets
pub type PermissionMap = BTreeMap<String, bool>;

/// Free-form metadata as it crosses the bridge
pub type RawMetadata = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuantitySample {
    pub uuid: String,
    pub quantity_type: String,
    pub quantity: f64,
    pub unit: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: RawMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCategorySample {
    pub uuid: String,
    pub category_type: String,
    pub value: i32,
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: RawMetadata,
}

/// A sample of either kind, distinguished by which type field is present
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSample {
    Quantity(RawQuantitySample),
    Category(RawCategorySample),
}

impl RawSample {
    pub fn type_identifier(&self) -> &str {
        match self {
            RawSample::Quantity(s) => &s.quantity_type,
            RawSample::Category(s) => &s.category_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCorrelation {
    pub uuid: String,
    pub correlation_type: String,
    pub start_date: String,
    pub end_date: String,
    pub objects: Vec<RawSample>,
    #[serde(default)]
    pub metadata: RawMetadata,
}

/// Constituent sent when saving a correlation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCorrelationObject {
    #[serde(rename_all = "camelCase")]
    Quantity {
        quantity_type: String,
        unit: String,
        quantity: f64,
        #[serde(default)]
        metadata: RawMetadata,
    },
    #[serde(rename_all = "camelCase")]
    Category {
        category_type: String,
        value: i32,
        #[serde(default)]
        metadata: RawMetadata,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawQuantity {
    pub unit: String,
    pub quantity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWorkout {
    pub uuid: String,
    pub workout_activity_type: i64,
    pub start_date: String,
    pub end_date: String,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_energy_burned: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<SourceRevision>,
    #[serde(default)]
    pub metadata: RawMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDateInterval {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatisticsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_quantity: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_quantity: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_quantity: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_quantity: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_quantity: Option<RawQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_quantity_date_interval: Option<RawDateInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<RawQuantity>,
}

/// One record from the multiplexed change stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBridgeEvent {
    pub query_id: String,
    pub type_identifier: String,
    #[serde(default)]
    pub samples: Vec<RawSample>,
}

/// Request/response surface of the native health service.
///
/// Workout activity types travel as their native raw values; dates are
/// ISO8601 strings; `None` bounds mean "unbounded".
#[async_trait]
pub trait HealthBridge: Send + Sync {
    async fn is_available(&self) -> BridgeResult<bool>;

    /// Raw characteristic value: a numeric code, or a date string / null for date of birth
    async fn characteristic(&self, kind: CharacteristicTypeIdentifier) -> BridgeResult<Value>;

    async fn authorization_status(&self, identifier: &str) -> BridgeResult<bool>;

    async fn request_authorization(
        &self,
        write: &PermissionMap,
        read: &PermissionMap,
    ) -> BridgeResult<bool>;

    /// Raw request status code (0 unknown, 1 should request, 2 already requested)
    async fn request_status_for(
        &self,
        write: &PermissionMap,
        read: &PermissionMap,
    ) -> BridgeResult<i64>;

    async fn preferred_units(
        &self,
        identifiers: &[String],
    ) -> BridgeResult<HashMap<String, String>>;

    async fn save_quantity(
        &self,
        identifier: &str,
        unit: &str,
        value: f64,
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool>;

    async fn save_category(
        &self,
        identifier: &str,
        value: i32,
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool>;

    async fn save_correlation(
        &self,
        identifier: &str,
        objects: &[RawCorrelationObject],
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool>;

    async fn save_workout(
        &self,
        activity: i64,
        start: &str,
        end: &str,
        energy: Option<&RawQuantity>,
        distance: Option<&RawQuantity>,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool>;

    /// Most recent samples first; a limit of 0 means no limit
    async fn query_last(
        &self,
        identifier: &str,
        limit: u32,
        unit: &str,
    ) -> BridgeResult<Vec<RawQuantitySample>>;

    async fn query_between(
        &self,
        identifier: &str,
        unit: &str,
        from: &str,
        to: &str,
    ) -> BridgeResult<Vec<RawQuantitySample>>;

    async fn query_category(
        &self,
        identifier: &str,
        limit: u32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawCategorySample>>;

    async fn query_correlations(
        &self,
        identifier: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawCorrelation>>;

    async fn query_workouts(
        &self,
        energy_unit: &str,
        distance_unit: &str,
        limit: u32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawWorkout>>;

    async fn query_stats(
        &self,
        identifier: &str,
        unit: &str,
        from: &str,
        to: &str,
        options: &[String],
    ) -> BridgeResult<RawStatisticsResponse>;

    /// Start a native observer; returns the service-issued query id
    async fn start_observing(&self, identifier: &str, unit: Option<&str>) -> BridgeResult<String>;

    async fn stop_observing(&self, query_id: &str) -> BridgeResult<bool>;

    /// Receiver on the single multiplexed change stream
    fn events(&self) -> broadcast::Receiver<RawBridgeEvent>;
}
