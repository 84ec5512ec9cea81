//! Typed client over a [`HealthBridge`].
//!
//! Every operation converts its typed arguments to wire form, makes one
//! bridge call (plus at most one preferred-unit lookup) and converts the
//! response back. Bridge failures are returned unchanged as
//! [`Error::Bridge`].

use crate::bridge::{HealthBridge, PermissionMap};
use crate::config::Config;
use crate::identifiers::*;
use crate::marshal::*;
use crate::registry::{self, MetadataShape};
use crate::subscription::{self, ChangeCallback, EventHub, Subscription, SubscriptionUpdate};
use crate::types::*;
use crate::units::{check_unit, resolve_unit, Unit, UnitRequest};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Range and limit for sample queries
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results; `None` uses the configured default
    pub limit: Option<u32>,
    /// Unit for quantity queries; ignored by the other kinds
    pub unit: UnitRequest,
}

impl QueryOptions {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn last(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: impl Into<UnitRequest>) -> Self {
        self.unit = unit.into();
        self
    }

    fn has_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    /// Both bounds, defaulting an open start to the epoch and an open end to now
    fn range(&self) -> Result<DateInterval> {
        let from = self.from.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let to = self.to.unwrap_or_else(Utc::now);
        DateInterval::new(from, to)
    }

    fn check_range(&self) -> Result<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => DateInterval::new(from, to).map(|_| ()),
            _ => Ok(()),
        }
    }
}

/// Options for workout queries
#[derive(Clone, Debug)]
pub struct WorkoutQueryOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub energy_unit: Unit,
    pub distance_unit: Unit,
}

impl Default for WorkoutQueryOptions {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: None,
            energy_unit: Unit::Kilocalorie,
            distance_unit: Unit::Meter,
        }
    }
}

/// Application-facing health data client.
///
/// Creating a client starts one task that pumps the bridge's change stream
/// into the subscription hub; it is aborted when the client is dropped.
pub struct HealthClient<B: HealthBridge> {
    bridge: Arc<B>,
    config: Config,
    hub: EventHub,
    pump: JoinHandle<()>,
}

impl<B: HealthBridge> Drop for HealthClient<B> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl<B: HealthBridge + 'static> HealthClient<B> {
    /// Create a client. Must be called from within a tokio runtime.
    pub fn new(bridge: Arc<B>, config: Config) -> Self {
        let hub = EventHub::new();
        let pump = tokio::spawn(hub.clone().run(bridge.events()));
        tracing::debug!("Health client started (strict units: {})", config.units.strict);
        Self {
            bridge,
            config,
            hub,
            pump,
        }
    }

    pub fn bridge(&self) -> &Arc<B> {
        &self.bridge
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    fn limit(&self, limit: Option<u32>) -> u32 {
        limit.unwrap_or(self.config.queries.default_limit)
    }

    /// Ranged queries return everything in range unless a limit is given
    fn ranged_limit(&self, ranged: bool, limit: Option<u32>) -> u32 {
        match (ranged, limit) {
            (true, None) => 0,
            _ => self.limit(limit),
        }
    }

    /// Apply the strict-mode family check to an explicit unit
    fn guard_unit(&self, identifier: QuantityTypeIdentifier, unit: &Unit) -> Result<()> {
        if self.config.units.strict {
            check_unit(identifier, unit)?;
        }
        Ok(())
    }

    async fn unit_for(&self, identifier: QuantityTypeIdentifier, request: UnitRequest) -> Result<Unit> {
        if let UnitRequest::Explicit(ref unit) = request {
            self.guard_unit(identifier, unit)?;
        }
        resolve_unit(self.bridge.as_ref(), identifier, request).await
    }

    // ========================================================================
    // Availability and characteristics
    // ========================================================================

    pub async fn is_available(&self) -> Result<bool> {
        Ok(self.bridge.is_available().await?)
    }

    async fn characteristic(&self, kind: CharacteristicTypeIdentifier) -> Result<Value> {
        tracing::debug!("Reading characteristic {}", kind);
        Ok(self.bridge.characteristic(kind).await?)
    }

    pub async fn biological_sex(&self) -> Result<BiologicalSex> {
        decode_code(&self.characteristic(CharacteristicTypeIdentifier::BiologicalSex).await?)
    }

    pub async fn blood_type(&self) -> Result<BloodType> {
        decode_code(&self.characteristic(CharacteristicTypeIdentifier::BloodType).await?)
    }

    /// Date of birth, or `None` when the user has not set one
    pub async fn date_of_birth(&self) -> Result<Option<DateTime<Utc>>> {
        decode_date_of_birth(&self.characteristic(CharacteristicTypeIdentifier::DateOfBirth).await?)
    }

    pub async fn fitzpatrick_skin_type(&self) -> Result<FitzpatrickSkinType> {
        decode_code(
            &self
                .characteristic(CharacteristicTypeIdentifier::FitzpatrickSkinType)
                .await?,
        )
    }

    pub async fn wheelchair_use(&self) -> Result<WheelchairUse> {
        decode_code(&self.characteristic(CharacteristicTypeIdentifier::WheelchairUse).await?)
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Whether sharing (writing) the given type has been authorized
    pub async fn authorization_status(&self, identifier: impl Into<PermissionIdentifier>) -> Result<bool> {
        let identifier = identifier.into();
        Ok(self.bridge.authorization_status(identifier.as_wire()).await?)
    }

    /// Ask for read and write access.
    ///
    /// Both sets are flattened to presence maps; the service's answer is
    /// returned as-is.
    pub async fn request_authorization(
        &self,
        read: &[PermissionIdentifier],
        write: &[PermissionIdentifier],
    ) -> Result<bool> {
        let (read, write): (PermissionMap, PermissionMap) = (flatten(read), flatten(write));
        tracing::debug!("Requesting authorization: read {:?}, write {:?}", read, write);
        Ok(self.bridge.request_authorization(&write, &read).await?)
    }

    /// Whether requesting these sets would prompt the user
    pub async fn request_status_for(
        &self,
        read: &[PermissionIdentifier],
        write: &[PermissionIdentifier],
    ) -> Result<AuthorizationRequestStatus> {
        let code = self
            .bridge
            .request_status_for(&flatten(write), &flatten(read))
            .await?;
        decode_code(&Value::from(code))
    }

    // ========================================================================
    // Units
    // ========================================================================

    pub async fn preferred_unit(&self, identifier: QuantityTypeIdentifier) -> Result<Unit> {
        resolve_unit(self.bridge.as_ref(), identifier, UnitRequest::PreferFromService).await
    }

    /// Preferred units for several identifiers in one call.
    ///
    /// Identifiers the service reports nothing for are left out.
    pub async fn preferred_units(
        &self,
        identifiers: &[QuantityTypeIdentifier],
    ) -> Result<HashMap<QuantityTypeIdentifier, Unit>> {
        let wire: Vec<String> = identifiers.iter().map(|id| id.as_wire().to_string()).collect();
        let units = self.bridge.preferred_units(&wire).await?;
        Ok(identifiers
            .iter()
            .filter_map(|id| units.get(id.as_wire()).map(|unit| (*id, Unit::from(unit.as_str()))))
            .collect())
    }

    // ========================================================================
    // Saving
    // ========================================================================

    pub async fn save_quantity_sample(
        &self,
        identifier: QuantityTypeIdentifier,
        unit: &Unit,
        value: f64,
        interval: DateInterval,
        metadata: &Metadata,
    ) -> Result<bool> {
        self.guard_unit(identifier, unit)?;
        let shape = registry::quantity_entry(identifier).metadata;
        check_metadata(identifier.as_wire(), shape, metadata)?;

        tracing::debug!("Saving {} {} of {}", value, unit, identifier);
        Ok(self
            .bridge
            .save_quantity(
                identifier.as_wire(),
                unit.as_str(),
                value,
                &format_date(&interval.from),
                &format_date(&interval.to),
                &metadata_to_wire(metadata),
            )
            .await?)
    }

    pub async fn save_category_sample(
        &self,
        identifier: CategoryTypeIdentifier,
        value: i32,
        interval: DateInterval,
        metadata: &Metadata,
    ) -> Result<bool> {
        let entry = registry::category_entry(identifier);
        if self.config.units.strict && !entry.values.contains(value) {
            return Err(Error::UnexpectedValue {
                field: identifier.as_wire().to_string(),
                value: value.to_string(),
            });
        }
        check_metadata(identifier.as_wire(), entry.metadata, metadata)?;

        tracing::debug!("Saving {} = {}", identifier, value);
        Ok(self
            .bridge
            .save_category(
                identifier.as_wire(),
                value,
                &format_date(&interval.from),
                &format_date(&interval.to),
                &metadata_to_wire(metadata),
            )
            .await?)
    }

    pub async fn save_correlation_sample(
        &self,
        identifier: CorrelationTypeIdentifier,
        objects: &[CorrelationObject],
        interval: DateInterval,
        metadata: &Metadata,
    ) -> Result<bool> {
        check_metadata(identifier.as_wire(), MetadataShape::Empty, metadata)?;
        if self.config.units.strict {
            let entry = registry::correlation_entry(identifier);
            for object in objects {
                if !entry.allows(object.identifier()) {
                    return Err(Error::InvalidConstituent {
                        correlation: identifier.as_wire().to_string(),
                        constituent: object.identifier().to_string(),
                    });
                }
                if let CorrelationObject::Quantity {
                    quantity_type, unit, ..
                } = object
                {
                    check_unit(*quantity_type, unit)?;
                }
            }
        }

        let raw: Vec<_> = objects.iter().map(serialize_correlation_object).collect();
        tracing::debug!("Saving {} with {} objects", identifier, raw.len());
        Ok(self
            .bridge
            .save_correlation(
                identifier.as_wire(),
                &raw,
                &format_date(&interval.from),
                &format_date(&interval.to),
                &metadata_to_wire(metadata),
            )
            .await?)
    }

    pub async fn save_workout(
        &self,
        activity: WorkoutActivityType,
        interval: DateInterval,
        energy: Option<&Quantity>,
        distance: Option<&Quantity>,
        metadata: &Metadata,
    ) -> Result<bool> {
        check_metadata(&activity.name(), MetadataShape::Empty, metadata)?;
        if self.config.units.strict {
            if let Some(energy) = energy {
                check_unit(QuantityTypeIdentifier::ActiveEnergyBurned, &energy.unit)?;
            }
            if let Some(distance) = distance {
                let identifier = registry::workout_entry(activity)
                    .distance
                    .unwrap_or(QuantityTypeIdentifier::DistanceWalkingRunning);
                check_unit(identifier, &distance.unit)?;
            }
        }

        tracing::debug!("Saving {} workout", activity);
        Ok(self
            .bridge
            .save_workout(
                activity.raw_value(),
                &format_date(&interval.from),
                &format_date(&interval.to),
                energy.map(serialize_quantity).as_ref(),
                distance.map(serialize_quantity).as_ref(),
                &metadata_to_wire(metadata),
            )
            .await?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Quantity samples: newest first without a range, chronological with one
    pub async fn query_quantity_samples(
        &self,
        identifier: QuantityTypeIdentifier,
        options: QueryOptions,
    ) -> Result<Vec<QuantitySample>> {
        options.check_range()?;
        let unit = self.unit_for(identifier, options.unit.clone()).await?;

        let raw = if options.has_range() {
            let range = options.range()?;
            let mut samples = self
                .bridge
                .query_between(
                    identifier.as_wire(),
                    unit.as_str(),
                    &format_date(&range.from),
                    &format_date(&range.to),
                )
                .await?;
            if let Some(limit) = options.limit.filter(|limit| *limit > 0) {
                samples.truncate(limit as usize);
            }
            samples
        } else {
            self.bridge
                .query_last(identifier.as_wire(), self.limit(options.limit), unit.as_str())
                .await?
        };

        tracing::debug!("{} returned {} samples", identifier, raw.len());
        raw.into_iter().map(deserialize_quantity_sample).collect()
    }

    pub async fn query_category_samples(
        &self,
        identifier: CategoryTypeIdentifier,
        options: QueryOptions,
    ) -> Result<Vec<CategorySample>> {
        options.check_range()?;
        let (from, to) = (options.from.map(|d| format_date(&d)), options.to.map(|d| format_date(&d)));
        let raw = self
            .bridge
            .query_category(
                identifier.as_wire(),
                self.ranged_limit(options.has_range(), options.limit),
                from.as_deref(),
                to.as_deref(),
            )
            .await?;
        raw.into_iter().map(deserialize_category_sample).collect()
    }

    pub async fn query_correlation_samples(
        &self,
        identifier: CorrelationTypeIdentifier,
        options: QueryOptions,
    ) -> Result<Vec<Correlation>> {
        options.check_range()?;
        let (from, to) = (options.from.map(|d| format_date(&d)), options.to.map(|d| format_date(&d)));
        let raw = self
            .bridge
            .query_correlations(identifier.as_wire(), from.as_deref(), to.as_deref())
            .await?;
        let mut correlations = raw
            .into_iter()
            .map(deserialize_correlation)
            .collect::<Result<Vec<_>>>()?;
        if let Some(limit) = options.limit.filter(|limit| *limit > 0) {
            correlations.truncate(limit as usize);
        }
        Ok(correlations)
    }

    pub async fn query_workouts(&self, options: WorkoutQueryOptions) -> Result<Vec<Workout>> {
        if let (Some(from), Some(to)) = (options.from, options.to) {
            DateInterval::new(from, to)?;
        }
        let (from, to) = (options.from.map(|d| format_date(&d)), options.to.map(|d| format_date(&d)));
        let raw = self
            .bridge
            .query_workouts(
                options.energy_unit.as_str(),
                options.distance_unit.as_str(),
                self.ranged_limit(options.from.is_some() || options.to.is_some(), options.limit),
                from.as_deref(),
                to.as_deref(),
            )
            .await?;
        raw.into_iter().map(deserialize_workout).collect()
    }

    pub async fn most_recent_quantity_sample(
        &self,
        identifier: QuantityTypeIdentifier,
        unit: impl Into<UnitRequest>,
    ) -> Result<Option<QuantitySample>> {
        let samples = self
            .query_quantity_samples(identifier, QueryOptions::last(1).with_unit(unit))
            .await?;
        Ok(samples.into_iter().next())
    }

    pub async fn most_recent_category_sample(
        &self,
        identifier: CategoryTypeIdentifier,
    ) -> Result<Option<CategorySample>> {
        let samples = self
            .query_category_samples(identifier, QueryOptions::last(1))
            .await?;
        Ok(samples.into_iter().next())
    }

    pub async fn most_recent_workout(&self) -> Result<Option<Workout>> {
        let workouts = self
            .query_workouts(WorkoutQueryOptions {
                limit: Some(1),
                ..WorkoutQueryOptions::default()
            })
            .await?;
        Ok(workouts.into_iter().next())
    }

    /// Aggregate a quantity type over `[from, to]`
    pub async fn query_statistics(
        &self,
        identifier: QuantityTypeIdentifier,
        options: &[StatisticsOption],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        unit: impl Into<UnitRequest>,
    ) -> Result<StatisticsResponse> {
        let range = DateInterval::new(from, to)?;
        let unit = self.unit_for(identifier, unit.into()).await?;
        let options: Vec<String> = options.iter().map(|o| o.as_wire().to_string()).collect();

        tracing::debug!("Statistics for {} in {}: {:?}", identifier, unit, options);
        let raw = self
            .bridge
            .query_stats(
                identifier.as_wire(),
                unit.as_str(),
                &format_date(&range.from),
                &format_date(&range.to),
                &options,
            )
            .await?;
        normalize_statistics(raw)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Call `callback` whenever samples of `identifier` change.
    ///
    /// Quantity subscriptions resolve their unit first; if that or the
    /// native observer fails, nothing stays registered.
    pub async fn subscribe_to_changes<F>(
        &self,
        identifier: SampleIdentifier,
        unit: UnitRequest,
        callback: F,
    ) -> Result<Subscription<B>>
    where
        F: Fn(SubscriptionUpdate) + Send + Sync + 'static,
    {
        let unit = match identifier {
            SampleIdentifier::Quantity(id) => Some(self.unit_for(id, unit).await?),
            SampleIdentifier::Category(_) => None,
        };
        let callback: ChangeCallback = Arc::new(callback);
        subscription::subscribe(Arc::clone(&self.bridge), &self.hub, identifier, unit, callback).await
    }
}
