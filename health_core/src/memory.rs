//! In-process health service backed by a fixture document.
//!
//! [`MemoryBridge`] implements [`HealthBridge`] over plain data so the client
//! can run without the native platform: tests drive it directly and the CLI
//! loads it from a JSON fixture file. Every call is recorded, saves notify
//! matching observers through the event stream, and values are returned in
//! the units they were stored with (no unit conversion).

use crate::bridge::*;
use crate::error::BridgeError;
use crate::marshal::parse_date;
use crate::{CharacteristicTypeIdentifier, QuantityTypeIdentifier, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of the change stream
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Native error code used for malformed requests
const INVALID_ARGUMENT: i64 = 3;

/// Serialized state of the simulated service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    pub available: bool,
    /// Reject saves for types without write authorization
    pub enforce_authorization: bool,
    /// Characteristic values keyed by short name (e.g. `bloodType`)
    pub characteristics: BTreeMap<String, Value>,
    pub preferred_units: BTreeMap<String, String>,
    /// Types with write (sharing) authorization
    pub authorized: BTreeSet<String>,
    /// Types the user has already been asked about
    pub requested: BTreeSet<String>,
    pub quantity_samples: Vec<RawQuantitySample>,
    pub category_samples: Vec<RawCategorySample>,
    pub correlations: Vec<RawCorrelation>,
    pub workouts: Vec<RawWorkout>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            available: true,
            enforce_authorization: false,
            characteristics: BTreeMap::new(),
            preferred_units: BTreeMap::new(),
            authorized: BTreeSet::new(),
            requested: BTreeSet::new(),
            quantity_samples: Vec::new(),
            category_samples: Vec::new(),
            correlations: Vec::new(),
            workouts: Vec::new(),
        }
    }
}

impl Fixture {
    /// Load a fixture with a shared lock
    ///
    /// Returns an empty fixture if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No fixture found at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let fixture = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded fixture from {:?}", path);
        Ok(fixture)
    }

    /// Save a fixture atomically (temp file, exclusive lock, rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| crate::Error::Io(e.error))?;

        tracing::debug!("Saved fixture to {:?}", path);
        Ok(())
    }
}

/// A recorded bridge call, for asserting on traffic
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeCall {
    IsAvailable,
    Characteristic(CharacteristicTypeIdentifier),
    AuthorizationStatus(String),
    RequestAuthorization {
        write: PermissionMap,
        read: PermissionMap,
    },
    RequestStatusFor {
        write: PermissionMap,
        read: PermissionMap,
    },
    PreferredUnits(Vec<String>),
    SaveQuantity {
        identifier: String,
        unit: String,
        value: f64,
    },
    SaveCategory {
        identifier: String,
        value: i32,
    },
    SaveCorrelation {
        identifier: String,
        objects: usize,
    },
    SaveWorkout {
        activity: i64,
    },
    QueryLast {
        identifier: String,
        limit: u32,
        unit: String,
    },
    QueryBetween {
        identifier: String,
        unit: String,
        from: String,
        to: String,
    },
    QueryCategory {
        identifier: String,
        limit: u32,
    },
    QueryCorrelations {
        identifier: String,
    },
    QueryWorkouts {
        limit: u32,
    },
    QueryStats {
        identifier: String,
        unit: String,
        options: Vec<String>,
    },
    StartObserving {
        identifier: String,
        unit: Option<String>,
    },
    StopObserving(String),
}

#[derive(Debug)]
struct Observer {
    identifier: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    fixture: Fixture,
    observers: HashMap<String, Observer>,
    next_query: u64,
    fail_next_observe: Option<BridgeError>,
    calls: Vec<BridgeCall>,
}

/// Simulated native health service
pub struct MemoryBridge {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<RawBridgeEvent>,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBridge {
    /// Empty, available service
    pub fn new() -> Self {
        Self::from_fixture(Fixture::default(), DEFAULT_EVENT_BUFFER)
    }

    pub fn from_fixture(fixture: Fixture, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            state: Mutex::new(MemoryState {
                fixture,
                ..Default::default()
            }),
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and fail it if the service is unavailable
    fn enter(&self, call: BridgeCall) -> BridgeResult<MutexGuard<'_, MemoryState>> {
        tracing::debug!("Bridge call: {:?}", call);
        let mut state = self.state();
        state.calls.push(call);
        if !state.fixture.available {
            return Err(BridgeError::Unavailable(
                "health data is not available on this device".into(),
            ));
        }
        Ok(state)
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Copy of the current service state
    pub fn snapshot(&self) -> Fixture {
        self.state().fixture.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.state().fixture.available = available;
    }

    pub fn set_enforce_authorization(&self, enforce: bool) {
        self.state().fixture.enforce_authorization = enforce;
    }

    pub fn set_preferred_unit(&self, identifier: QuantityTypeIdentifier, unit: &str) {
        self.state()
            .fixture
            .preferred_units
            .insert(identifier.as_wire().to_string(), unit.to_string());
    }

    pub fn set_characteristic(&self, kind: CharacteristicTypeIdentifier, value: Value) {
        self.state()
            .fixture
            .characteristics
            .insert(kind.short_name().to_string(), value);
    }

    /// Make the next `start_observing` call fail with `error`
    pub fn fail_next_observe(&self, error: BridgeError) {
        self.state().fail_next_observe = Some(error);
    }

    /// Number of native observers currently running
    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }

    pub fn add_quantity_sample(&self, sample: RawQuantitySample) {
        self.state().fixture.quantity_samples.push(sample);
    }

    pub fn add_category_sample(&self, sample: RawCategorySample) {
        self.state().fixture.category_samples.push(sample);
    }

    pub fn add_workout(&self, workout: RawWorkout) {
        self.state().fixture.workouts.push(workout);
    }

    /// Push a raw event onto the change stream
    pub fn emit(&self, event: RawBridgeEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Dropped bridge event: no listeners");
        }
    }

    /// Notify every observer of `identifier` about new samples
    fn notify(&self, state: &MemoryState, identifier: &str, samples: Vec<RawSample>) {
        for (query_id, observer) in &state.observers {
            if observer.identifier == identifier {
                self.emit(RawBridgeEvent {
                    query_id: query_id.clone(),
                    type_identifier: identifier.to_string(),
                    samples: samples.clone(),
                });
            }
        }
    }

    fn check_write(state: &MemoryState, identifier: &str) -> BridgeResult<()> {
        if state.fixture.enforce_authorization && !state.fixture.authorized.contains(identifier) {
            return Err(BridgeError::PermissionDenied(format!(
                "not authorized to share {}",
                identifier
            )));
        }
        Ok(())
    }
}

fn wire_date(value: &str) -> BridgeResult<DateTime<Utc>> {
    parse_date(value).map_err(|e| BridgeError::Rejected {
        code: INVALID_ARGUMENT,
        message: e.to_string(),
    })
}

fn optional_date(value: Option<&str>) -> BridgeResult<Option<DateTime<Utc>>> {
    value.map(wire_date).transpose()
}

/// Whether `[start, end]` lies inside the optional bounds
fn within(
    start: &str,
    end: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> bool {
    let (Ok(start), Ok(end)) = (parse_date(start), parse_date(end)) else {
        tracing::warn!("Skipping stored record with malformed dates {} / {}", start, end);
        return false;
    };
    from.map_or(true, |from| start >= from) && to.map_or(true, |to| end <= to)
}

fn end_key(end: &str) -> Option<DateTime<Utc>> {
    parse_date(end).ok()
}

fn apply_limit<T>(mut items: Vec<T>, limit: u32) -> Vec<T> {
    if limit > 0 {
        items.truncate(limit as usize);
    }
    items
}

#[async_trait]
impl HealthBridge for MemoryBridge {
    async fn is_available(&self) -> BridgeResult<bool> {
        let mut state = self.state();
        state.calls.push(BridgeCall::IsAvailable);
        Ok(state.fixture.available)
    }

    async fn characteristic(&self, kind: CharacteristicTypeIdentifier) -> BridgeResult<Value> {
        let state = self.enter(BridgeCall::Characteristic(kind))?;
        let value = state
            .fixture
            .characteristics
            .get(kind.short_name())
            .cloned()
            .unwrap_or(match kind {
                CharacteristicTypeIdentifier::DateOfBirth => Value::Null,
                _ => Value::from(0),
            });
        Ok(value)
    }

    async fn authorization_status(&self, identifier: &str) -> BridgeResult<bool> {
        let state = self.enter(BridgeCall::AuthorizationStatus(identifier.to_string()))?;
        Ok(state.fixture.authorized.contains(identifier))
    }

    async fn request_authorization(
        &self,
        write: &PermissionMap,
        read: &PermissionMap,
    ) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::RequestAuthorization {
            write: write.clone(),
            read: read.clone(),
        })?;
        for (identifier, _) in write.iter().filter(|(_, present)| **present) {
            state.fixture.authorized.insert(identifier.clone());
            state.fixture.requested.insert(identifier.clone());
        }
        for (identifier, _) in read.iter().filter(|(_, present)| **present) {
            state.fixture.requested.insert(identifier.clone());
        }
        Ok(true)
    }

    async fn request_status_for(
        &self,
        write: &PermissionMap,
        read: &PermissionMap,
    ) -> BridgeResult<i64> {
        let state = self.enter(BridgeCall::RequestStatusFor {
            write: write.clone(),
            read: read.clone(),
        })?;
        let all_requested = write
            .keys()
            .chain(read.keys())
            .all(|identifier| state.fixture.requested.contains(identifier));
        Ok(if all_requested { 2 } else { 1 })
    }

    async fn preferred_units(
        &self,
        identifiers: &[String],
    ) -> BridgeResult<HashMap<String, String>> {
        let state = self.enter(BridgeCall::PreferredUnits(identifiers.to_vec()))?;
        Ok(identifiers
            .iter()
            .filter_map(|id| {
                state
                    .fixture
                    .preferred_units
                    .get(id)
                    .map(|unit| (id.clone(), unit.clone()))
            })
            .collect())
    }

    async fn save_quantity(
        &self,
        identifier: &str,
        unit: &str,
        value: f64,
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::SaveQuantity {
            identifier: identifier.to_string(),
            unit: unit.to_string(),
            value,
        })?;
        Self::check_write(&state, identifier)?;
        wire_date(start)?;
        wire_date(end)?;

        let sample = RawQuantitySample {
            uuid: Uuid::new_v4().to_string(),
            quantity_type: identifier.to_string(),
            quantity: value,
            unit: unit.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            device: None,
            source_revision: None,
            metadata: metadata.clone(),
        };
        state.fixture.quantity_samples.push(sample.clone());
        self.notify(&state, identifier, vec![RawSample::Quantity(sample)]);
        Ok(true)
    }

    async fn save_category(
        &self,
        identifier: &str,
        value: i32,
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::SaveCategory {
            identifier: identifier.to_string(),
            value,
        })?;
        Self::check_write(&state, identifier)?;
        wire_date(start)?;
        wire_date(end)?;

        let sample = RawCategorySample {
            uuid: Uuid::new_v4().to_string(),
            category_type: identifier.to_string(),
            value,
            start_date: start.to_string(),
            end_date: end.to_string(),
            device: None,
            source_revision: None,
            metadata: metadata.clone(),
        };
        state.fixture.category_samples.push(sample.clone());
        self.notify(&state, identifier, vec![RawSample::Category(sample)]);
        Ok(true)
    }

    async fn save_correlation(
        &self,
        identifier: &str,
        objects: &[RawCorrelationObject],
        start: &str,
        end: &str,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::SaveCorrelation {
            identifier: identifier.to_string(),
            objects: objects.len(),
        })?;
        wire_date(start)?;
        wire_date(end)?;

        let samples: Vec<RawSample> = objects
            .iter()
            .map(|object| match object {
                RawCorrelationObject::Quantity {
                    quantity_type,
                    unit,
                    quantity,
                    metadata,
                } => RawSample::Quantity(RawQuantitySample {
                    uuid: Uuid::new_v4().to_string(),
                    quantity_type: quantity_type.clone(),
                    quantity: *quantity,
                    unit: unit.clone(),
                    start_date: start.to_string(),
                    end_date: end.to_string(),
                    device: None,
                    source_revision: None,
                    metadata: metadata.clone(),
                }),
                RawCorrelationObject::Category {
                    category_type,
                    value,
                    metadata,
                } => RawSample::Category(RawCategorySample {
                    uuid: Uuid::new_v4().to_string(),
                    category_type: category_type.clone(),
                    value: *value,
                    start_date: start.to_string(),
                    end_date: end.to_string(),
                    device: None,
                    source_revision: None,
                    metadata: metadata.clone(),
                }),
            })
            .collect();

        for sample in &samples {
            Self::check_write(&state, sample.type_identifier())?;
        }

        state.fixture.correlations.push(RawCorrelation {
            uuid: Uuid::new_v4().to_string(),
            correlation_type: identifier.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            objects: samples.clone(),
            metadata: metadata.clone(),
        });
        for sample in samples {
            self.notify(&state, sample.type_identifier(), vec![sample.clone()]);
            match sample {
                RawSample::Quantity(q) => state.fixture.quantity_samples.push(q),
                RawSample::Category(c) => state.fixture.category_samples.push(c),
            }
        }
        Ok(true)
    }

    /// Workouts are not observable: change subscriptions cover quantity and
    /// category types only, so saving a workout emits no event.
    async fn save_workout(
        &self,
        activity: i64,
        start: &str,
        end: &str,
        energy: Option<&RawQuantity>,
        distance: Option<&RawQuantity>,
        metadata: &RawMetadata,
    ) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::SaveWorkout { activity })?;
        Self::check_write(&state, crate::identifiers::WORKOUT_TYPE_IDENTIFIER)?;
        let duration = (wire_date(end)? - wire_date(start)?).num_milliseconds() as f64 / 1000.0;

        state.fixture.workouts.push(RawWorkout {
            uuid: Uuid::new_v4().to_string(),
            workout_activity_type: activity,
            start_date: start.to_string(),
            end_date: end.to_string(),
            duration,
            total_energy_burned: energy.cloned(),
            total_distance: distance.cloned(),
            device: None,
            source_revision: None,
            metadata: metadata.clone(),
        });
        Ok(true)
    }

    async fn query_last(
        &self,
        identifier: &str,
        limit: u32,
        unit: &str,
    ) -> BridgeResult<Vec<RawQuantitySample>> {
        let state = self.enter(BridgeCall::QueryLast {
            identifier: identifier.to_string(),
            limit,
            unit: unit.to_string(),
        })?;
        let mut samples: Vec<_> = state
            .fixture
            .quantity_samples
            .iter()
            .filter(|s| s.quantity_type == identifier)
            .cloned()
            .collect();
        samples.sort_by_key(|s| std::cmp::Reverse(end_key(&s.end_date)));
        Ok(apply_limit(samples, limit))
    }

    async fn query_between(
        &self,
        identifier: &str,
        unit: &str,
        from: &str,
        to: &str,
    ) -> BridgeResult<Vec<RawQuantitySample>> {
        let state = self.enter(BridgeCall::QueryBetween {
            identifier: identifier.to_string(),
            unit: unit.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })?;
        let (from, to) = (Some(wire_date(from)?), Some(wire_date(to)?));
        let mut samples: Vec<_> = state
            .fixture
            .quantity_samples
            .iter()
            .filter(|s| s.quantity_type == identifier && within(&s.start_date, &s.end_date, from, to))
            .cloned()
            .collect();
        samples.sort_by_key(|s| parse_date(&s.start_date).ok());
        Ok(samples)
    }

    async fn query_category(
        &self,
        identifier: &str,
        limit: u32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawCategorySample>> {
        let state = self.enter(BridgeCall::QueryCategory {
            identifier: identifier.to_string(),
            limit,
        })?;
        let (from, to) = (optional_date(from)?, optional_date(to)?);
        let mut samples: Vec<_> = state
            .fixture
            .category_samples
            .iter()
            .filter(|s| s.category_type == identifier && within(&s.start_date, &s.end_date, from, to))
            .cloned()
            .collect();
        samples.sort_by_key(|s| std::cmp::Reverse(end_key(&s.end_date)));
        Ok(apply_limit(samples, limit))
    }

    async fn query_correlations(
        &self,
        identifier: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawCorrelation>> {
        let state = self.enter(BridgeCall::QueryCorrelations {
            identifier: identifier.to_string(),
        })?;
        let (from, to) = (optional_date(from)?, optional_date(to)?);
        Ok(state
            .fixture
            .correlations
            .iter()
            .filter(|c| {
                c.correlation_type == identifier && within(&c.start_date, &c.end_date, from, to)
            })
            .cloned()
            .collect())
    }

    async fn query_workouts(
        &self,
        _energy_unit: &str,
        _distance_unit: &str,
        limit: u32,
        from: Option<&str>,
        to: Option<&str>,
    ) -> BridgeResult<Vec<RawWorkout>> {
        let state = self.enter(BridgeCall::QueryWorkouts { limit })?;
        let (from, to) = (optional_date(from)?, optional_date(to)?);
        let mut workouts: Vec<_> = state
            .fixture
            .workouts
            .iter()
            .filter(|w| within(&w.start_date, &w.end_date, from, to))
            .cloned()
            .collect();
        workouts.sort_by_key(|w| std::cmp::Reverse(end_key(&w.end_date)));
        Ok(apply_limit(workouts, limit))
    }

    async fn query_stats(
        &self,
        identifier: &str,
        unit: &str,
        from: &str,
        to: &str,
        options: &[String],
    ) -> BridgeResult<RawStatisticsResponse> {
        let state = self.enter(BridgeCall::QueryStats {
            identifier: identifier.to_string(),
            unit: unit.to_string(),
            options: options.to_vec(),
        })?;
        let (from, to) = (Some(wire_date(from)?), Some(wire_date(to)?));
        let samples: Vec<_> = state
            .fixture
            .quantity_samples
            .iter()
            .filter(|s| s.quantity_type == identifier && within(&s.start_date, &s.end_date, from, to))
            .collect();

        let mut response = RawStatisticsResponse::default();
        if samples.is_empty() {
            return Ok(response);
        }

        let quantity = |value: f64| RawQuantity {
            unit: unit.to_string(),
            quantity: value,
        };
        let values: Vec<f64> = samples.iter().map(|s| s.quantity).collect();
        let wants = |option: &str| options.iter().any(|o| o == option);

        if wants("cumulativeSum") {
            response.sum_quantity = Some(quantity(values.iter().sum()));
        }
        if wants("discreteAverage") {
            response.average_quantity =
                Some(quantity(values.iter().sum::<f64>() / values.len() as f64));
        }
        if wants("discreteMin") {
            response.minimum_quantity = Some(quantity(values.iter().copied().fold(f64::INFINITY, f64::min)));
        }
        if wants("discreteMax") {
            response.maximum_quantity =
                Some(quantity(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)));
        }
        if wants("mostRecent") {
            if let Some(latest) = samples.iter().max_by_key(|s| end_key(&s.end_date)) {
                response.most_recent_quantity = Some(quantity(latest.quantity));
                response.most_recent_quantity_date_interval = Some(RawDateInterval {
                    from: latest.start_date.clone(),
                    to: latest.end_date.clone(),
                });
            }
        }
        if wants("duration") {
            let seconds: f64 = samples
                .iter()
                .filter_map(|s| Some((end_key(&s.end_date)? - end_key(&s.start_date)?).num_seconds()))
                .map(|s| s as f64)
                .sum();
            response.duration = Some(RawQuantity {
                unit: "s".into(),
                quantity: seconds,
            });
        }
        Ok(response)
    }

    async fn start_observing(&self, identifier: &str, unit: Option<&str>) -> BridgeResult<String> {
        let mut state = self.enter(BridgeCall::StartObserving {
            identifier: identifier.to_string(),
            unit: unit.map(str::to_string),
        })?;
        if let Some(error) = state.fail_next_observe.take() {
            return Err(error);
        }
        state.next_query += 1;
        let query_id = format!("query-{}", state.next_query);
        state.observers.insert(
            query_id.clone(),
            Observer {
                identifier: identifier.to_string(),
            },
        );
        Ok(query_id)
    }

    async fn stop_observing(&self, query_id: &str) -> BridgeResult<bool> {
        let mut state = self.enter(BridgeCall::StopObserving(query_id.to_string()))?;
        Ok(state.observers.remove(query_id).is_some())
    }

    fn events(&self) -> broadcast::Receiver<RawBridgeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_steps(count: f64, start: &str, end: &str) -> RawQuantitySample {
        RawQuantitySample {
            uuid: Uuid::new_v4().to_string(),
            quantity_type: "HKQuantityTypeIdentifierStepCount".into(),
            quantity: count,
            unit: "count".into(),
            start_date: start.into(),
            end_date: end.into(),
            device: None,
            source_revision: None,
            metadata: RawMetadata::new(),
        }
    }

    fn seeded() -> MemoryBridge {
        let bridge = MemoryBridge::new();
        bridge.add_quantity_sample(raw_steps(
            100.0,
            "2024-01-01T08:00:00.000Z",
            "2024-01-01T09:00:00.000Z",
        ));
        bridge.add_quantity_sample(raw_steps(
            300.0,
            "2024-01-01T12:00:00.000Z",
            "2024-01-01T13:00:00.000Z",
        ));
        bridge.add_quantity_sample(raw_steps(
            200.0,
            "2024-01-02T08:00:00.000Z",
            "2024-01-02T09:00:00.000Z",
        ));
        bridge
    }

    #[tokio::test]
    async fn test_query_last_orders_newest_first() {
        let bridge = seeded();
        let samples = bridge
            .query_last("HKQuantityTypeIdentifierStepCount", 2, "count")
            .await
            .unwrap();
        let counts: Vec<f64> = samples.iter().map(|s| s.quantity).collect();
        assert_eq!(counts, vec![200.0, 300.0]);
    }

    #[tokio::test]
    async fn test_query_between_bounds() {
        let bridge = seeded();
        let samples = bridge
            .query_between(
                "HKQuantityTypeIdentifierStepCount",
                "count",
                "2024-01-01T00:00:00.000Z",
                "2024-01-02T00:00:00.000Z",
            )
            .await
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].quantity, 100.0);
    }

    #[tokio::test]
    async fn test_query_stats() {
        let bridge = seeded();
        let options: Vec<String> = ["cumulativeSum", "discreteMax", "mostRecent"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stats = bridge
            .query_stats(
                "HKQuantityTypeIdentifierStepCount",
                "count",
                "2024-01-01T00:00:00.000Z",
                "2024-01-03T00:00:00.000Z",
                &options,
            )
            .await
            .unwrap();
        assert_eq!(stats.sum_quantity.unwrap().quantity, 600.0);
        assert_eq!(stats.maximum_quantity.unwrap().quantity, 300.0);
        assert_eq!(stats.most_recent_quantity.unwrap().quantity, 200.0);
        assert_eq!(
            stats.most_recent_quantity_date_interval.unwrap().from,
            "2024-01-02T08:00:00.000Z"
        );
        assert!(stats.average_quantity.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_rejects_calls() {
        let bridge = MemoryBridge::new();
        bridge.set_available(false);
        assert!(!bridge.is_available().await.unwrap());
        let err = bridge
            .authorization_status("HKQuantityTypeIdentifierStepCount")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_enforced_authorization() {
        let bridge = MemoryBridge::new();
        bridge.set_enforce_authorization(true);
        let err = bridge
            .save_category(
                "HKCategoryTypeIdentifierMindfulSession",
                0,
                "2024-01-01T00:00:00.000Z",
                "2024-01-01T00:10:00.000Z",
                &RawMetadata::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_save_notifies_observers() {
        let bridge = MemoryBridge::new();
        let mut events = bridge.events();
        let query_id = bridge
            .start_observing("HKQuantityTypeIdentifierStepCount", Some("count"))
            .await
            .unwrap();

        bridge
            .save_quantity(
                "HKQuantityTypeIdentifierStepCount",
                "count",
                42.0,
                "2024-01-01T00:00:00.000Z",
                "2024-01-01T00:01:00.000Z",
                &RawMetadata::new(),
            )
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.query_id, query_id);
        assert_eq!(event.samples.len(), 1);
        assert!(bridge.stop_observing(&query_id).await.unwrap());
        assert!(!bridge.stop_observing(&query_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_workout_save_emits_no_event() {
        let bridge = MemoryBridge::new();
        let mut events = bridge.events();
        bridge
            .start_observing(crate::identifiers::WORKOUT_TYPE_IDENTIFIER, None)
            .await
            .unwrap();

        assert!(bridge
            .save_workout(
                37,
                "2024-01-01T06:00:00.000Z",
                "2024-01-01T07:00:00.000Z",
                None,
                None,
                &RawMetadata::new(),
            )
            .await
            .unwrap());

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert_eq!(bridge.snapshot().workouts.len(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_malformed_date() {
        let bridge = MemoryBridge::new();
        let err = bridge
            .save_quantity(
                "HKQuantityTypeIdentifierStepCount",
                "count",
                1.0,
                "soon",
                "2024-01-01T00:01:00.000Z",
                &RawMetadata::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rejected { code: 3, .. }));
    }

    #[test]
    fn test_fixture_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("fixture.json");

        let mut fixture = Fixture::default();
        fixture
            .preferred_units
            .insert("HKQuantityTypeIdentifierBodyMass".into(), "kg".into());
        fixture.quantity_samples.push(raw_steps(
            5.0,
            "2024-01-01T00:00:00.000Z",
            "2024-01-01T00:00:00.000Z",
        ));
        fixture.save(&path).unwrap();

        let loaded = Fixture::load(&path).unwrap();
        assert_eq!(loaded, fixture);
    }

    #[test]
    fn test_missing_fixture_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loaded = Fixture::load(&temp_dir.path().join("absent.json")).unwrap();
        assert!(loaded.available);
        assert!(loaded.quantity_samples.is_empty());
    }

    #[test]
    fn test_partial_fixture_uses_defaults() {
        let fixture: Fixture = serde_json::from_str(r#"{"authorized": ["HKWorkoutTypeIdentifier"]}"#).unwrap();
        assert!(fixture.available);
        assert!(fixture.authorized.contains("HKWorkoutTypeIdentifier"));
    }
}
