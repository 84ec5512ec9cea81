//! Conversion between bridge wire shapes and typed domain records.
//!
//! Dates cross the bridge as ISO8601 strings and are written with
//! millisecond precision, so a sample with millisecond-precision dates
//! survives `serialize` followed by `deserialize` unchanged.

use crate::bridge::*;
use crate::identifiers::*;
use crate::registry::{self, MetadataShape};
use crate::types::*;
use crate::units::Unit;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

// ============================================================================
// Dates
// ============================================================================

/// Parse a wire date string
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|source| Error::InvalidDate {
            value: value.to_string(),
            source,
        })
}

/// Format a date for the wire: `2024-01-01T00:00:00.000Z`
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_interval(raw: &RawDateInterval) -> Result<DateInterval> {
    Ok(DateInterval {
        from: parse_date(&raw.from)?,
        to: parse_date(&raw.to)?,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| Error::UnexpectedValue {
        field: "uuid".into(),
        value: value.to_string(),
    })
}

// ============================================================================
// Permissions
// ============================================================================

/// Turn a permission set into a presence map.
///
/// Duplicates collapse and input order is irrelevant; an empty set gives an
/// empty map.
pub fn flatten<'a, I>(identifiers: I) -> PermissionMap
where
    I: IntoIterator<Item = &'a PermissionIdentifier>,
{
    identifiers
        .into_iter()
        .map(|id| (id.as_wire().to_string(), true))
        .collect()
}

/// Recover the permission set from a presence map, ignoring `false` entries
pub fn unflatten(map: &PermissionMap) -> Result<BTreeSet<PermissionIdentifier>> {
    map.iter()
        .filter(|(_, present)| **present)
        .map(|(name, _)| name.parse())
        .collect()
}

// ============================================================================
// Metadata
// ============================================================================

fn structured_shape(structured: &StructuredMetadata) -> MetadataShape {
    match structured {
        StructuredMetadata::InsulinDelivery(_) => MetadataShape::InsulinDelivery,
        StructuredMetadata::BloodGlucose(_) => MetadataShape::BloodGlucose,
        StructuredMetadata::HeartRate(_) => MetadataShape::HeartRate,
        StructuredMetadata::Vo2Max(_) => MetadataShape::Vo2Max,
        StructuredMetadata::MenstrualCycle { .. } => MetadataShape::MenstrualCycle,
        StructuredMetadata::SexualActivity { .. } => MetadataShape::SexualActivity,
    }
}

/// Reject structured metadata that does not belong to the sample type
pub fn check_metadata(identifier: &str, shape: MetadataShape, metadata: &Metadata) -> Result<()> {
    match metadata.structured {
        Some(ref structured) if structured_shape(structured) != shape => {
            Err(Error::MetadataMismatch {
                identifier: identifier.to_string(),
                expected: format!("{:?}", shape),
            })
        }
        _ => Ok(()),
    }
}

fn structured_value(structured: &StructuredMetadata) -> Value {
    match *structured {
        StructuredMetadata::InsulinDelivery(reason) => Value::from(match reason {
            InsulinDeliveryReason::Basal => 1,
            InsulinDeliveryReason::Bolus => 2,
        }),
        StructuredMetadata::BloodGlucose(meal_time) => Value::from(match meal_time {
            BloodGlucoseMealTime::Preprandial => 1,
            BloodGlucoseMealTime::Postprandial => 2,
        }),
        StructuredMetadata::HeartRate(context) => Value::from(match context {
            HeartRateMotionContext::NotSet => 0,
            HeartRateMotionContext::Sedentary => 1,
            HeartRateMotionContext::Active => 2,
        }),
        StructuredMetadata::Vo2Max(test_type) => Value::from(match test_type {
            Vo2MaxTestType::MaxExercise => 1,
            Vo2MaxTestType::PredictionSubMaxExercise => 2,
            Vo2MaxTestType::PredictionNonExercise => 3,
        }),
        StructuredMetadata::MenstrualCycle { cycle_start } => Value::Bool(cycle_start),
        StructuredMetadata::SexualActivity { protection_used } => Value::Bool(protection_used),
    }
}

fn decode_structured(shape: MetadataShape, value: &Value) -> Option<StructuredMetadata> {
    let structured = match shape {
        MetadataShape::Empty => return None,
        MetadataShape::InsulinDelivery => {
            StructuredMetadata::InsulinDelivery(match value.as_i64()? {
                1 => InsulinDeliveryReason::Basal,
                2 => InsulinDeliveryReason::Bolus,
                _ => return None,
            })
        }
        MetadataShape::BloodGlucose => StructuredMetadata::BloodGlucose(match value.as_i64()? {
            1 => BloodGlucoseMealTime::Preprandial,
            2 => BloodGlucoseMealTime::Postprandial,
            _ => return None,
        }),
        MetadataShape::HeartRate => StructuredMetadata::HeartRate(match value.as_i64()? {
            0 => HeartRateMotionContext::NotSet,
            1 => HeartRateMotionContext::Sedentary,
            2 => HeartRateMotionContext::Active,
            _ => return None,
        }),
        MetadataShape::Vo2Max => StructuredMetadata::Vo2Max(match value.as_i64()? {
            1 => Vo2MaxTestType::MaxExercise,
            2 => Vo2MaxTestType::PredictionSubMaxExercise,
            3 => Vo2MaxTestType::PredictionNonExercise,
            _ => return None,
        }),
        MetadataShape::MenstrualCycle => StructuredMetadata::MenstrualCycle {
            cycle_start: value.as_bool()?,
        },
        MetadataShape::SexualActivity => StructuredMetadata::SexualActivity {
            protection_used: value.as_bool()?,
        },
    };
    Some(structured)
}

/// Flatten typed metadata into the native key/value map
pub fn metadata_to_wire(metadata: &Metadata) -> RawMetadata {
    let mut raw = metadata.entries.clone();
    if let Some(ref structured) = metadata.structured {
        if let Some(key) = structured_shape(structured).key() {
            raw.insert(key.to_string(), structured_value(structured));
        }
    }
    raw
}

/// Split a native metadata map into its typed part and the remaining keys
pub fn metadata_from_wire(shape: MetadataShape, mut raw: RawMetadata) -> Result<Metadata> {
    let structured = match shape.key().and_then(|key| raw.remove(key).map(|v| (key, v))) {
        Some((key, value)) => Some(decode_structured(shape, &value).ok_or_else(|| {
            Error::UnexpectedValue {
                field: key.to_string(),
                value: value.to_string(),
            }
        })?),
        None => None,
    };
    Ok(Metadata {
        structured,
        entries: raw,
    })
}

// ============================================================================
// Samples
// ============================================================================

pub fn deserialize_quantity_sample(raw: RawQuantitySample) -> Result<QuantitySample> {
    let quantity_type: QuantityTypeIdentifier = raw.quantity_type.parse()?;
    let shape = registry::quantity_entry(quantity_type).metadata;
    Ok(QuantitySample {
        uuid: parse_uuid(&raw.uuid)?,
        quantity_type,
        quantity: raw.quantity,
        unit: Unit::from(raw.unit.as_str()),
        start_date: parse_date(&raw.start_date)?,
        end_date: parse_date(&raw.end_date)?,
        device: raw.device,
        source_revision: raw.source_revision,
        metadata: metadata_from_wire(shape, raw.metadata)?,
    })
}

pub fn serialize_quantity_sample(sample: &QuantitySample) -> RawQuantitySample {
    RawQuantitySample {
        uuid: sample.uuid.to_string(),
        quantity_type: sample.quantity_type.as_wire().to_string(),
        quantity: sample.quantity,
        unit: sample.unit.to_string(),
        start_date: format_date(&sample.start_date),
        end_date: format_date(&sample.end_date),
        device: sample.device.clone(),
        source_revision: sample.source_revision.clone(),
        metadata: metadata_to_wire(&sample.metadata),
    }
}

pub fn deserialize_category_sample(raw: RawCategorySample) -> Result<CategorySample> {
    let category_type: CategoryTypeIdentifier = raw.category_type.parse()?;
    let shape = registry::category_entry(category_type).metadata;
    Ok(CategorySample {
        uuid: parse_uuid(&raw.uuid)?,
        category_type,
        value: raw.value,
        start_date: parse_date(&raw.start_date)?,
        end_date: parse_date(&raw.end_date)?,
        device: raw.device,
        source_revision: raw.source_revision,
        metadata: metadata_from_wire(shape, raw.metadata)?,
    })
}

pub fn serialize_category_sample(sample: &CategorySample) -> RawCategorySample {
    RawCategorySample {
        uuid: sample.uuid.to_string(),
        category_type: sample.category_type.as_wire().to_string(),
        value: sample.value,
        start_date: format_date(&sample.start_date),
        end_date: format_date(&sample.end_date),
        device: sample.device.clone(),
        source_revision: sample.source_revision.clone(),
        metadata: metadata_to_wire(&sample.metadata),
    }
}

pub fn deserialize_sample(raw: RawSample) -> Result<Sample> {
    match raw {
        RawSample::Quantity(q) => deserialize_quantity_sample(q).map(Sample::Quantity),
        RawSample::Category(c) => deserialize_category_sample(c).map(Sample::Category),
    }
}

pub fn serialize_sample(sample: &Sample) -> RawSample {
    match sample {
        Sample::Quantity(q) => RawSample::Quantity(serialize_quantity_sample(q)),
        Sample::Category(c) => RawSample::Category(serialize_category_sample(c)),
    }
}

// ============================================================================
// Correlations and Workouts
// ============================================================================

pub fn deserialize_correlation(raw: RawCorrelation) -> Result<Correlation> {
    Ok(Correlation {
        uuid: parse_uuid(&raw.uuid)?,
        correlation_type: raw.correlation_type.parse()?,
        start_date: parse_date(&raw.start_date)?,
        end_date: parse_date(&raw.end_date)?,
        objects: raw
            .objects
            .into_iter()
            .map(deserialize_sample)
            .collect::<Result<Vec<_>>>()?,
        metadata: metadata_from_wire(MetadataShape::Empty, raw.metadata)?,
    })
}

pub fn serialize_correlation_object(object: &CorrelationObject) -> RawCorrelationObject {
    match object {
        CorrelationObject::Quantity {
            quantity_type,
            unit,
            quantity,
            metadata,
        } => RawCorrelationObject::Quantity {
            quantity_type: quantity_type.as_wire().to_string(),
            unit: unit.to_string(),
            quantity: *quantity,
            metadata: metadata_to_wire(metadata),
        },
        CorrelationObject::Category {
            category_type,
            value,
            metadata,
        } => RawCorrelationObject::Category {
            category_type: category_type.as_wire().to_string(),
            value: *value,
            metadata: metadata_to_wire(metadata),
        },
    }
}

pub fn deserialize_quantity(raw: RawQuantity) -> Quantity {
    Quantity {
        unit: Unit::from(raw.unit.as_str()),
        quantity: raw.quantity,
    }
}

pub fn serialize_quantity(quantity: &Quantity) -> RawQuantity {
    RawQuantity {
        unit: quantity.unit.to_string(),
        quantity: quantity.quantity,
    }
}

pub fn deserialize_workout(raw: RawWorkout) -> Result<Workout> {
    Ok(Workout {
        uuid: parse_uuid(&raw.uuid)?,
        workout_activity_type: WorkoutActivityType::from_raw_value(raw.workout_activity_type)?,
        start_date: parse_date(&raw.start_date)?,
        end_date: parse_date(&raw.end_date)?,
        duration: raw.duration,
        total_energy_burned: raw.total_energy_burned.map(deserialize_quantity),
        total_distance: raw.total_distance.map(deserialize_quantity),
        device: raw.device,
        source_revision: raw.source_revision,
        metadata: metadata_from_wire(MetadataShape::Empty, raw.metadata)?,
    })
}

pub fn serialize_workout(workout: &Workout) -> RawWorkout {
    RawWorkout {
        uuid: workout.uuid.to_string(),
        workout_activity_type: workout.workout_activity_type.raw_value(),
        start_date: format_date(&workout.start_date),
        end_date: format_date(&workout.end_date),
        duration: workout.duration,
        total_energy_burned: workout.total_energy_burned.as_ref().map(serialize_quantity),
        total_distance: workout.total_distance.as_ref().map(serialize_quantity),
        device: workout.device.clone(),
        source_revision: workout.source_revision.clone(),
        metadata: metadata_to_wire(&workout.metadata),
    }
}

// ============================================================================
// Statistics and Characteristics
// ============================================================================

/// Rewrite the optional most-recent interval into dates; all else passes through
pub fn normalize_statistics(raw: RawStatisticsResponse) -> Result<StatisticsResponse> {
    let most_recent_quantity_date_interval = raw
        .most_recent_quantity_date_interval
        .as_ref()
        .map(parse_interval)
        .transpose()?;

    Ok(StatisticsResponse {
        average_quantity: raw.average_quantity.map(deserialize_quantity),
        maximum_quantity: raw.maximum_quantity.map(deserialize_quantity),
        minimum_quantity: raw.minimum_quantity.map(deserialize_quantity),
        sum_quantity: raw.sum_quantity.map(deserialize_quantity),
        most_recent_quantity: raw.most_recent_quantity.map(deserialize_quantity),
        most_recent_quantity_date_interval,
        duration: raw.duration.map(deserialize_quantity),
    })
}

/// Decode a numeric characteristic or status code
pub fn decode_code<T: CharacteristicCode>(raw: &Value) -> Result<T> {
    raw.as_i64()
        .and_then(T::from_code)
        .ok_or_else(|| Error::UnexpectedValue {
            field: T::FIELD.to_string(),
            value: raw.to_string(),
        })
}

/// Decode the date-of-birth characteristic; null means not set
pub fn decode_date_of_birth(raw: &Value) -> Result<Option<DateTime<Utc>>> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) => parse_date(s).map(Some),
        other => Err(Error::UnexpectedValue {
            field: "date of birth".into(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn millis(y: i32, m: u32, d: u32, h: u32, min: u32, ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    fn heart_rate_sample() -> QuantitySample {
        QuantitySample {
            uuid: Uuid::new_v4(),
            quantity_type: QuantityTypeIdentifier::HeartRate,
            quantity: 72.0,
            unit: Unit::CountPerMinute,
            start_date: millis(2024, 3, 10, 9, 30, 125),
            end_date: millis(2024, 3, 10, 9, 30, 125),
            device: Some(Device {
                name: Some("Apple Watch".into()),
                ..Default::default()
            }),
            source_revision: None,
            metadata: Metadata::with_structured(StructuredMetadata::HeartRate(
                HeartRateMotionContext::Sedentary,
            ))
            .insert("HKWasUserEntered", false),
        }
    }

    #[test]
    fn test_format_date_uses_millis_and_z() {
        let date = millis(2024, 1, 1, 0, 0, 0);
        assert_eq!(format_date(&date), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_parse_date_accepts_offsets() {
        let date = parse_date("2024-01-01T02:00:00.000+02:00").unwrap();
        assert_eq!(date, millis(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("yesterday").unwrap_err();
        assert!(matches!(err, Error::InvalidDate { ref value, .. } if value == "yesterday"));
    }

    #[test]
    fn test_quantity_sample_survives_wire_trip() {
        let sample = heart_rate_sample();
        let raw = serialize_quantity_sample(&sample);
        assert_eq!(raw.metadata["HKHeartRateMotionContext"], 1);
        assert_eq!(raw.start_date, "2024-03-10T09:30:00.125Z");
        assert_eq!(deserialize_quantity_sample(raw).unwrap(), sample);
    }

    #[test]
    fn test_category_sample_survives_wire_trip() {
        let sample = Sample::Category(CategorySample {
            uuid: Uuid::new_v4(),
            category_type: CategoryTypeIdentifier::MenstrualFlow,
            value: 3,
            start_date: millis(2024, 5, 1, 0, 0, 0),
            end_date: millis(2024, 5, 1, 23, 59, 999),
            device: None,
            source_revision: Some(SourceRevision {
                source_name: "Cycle".into(),
                bundle_identifier: "com.example.cycle".into(),
                version: None,
            }),
            metadata: Metadata::with_structured(StructuredMetadata::MenstrualCycle {
                cycle_start: true,
            }),
        });
        assert_eq!(deserialize_sample(serialize_sample(&sample)).unwrap(), sample);
    }

    #[test]
    fn test_deserialize_rejects_bad_date() {
        let mut raw = serialize_quantity_sample(&heart_rate_sample());
        raw.end_date = "not a date".into();
        assert!(matches!(
            deserialize_quantity_sample(raw),
            Err(Error::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_metadata_without_shape_keeps_all_keys() {
        let mut raw = RawMetadata::new();
        raw.insert("HKHeartRateMotionContext".into(), Value::from(2));
        let metadata = metadata_from_wire(MetadataShape::Empty, raw).unwrap();
        assert!(metadata.structured.is_none());
        assert_eq!(metadata.entries.len(), 1);
    }

    #[test]
    fn test_metadata_with_bad_structured_value() {
        let mut raw = RawMetadata::new();
        raw.insert("HKBloodGlucoseMealTime".into(), Value::from(9));
        assert!(matches!(
            metadata_from_wire(MetadataShape::BloodGlucose, raw),
            Err(Error::UnexpectedValue { .. })
        ));
    }

    #[test]
    fn test_check_metadata_shape() {
        let metadata = Metadata::with_structured(StructuredMetadata::Vo2Max(
            Vo2MaxTestType::MaxExercise,
        ));
        assert!(check_metadata("vo2Max", MetadataShape::Vo2Max, &metadata).is_ok());
        assert!(matches!(
            check_metadata("stepCount", MetadataShape::Empty, &metadata),
            Err(Error::MetadataMismatch { .. })
        ));
        assert!(check_metadata("stepCount", MetadataShape::Empty, &Metadata::default()).is_ok());
    }

    #[test]
    fn test_flatten_empty_set() {
        let empty: Vec<PermissionIdentifier> = Vec::new();
        assert_eq!(flatten(&empty), PermissionMap::new());
    }

    #[test]
    fn test_flatten_ignores_order_and_duplicates() {
        let a = PermissionIdentifier::Quantity(QuantityTypeIdentifier::StepCount);
        let b = PermissionIdentifier::Category(CategoryTypeIdentifier::SleepAnalysis);

        let forward = flatten(&[a, b]);
        let backward = flatten(&[b, a, b]);

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 2);
        assert_eq!(forward["HKQuantityTypeIdentifierStepCount"], true);
        assert_eq!(forward["HKCategoryTypeIdentifierSleepAnalysis"], true);
    }

    #[test]
    fn test_unflatten_recovers_set() {
        let ids = [
            PermissionIdentifier::Workout,
            PermissionIdentifier::Characteristic(CharacteristicTypeIdentifier::DateOfBirth),
        ];
        let mut map = flatten(&ids);
        map.insert("HKQuantityTypeIdentifierHeight".into(), false);
        let set = unflatten(&map).unwrap();
        assert_eq!(set, ids.iter().copied().collect());
    }

    #[test]
    fn test_statistics_interval_normalized() {
        let raw = RawStatisticsResponse {
            most_recent_quantity: Some(RawQuantity {
                unit: "count".into(),
                quantity: 12.0,
            }),
            most_recent_quantity_date_interval: Some(RawDateInterval {
                from: "2024-01-01T00:00:00.000Z".into(),
                to: "2024-01-02T00:00:00.000Z".into(),
            }),
            ..Default::default()
        };
        let stats = normalize_statistics(raw).unwrap();
        let interval = stats.most_recent_quantity_date_interval.unwrap();
        assert_eq!(interval.from, millis(2024, 1, 1, 0, 0, 0));
        assert_eq!(interval.to, millis(2024, 1, 2, 0, 0, 0));
        assert_eq!(stats.most_recent_quantity, Some(Quantity::new(12.0, "count")));
    }

    #[test]
    fn test_statistics_without_interval_stays_absent() {
        let raw = RawStatisticsResponse {
            sum_quantity: Some(RawQuantity {
                unit: "kcal".into(),
                quantity: 350.5,
            }),
            ..Default::default()
        };
        let stats = normalize_statistics(raw).unwrap();
        assert!(stats.most_recent_quantity_date_interval.is_none());
        assert_eq!(stats.sum_quantity, Some(Quantity::new(350.5, Unit::Kilocalorie)));
    }

    #[test]
    fn test_workout_wire_trip() {
        let workout = Workout {
            uuid: Uuid::new_v4(),
            workout_activity_type: WorkoutActivityType::Running,
            start_date: millis(2024, 6, 1, 7, 0, 0),
            end_date: millis(2024, 6, 1, 7, 45, 0),
            duration: 2700.0,
            total_energy_burned: Some(Quantity::new(480.0, Unit::Kilocalorie)),
            total_distance: Some(Quantity::new(8.2, Unit::Kilometer)),
            device: None,
            source_revision: None,
            metadata: Metadata::default().insert("HKIndoorWorkout", false),
        };
        let raw = serialize_workout(&workout);
        assert_eq!(raw.workout_activity_type, 37);
        assert_eq!(deserialize_workout(raw).unwrap(), workout);
    }

    #[test]
    fn test_decode_codes() {
        let blood: BloodType = decode_code(&Value::from(5)).unwrap();
        assert_eq!(blood, BloodType::AbPositive);
        assert!(decode_code::<BiologicalSex>(&Value::from(42)).is_err());
        assert!(decode_code::<BiologicalSex>(&Value::from("male")).is_err());
    }

    #[test]
    fn test_decode_date_of_birth() {
        assert_eq!(decode_date_of_birth(&Value::Null).unwrap(), None);
        assert_eq!(
            decode_date_of_birth(&Value::from("1990-04-12T00:00:00.000Z")).unwrap(),
            Some(Utc.with_ymd_and_hms(1990, 4, 12, 0, 0, 0).unwrap())
        );
        assert!(decode_date_of_birth(&Value::from(12)).is_err());
    }
}
