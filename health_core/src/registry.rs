//! Identifier-capability registry.
//!
//! Maps every known identifier to the unit family it accepts, the shape of
//! structured metadata it carries, and (for correlations and workouts) the
//! sample types that may accompany it. Entry lookups are exhaustive matches,
//! so every identifier has exactly one entry by construction; the cached
//! [`Registry`] adds a name index and the full entry lists.

use crate::identifiers::*;
use crate::units::UnitFamily;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Structured metadata a sample type may carry beyond the common keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataShape {
    Empty,
    InsulinDelivery,
    BloodGlucose,
    HeartRate,
    Vo2Max,
    MenstrualCycle,
    SexualActivity,
}

impl MetadataShape {
    /// Native metadata key carrying the structured value, if any
    pub fn key(&self) -> Option<&'static str> {
        match self {
            MetadataShape::Empty => None,
            MetadataShape::InsulinDelivery => Some("HKInsulinDeliveryReason"),
            MetadataShape::BloodGlucose => Some("HKBloodGlucoseMealTime"),
            MetadataShape::HeartRate => Some("HKHeartRateMotionContext"),
            MetadataShape::Vo2Max => Some("HKVO2MaxTestType"),
            MetadataShape::MenstrualCycle => Some("HKMenstrualCycleStart"),
            MetadataShape::SexualActivity => Some("HKSexualActivityProtectionUsed"),
        }
    }
}

/// Legal value codes of a category type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryValueSet {
    NotApplicable,
    SleepAnalysis,
    AppleStandHour,
    MenstrualFlow,
    CervicalMucusQuality,
    OvulationTestResult,
    AudioExposureEvent,
    Severity,
}

impl CategoryValueSet {
    /// (code, name) pairs accepted for this value set
    pub fn values(&self) -> &'static [(i32, &'static str)] {
        match self {
            CategoryValueSet::NotApplicable => &[(0, "notApplicable")],
            CategoryValueSet::SleepAnalysis => &[
                (0, "inBed"),
                (1, "asleepUnspecified"),
                (2, "awake"),
                (3, "asleepCore"),
                (4, "asleepDeep"),
                (5, "asleepREM"),
            ],
            CategoryValueSet::AppleStandHour => &[(0, "stood"), (1, "idle")],
            CategoryValueSet::MenstrualFlow => &[
                (1, "unspecified"),
                (2, "light"),
                (3, "medium"),
                (4, "heavy"),
                (5, "none"),
            ],
            CategoryValueSet::CervicalMucusQuality => &[
                (1, "dry"),
                (2, "sticky"),
                (3, "creamy"),
                (4, "watery"),
                (5, "eggWhite"),
            ],
            CategoryValueSet::OvulationTestResult => &[
                (1, "negative"),
                (2, "luteinizingHormoneSurge"),
                (3, "indeterminate"),
                (4, "estrogenSurge"),
            ],
            CategoryValueSet::AudioExposureEvent => &[(1, "momentaryLimit")],
            CategoryValueSet::Severity => &[
                (0, "unspecified"),
                (1, "notPresent"),
                (2, "mild"),
                (3, "moderate"),
                (4, "severe"),
            ],
        }
    }

    pub fn contains(&self, code: i32) -> bool {
        self.values().iter().any(|(c, _)| *c == code)
    }

    pub fn name_of(&self, code: i32) -> Option<&'static str> {
        self.values()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    pub fn code_of(&self, name: &str) -> Option<i32> {
        self.values()
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| *code)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuantityEntry {
    pub identifier: QuantityTypeIdentifier,
    pub unit_family: UnitFamily,
    pub metadata: MetadataShape,
    /// Whether statistics over this type sum (cumulative) or aggregate (discrete)
    pub cumulative: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryEntry {
    pub identifier: CategoryTypeIdentifier,
    pub values: CategoryValueSet,
    pub metadata: MetadataShape,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CorrelationEntry {
    pub identifier: CorrelationTypeIdentifier,
    pub constituents: &'static [SampleIdentifier],
}

impl CorrelationEntry {
    pub fn allows(&self, constituent: SampleIdentifier) -> bool {
        self.constituents.contains(&constituent)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WorkoutEntry {
    pub activity: WorkoutActivityType,
    /// Quantity type that records distance for this activity, if it has one
    pub distance: Option<QuantityTypeIdentifier>,
}

/// Registry entry for any identifier, as returned by name lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryEntry {
    Quantity(QuantityEntry),
    Category(CategoryEntry),
    Correlation(CorrelationEntry),
    Workout(WorkoutEntry),
}

/// Capability entry for a quantity identifier
pub fn quantity_entry(identifier: QuantityTypeIdentifier) -> QuantityEntry {
    use QuantityTypeIdentifier as Q;

    let (unit_family, metadata, cumulative) = match identifier {
        Q::StepCount | Q::PushCount | Q::SwimmingStrokeCount | Q::FlightsClimbed => {
            (UnitFamily::Count, MetadataShape::Empty, true)
        }
        Q::NumberOfTimesFallen => (UnitFamily::Count, MetadataShape::Empty, true),
        Q::DistanceWalkingRunning
        | Q::DistanceCycling
        | Q::DistanceSwimming
        | Q::DistanceWheelchair
        | Q::DistanceDownhillSnowSports => (UnitFamily::Length, MetadataShape::Empty, true),
        Q::ActiveEnergyBurned | Q::BasalEnergyBurned | Q::DietaryEnergyConsumed => {
            (UnitFamily::Energy, MetadataShape::Empty, true)
        }
        Q::AppleExerciseTime | Q::AppleStandTime => (UnitFamily::Time, MetadataShape::Empty, true),
        Q::HeartRate => (UnitFamily::CountPerTime, MetadataShape::HeartRate, false),
        Q::RestingHeartRate | Q::WalkingHeartRateAverage | Q::RespiratoryRate => {
            (UnitFamily::CountPerTime, MetadataShape::Empty, false)
        }
        Q::HeartRateVariabilitySdnn => (UnitFamily::Time, MetadataShape::Empty, false),
        Q::OxygenSaturation | Q::BodyFatPercentage => {
            (UnitFamily::Percent, MetadataShape::Empty, false)
        }
        Q::BodyTemperature | Q::BasalBodyTemperature => {
            (UnitFamily::Temperature, MetadataShape::Empty, false)
        }
        Q::BloodPressureSystolic | Q::BloodPressureDiastolic => {
            (UnitFamily::Pressure, MetadataShape::Empty, false)
        }
        Q::Vo2Max => (UnitFamily::OxygenConsumption, MetadataShape::Vo2Max, false),
        Q::BodyMass | Q::LeanBodyMass => (UnitFamily::Mass, MetadataShape::Empty, false),
        Q::BodyMassIndex | Q::UvExposure => (UnitFamily::Count, MetadataShape::Empty, false),
        Q::Height | Q::WaistCircumference => (UnitFamily::Length, MetadataShape::Empty, false),
        Q::BloodGlucose => (UnitFamily::BloodGlucose, MetadataShape::BloodGlucose, false),
        Q::InsulinDelivery => (UnitFamily::Pharmacology, MetadataShape::InsulinDelivery, true),
        Q::DietaryCarbohydrates
        | Q::DietaryProtein
        | Q::DietaryFatTotal
        | Q::DietarySugar
        | Q::DietaryCaffeine => (UnitFamily::Mass, MetadataShape::Empty, true),
        Q::DietaryWater => (UnitFamily::Volume, MetadataShape::Empty, true),
        Q::EnvironmentalAudioExposure | Q::HeadphoneAudioExposure => {
            (UnitFamily::SoundLevel, MetadataShape::Empty, false)
        }
        Q::WalkingSpeed => (UnitFamily::Speed, MetadataShape::Empty, false),
    };

    QuantityEntry {
        identifier,
        unit_family,
        metadata,
        cumulative,
    }
}

/// Capability entry for a category identifier
pub fn category_entry(identifier: CategoryTypeIdentifier) -> CategoryEntry {
    use CategoryTypeIdentifier as C;

    let (values, metadata) = match identifier {
        C::SleepAnalysis => (CategoryValueSet::SleepAnalysis, MetadataShape::Empty),
        C::AppleStandHour => (CategoryValueSet::AppleStandHour, MetadataShape::Empty),
        C::MenstrualFlow => (CategoryValueSet::MenstrualFlow, MetadataShape::MenstrualCycle),
        C::CervicalMucusQuality => (CategoryValueSet::CervicalMucusQuality, MetadataShape::Empty),
        C::OvulationTestResult => (CategoryValueSet::OvulationTestResult, MetadataShape::Empty),
        C::SexualActivity => (CategoryValueSet::NotApplicable, MetadataShape::SexualActivity),
        C::AudioExposureEvent => (CategoryValueSet::AudioExposureEvent, MetadataShape::Empty),
        C::Headache | C::Nausea | C::Fatigue | C::Dizziness => {
            (CategoryValueSet::Severity, MetadataShape::Empty)
        }
        C::MindfulSession
        | C::IntermenstrualBleeding
        | C::HighHeartRateEvent
        | C::LowHeartRateEvent
        | C::IrregularHeartRhythmEvent
        | C::ToothbrushingEvent
        | C::HandwashingEvent => (CategoryValueSet::NotApplicable, MetadataShape::Empty),
    };

    CategoryEntry {
        identifier,
        values,
        metadata,
    }
}

const BLOOD_PRESSURE_CONSTITUENTS: &[SampleIdentifier] = &[
    SampleIdentifier::Quantity(QuantityTypeIdentifier::BloodPressureSystolic),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::BloodPressureDiastolic),
];

const FOOD_CONSTITUENTS: &[SampleIdentifier] = &[
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryEnergyConsumed),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryCarbohydrates),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryProtein),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryFatTotal),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietarySugar),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryWater),
    SampleIdentifier::Quantity(QuantityTypeIdentifier::DietaryCaffeine),
];

/// Capability entry for a correlation identifier
pub fn correlation_entry(identifier: CorrelationTypeIdentifier) -> CorrelationEntry {
    let constituents = match identifier {
        CorrelationTypeIdentifier::BloodPressure => BLOOD_PRESSURE_CONSTITUENTS,
        CorrelationTypeIdentifier::Food => FOOD_CONSTITUENTS,
    };
    CorrelationEntry {
        identifier,
        constituents,
    }
}

/// Capability entry for a workout activity type
pub fn workout_entry(activity: WorkoutActivityType) -> WorkoutEntry {
    use QuantityTypeIdentifier as Q;
    use WorkoutActivityType as W;

    let distance = match activity {
        W::Running | W::Walking | W::Hiking => Some(Q::DistanceWalkingRunning),
        W::Cycling => Some(Q::DistanceCycling),
        W::Swimming => Some(Q::DistanceSwimming),
        W::WheelchairWalkPace | W::WheelchairRunPace => Some(Q::DistanceWheelchair),
        W::DownhillSkiing | W::Snowboarding => Some(Q::DistanceDownhillSnowSports),
        _ => None,
    };

    WorkoutEntry { activity, distance }
}

/// Cached registry - built once and reused across all lookups
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::build);

/// Name-indexed view over every registry entry
#[derive(Debug)]
pub struct Registry {
    by_name: HashMap<&'static str, RegistryEntry>,
    pub quantities: Vec<QuantityEntry>,
    pub categories: Vec<CategoryEntry>,
    pub correlations: Vec<CorrelationEntry>,
    pub workouts: Vec<WorkoutEntry>,
}

impl Registry {
    /// Get a reference to the cached registry
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    fn build() -> Self {
        let quantities: Vec<_> = QuantityTypeIdentifier::ALL
            .iter()
            .map(|id| quantity_entry(*id))
            .collect();
        let categories: Vec<_> = CategoryTypeIdentifier::ALL
            .iter()
            .map(|id| category_entry(*id))
            .collect();
        let correlations: Vec<_> = CorrelationTypeIdentifier::ALL
            .iter()
            .map(|id| correlation_entry(*id))
            .collect();
        let workouts: Vec<_> = WorkoutActivityType::ALL
            .iter()
            .map(|activity| workout_entry(*activity))
            .collect();

        let mut by_name = HashMap::new();
        for entry in &quantities {
            let e = RegistryEntry::Quantity(*entry);
            by_name.insert(entry.identifier.as_wire(), e);
            by_name.insert(entry.identifier.short_name(), e);
        }
        for entry in &categories {
            let e = RegistryEntry::Category(*entry);
            by_name.insert(entry.identifier.as_wire(), e);
            by_name.insert(entry.identifier.short_name(), e);
        }
        for entry in &correlations {
            let e = RegistryEntry::Correlation(*entry);
            by_name.insert(entry.identifier.as_wire(), e);
            by_name.insert(entry.identifier.short_name(), e);
        }

        tracing::debug!("Built identifier registry with {} names", by_name.len());

        Registry {
            by_name,
            quantities,
            categories,
            correlations,
            workouts,
        }
    }

    /// Look up any identifier by wire or short name.
    ///
    /// Workout activities are matched by camel-case name or raw value.
    pub fn lookup(&self, name: &str) -> Result<RegistryEntry> {
        if let Some(entry) = self.by_name.get(name) {
            return Ok(*entry);
        }
        name.parse::<WorkoutActivityType>()
            .map(|activity| RegistryEntry::Workout(workout_entry(activity)))
            .map_err(|_| Error::UnknownIdentifier(name.to_string()))
    }

    /// Check the table for internal consistency
    ///
    /// Returns a list of problems, or empty Vec if consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for entry in &self.quantities {
            if crate::units::Unit::in_family(entry.unit_family).is_empty() {
                errors.push(format!(
                    "{} uses unit family {:?} with no named units",
                    entry.identifier, entry.unit_family
                ));
            }
        }

        for entry in &self.categories {
            if entry.values.values().is_empty() {
                errors.push(format!("{} has no legal values", entry.identifier));
            }
        }

        for entry in &self.correlations {
            if entry.constituents.is_empty() {
                errors.push(format!("{} has no constituents", entry.identifier));
            }
        }

        for entry in &self.workouts {
            if let Some(distance) = entry.distance {
                if quantity_entry(distance).unit_family != UnitFamily::Length {
                    errors.push(format!(
                        "Workout {} records distance with non-length type {}",
                        entry.activity, distance
                    ));
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_identifier() {
        let registry = Registry::global();
        assert_eq!(registry.quantities.len(), QuantityTypeIdentifier::ALL.len());
        assert_eq!(registry.categories.len(), CategoryTypeIdentifier::ALL.len());
        assert_eq!(registry.correlations.len(), CorrelationTypeIdentifier::ALL.len());
        assert_eq!(registry.workouts.len(), WorkoutActivityType::ALL.len());
    }

    #[test]
    fn test_each_name_maps_to_exactly_one_entry() {
        let registry = Registry::global();
        for id in QuantityTypeIdentifier::ALL {
            let by_wire = registry.lookup(id.as_wire()).unwrap();
            let by_short = registry.lookup(id.short_name()).unwrap();
            assert_eq!(by_wire, by_short);
            assert_eq!(by_wire, RegistryEntry::Quantity(quantity_entry(*id)));
        }
        for id in CategoryTypeIdentifier::ALL {
            assert_eq!(
                registry.lookup(id.as_wire()).unwrap(),
                RegistryEntry::Category(category_entry(*id))
            );
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = Registry::global().lookup("HKQuantityTypeIdentifierNope").unwrap_err();
        assert!(matches!(err, Error::UnknownIdentifier(_)));
    }

    #[test]
    fn test_workout_lookup() {
        let entry = Registry::global().lookup("running").unwrap();
        assert_eq!(
            entry,
            RegistryEntry::Workout(WorkoutEntry {
                activity: WorkoutActivityType::Running,
                distance: Some(QuantityTypeIdentifier::DistanceWalkingRunning),
            })
        );
        assert_eq!(workout_entry(WorkoutActivityType::Yoga).distance, None);
    }

    #[test]
    fn test_metadata_shapes() {
        assert_eq!(
            quantity_entry(QuantityTypeIdentifier::HeartRate).metadata,
            MetadataShape::HeartRate
        );
        assert_eq!(
            quantity_entry(QuantityTypeIdentifier::StepCount).metadata,
            MetadataShape::Empty
        );
        assert_eq!(
            category_entry(CategoryTypeIdentifier::MenstrualFlow).metadata,
            MetadataShape::MenstrualCycle
        );
        assert_eq!(MetadataShape::Empty.key(), None);
    }

    #[test]
    fn test_category_values() {
        let sleep = category_entry(CategoryTypeIdentifier::SleepAnalysis).values;
        assert_eq!(sleep.name_of(0), Some("inBed"));
        assert_eq!(sleep.code_of("asleepREM"), Some(5));
        assert!(!sleep.contains(9));
    }

    #[test]
    fn test_blood_pressure_constituents() {
        let entry = correlation_entry(CorrelationTypeIdentifier::BloodPressure);
        assert!(entry.allows(QuantityTypeIdentifier::BloodPressureSystolic.into()));
        assert!(!entry.allows(QuantityTypeIdentifier::HeartRate.into()));
    }

    #[test]
    fn test_default_registry_validates() {
        let errors = Registry::global().validate();
        assert!(
            errors.is_empty(),
            "Registry has validation errors: {:?}",
            errors
        );
    }
}
