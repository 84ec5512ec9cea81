//! Identifier tags for every kind of health datum the client understands.
//!
//! Each identifier has a canonical wire form (the native `HK...` string) and
//! a short camel-case alias. Both forms parse; only the wire form is emitted.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! identifier_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $variant:ident => ($wire:literal, $short:literal), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Native identifier string sent across the bridge
            pub fn as_wire(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire, )+
                }
            }

            /// Short camel-case alias
            pub fn short_name(&self) -> &'static str {
                match self {
                    $( $name::$variant => $short, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_wire())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $( $wire | $short => Ok($name::$variant), )+
                    other => Err(Error::UnknownIdentifier(other.to_string())),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_wire())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

identifier_enum! {
    /// Quantity sample types (numeric value with a unit)
    QuantityTypeIdentifier {
        StepCount => ("HKQuantityTypeIdentifierStepCount", "stepCount"),
        DistanceWalkingRunning => ("HKQuantityTypeIdentifierDistanceWalkingRunning", "distanceWalkingRunning"),
        DistanceCycling => ("HKQuantityTypeIdentifierDistanceCycling", "distanceCycling"),
        DistanceSwimming => ("HKQuantityTypeIdentifierDistanceSwimming", "distanceSwimming"),
        DistanceWheelchair => ("HKQuantityTypeIdentifierDistanceWheelchair", "distanceWheelchair"),
        DistanceDownhillSnowSports => ("HKQuantityTypeIdentifierDistanceDownhillSnowSports", "distanceDownhillSnowSports"),
        PushCount => ("HKQuantityTypeIdentifierPushCount", "pushCount"),
        SwimmingStrokeCount => ("HKQuantityTypeIdentifierSwimmingStrokeCount", "swimmingStrokeCount"),
        FlightsClimbed => ("HKQuantityTypeIdentifierFlightsClimbed", "flightsClimbed"),
        ActiveEnergyBurned => ("HKQuantityTypeIdentifierActiveEnergyBurned", "activeEnergyBurned"),
        BasalEnergyBurned => ("HKQuantityTypeIdentifierBasalEnergyBurned", "basalEnergyBurned"),
        AppleExerciseTime => ("HKQuantityTypeIdentifierAppleExerciseTime", "appleExerciseTime"),
        AppleStandTime => ("HKQuantityTypeIdentifierAppleStandTime", "appleStandTime"),
        HeartRate => ("HKQuantityTypeIdentifierHeartRate", "heartRate"),
        RestingHeartRate => ("HKQuantityTypeIdentifierRestingHeartRate", "restingHeartRate"),
        WalkingHeartRateAverage => ("HKQuantityTypeIdentifierWalkingHeartRateAverage", "walkingHeartRateAverage"),
        HeartRateVariabilitySdnn => ("HKQuantityTypeIdentifierHeartRateVariabilitySDNN", "heartRateVariabilitySDNN"),
        OxygenSaturation => ("HKQuantityTypeIdentifierOxygenSaturation", "oxygenSaturation"),
        BodyTemperature => ("HKQuantityTypeIdentifierBodyTemperature", "bodyTemperature"),
        BasalBodyTemperature => ("HKQuantityTypeIdentifierBasalBodyTemperature", "basalBodyTemperature"),
        BloodPressureSystolic => ("HKQuantityTypeIdentifierBloodPressureSystolic", "bloodPressureSystolic"),
        BloodPressureDiastolic => ("HKQuantityTypeIdentifierBloodPressureDiastolic", "bloodPressureDiastolic"),
        RespiratoryRate => ("HKQuantityTypeIdentifierRespiratoryRate", "respiratoryRate"),
        Vo2Max => ("HKQuantityTypeIdentifierVO2Max", "vo2Max"),
        BodyMass => ("HKQuantityTypeIdentifierBodyMass", "bodyMass"),
        BodyMassIndex => ("HKQuantityTypeIdentifierBodyMassIndex", "bodyMassIndex"),
        LeanBodyMass => ("HKQuantityTypeIdentifierLeanBodyMass", "leanBodyMass"),
        BodyFatPercentage => ("HKQuantityTypeIdentifierBodyFatPercentage", "bodyFatPercentage"),
        Height => ("HKQuantityTypeIdentifierHeight", "height"),
        WaistCircumference => ("HKQuantityTypeIdentifierWaistCircumference", "waistCircumference"),
        BloodGlucose => ("HKQuantityTypeIdentifierBloodGlucose", "bloodGlucose"),
        InsulinDelivery => ("HKQuantityTypeIdentifierInsulinDelivery", "insulinDelivery"),
        DietaryEnergyConsumed => ("HKQuantityTypeIdentifierDietaryEnergyConsumed", "dietaryEnergyConsumed"),
        DietaryCarbohydrates => ("HKQuantityTypeIdentifierDietaryCarbohydrates", "dietaryCarbohydrates"),
        DietaryProtein => ("HKQuantityTypeIdentifierDietaryProtein", "dietaryProtein"),
        DietaryFatTotal => ("HKQuantityTypeIdentifierDietaryFatTotal", "dietaryFatTotal"),
        DietarySugar => ("HKQuantityTypeIdentifierDietarySugar", "dietarySugar"),
        DietaryWater => ("HKQuantityTypeIdentifierDietaryWater", "dietaryWater"),
        DietaryCaffeine => ("HKQuantityTypeIdentifierDietaryCaffeine", "dietaryCaffeine"),
        EnvironmentalAudioExposure => ("HKQuantityTypeIdentifierEnvironmentalAudioExposure", "environmentalAudioExposure"),
        HeadphoneAudioExposure => ("HKQuantityTypeIdentifierHeadphoneAudioExposure", "headphoneAudioExposure"),
        WalkingSpeed => ("HKQuantityTypeIdentifierWalkingSpeed", "walkingSpeed"),
        UvExposure => ("HKQuantityTypeIdentifierUVExposure", "uvExposure"),
        NumberOfTimesFallen => ("HKQuantityTypeIdentifierNumberOfTimesFallen", "numberOfTimesFallen"),
    }
}

identifier_enum! {
    /// Category sample types (enumerated value, no unit)
    CategoryTypeIdentifier {
        SleepAnalysis => ("HKCategoryTypeIdentifierSleepAnalysis", "sleepAnalysis"),
        AppleStandHour => ("HKCategoryTypeIdentifierAppleStandHour", "appleStandHour"),
        MindfulSession => ("HKCategoryTypeIdentifierMindfulSession", "mindfulSession"),
        MenstrualFlow => ("HKCategoryTypeIdentifierMenstrualFlow", "menstrualFlow"),
        IntermenstrualBleeding => ("HKCategoryTypeIdentifierIntermenstrualBleeding", "intermenstrualBleeding"),
        CervicalMucusQuality => ("HKCategoryTypeIdentifierCervicalMucusQuality", "cervicalMucusQuality"),
        OvulationTestResult => ("HKCategoryTypeIdentifierOvulationTestResult", "ovulationTestResult"),
        SexualActivity => ("HKCategoryTypeIdentifierSexualActivity", "sexualActivity"),
        HighHeartRateEvent => ("HKCategoryTypeIdentifierHighHeartRateEvent", "highHeartRateEvent"),
        LowHeartRateEvent => ("HKCategoryTypeIdentifierLowHeartRateEvent", "lowHeartRateEvent"),
        IrregularHeartRhythmEvent => ("HKCategoryTypeIdentifierIrregularHeartRhythmEvent", "irregularHeartRhythmEvent"),
        AudioExposureEvent => ("HKCategoryTypeIdentifierAudioExposureEvent", "audioExposureEvent"),
        ToothbrushingEvent => ("HKCategoryTypeIdentifierToothbrushingEvent", "toothbrushingEvent"),
        HandwashingEvent => ("HKCategoryTypeIdentifierHandwashingEvent", "handwashingEvent"),
        Headache => ("HKCategoryTypeIdentifierHeadache", "headache"),
        Nausea => ("HKCategoryTypeIdentifierNausea", "nausea"),
        Fatigue => ("HKCategoryTypeIdentifierFatigue", "fatigue"),
        Dizziness => ("HKCategoryTypeIdentifierDizziness", "dizziness"),
    }
}

identifier_enum! {
    /// Correlation types grouping several samples
    CorrelationTypeIdentifier {
        BloodPressure => ("HKCorrelationTypeIdentifierBloodPressure", "bloodPressure"),
        Food => ("HKCorrelationTypeIdentifierFood", "food"),
    }
}

identifier_enum! {
    /// Characteristic types (static per-user facts)
    CharacteristicTypeIdentifier {
        BiologicalSex => ("HKCharacteristicTypeIdentifierBiologicalSex", "biologicalSex"),
        BloodType => ("HKCharacteristicTypeIdentifierBloodType", "bloodType"),
        DateOfBirth => ("HKCharacteristicTypeIdentifierDateOfBirth", "dateOfBirth"),
        FitzpatrickSkinType => ("HKCharacteristicTypeIdentifierFitzpatrickSkinType", "fitzpatrickSkinType"),
        WheelchairUse => ("HKCharacteristicTypeIdentifierWheelchairUse", "wheelchairUse"),
    }
}

/// Wire identifier used when asking for workout permissions
pub const WORKOUT_TYPE_IDENTIFIER: &str = "HKWorkoutTypeIdentifier";

/// Workout activity types, carried on the wire as their native raw value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkoutActivityType {
    Badminton,
    Basketball,
    Boxing,
    Climbing,
    CrossTraining,
    Cycling,
    Dance,
    Elliptical,
    FunctionalStrengthTraining,
    Golf,
    Hiking,
    MartialArts,
    MindAndBody,
    Rowing,
    Running,
    Soccer,
    StairClimbing,
    Swimming,
    Tennis,
    TraditionalStrengthTraining,
    Walking,
    Yoga,
    CoreTraining,
    CrossCountrySkiing,
    DownhillSkiing,
    Flexibility,
    HighIntensityIntervalTraining,
    JumpRope,
    Pilates,
    Snowboarding,
    WheelchairWalkPace,
    WheelchairRunPace,
    Other,
}

impl WorkoutActivityType {
    pub const ALL: &'static [WorkoutActivityType] = &[
        Self::Badminton,
        Self::Basketball,
        Self::Boxing,
        Self::Climbing,
        Self::CrossTraining,
        Self::Cycling,
        Self::Dance,
        Self::Elliptical,
        Self::FunctionalStrengthTraining,
        Self::Golf,
        Self::Hiking,
        Self::MartialArts,
        Self::MindAndBody,
        Self::Rowing,
        Self::Running,
        Self::Soccer,
        Self::StairClimbing,
        Self::Swimming,
        Self::Tennis,
        Self::TraditionalStrengthTraining,
        Self::Walking,
        Self::Yoga,
        Self::CoreTraining,
        Self::CrossCountrySkiing,
        Self::DownhillSkiing,
        Self::Flexibility,
        Self::HighIntensityIntervalTraining,
        Self::JumpRope,
        Self::Pilates,
        Self::Snowboarding,
        Self::WheelchairWalkPace,
        Self::WheelchairRunPace,
        Self::Other,
    ];

    /// Native raw value of the activity type
    pub fn raw_value(&self) -> i64 {
        match self {
            Self::Badminton => 4,
            Self::Basketball => 6,
            Self::Boxing => 8,
            Self::Climbing => 9,
            Self::CrossTraining => 11,
            Self::Cycling => 13,
            Self::Dance => 14,
            Self::Elliptical => 16,
            Self::FunctionalStrengthTraining => 20,
            Self::Golf => 21,
            Self::Hiking => 24,
            Self::MartialArts => 28,
            Self::MindAndBody => 29,
            Self::Rowing => 35,
            Self::Running => 37,
            Self::Soccer => 41,
            Self::StairClimbing => 44,
            Self::Swimming => 46,
            Self::Tennis => 48,
            Self::TraditionalStrengthTraining => 50,
            Self::Walking => 52,
            Self::Yoga => 57,
            Self::CoreTraining => 59,
            Self::CrossCountrySkiing => 60,
            Self::DownhillSkiing => 61,
            Self::Flexibility => 62,
            Self::HighIntensityIntervalTraining => 63,
            Self::JumpRope => 64,
            Self::Pilates => 66,
            Self::Snowboarding => 67,
            Self::WheelchairWalkPace => 70,
            Self::WheelchairRunPace => 71,
            Self::Other => 3000,
        }
    }

    /// Look up an activity type by its native raw value
    pub fn from_raw_value(raw: i64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|activity| activity.raw_value() == raw)
            .ok_or_else(|| Error::UnknownIdentifier(format!("workout activity type {}", raw)))
    }

    /// Camel-case name, matching the serde representation
    pub fn name(&self) -> String {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => name,
            _ => format!("{:?}", self),
        }
    }
}

impl fmt::Display for WorkoutActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for WorkoutActivityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(raw) = s.parse::<i64>() {
            return Self::from_raw_value(raw);
        }
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| Error::UnknownIdentifier(s.to_string()))
    }
}

/// Identifier of a single sample type: quantity or category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleIdentifier {
    Quantity(QuantityTypeIdentifier),
    Category(CategoryTypeIdentifier),
}

impl SampleIdentifier {
    pub fn as_wire(&self) -> &'static str {
        match self {
            SampleIdentifier::Quantity(id) => id.as_wire(),
            SampleIdentifier::Category(id) => id.as_wire(),
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            SampleIdentifier::Quantity(id) => id.short_name(),
            SampleIdentifier::Category(id) => id.short_name(),
        }
    }
}

impl fmt::Display for SampleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for SampleIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(id) = s.parse::<QuantityTypeIdentifier>() {
            return Ok(SampleIdentifier::Quantity(id));
        }
        if let Ok(id) = s.parse::<CategoryTypeIdentifier>() {
            return Ok(SampleIdentifier::Category(id));
        }
        Err(Error::UnknownIdentifier(s.to_string()))
    }
}

impl From<QuantityTypeIdentifier> for SampleIdentifier {
    fn from(id: QuantityTypeIdentifier) -> Self {
        SampleIdentifier::Quantity(id)
    }
}

impl From<CategoryTypeIdentifier> for SampleIdentifier {
    fn from(id: CategoryTypeIdentifier) -> Self {
        SampleIdentifier::Category(id)
    }
}

/// Anything that can be named in an authorization request.
///
/// Correlation types are absent on purpose: the platform only grants access
/// to their constituent quantity types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionIdentifier {
    Quantity(QuantityTypeIdentifier),
    Category(CategoryTypeIdentifier),
    Characteristic(CharacteristicTypeIdentifier),
    Workout,
}

impl PermissionIdentifier {
    pub fn as_wire(&self) -> &'static str {
        match self {
            PermissionIdentifier::Quantity(id) => id.as_wire(),
            PermissionIdentifier::Category(id) => id.as_wire(),
            PermissionIdentifier::Characteristic(id) => id.as_wire(),
            PermissionIdentifier::Workout => WORKOUT_TYPE_IDENTIFIER,
        }
    }
}

impl fmt::Display for PermissionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for PermissionIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == WORKOUT_TYPE_IDENTIFIER || s == "workout" {
            return Ok(PermissionIdentifier::Workout);
        }
        if let Ok(id) = s.parse::<SampleIdentifier>() {
            return Ok(id.into());
        }
        if let Ok(id) = s.parse::<CharacteristicTypeIdentifier>() {
            return Ok(PermissionIdentifier::Characteristic(id));
        }
        Err(Error::UnknownIdentifier(s.to_string()))
    }
}

impl From<SampleIdentifier> for PermissionIdentifier {
    fn from(id: SampleIdentifier) -> Self {
        match id {
            SampleIdentifier::Quantity(q) => PermissionIdentifier::Quantity(q),
            SampleIdentifier::Category(c) => PermissionIdentifier::Category(c),
        }
    }
}

impl From<QuantityTypeIdentifier> for PermissionIdentifier {
    fn from(id: QuantityTypeIdentifier) -> Self {
        PermissionIdentifier::Quantity(id)
    }
}

impl From<CategoryTypeIdentifier> for PermissionIdentifier {
    fn from(id: CategoryTypeIdentifier) -> Self {
        PermissionIdentifier::Category(id)
    }
}

impl From<CharacteristicTypeIdentifier> for PermissionIdentifier {
    fn from(id: CharacteristicTypeIdentifier) -> Self {
        PermissionIdentifier::Characteristic(id)
    }
}
