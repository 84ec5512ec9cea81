//! Units, unit families, and default-unit resolution.

use crate::bridge::HealthBridge;
use crate::identifiers::QuantityTypeIdentifier;
use crate::registry;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Group of interchangeable units for one physical dimension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    Count,
    CountPerTime,
    Percent,
    Energy,
    Length,
    Mass,
    Temperature,
    Pressure,
    Time,
    Volume,
    BloodGlucose,
    Pharmacology,
    SoundLevel,
    Speed,
    OxygenConsumption,
}

/// A unit of measurement as the native service spells it
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Count,
    CountPerMinute,
    Percent,
    Kilocalorie,
    Kilojoule,
    Meter,
    Centimeter,
    Kilometer,
    Inch,
    Foot,
    Yard,
    Mile,
    Microgram,
    Milligram,
    Gram,
    Kilogram,
    Ounce,
    Pound,
    Stone,
    Celsius,
    Fahrenheit,
    Kelvin,
    MillimeterOfMercury,
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Milliliter,
    Liter,
    FluidOunceUs,
    CupUs,
    MilligramPerDeciliter,
    MillimolePerLiter,
    InternationalUnit,
    DecibelAWeightedSpl,
    MeterPerSecond,
    KilometerPerHour,
    MilliliterPerKilogramMinute,
    /// Any unit string the client has no name for; passed through as-is
    Custom(String),
}

impl Unit {
    const KNOWN: &'static [Unit] = &[
        Unit::Count,
        Unit::CountPerMinute,
        Unit::Percent,
        Unit::Kilocalorie,
        Unit::Kilojoule,
        Unit::Meter,
        Unit::Centimeter,
        Unit::Kilometer,
        Unit::Inch,
        Unit::Foot,
        Unit::Yard,
        Unit::Mile,
        Unit::Microgram,
        Unit::Milligram,
        Unit::Gram,
        Unit::Kilogram,
        Unit::Ounce,
        Unit::Pound,
        Unit::Stone,
        Unit::Celsius,
        Unit::Fahrenheit,
        Unit::Kelvin,
        Unit::MillimeterOfMercury,
        Unit::Millisecond,
        Unit::Second,
        Unit::Minute,
        Unit::Hour,
        Unit::Day,
        Unit::Milliliter,
        Unit::Liter,
        Unit::FluidOunceUs,
        Unit::CupUs,
        Unit::MilligramPerDeciliter,
        Unit::MillimolePerLiter,
        Unit::InternationalUnit,
        Unit::DecibelAWeightedSpl,
        Unit::MeterPerSecond,
        Unit::KilometerPerHour,
        Unit::MilliliterPerKilogramMinute,
    ];

    /// Unit string sent across the bridge
    pub fn as_str(&self) -> &str {
        match self {
            Unit::Count => "count",
            Unit::CountPerMinute => "count/min",
            Unit::Percent => "%",
            Unit::Kilocalorie => "kcal",
            Unit::Kilojoule => "kJ",
            Unit::Meter => "m",
            Unit::Centimeter => "cm",
            Unit::Kilometer => "km",
            Unit::Inch => "in",
            Unit::Foot => "ft",
            Unit::Yard => "yd",
            Unit::Mile => "mi",
            Unit::Microgram => "mcg",
            Unit::Milligram => "mg",
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Ounce => "oz",
            Unit::Pound => "lb",
            Unit::Stone => "st",
            Unit::Celsius => "degC",
            Unit::Fahrenheit => "degF",
            Unit::Kelvin => "K",
            Unit::MillimeterOfMercury => "mmHg",
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "min",
            Unit::Hour => "hr",
            Unit::Day => "d",
            Unit::Milliliter => "mL",
            Unit::Liter => "L",
            Unit::FluidOunceUs => "fl_oz_us",
            Unit::CupUs => "cup_us",
            Unit::MilligramPerDeciliter => "mg/dL",
            Unit::MillimolePerLiter => "mmol<180.15588000005408>/L",
            Unit::InternationalUnit => "IU",
            Unit::DecibelAWeightedSpl => "dBASPL",
            Unit::MeterPerSecond => "m/s",
            Unit::KilometerPerHour => "km/hr",
            Unit::MilliliterPerKilogramMinute => "ml/(kg*min)",
            Unit::Custom(raw) => raw,
        }
    }

    /// Family this unit belongs to, `None` for custom units
    pub fn family(&self) -> Option<UnitFamily> {
        let family = match self {
            Unit::Count => UnitFamily::Count,
            Unit::CountPerMinute => UnitFamily::CountPerTime,
            Unit::Percent => UnitFamily::Percent,
            Unit::Kilocalorie | Unit::Kilojoule => UnitFamily::Energy,
            Unit::Meter
            | Unit::Centimeter
            | Unit::Kilometer
            | Unit::Inch
            | Unit::Foot
            | Unit::Yard
            | Unit::Mile => UnitFamily::Length,
            Unit::Microgram
            | Unit::Milligram
            | Unit::Gram
            | Unit::Kilogram
            | Unit::Ounce
            | Unit::Pound
            | Unit::Stone => UnitFamily::Mass,
            Unit::Celsius | Unit::Fahrenheit | Unit::Kelvin => UnitFamily::Temperature,
            Unit::MillimeterOfMercury => UnitFamily::Pressure,
            Unit::Millisecond | Unit::Second | Unit::Minute | Unit::Hour | Unit::Day => {
                UnitFamily::Time
            }
            Unit::Milliliter | Unit::Liter | Unit::FluidOunceUs | Unit::CupUs => UnitFamily::Volume,
            Unit::MilligramPerDeciliter | Unit::MillimolePerLiter => UnitFamily::BloodGlucose,
            Unit::InternationalUnit => UnitFamily::Pharmacology,
            Unit::DecibelAWeightedSpl => UnitFamily::SoundLevel,
            Unit::MeterPerSecond | Unit::KilometerPerHour => UnitFamily::Speed,
            Unit::MilliliterPerKilogramMinute => UnitFamily::OxygenConsumption,
            Unit::Custom(_) => return None,
        };
        Some(family)
    }

    /// All named units in a family
    pub fn in_family(family: UnitFamily) -> Vec<Unit> {
        Self::KNOWN
            .iter()
            .filter(|unit| unit.family() == Some(family))
            .cloned()
            .collect()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Unit::from(s))
    }
}

impl From<&str> for Unit {
    fn from(s: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|unit| unit.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Unit::Custom(s.to_string()))
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Unit::from(raw.as_str()))
    }
}

/// How the caller wants the unit for a quantity call chosen
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum UnitRequest {
    /// Use exactly this unit
    Explicit(Unit),
    /// Ask the service for the user's preferred unit
    #[default]
    PreferFromService,
}

impl From<Unit> for UnitRequest {
    fn from(unit: Unit) -> Self {
        UnitRequest::Explicit(unit)
    }
}

impl From<Option<Unit>> for UnitRequest {
    fn from(unit: Option<Unit>) -> Self {
        match unit {
            Some(unit) => UnitRequest::Explicit(unit),
            None => UnitRequest::PreferFromService,
        }
    }
}

/// Resolve the unit to use for a quantity identifier.
///
/// An explicit unit is passed through without a bridge call. Otherwise the
/// service's preferred unit is fetched with exactly one round-trip.
pub async fn resolve_unit<B: HealthBridge + ?Sized>(
    bridge: &B,
    identifier: QuantityTypeIdentifier,
    request: UnitRequest,
) -> Result<Unit> {
    match request {
        UnitRequest::Explicit(unit) => Ok(unit),
        UnitRequest::PreferFromService => {
            let wire = identifier.as_wire();
            tracing::debug!("Fetching preferred unit for {}", wire);
            let units = bridge.preferred_units(&[wire.to_string()]).await?;
            units
                .get(wire)
                .map(|raw| Unit::from(raw.as_str()))
                .ok_or_else(|| Error::MissingPreferredUnit(wire.to_string()))
        }
    }
}

/// Check that a unit belongs to the identifier's family.
///
/// Custom units are let through; only the service can judge those.
pub fn check_unit(identifier: QuantityTypeIdentifier, unit: &Unit) -> Result<()> {
    let expected = registry::quantity_entry(identifier).unit_family;
    match unit.family() {
        Some(family) if family != expected => Err(Error::UnitMismatch {
            identifier: identifier.as_wire().to_string(),
            unit: unit.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BridgeCall, MemoryBridge};

    #[test]
    fn test_unit_parse_known_and_custom() {
        assert_eq!(Unit::from("count/min"), Unit::CountPerMinute);
        assert_eq!(Unit::from("furlong"), Unit::Custom("furlong".into()));
        assert_eq!(Unit::Custom("furlong".into()).family(), None);
    }

    #[test]
    fn test_every_known_unit_round_trips() {
        for unit in Unit::KNOWN {
            assert_eq!(&Unit::from(unit.as_str()), unit);
        }
    }

    #[test]
    fn test_family_listing() {
        let energy = Unit::in_family(UnitFamily::Energy);
        assert_eq!(energy, vec![Unit::Kilocalorie, Unit::Kilojoule]);
    }

    #[test]
    fn test_check_unit() {
        assert!(check_unit(QuantityTypeIdentifier::StepCount, &Unit::Count).is_ok());
        assert!(check_unit(QuantityTypeIdentifier::BodyMass, &Unit::Pound).is_ok());
        assert!(matches!(
            check_unit(QuantityTypeIdentifier::StepCount, &Unit::Kilogram),
            Err(Error::UnitMismatch { .. })
        ));
        assert!(check_unit(QuantityTypeIdentifier::StepCount, &Unit::from("steps")).is_ok());
    }

    #[tokio::test]
    async fn test_resolve_preferred_unit_makes_one_call() {
        let bridge = MemoryBridge::new();
        bridge.set_preferred_unit(QuantityTypeIdentifier::StepCount, "count");

        let unit = resolve_unit(
            &bridge,
            QuantityTypeIdentifier::StepCount,
            UnitRequest::PreferFromService,
        )
        .await
        .unwrap();

        assert_eq!(unit, Unit::Count);
        assert_eq!(
            bridge.calls(),
            vec![BridgeCall::PreferredUnits(vec![
                "HKQuantityTypeIdentifierStepCount".into()
            ])]
        );
    }

    #[tokio::test]
    async fn test_resolve_explicit_unit_makes_no_calls() {
        let bridge = MemoryBridge::new();

        let unit = resolve_unit(
            &bridge,
            QuantityTypeIdentifier::StepCount,
            UnitRequest::Explicit(Unit::Count),
        )
        .await
        .unwrap();

        assert_eq!(unit, Unit::Count);
        assert!(bridge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_missing_preferred_unit() {
        let bridge = MemoryBridge::new();
        let err = resolve_unit(
            &bridge,
            QuantityTypeIdentifier::HeartRate,
            UnitRequest::PreferFromService,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MissingPreferredUnit(_)));
    }

    #[tokio::test]
    async fn test_resolve_propagates_bridge_rejection() {
        let bridge = MemoryBridge::new();
        bridge.set_available(false);
        let err = resolve_unit(
            &bridge,
            QuantityTypeIdentifier::StepCount,
            UnitRequest::PreferFromService,
        )
        .await
        .unwrap_err();
        assert!(err.is_bridge());
    }
}
