//! Unit vocabulary for gridded inputs.
//!
//! Files spell the same unit in many ways (`W m-2`, `W m**-2`, `W/m2`, ...).
//! Parsing normalizes the spelling only; it never converts between units.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Irradiance / radiative flux.
    WattsPerSquareMetre,
    /// Accumulated radiation (ERA5 `ssrd` is stored this way).
    JoulesPerSquareMetre,
    MetresPerSecond,
    CubicMetresPerSecond,
    /// Precipitation flux; numerically mm of water per second.
    KilogramsPerSquareMetrePerSecond,
    /// Accumulated precipitation depth.
    Metres,
    Kelvin,
    Celsius,
    Dimensionless,
}

impl Unit {
    /// Parse a unit attribute. Returns `None` for anything unrecognized.
    pub fn parse(raw: &str) -> Option<Unit> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .replace("**", "")
            .replace('^', "")
            .replace('²', "2")
            .replace('³', "3");

        let unit = match key.as_str() {
            "Wm-2" | "W/m2" | "W.m-2" => Unit::WattsPerSquareMetre,
            "Jm-2" | "J/m2" | "J.m-2" => Unit::JoulesPerSquareMetre,
            "ms-1" | "m/s" | "m.s-1" => Unit::MetresPerSecond,
            "m3s-1" | "m3/s" | "m3.s-1" => Unit::CubicMetresPerSecond,
            "kgm-2s-1" | "kg/m2/s" | "kg.m-2.s-1" => Unit::KilogramsPerSquareMetrePerSecond,
            "m" => Unit::Metres,
            "K" => Unit::Kelvin,
            "degC" | "°C" | "C" | "celsius" | "degrees_Celsius" => Unit::Celsius,
            "1" | "-" | "dimensionless" | "(0-1)" => Unit::Dimensionless,
            _ => return None,
        };
        Some(unit)
    }

    /// Canonical CF-style spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::WattsPerSquareMetre => "W m-2",
            Unit::JoulesPerSquareMetre => "J m-2",
            Unit::MetresPerSecond => "m s-1",
            Unit::CubicMetresPerSecond => "m3 s-1",
            Unit::KilogramsPerSquareMetrePerSecond => "kg m-2 s-1",
            Unit::Metres => "m",
            Unit::Kelvin => "K",
            Unit::Celsius => "degC",
            Unit::Dimensionless => "1",
        }
    }

    pub fn is_temperature(self) -> bool {
        matches!(self, Unit::Kelvin | Unit::Celsius)
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecmwf_spellings_normalize() {
        assert_eq!(Unit::parse("W m**-2"), Some(Unit::WattsPerSquareMetre));
        assert_eq!(Unit::parse("m s**-1"), Some(Unit::MetresPerSecond));
        assert_eq!(Unit::parse("m**3 s**-1"), Some(Unit::CubicMetresPerSecond));
        assert_eq!(Unit::parse(" K "), Some(Unit::Kelvin));
        assert_eq!(Unit::parse("kg m**-2 s**-1"), Some(Unit::KilogramsPerSquareMetrePerSecond));
    }

    #[test]
    fn unknown_units_are_rejected() {
        assert_eq!(Unit::parse("furlongs per fortnight"), None);
        assert_eq!(Unit::parse(""), None);
        // A depth rate is not a mass flux.
        assert_eq!(Unit::parse("mm/s"), None);
    }

    #[test]
    fn accumulated_radiation_is_not_irradiance() {
        assert_ne!(Unit::parse("J m**-2"), Some(Unit::WattsPerSquareMetre));
    }
}
