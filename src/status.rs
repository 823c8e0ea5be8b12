use std::str::FromStr;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Value of the availability topic shared by every sensor of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// Payload sent to MQTT
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

/// Status flags reported by NUT in `ups.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
pub enum StatusCode {
    #[strum(serialize = "OL")]
    Online,
    #[strum(serialize = "OB")]
    OnBattery,
    #[strum(serialize = "LB")]
    LowBattery,
    #[strum(serialize = "HB")]
    HighBattery,
    #[strum(serialize = "RB")]
    ReplaceBattery,
    #[strum(serialize = "CHRG")]
    Charging,
    #[strum(serialize = "DISCHRG")]
    Discharging,
    #[strum(serialize = "BYPASS")]
    Bypass,
    #[strum(serialize = "CAL")]
    Calibrating,
    #[strum(serialize = "OFF")]
    Off,
    #[strum(serialize = "OVER")]
    Overload,
    #[strum(serialize = "TRIM")]
    Trim,
    #[strum(serialize = "BOOST")]
    Boost,
}

impl StatusCode {
    /// Token as printed by NUT
    pub fn token(&self) -> &'static str {
        self.into()
    }

    /// Human readable meaning of the flag
    pub fn description(&self) -> &'static str {
        match self {
            StatusCode::Online => "Online",
            StatusCode::OnBattery => "On Battery",
            StatusCode::LowBattery => "Low Battery",
            StatusCode::HighBattery => "High Battery",
            StatusCode::ReplaceBattery => "Replace Battery",
            StatusCode::Charging => "Charging",
            StatusCode::Discharging => "Discharging",
            StatusCode::Bypass => "Bypass",
            StatusCode::Calibrating => "Calibrating",
            StatusCode::Off => "Offline",
            StatusCode::Overload => "Overload",
            StatusCode::Trim => "Smart Trim",
            StatusCode::Boost => "Smart Boost",
        }
    }
}

/// Translates a space separated `ups.status` value, e.g. `OL CHRG` becomes `Online + Charging`.
///
/// Unknown flags are kept as they are.
pub fn decode_status(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            StatusCode::from_str(token)
                .map(|code| code.description())
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_decode_status() {
        assert_eq!(decode_status("OL"), "Online");
        assert_eq!(decode_status("OL CHRG"), "Online + Charging");
        assert_eq!(decode_status("OB DISCHRG LB"), "On Battery + Discharging + Low Battery");
    }

    #[test]
    fn test_unknown_token_passes_through() {
        assert_eq!(decode_status("OL FOO"), "Online + FOO");
        assert_eq!(decode_status("ol"), "ol");
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(decode_status("  OL   TRIM "), "Online + Smart Trim");
        assert_eq!(decode_status(""), "");
    }

    #[test]
    fn test_every_code_is_decoded() {
        for code in StatusCode::iter() {
            assert_eq!(StatusCode::from_str(code.token()), Ok(code));
            assert_eq!(decode_status(code.token()), code.description());
        }
    }

    #[test]
    fn test_availability() {
        assert_eq!(Availability::Online.as_str(), "online");
        assert_eq!(Availability::Offline.as_str(), "offline");
    }
}
