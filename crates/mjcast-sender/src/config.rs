use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mjcast_transport::{DEFAULT_MTU, DEFAULT_TTL};
use thiserror::Error;

pub const DEFAULT_GROUP: &str = "224.0.0.250:5000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Sender settings, read from `MJCAST_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub addr: String,
    pub iface: Option<String>,
    pub ttl: u32,
    pub mtu: usize,
    pub repeats: usize,
    pub slides: PathBuf,
    pub slide_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build settings from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let slides = get("MJCAST_SLIDES").ok_or(ConfigError::Missing("MJCAST_SLIDES"))?;
        let interval_secs: u64 = parse_or(&get, "MJCAST_SLIDE_INTERVAL_SECS", 5)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "MJCAST_SLIDE_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            addr: get("MJCAST_ADDR").unwrap_or_else(|| DEFAULT_GROUP.into()),
            iface: get("MJCAST_IFACE"),
            ttl: parse_or(&get, "MJCAST_TTL", DEFAULT_TTL)?,
            mtu: parse_or(&get, "MJCAST_MTU", DEFAULT_MTU)?,
            repeats: parse_or(&get, "MJCAST_REPEATS", 1usize)?.max(1),
            slides: slides.into(),
            slide_interval: Duration::from_secs(interval_secs),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[("MJCAST_SLIDES", "/srv/slides")]).unwrap();
        assert_eq!(s.addr, "224.0.0.250:5000");
        assert_eq!(s.iface, None);
        assert_eq!(s.ttl, 1);
        assert_eq!(s.mtu, 1200);
        assert_eq!(s.repeats, 1);
        assert_eq!(s.slides, PathBuf::from("/srv/slides"));
        assert_eq!(s.slide_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("MJCAST_SLIDES", "slides"),
            ("MJCAST_ADDR", "239.1.2.3:6000"),
            ("MJCAST_IFACE", "eth0"),
            ("MJCAST_TTL", "4"),
            ("MJCAST_MTU", "1400"),
            ("MJCAST_REPEATS", "0"),
            ("MJCAST_SLIDE_INTERVAL_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(s.addr, "239.1.2.3:6000");
        assert_eq!(s.iface.as_deref(), Some("eth0"));
        assert_eq!(s.ttl, 4);
        assert_eq!(s.mtu, 1400);
        assert_eq!(s.repeats, 1);
        assert_eq!(s.slide_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(settings(&[]).unwrap_err(), ConfigError::Missing("MJCAST_SLIDES"));
        assert!(matches!(
            settings(&[("MJCAST_SLIDES", "s"), ("MJCAST_TTL", "many")]),
            Err(ConfigError::Invalid { var: "MJCAST_TTL", .. })
        ));
        assert!(matches!(
            settings(&[("MJCAST_SLIDES", "s"), ("MJCAST_SLIDE_INTERVAL_SECS", "0")]),
            Err(ConfigError::Invalid { var: "MJCAST_SLIDE_INTERVAL_SECS", .. })
        ));
    }
}
