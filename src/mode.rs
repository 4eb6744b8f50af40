use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// How the caller wants the transcription to be computed.
///
/// `Auto` is only ever a *requested* mode: it is resolved to `Local` or `Remote` before any
/// adapter runs, so results never report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeMode {
    Local,
    Remote,
    Auto,
}

impl ComputeMode {
    pub const ALL: [ComputeMode; 3] = [Self::Local, Self::Remote, Self::Auto];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "auto" => Ok(Self::Auto),
            _ => Err(Error::InvalidMode(raw.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes_case_insensitively() -> crate::Result<()> {
        assert_eq!(" Local ".parse::<ComputeMode>()?, ComputeMode::Local);
        assert_eq!("REMOTE".parse::<ComputeMode>()?, ComputeMode::Remote);
        assert_eq!("auto".parse::<ComputeMode>()?, ComputeMode::Auto);
        Ok(())
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "gpu".parse::<ComputeMode>().unwrap_err();
        assert!(matches!(err, Error::InvalidMode(ref raw) if raw == "gpu"));
    }

    #[test]
    fn display_round_trips_wire_names() {
        for mode in ComputeMode::ALL {
            assert_eq!(mode.to_string().parse::<ComputeMode>().ok(), Some(mode));
        }
    }
}
