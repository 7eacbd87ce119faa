//! Deterministic step identifiers.
//!
//! A task id names one flow step: `scale-up:level-2:cluster-autoscaler,vpa-updater`.
//! Resource names never contain `:` or `,` (enforced by config validation),
//! so an id can always be decoded back into its level and names.

use std::fmt;

use serde::Serialize;
use watchdog_core::ScaleDirection;

use crate::error::TaskIdError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new<S: AsRef<str>>(direction: ScaleDirection, level: u32, names: &[S]) -> Self {
        let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
        TaskId(format!("{direction}:level-{level}:{}", names.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the id into its direction, level and resource names.
    pub fn parse(id: &str) -> Result<(ScaleDirection, u32, Vec<String>), TaskIdError> {
        let malformed = || TaskIdError(id.to_string());

        let mut parts = id.splitn(3, ':');
        let direction = parts
            .next()
            .and_then(|d| d.parse::<ScaleDirection>().ok())
            .ok_or_else(malformed)?;
        let level = parts
            .next()
            .and_then(|l| l.strip_prefix("level-"))
            .and_then(|l| l.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        let names = parts.next().ok_or_else(malformed)?;
        if names.is_empty() {
            return Err(malformed());
        }
        let names = names.split(',').map(str::to_string).collect::<Vec<_>>();
        if names.iter().any(|n| n.is_empty()) {
            return Err(malformed());
        }
        Ok((direction, level, names))
    }

    pub fn level(&self) -> Option<u32> {
        Self::parse(&self.0).ok().map(|(_, level, _)| level)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_direction_level_and_names() {
        let id = TaskId::new(ScaleDirection::ScaleDown, 3, &["kcm", "mcm"]);
        assert_eq!(id.as_str(), "scale-down:level-3:kcm,mcm");
    }

    #[test]
    fn decodes_what_it_encodes() {
        let names = ["machine-controller-manager", "cluster-autoscaler", "vpa.updater"];
        let id = TaskId::new(ScaleDirection::ScaleUp, 12, &names);
        let (direction, level, decoded) = TaskId::parse(id.as_str()).unwrap();
        assert_eq!(direction, ScaleDirection::ScaleUp);
        assert_eq!(level, 12);
        assert_eq!(decoded, names);
        assert_eq!(id.level(), Some(12));
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "",
            "scale-up",
            "scale-up:level-x:kcm",
            "sideways:level-0:kcm",
            "scale-up:0:kcm",
            "scale-up:level-0:",
            "scale-up:level-0:kcm,,mcm",
        ] {
            assert!(TaskId::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }
}
