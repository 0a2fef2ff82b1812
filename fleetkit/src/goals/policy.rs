//! Conflict resolution for a new event request arriving while the robot
//! already has one open.

use crate::errors::FleetError;
use std::fmt;
use std::str::FromStr;

/// How to handle a new dynamic event request for a robot whose current
/// event is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelBehavior {
    /// Leave the existing event untouched and report "not started".
    Ignore,
    /// Return the existing task/sequence as if the new request had just
    /// been accepted, without contacting the command channel.
    Continue,
    /// Cancel the open event, wait for the cancellation to land, then
    /// submit the new request as a fresh goal.
    Overwrite,
    /// Create an entirely new task and proceed as if no prior event
    /// existed.
    Queue,
}

impl FromStr for ParallelBehavior {
    type Err = FleetError;

    /// Unknown values are a configuration error; there is deliberately
    /// no silent default.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ignore" => Ok(Self::Ignore),
            "continue" | "reuse" => Ok(Self::Continue),
            "overwrite" => Ok(Self::Overwrite),
            "queue" => Ok(Self::Queue),
            other => Err(FleetError::InvalidParallelBehavior {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ParallelBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ignore => "ignore",
            Self::Continue => "continue",
            Self::Overwrite => "overwrite",
            Self::Queue => "queue",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_values() {
        assert_eq!(
            "ignore".parse::<ParallelBehavior>().unwrap(),
            ParallelBehavior::Ignore
        );
        assert_eq!(
            "reuse".parse::<ParallelBehavior>().unwrap(),
            ParallelBehavior::Continue
        );
        assert_eq!(
            "overwrite".parse::<ParallelBehavior>().unwrap(),
            ParallelBehavior::Overwrite
        );
        assert_eq!(
            "queue".parse::<ParallelBehavior>().unwrap(),
            ParallelBehavior::Queue
        );
    }

    #[test]
    fn unknown_value_is_a_configuration_error() {
        let result = "replace".parse::<ParallelBehavior>();
        assert!(matches!(
            result,
            Err(FleetError::InvalidParallelBehavior { value }) if value == "replace"
        ));
    }
}
