use sarge::ArgumentType;

use crate::config::{BackendKind, Mode, ParseKindError};

impl ArgumentType for Mode {
    type Error = ParseKindError;

    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        // A bare `-m` keeps the file mode.
        Some(val.map_or(Ok(Mode::File), |v| v.trim().parse()))
    }

    fn default_value() -> Option<Self> {
        Some(Mode::default())
    }
}

impl ArgumentType for BackendKind {
    type Error = ParseKindError;

    fn from_value(val: Option<&str>) -> sarge::ArgResult<Self> {
        val.map(|v| v.trim().parse())
    }
}
