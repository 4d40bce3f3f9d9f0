//! Configuration types for stages.
//!
//! This module provides:
//! - `Mode` and `BackendKind`: The values of `-m` and `-s`/`-d`
//! - `StageConfig`: Resolved configuration with mode defaults applied
//! - `Settings`: Transform-specific key/value settings from `-c`

mod settings;
mod stage;

pub use settings::Settings;
pub use stage::{
    BackendKind, DEFAULT_OUTPUT_DIR, Mode, ModeDefaults, ParseKindError, StageConfig, unescape,
};
