//! Process-wide runtime settings
//!
//! Installed once by the CLI before a conversation starts. Agents snapshot the
//! current value when they are constructed.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Toggles that affect how agents talk to their LLM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Verbose logging of prompts and routing decisions
    pub debug: bool,
    /// Reuse cached LLM responses for identical requests
    pub cache: bool,
    /// Stream LLM output token by token
    pub stream: bool,
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            debug: false,
            cache: true,
            stream: true,
        }
    }

    /// Build settings from the command-line switches.
    ///
    /// Each switch flips exactly one field away from its default.
    pub const fn from_flags(debug: bool, no_stream: bool, no_cache: bool) -> Self {
        Self {
            debug,
            cache: !no_cache,
            stream: !no_stream,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: RwLock<Settings> = RwLock::new(Settings::new());

/// Replace the process-wide settings
pub fn set_global(settings: Settings) {
    debug!("Installing global settings: {:?}", settings);
    match GLOBAL.write() {
        Ok(mut guard) => *guard = settings,
        Err(poisoned) => *poisoned.into_inner() = settings,
    }
}

/// Current process-wide settings
pub fn global() -> Settings {
    match GLOBAL.read() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(!s.debug);
        assert!(s.cache);
        assert!(s.stream);
    }

    #[test]
    fn test_no_flags_matches_default() {
        assert_eq!(Settings::from_flags(false, false, false), Settings::default());
    }

    #[test]
    fn test_debug_flag_only_touches_debug() {
        let s = Settings::from_flags(true, false, false);
        assert_eq!(
            s,
            Settings {
                debug: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_nostream_flag_only_touches_stream() {
        let s = Settings::from_flags(false, true, false);
        assert_eq!(
            s,
            Settings {
                stream: false,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_nocache_flag_only_touches_cache() {
        let s = Settings::from_flags(false, false, true);
        assert_eq!(
            s,
            Settings {
                cache: false,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_set_and_read_global() {
        let custom = Settings::from_flags(true, true, true);
        set_global(custom);
        assert_eq!(global(), custom);
        set_global(Settings::default());
        assert_eq!(global(), Settings::default());
    }
}
