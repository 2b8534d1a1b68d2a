//! Config for the supervisor behaviors.
//!
//! Configuration can be created programmatically using [`Configuration::new()`]
//! or by reading environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration
//! values. All values are optional, and case-insensitive. Set the value to
//! `"true"` to enable a flag.
//!
//! - `REFEREE_VERBOSE` — Print match progress to stdout (default: `true`)
//! - `REFEREE_LOG` — Enable logging to a file (default: `false`)
//! - `REFEREE_PLAYER_STDERR` — Pass player stderr through for debugging (default: `false`)

/// Configuration for supervisor behaviors.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) player_stderr: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Match progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Player stderr output is discarded.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            player_stderr: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Recognized variables are `REFEREE_VERBOSE`, `REFEREE_LOG` and
    /// `REFEREE_PLAYER_STDERR`; any other value (including unset) results in
    /// the default value for each field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Self {
            verbose: get_env_flag("REFEREE_VERBOSE", true),
            log: get_env_flag("REFEREE_LOG", false),
            player_stderr: get_env_flag("REFEREE_PLAYER_STDERR", false),
        }
    }

    /// Enable or disable match progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable player stderr passthrough (debug purposes only).
    pub fn with_player_stderr(mut self, value: bool) -> Self {
        self.player_stderr = value;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
