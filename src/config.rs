//! Configuration types for the slidekick server and its sessions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SlidekickError};

/// Default realtime model used for the voice session.
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Default text model used for summaries.
pub const DEFAULT_SUMMARY_MODEL: &str = "gemini-2.5-flash";

/// Bidirectional streaming endpoint of the Gemini Live API.
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Base URL of the Gemini REST API.
pub const DEFAULT_SUMMARY_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// System prompt for the presentation assistant.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are an AI presentation assistant controlling a slide deck.

Your goal is to help the presenter by navigating slides and executing commands in real-time.

AVAILABLE TOOLS:
1. `navigate_slide(direction, index)`: Move next/prev or jump to slide. NOTE: index is 1-BASED (Slide 1 = index 1).
2. `get_presentation_context()`: Check current slide number and status.
3. `trigger_summary(conversational_context)`: Summarize the talk so far.

RULES:
- Execute commands immediately when asked.
- If the user just talks about the topic, DO NOT call tools. Only call tools for COMMANDS (e.g. \"Next slide\", \"Summarize what I said\").
- If unsure, do nothing (don't interrupt the flow).
";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidekickConfig {
    /// HTTP/WebSocket server settings.
    pub server: ServerConfig,
    /// Realtime inference stream settings.
    pub live: LiveConfig,
    /// Summary text generation settings.
    pub summary: SummaryConfig,
    /// Audio buffering settings.
    pub audio: AudioConfig,
    /// Per-session behaviour.
    pub session: SessionConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = auto-assign).
    pub port: u16,
    /// Root of uploaded decks and generated slides.
    pub public_dir: PathBuf,
    /// Write conversion output to the system temp dir instead of `slides_dir`.
    pub use_temp_dir: bool,
    /// Converter program and leading arguments. The uploaded file, `--static`
    /// and the output directory are appended.
    pub converter_command: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            public_dir: PathBuf::from("public"),
            use_temp_dir: false,
            converter_command: vec!["npx".to_owned(), "reveal-md".to_owned()],
        }
    }
}

impl ServerConfig {
    /// Directory uploaded markdown decks are saved to.
    pub fn uploads_dir(&self) -> PathBuf {
        self.public_dir.join("uploads")
    }

    /// Directory generated slide sites are served from.
    pub fn slides_dir(&self) -> PathBuf {
        self.public_dir.join("slides")
    }
}

/// Realtime inference stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Model identifier (without the `models/` prefix).
    pub model: String,
    /// WebSocket endpoint.
    pub endpoint: String,
    /// API key. Only ever read from the environment.
    #[serde(skip)]
    pub api_key: String,
    /// System prompt sent in the setup message.
    pub system_instruction: String,
    /// Output modalities negotiated with the model.
    pub response_modalities: Vec<String>,
    /// Ask the model for a text transcription of its audio output.
    pub transcribe_output: bool,
    /// How long to wait for `setupComplete`.
    pub setup_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_owned(),
            endpoint: DEFAULT_LIVE_ENDPOINT.to_owned(),
            api_key: String::new(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_owned(),
            response_modalities: vec!["AUDIO".to_owned()],
            transcribe_output: true,
            setup_timeout_ms: 10_000,
        }
    }
}

impl LiveConfig {
    /// Setup handshake timeout.
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }
}

/// Summary text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Text model identifier.
    pub model: String,
    /// REST API base URL.
    pub endpoint: String,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SUMMARY_MODEL.to_owned(),
            endpoint: DEFAULT_SUMMARY_ENDPOINT.to_owned(),
            request_timeout_ms: 60_000,
        }
    }
}

/// Audio buffering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Queue capacity for network-sourced audio (jitter buffer).
    pub client_queue_capacity: usize,
    /// Queue capacity for local capture.
    pub local_queue_capacity: usize,
    /// Forward loop queue poll timeout in ms.
    pub pop_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: crate::audio::NETWORK_QUEUE_CAPACITY,
            local_queue_capacity: crate::audio::LOCAL_QUEUE_CAPACITY,
            pop_timeout_ms: 1000,
        }
    }
}

impl AudioConfig {
    /// Forward loop queue poll timeout.
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }
}

/// Per-session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Drop model audio instead of relaying it to the client.
    ///
    /// The upstream stays negotiated for audio output either way.
    pub mute_model_audio: bool,
    /// Log tool registration and execution.
    pub verbose_tool_logs: bool,
    /// Pause after a transient response-loop error, in ms.
    pub response_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mute_model_audio: false,
            verbose_tool_logs: true,
            response_backoff_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Response loop backoff after a transient error.
    pub fn response_backoff(&self) -> Duration {
        Duration::from_millis(self.response_backoff_ms)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rolling `slidekick.log` file (None = stderr only).
    pub log_dir: Option<PathBuf>,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: Some(PathBuf::from("logs")),
            filter: "slidekick=info,tungstenite=warn".to_owned(),
        }
    }
}

impl SlidekickConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SlidekickError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SlidekickError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/slidekick/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("slidekick").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("slidekick")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/slidekick-config/config.toml")
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// Returns a description of every override that was ignored; callers log
    /// them once logging is initialised.
    pub fn apply_env_overrides(&mut self) -> Vec<String> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `GEMINI_API_KEY`, `VERBOSE_TOOL_LOG` (integer, non-zero
    /// enables), `SLIDEKICK_PORT`, `SLIDEKICK_MUTE_AUDIO` (`1`/`true`).
    /// Unparseable values leave the setting untouched and are reported in the
    /// returned list.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut ignored = Vec::new();
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.live.api_key = key.trim().to_owned();
        }
        if let Some(raw) = lookup("VERBOSE_TOOL_LOG") {
            match raw.trim().parse::<i64>() {
                Ok(v) => self.session.verbose_tool_logs = v != 0,
                Err(_) => ignored.push(format!("ignoring non-integer VERBOSE_TOOL_LOG={raw:?}")),
            }
        }
        if let Some(raw) = lookup("SLIDEKICK_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => ignored.push(format!("ignoring invalid SLIDEKICK_PORT={raw:?}")),
            }
        }
        if let Some(raw) = lookup("SLIDEKICK_MUTE_AUDIO") {
            let v = raw.trim().to_ascii_lowercase();
            self.session.mute_model_audio = matches!(v.as_str(), "1" | "true" | "yes");
        }
        ignored
    }

    /// Check the configuration is usable for serving live sessions.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::Config`] when the API key is missing or a
    /// queue capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.live.api_key.is_empty() {
            return Err(SlidekickError::Config(
                "GEMINI_API_KEY not found in environment variables".to_owned(),
            ));
        }
        if self.audio.client_queue_capacity == 0 || self.audio.local_queue_capacity == 0 {
            return Err(SlidekickError::Config(
                "audio queue capacities must be at least 1".to_owned(),
            ));
        }
        if self.server.converter_command.is_empty() {
            return Err(SlidekickError::Config(
                "server.converter_command must name a program".to_owned(),
            ));
        }
        Ok(())
    }
}
