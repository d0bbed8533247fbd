//! Relay configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Literal payload that terminates an upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Field marker that prefixes every payload line of an upstream frame.
pub const DATA_PREFIX: &str = "data:";

/// Blank line separating upstream frames (after `\r\n` normalization).
pub const FRAME_DELIMITER: &str = "\n\n";

/// Default completion endpoint (OpenAI-compatible chat completions).
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Environment variable consulted for the API key.
pub const DEFAULT_API_KEY_ENV: &str = "HONYAKU_API_KEY";

/// A session that receives no byte for this long reports an idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for establishing the upstream connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Non-2xx bodies are read up to this size when extracting the error code.
pub const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
