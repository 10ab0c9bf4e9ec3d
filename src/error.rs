use thiserror::Error;

/// Error taxonomy for every orchestrator and engine operation.
///
/// Cancellation is deliberately absent: a user cancelling a ceremony resolves
/// as a `confirmed=false` decision, not as an error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestratorError {
    /// Malformed or unversioned request, unmatched requestId, unknown response shape.
    /// Fatal to the single operation, never auto-retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Platform credential ceremony failed outright (not a user cancellation).
    #[error("Ceremony error: {0}")]
    Ceremony(String),

    /// Missing or unusable PRF output, HKDF or key-material failure.
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// Store write, read-back or verification failure. No partial key material
    /// is ever considered valid.
    #[error("Store error: {0}")]
    Store(String),

    /// Dispatch exceeded its bound; the instance was destroyed and replaced.
    #[error("Dispatch timed out after {ms}ms")]
    Timeout { ms: u64 },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Stable slug carried in failure envelopes so the caller side can map
    /// the message back into the taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Protocol(_) => "protocol",
            OrchestratorError::Ceremony(_) => "ceremony",
            OrchestratorError::Derivation(_) => "derivation",
            OrchestratorError::Store(_) => "store",
            OrchestratorError::Timeout { .. } => "timeout",
        }
    }

    /// Rebuild a variant from a failure-envelope `{error, kind}` pair.
    /// Unknown kinds degrade to Protocol.
    pub fn from_failure(kind: &str, message: String) -> Self {
        match kind {
            "ceremony" => OrchestratorError::Ceremony(message),
            "derivation" => OrchestratorError::Derivation(message),
            "store" => OrchestratorError::Store(message),
            _ => OrchestratorError::Protocol(message),
        }
    }

    /// Message without the variant prefix. Failure envelopes carry this so
    /// `from_failure` on the caller side prefixes exactly once.
    pub fn bare_message(&self) -> String {
        match self {
            OrchestratorError::Protocol(message)
            | OrchestratorError::Ceremony(message)
            | OrchestratorError::Derivation(message)
            | OrchestratorError::Store(message) => message.clone(),
            OrchestratorError::Timeout { ms } => format!("Dispatch timed out after {}ms", ms),
        }
    }

    /// Display string with secret values redacted. Every message that leaves
    /// the engine (failure envelopes, logs) goes through this.
    pub fn scrubbed_message(&self) -> String {
        scrub_error_message(&self.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Protocol(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Store(format!("IO error: {}", err))
    }
}

// === SECRET SCRUBBING ===

#[derive(Clone, Copy)]
enum QuoteStyle {
    Plain,
    Escaped,
}

impl QuoteStyle {
    fn quote(self) -> &'static str {
        match self {
            QuoteStyle::Plain => "\"",
            QuoteStyle::Escaped => "\\\"",
        }
    }

    fn skip_value(self, s: &str) -> Option<&str> {
        match self {
            QuoteStyle::Plain => skip_plain_quoted_value(s),
            QuoteStyle::Escaped => skip_escaped_quoted_value(s),
        }
    }
}

const REDACTED: &str = "[REDACTED]";
const SECRET_STRING_FIELDS: [(&str, QuoteStyle); 36] = [
    ("\"nearPrivateKey\"", QuoteStyle::Plain),
    ("\"near_private_key\"", QuoteStyle::Plain),
    ("\\\"nearPrivateKey\\\"", QuoteStyle::Escaped),
    ("\\\"near_private_key\\\"", QuoteStyle::Escaped),
    ("\"privateKey\"", QuoteStyle::Plain),
    ("\"private_key\"", QuoteStyle::Plain),
    ("\\\"privateKey\\\"", QuoteStyle::Escaped),
    ("\\\"private_key\\\"", QuoteStyle::Escaped),
    ("\"prfOutput\"", QuoteStyle::Plain),
    ("\"prf_output\"", QuoteStyle::Plain),
    ("\\\"prfOutput\\\"", QuoteStyle::Escaped),
    ("\\\"prf_output\\\"", QuoteStyle::Escaped),
    ("\"prfFirst\"", QuoteStyle::Plain),
    ("\"prfSecond\"", QuoteStyle::Plain),
    ("\\\"prfFirst\\\"", QuoteStyle::Escaped),
    ("\\\"prfSecond\\\"", QuoteStyle::Escaped),
    ("\"prf_first\"", QuoteStyle::Plain),
    ("\"prf_second\"", QuoteStyle::Plain),
    ("\\\"prf_first\\\"", QuoteStyle::Escaped),
    ("\\\"prf_second\\\"", QuoteStyle::Escaped),
    ("\"chacha20PrfOutput\"", QuoteStyle::Plain),
    ("\"ed25519PrfOutput\"", QuoteStyle::Plain),
    ("\\\"chacha20PrfOutput\\\"", QuoteStyle::Escaped),
    ("\\\"ed25519PrfOutput\\\"", QuoteStyle::Escaped),
    ("\"chacha20_prf_output\"", QuoteStyle::Plain),
    ("\"ed25519_prf_output\"", QuoteStyle::Plain),
    ("\\\"chacha20_prf_output\\\"", QuoteStyle::Escaped),
    ("\\\"ed25519_prf_output\\\"", QuoteStyle::Escaped),
    ("\"decryptedPrivateKey\"", QuoteStyle::Plain),
    ("\"decrypted_private_key\"", QuoteStyle::Plain),
    ("\\\"decryptedPrivateKey\\\"", QuoteStyle::Escaped),
    ("\\\"decrypted_private_key\\\"", QuoteStyle::Escaped),
    ("\"encryptedPrivateKeyData\"", QuoteStyle::Plain),
    ("\"encrypted_private_key_data\"", QuoteStyle::Plain),
    ("\\\"encryptedPrivateKeyData\\\"", QuoteStyle::Escaped),
    ("\\\"encrypted_private_key_data\\\"", QuoteStyle::Escaped),
];

/// JSON object keys that must never appear in an outbound confirmation payload.
/// The engine refuses to emit a request carrying any of these.
const FORBIDDEN_PAYLOAD_KEYS: [&str; 10] = [
    "nearPrivateKey",
    "near_private_key",
    "privateKey",
    "private_key",
    "prfOutput",
    "prf_output",
    "dualPrfOutputs",
    "dual_prf_outputs",
    "chacha20PrfOutput",
    "ed25519PrfOutput",
];

fn scrub_json_string_fields(input: &str, patterns: &[(&str, QuoteStyle)]) -> String {
    let mut output = input.to_string();
    for (pattern, quote_style) in patterns {
        output = scrub_json_string_field(&output, pattern, *quote_style);
    }
    output
}

fn scrub_json_string_field(input: &str, key_pattern: &str, quote_style: QuoteStyle) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before_key, after_key)) = rest.split_once(key_pattern) {
        out.push_str(before_key);
        out.push_str(key_pattern);
        rest = after_key;

        let Some((before_colon, after_colon)) = rest.split_once(':') else {
            out.push_str(rest);
            return out;
        };

        out.push_str(before_colon);
        out.push(':');
        rest = after_colon;

        let (ws, after_ws) = split_while(rest, |ch| ch.is_whitespace());
        out.push_str(ws);
        rest = after_ws;

        let quote = quote_style.quote();
        let Some(after_open) = rest.strip_prefix(quote) else {
            out.push_str(rest);
            return out;
        };

        out.push_str(quote);
        out.push_str(REDACTED);
        out.push_str(quote);

        rest = match quote_style.skip_value(after_open) {
            Some(after_close) => after_close,
            None => return out,
        };
    }

    out.push_str(rest);
    out
}

fn split_while<F>(s: &str, mut pred: F) -> (&str, &str)
where
    F: FnMut(char) -> bool,
{
    let mut end = 0;
    for (idx, ch) in s.char_indices() {
        if pred(ch) {
            end = idx + ch.len_utf8();
        } else {
            break;
        }
    }
    s.split_at(end)
}

fn skip_plain_quoted_value(s: &str) -> Option<&str> {
    let mut escaped = false;
    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            return Some(&s[idx + ch.len_utf8()..]);
        }
    }
    None
}

fn skip_escaped_quoted_value(s: &str) -> Option<&str> {
    s.find("\\\"").map(|idx| &s[idx + 2..])
}

/// Redact secret-bearing JSON string fields from an error message or log line.
/// Every string that crosses into an envelope or a log call goes through here.
pub fn scrub_error_message(message: &str) -> String {
    let scrubbed = scrub_json_string_fields(message, &SECRET_STRING_FIELDS);
    if scrubbed.contains("\"prf\"") || scrubbed.contains("\\\"prf\\\"") {
        scrub_json_string_fields(
            &scrubbed,
            &[
                ("\"first\"", QuoteStyle::Plain),
                ("\"second\"", QuoteStyle::Plain),
                ("\\\"first\\\"", QuoteStyle::Escaped),
                ("\\\"second\\\"", QuoteStyle::Escaped),
            ],
        )
    } else {
        scrubbed
    }
}

/// Walk a JSON tree looking for a key that names secret material.
/// Returns the first offending key, or None when the payload is clean.
pub fn find_forbidden_secret_key(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Array(items) => {
            items.iter().find_map(find_forbidden_secret_key)
        }
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                if FORBIDDEN_PAYLOAD_KEYS.contains(&key.as_str()) {
                    return Some(key.clone());
                }
                if let Some(inner) = find_forbidden_secret_key(child) {
                    return Some(inner);
                }
            }
            None
        }
        _ => None,
    }
}
