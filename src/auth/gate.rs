//! Method-scoped lazy authentication.
//!
//! The gate never sees the HTTP framework. Callers hand it the operation
//! name they already parsed and two booleans about the credential.

use serde::Deserialize;
use serde_json::Value;

/// Method prefixes that require a credential when auth is enabled.
const PRIVILEGED_PREFIXES: &[&str] = &["tools/", "resources/"];

/// Outcome of the gate for one request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthDecision {
    /// The privileged-operation check applies to this request.
    pub required: bool,
    /// The request may proceed.
    pub authorized: bool,
}

impl AuthDecision {
    pub fn is_rejected(&self) -> bool {
        self.required && !self.authorized
    }
}

/// Whether `method` names a privileged operation (tool invocation, resource read).
pub fn is_privileged(method: &str) -> bool {
    PRIVILEGED_PREFIXES.iter().any(|prefix| method.starts_with(prefix))
}

/// Decide whether a request may proceed.
///
/// Enforcement applies only when the deployment demands auth and the
/// operation is privileged. A request whose body could not be parsed has no
/// operation name and is let through to generic handling.
pub fn decide(
    operation: Option<&str>,
    has_credential: bool,
    credential_valid: bool,
    auth_required_by_config: bool,
) -> AuthDecision {
    let required = auth_required_by_config && operation.is_some_and(is_privileged);
    let authorized = !required || (has_credential && credential_valid);
    AuthDecision { required, authorized }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Deserialize)]
struct Envelope {
    method: Option<String>,
    #[serde(default)]
    id: Value,
}

/// The minimal slice of a JSON-RPC body the gate needs.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationProbe {
    pub method: Option<String>,
    /// Request id echoed into a rejection, `null` when absent.
    pub id: Value,
}

impl OperationProbe {
    /// Sniff the operation out of a request body.
    ///
    /// Returns `None` when the body is not a JSON-RPC object or batch. For a
    /// batch the first privileged message wins, so one cheap call cannot
    /// smuggle a privileged one past the gate.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        match serde_json::from_slice::<Value>(body).ok()? {
            Value::Object(map) => {
                let envelope: Envelope = serde_json::from_value(Value::Object(map)).ok()?;
                Some(Self { method: envelope.method, id: envelope.id })
            }
            Value::Array(items) => {
                let envelopes: Vec<Envelope> = items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect();
                let pick = envelopes
                    .iter()
                    .position(|e| e.method.as_deref().is_some_and(is_privileged))
                    .or_else(|| envelopes.iter().position(|e| e.method.is_some()))?;
                let envelope = envelopes.into_iter().nth(pick)?;
                Some(Self { method: envelope.method, id: envelope.id })
            }
            _ => None,
        }
    }
}
