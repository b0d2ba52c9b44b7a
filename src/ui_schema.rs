use serde_json::Value;

/// Result of validating the server's UI sub-document.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUi {
    /// The payload to render: validated, or passed through best-effort.
    pub value: Value,
    pub valid: bool,
}

/// Seam for the runtime schema-validation collaborator.
///
/// Validation is advisory: an implementation returns either the validated
/// payload or a best-effort passthrough, and the stream reducer proceeds
/// identically either way. It must never block or mutate control flow.
pub trait UiSchemaValidator: Send + Sync {
    fn validate(&self, payload: &Value) -> ValidatedUi;
}

/// Default validator: accepts structured payloads (objects and arrays),
/// flags anything else, and always passes the payload through.
#[derive(Debug, Default)]
pub struct PermissiveUiValidator;

impl UiSchemaValidator for PermissiveUiValidator {
    fn validate(&self, payload: &Value) -> ValidatedUi {
        ValidatedUi {
            value: payload.clone(),
            valid: payload.is_object() || payload.is_array(),
        }
    }
}
