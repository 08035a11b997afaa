//! Error types for the assistant core.

/// Top-level error type for the agent core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Preference-registry errors.
///
/// `Validation` and `Unregistered` are configuration mistakes surfaced at
/// registration/decoration time. `NoContext` is a programmer error: prompt
/// values were read outside an active scope.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid prompt definition: {reason}")]
    Validation { reason: String },

    #[error("Prompt {key} not registered")]
    Unregistered { key: String },

    #[error("No prompt context found. Resolve prompts with a PromptScope first.")]
    NoContext,
}

/// Durable-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Dispatcher errors.
///
/// `UnknownTool` means the model selected a tool outside the closed action
/// set, which is a deployment mistake and fatal at the point of use.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown tool selected: {name}")]
    UnknownTool { name: String },

    #[error("Triage failed: {0}")]
    Triage(String),

    #[error("Drafting failed: {0}")]
    Draft(String),
}

/// Model-call errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid model response: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Provider-API errors.
///
/// External-action failures during Act are caught at the action boundary
/// and converted into textual tool results, so this type rarely escapes
/// the dispatcher.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Result type alias for the agent core.
pub type Result<T> = std::result::Result<T, Error>;
