//! Domain error types.

use chrono::NaiveDate;

use crate::domain::registry::ComponentKind;

/// A parse error with position information for definition expressions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Failure while evaluating an expression or script statement.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("name '{name}' is not defined")]
    UndefinedName { name: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("division by zero")]
    ZeroDivision,

    #[error("result of {length} bytes exceeds the string limit")]
    Memory { length: usize },

    #[error("{message}")]
    Host { message: String },
}

impl EvalError {
    pub fn type_error(message: impl Into<String>) -> Self {
        EvalError::Type {
            message: message.into(),
        }
    }
}

/// A script statement failure, tagged with its 1-based source line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {source}")]
pub struct ScriptError {
    pub line: usize,
    pub source: EvalError,
}

/// Registry mutation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} {name:?} is already registered")]
    Duplicate { kind: ComponentKind, name: String },

    #[error("{kind} {name:?} was not registered")]
    NotRegistered { kind: ComponentKind, name: String },
}

/// Why a single extension failed to load.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("no module named {module:?}")]
    ModuleNotFound { module: String },

    #[error("module {module:?} failed to initialize: {reason}")]
    Module { module: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Top-level error type for algorun.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid define {define:?}, should be of the form name=value")]
    DefinitionSyntax { define: String },

    #[error("failed to execute definition for name {name:?}: {source}")]
    DefinitionEvaluation { name: String, source: EvalError },

    #[error("{message}")]
    ConfigurationConflict { message: String },

    #[error("there are no trading days between {start} and {end}")]
    EmptyDateRange { start: NaiveDate, end: NaiveDate },

    #[error("no {kind} registered as {name:?}")]
    UnknownComponent { kind: ComponentKind, name: String },

    #[error("no pipeline loader registered for column {column}")]
    UnregisteredColumn { column: String },

    #[error("failed to load extension {extension:?}: {source}")]
    ExtensionLoad {
        extension: String,
        source: ExtensionError,
    },

    #[error("no data for bundle {bundle:?}: {reason}")]
    BundleNotFound { bundle: String, reason: String },

    #[error("bundle data error: {reason}")]
    BundleData { reason: String },

    #[error("benchmark data error: {reason}")]
    Benchmark { reason: String },

    #[error("simulation failed: {reason}")]
    Simulation { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("failed to persist results to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RunError> for std::process::ExitCode {
    fn from(err: &RunError) -> Self {
        let code: u8 = match err {
            RunError::Io(_) | RunError::Persist { .. } => 1,
            RunError::ConfigParse { .. }
            | RunError::ConfigMissing { .. }
            | RunError::ConfigInvalid { .. }
            | RunError::ConfigurationConflict { .. }
            | RunError::EmptyDateRange { .. } => 2,
            RunError::DefinitionSyntax { .. } | RunError::DefinitionEvaluation { .. } => 3,
            RunError::ExtensionLoad { .. } | RunError::UnknownComponent { .. } => 4,
            RunError::BundleNotFound { .. }
            | RunError::BundleData { .. }
            | RunError::Benchmark { .. } => 5,
            RunError::UnregisteredColumn { .. } | RunError::Simulation { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
