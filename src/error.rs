//! Unified error types for the simulation engine.
//!
//! Every subsystem has its own error enum, and all of them convert into the
//! crate-level [`Error`] so the host runner can propagate a single type.
//! The taxonomy follows the failure lifetime of each layer:
//!
//! | Type            | Raised at        | Effect                              |
//! |-----------------|------------------|-------------------------------------|
//! | `CatalogError`  | load time        | fatal, the engine refuses to start  |
//! | `RegistryError` | provisioning     | record logged and skipped           |
//! | `DecodeError`   | per codec call   | caller maps it to `Trouble(1)`      |
//! | `ScriptError`   | per invocation   | invocation aborted, loop continues  |
//! | `ConfigError`   | engine config    | reported by `EngineConfig::validate`|

use core::fmt;

use crate::catalog::DeviceKind;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Catalog(CatalogError),
    Registry(RegistryError),
    Decode(DecodeError),
    Script(ScriptError),
    Config(Vec<ConfigError>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "catalog: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Script(e) => write!(f, "script: {e}"),
            Self::Config(errs) => {
                write!(f, "config:")?;
                for e in errs {
                    write!(f, " [{e}]")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Catalog errors
// ---------------------------------------------------------------------------

/// Load-time failures of the device catalog or the instance config.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// The document is not valid JSON or a record has the wrong shape.
    Parse(String),
    /// Two records of the same kind share a model name.
    DuplicateModel(String),
    /// An entry of a pulse-width table can never be decoded because
    /// lower-index entries cover its whole range.
    OverlappingRanges { model: String, slot: u8, index: usize },
    /// A pulse-width table entry is malformed.
    InvalidTable { model: String, slot: u8, reason: &'static str },
    /// The condition lookup refers to a missing slot or out-of-table entries.
    InvalidLookup { model: String, reason: &'static str },
    /// A command sequence pattern is not made of `0`, `1` and `x` triplets.
    InvalidSequence { model: String, tag: String },
    /// A script failed to parse.
    Script { context: String, error: ScriptError },
    /// A `goto` names a script block that does not exist.
    UnresolvedLabel { context: String, label: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "malformed document: {msg}"),
            Self::DuplicateModel(name) => write!(f, "duplicate model '{name}'"),
            Self::OverlappingRanges { model, slot, index } => write!(
                f,
                "model '{model}' pw{slot}: entry {index} is shadowed by lower entries"
            ),
            Self::InvalidTable { model, slot, reason } => {
                write!(f, "model '{model}' pw{slot}: {reason}")
            }
            Self::InvalidLookup { model, reason } => {
                write!(f, "model '{model}' lookup: {reason}")
            }
            Self::InvalidSequence { model, tag } => {
                write!(f, "model '{model}' command '{tag}': bad sequence")
            }
            Self::Script { context, error } => write!(f, "{context}: {error}"),
            Self::UnresolvedLabel { context, label } => {
                write!(f, "{context}: goto to unknown label '{label}'")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<CatalogError> for Error {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Address outside 1..=160.
    AddressOutOfRange { kind: DeviceKind, address: u32 },
    /// The slot was never provisioned.
    Unprovisioned { kind: DeviceKind, address: u8 },
    /// More group memberships than a device can hold.
    TooManyGroups { kind: DeviceKind, address: u8 },
    /// Group numbers are 1..=255.
    InvalidGroup(u32),
    /// The provisioning record names a model missing from the catalog.
    UnknownModel { kind: DeviceKind, model: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange { kind, address } => {
                write!(f, "{kind} address {address} out of range")
            }
            Self::Unprovisioned { kind, address } => {
                write!(f, "{kind} {address} is not provisioned")
            }
            Self::TooManyGroups { kind, address } => {
                write!(f, "{kind} {address}: too many groups")
            }
            Self::InvalidGroup(g) => write!(f, "invalid group {g}"),
            Self::UnknownModel { kind, model } => write!(f, "unknown {kind} model '{model}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// No table entry contains the measured width.
    NoMatch { slot: u8, width: u16 },
    /// The model does not drive the slot holding its condition table.
    SlotNotDriven(u8),
    /// The requested condition has no entry in the model's lookup.
    Unrepresentable,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { slot, width } => write!(f, "pw{slot} width {width} matches no entry"),
            Self::SlotNotDriven(slot) => write!(f, "pw{slot} is not driven by this model"),
            Self::Unrepresentable => write!(f, "condition not present in lookup"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Script errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// Syntax error, reported at load time.
    Parse { line: u32, column: u32, message: String },
    /// Runtime fault; aborts the current invocation only.
    Fault(Fault),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse {
                line,
                column,
                message,
            } => write!(f, "syntax error at {line}:{column}: {message}"),
            Self::Fault(reason) => write!(f, "fault: {reason}"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<Fault> for ScriptError {
    fn from(f: Fault) -> Self {
        Self::Fault(f)
    }
}

impl From<ScriptError> for Error {
    fn from(e: ScriptError) -> Self {
        Self::Script(e)
    }
}

/// Reason a script invocation was aborted.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Device index outside 1..=160.
    AddressOutOfRange(i64),
    /// `led[..]` index outside the indicator bank.
    BadIndicator(i64),
    /// `timer[..]` index outside 1..=4.
    BadTimer(i64),
    DivisionByZero,
    UnresolvedSymbol(String),
    UnknownField(String),
    /// Assignment to a field scripts may only read.
    ReadOnly(&'static str),
    TypeMismatch(&'static str),
    /// A field write carried a value outside the field's domain.
    InvalidValue { field: &'static str, value: i64 },
    TooManyGroups,
    /// `this` used by a script that was not dispatched for a device.
    NoDevice,
    /// The invocation exceeded the per-run step budget.
    StepBudgetExhausted,
    BadArguments(&'static str),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange(a) => write!(f, "device index {a} out of range"),
            Self::BadIndicator(i) => write!(f, "indicator {i} out of range"),
            Self::BadTimer(i) => write!(f, "timer {i} out of range"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::UnresolvedSymbol(name) => write!(f, "unresolved symbol '{name}'"),
            Self::UnknownField(name) => write!(f, "unknown field '{name}'"),
            Self::ReadOnly(field) => write!(f, "field '{field}' is read-only"),
            Self::TypeMismatch(what) => write!(f, "type mismatch: {what}"),
            Self::InvalidValue { field, value } => write!(f, "invalid value {value} for {field}"),
            Self::TooManyGroups => write!(f, "too many groups"),
            Self::NoDevice => write!(f, "'this' has no device"),
            Self::StepBudgetExhausted => write!(f, "step budget exhausted"),
            Self::BadArguments(call) => write!(f, "bad arguments to {call}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine config errors
// ---------------------------------------------------------------------------

/// One violated constraint in [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<Vec<ConfigError>> for Error {
    fn from(errs: Vec<ConfigError>) -> Self {
        Self::Config(errs)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;
