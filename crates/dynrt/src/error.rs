//! Error types for the dynrt runtime.
//!
//! Recoverable failures are [`Error`] values returned through [`Result`].
//! Violations of the call-site producer's invariants are [`InternalError`]s
//! and go through [`fatal`], which never returns.

use crate::runtime::{Name, TypeRef, Value};
use std::fmt;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of member access that failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Getter,
    Setter,
    Index,
    Call,
    Constructor,
    Static,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemberKind::Method => "method",
            MemberKind::Getter => "getter",
            MemberKind::Setter => "setter",
            MemberKind::Index => "index operator",
            MemberKind::Call => "call",
            MemberKind::Constructor => "constructor",
            MemberKind::Static => "static method",
        };
        f.write_str(label)
    }
}

/// Recoverable runtime errors.
///
/// `Clone` because a single rejection may be observed by several promise
/// callbacks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Dispatch found no member, or the arguments did not fit its shape.
    #[error("no such {kind} `{name}` on {receiver} (called with {} argument(s))", .args.len())]
    NoSuchMember {
        name: Name,
        kind: MemberKind,
        receiver: String,
        args: Vec<Value>,
    },

    /// An explicit cast failed.
    #[error("type '{actual}' is not a subtype of type '{expected}' in type cast")]
    CastFailure { actual: TypeRef, expected: TypeRef },

    /// An implicit check on a dynamic value failed.
    #[error("type '{actual}' is not a subtype of type '{expected}' of '{context}'")]
    StrongModeViolation {
        actual: TypeRef,
        expected: TypeRef,
        context: String,
    },

    /// A value thrown by user code.
    #[error("uncaught exception: {0}")]
    Thrown(Value),

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("stream has already been listened to")]
    StreamAlreadyListened,

    #[error("cannot add events to a closed stream")]
    StreamClosed,

    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wraps a user value as a thrown exception.
    pub fn thrown(value: impl Into<Value>) -> Self {
        Error::Thrown(value.into())
    }

    pub(crate) fn no_such_member(
        name: Name,
        kind: MemberKind,
        receiver: &Value,
        args: &[Value],
    ) -> Self {
        Error::NoSuchMember {
            name,
            kind,
            receiver: receiver.describe(),
            args: args.to_vec(),
        }
    }
}

/// Violations of invariants the call-site producer is trusted to uphold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error("class `{class}` takes {expected} type argument(s) but was instantiated with {got}")]
    GenericArity {
        class: Name,
        expected: usize,
        got: usize,
    },

    #[error("class `{0}` is already registered")]
    DuplicateClass(Name),

    #[error("host constructor `{0}` already has a nominal type")]
    DuplicateHostRegistration(Name),

    #[error("signatures of class `{0}` were already defined")]
    SignaturesRedefined(Name),

    #[error("class `{class}` has no member `{member}` to publish as an extension")]
    MissingExtensionMember { class: Name, member: Name },

    #[error("type `{0}` is not a class type")]
    NotAClassType(TypeRef),
}

/// Logs `err` and aborts the current operation by panicking.
///
/// No layer of the runtime catches these.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: InternalError) -> ! {
    dynrt_log::error!("internal consistency error: {err}");
    panic!("internal consistency error: {err}");
}
