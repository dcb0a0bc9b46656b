use crate::primitive::{PrimitiveId, PrimitiveKind};

/// Enumeration representing the various errors that can occur while compiling a topology.
#[derive(Debug)]
pub enum TesselError {
    /// Primitive names an input that is not part of the topology
    DanglingDependency(PrimitiveId),
    /// Adding dependency would close a cycle, contains id of the node whose edge closed it
    GraphCycle(PrimitiveId),
    /// Two primitives with the same id
    DuplicatePrimitive(PrimitiveId),
    /// Invalid primitive parameters, detected when the descriptor is constructed
    ParameterError {
        /// Offending primitive
        id: PrimitiveId,
        /// What is wrong
        message: Box<str>,
    },
    /// Invalid shapes, detected during layout inference
    ShapeError {
        /// Offending primitive
        id: PrimitiveId,
        /// What is wrong
        message: Box<str>,
    },
    /// Primitive was accessed as a different kind than it is
    KindMismatch {
        /// Offending primitive
        id: PrimitiveId,
        /// Requested kind
        expected: PrimitiveKind,
        /// Actual kind
        found: PrimitiveKind,
    },
    /// No registered kernel implementation can execute this primitive
    NoCompatibleImplementation {
        /// Offending primitive
        id: PrimitiveId,
        /// Kind of the primitive
        kind: PrimitiveKind,
        /// Operation signature that could not be matched
        signature: Box<str>,
    },
    /// Dispatch geometry could not be computed, this is a bug in kernel registration
    GeometryError(Box<str>),
    /// Error parsing some data
    ParseError(Box<str>),
    /// Error from file operations
    IOError(std::io::Error),
}

impl TesselError {
    /// Parameter error
    pub fn parameter_error(id: &PrimitiveId, message: impl Into<Box<str>>) -> Self {
        Self::ParameterError { id: id.clone(), message: message.into() }
    }

    /// Shape error
    pub fn shape_error(id: &PrimitiveId, message: impl Into<Box<str>>) -> Self {
        Self::ShapeError { id: id.clone(), message: message.into() }
    }

    /// Geometry error
    #[track_caller]
    pub fn geometry_error(e: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        let mut e: String = e.into();
        e.push_str(&format!(", {}:{}:{}", location.file(), location.line(), location.column()));
        Self::GeometryError(e.into())
    }

    /// Parse error
    #[track_caller]
    pub fn parse_error(e: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        let mut e: String = e.into();
        e.push_str(&format!(", {}:{}:{}", location.file(), location.line(), location.column()));
        Self::ParseError(e.into())
    }
}

impl std::fmt::Display for TesselError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TesselError::DanglingDependency(id) => {
                f.write_fmt(format_args!("Dangling dependency, primitive {id} does not exist"))
            }
            TesselError::GraphCycle(id) => {
                f.write_fmt(format_args!("Dependency of {id} closes a cycle"))
            }
            TesselError::DuplicatePrimitive(id) => {
                f.write_fmt(format_args!("Primitive {id} is declared more than once"))
            }
            TesselError::ParameterError { id, message } => {
                f.write_fmt(format_args!("Invalid parameters of {id}: {message}"))
            }
            TesselError::ShapeError { id, message } => {
                f.write_fmt(format_args!("Shape error in {id}: {message}"))
            }
            TesselError::KindMismatch { id, expected, found } => f.write_fmt(format_args!(
                "Primitive {id} accessed as {expected}, but it is {found}"
            )),
            TesselError::NoCompatibleImplementation { id, kind, signature } => f.write_fmt(
                format_args!("No compatible {kind} implementation for {id}, signature {signature}"),
            ),
            TesselError::GeometryError(e) => f.write_fmt(format_args!("Geometry error {e}")),
            TesselError::ParseError(e) => f.write_fmt(format_args!("Parse error {e}")),
            TesselError::IOError(e) => f.write_fmt(format_args!("IO {e}")),
        }
    }
}

impl std::error::Error for TesselError {}

impl From<std::io::Error> for TesselError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
