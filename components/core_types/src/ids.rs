//! Identifier types shared by the compiler pipeline.
//!
//! Methods, classes and known heap objects are addressed by dense integer
//! handles handed out by the runtime. None of these types own any data; they
//! are cheap to copy and hash.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle for a resolved method.
///
/// # Examples
///
/// ```
/// use core_types::MethodId;
///
/// let id = MethodId(7);
/// assert_eq!(id.index(), 7);
/// assert_eq!(id.to_string(), "m7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u32);

impl MethodId {
    /// Raw index of this method
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Handle for a loaded class or interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Raw index of this class
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Index into the compilation's known-object table.
///
/// A known object is a heap object whose identity was proven at compile
/// time (for example a constant method handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KnownObjectId(pub u32);

impl fmt::Display for KnownObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// Location of a call instruction: the enclosing method and the bytecode
/// index of the call within it.
///
/// Profiling tables are keyed by this value, so it stays stable while the
/// IR around the call is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteKey {
    /// Method containing the call
    pub method: MethodId,
    /// Bytecode index of the call
    pub bc_index: u32,
}

impl CallSiteKey {
    /// Create a new call site key
    pub fn new(method: MethodId, bc_index: u32) -> Self {
        Self { method, bc_index }
    }
}

impl fmt::Display for CallSiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.bc_index)
    }
}
