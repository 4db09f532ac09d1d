//! Method and class metadata consumed by the optimizer
//!
//! These records are produced by the class loader and are read-only for the
//! compiler. A compilation may share them with other compilations running on
//! other threads.

use crate::{ClassId, MethodId};
use serde::{Deserialize, Serialize};

/// Type of a value flowing through the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// 32-bit integer (also used for booleans, bytes, chars and shorts)
    Int,
    /// 64-bit integer
    Long,
    /// 64-bit floating point
    Double,
    /// Object reference whose static type is the given class
    Reference(ClassId),
    /// No value
    Void,
}

impl ValueType {
    /// Check if this is a reference type
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Reference(_))
    }

    /// Declared class of a reference type
    pub fn class(&self) -> Option<ClassId> {
        match self {
            ValueType::Reference(class) => Some(*class),
            _ => None,
        }
    }
}

/// Boolean properties of a method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFlags {
    /// Method has no receiver
    pub is_static: bool,
    /// Method acquires the receiver's (or class's) monitor on entry
    pub is_synchronized: bool,
    /// Method is implemented natively and has no IR
    pub is_native: bool,
    /// Method has no body
    pub is_abstract: bool,
    /// Method cannot be overridden
    pub is_final: bool,
    /// VM-internal method handle archetype specimen
    pub is_archetype_specimen: bool,
    /// Method was generated for a lambda form
    pub is_lambda_form: bool,
    /// Method handle invoke helper (invokeExact and friends)
    pub is_method_handle_invoke: bool,
    /// Method carries a force-inline annotation
    pub force_inline: bool,
    /// Method carries a do-not-inline annotation
    pub dont_inline: bool,
}

/// Descriptor of a resolved method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Method handle
    pub id: MethodId,
    /// Declaring class
    pub holder: ClassId,
    /// Simple name, e.g. `hashCode`
    pub name: String,
    /// Signature, e.g. `(I)I`
    pub signature: String,
    /// Declared parameter types, excluding the receiver
    pub params: Vec<ValueType>,
    /// Declared return type
    pub return_type: ValueType,
    /// Method properties
    pub flags: MethodFlags,
}

impl MethodInfo {
    /// Create a method descriptor with default flags
    pub fn new(
        id: MethodId,
        holder: ClassId,
        name: impl Into<String>,
        signature: impl Into<String>,
        params: Vec<ValueType>,
        return_type: ValueType,
    ) -> Self {
        Self {
            id,
            holder,
            name: name.into(),
            signature: signature.into(),
            params,
            return_type,
            flags: MethodFlags::default(),
        }
    }

    /// Replace the method flags
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Name plus signature; two methods with the same selector in related
    /// classes override one another.
    pub fn selector(&self) -> String {
        format!("{}{}", self.name, self.signature)
    }

    /// Number of actual arguments a call passes, receiver included
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.flags.is_static)
    }

    /// Types of all incoming arguments, receiver first for instance methods
    pub fn arg_types(&self) -> Vec<ValueType> {
        let mut types = Vec::with_capacity(self.arg_count());
        if !self.flags.is_static {
            types.push(ValueType::Reference(self.holder));
        }
        types.extend(self.params.iter().copied());
        types
    }
}

/// Descriptor of a loaded class or interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Class handle
    pub id: ClassId,
    /// Internal name, e.g. `java/lang/String`
    pub name: String,
    /// Direct superclass, `None` for the root class and interfaces
    pub superclass: Option<ClassId>,
    /// Directly implemented (or extended, for interfaces) interfaces
    pub interfaces: Vec<ClassId>,
    /// Class is an interface
    pub is_interface: bool,
    /// Class cannot be instantiated
    pub is_abstract: bool,
    /// Class cannot be subclassed
    pub is_final: bool,
}

impl ClassInfo {
    /// Create a concrete, non-final class
    pub fn new(id: ClassId, name: impl Into<String>, superclass: Option<ClassId>) -> Self {
        Self {
            id,
            name: name.into(),
            superclass,
            interfaces: Vec::new(),
            is_interface: false,
            is_abstract: false,
            is_final: false,
        }
    }

    /// Create an interface
    pub fn interface(id: ClassId, name: impl Into<String>) -> Self {
        Self {
            is_interface: true,
            is_abstract: true,
            ..Self::new(id, name, None)
        }
    }

    /// Mark the class final
    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Mark the class abstract
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add an implemented interface
    pub fn implementing(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }
}

/// How hot the method being compiled is; higher levels buy more aggressive
/// optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hotness {
    /// First compilation of a rarely run method
    Cold,
    /// Default optimization level
    #[default]
    Warm,
    /// Frequently executed method
    Hot,
    /// Very frequently executed method
    VeryHot,
    /// Dominant method of the workload
    Scorching,
}
