//! Virtual guard selection
//!
//! A speculatively devirtualized call target is protected by a runtime test.
//! When the test fails, execution continues on a path that still performs
//! the original call.

use core_types::ClassId;
use serde::Serialize;
use std::fmt;

/// Why a guard is needed and what assumption it protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GuardKind {
    /// Target is exact; no runtime test
    NoGuard,
    /// Interface method with a single loaded implementer
    InterfaceGuard,
    /// Single implementer of an abstract or widely declared method
    NonoverriddenGuard,
    /// Receiver class observed by the profiler
    ProfiledGuard,
    /// Method not overridden anywhere in the receiver's hierarchy
    HierarchyGuard,
    /// Current target of a mutable call site
    MutableCallSiteGuard,
}

/// How the guard compares the receiver against the assumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TestType {
    /// Compare the resolved method pointer (slower, tolerates subclasses)
    MethodTest,
    /// Compare the receiver's class pointer
    VftTest,
}

/// Guard chosen for one call target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VirtualGuardSelection {
    /// Assumption being protected
    pub kind: GuardKind,
    /// Comparison used at runtime
    pub test: TestType,
    /// Class the test compares against, when the test needs one
    pub class: Option<ClassId>,
}

impl VirtualGuardSelection {
    /// Selection for a call that needs no guard
    pub fn none() -> Self {
        Self {
            kind: GuardKind::NoGuard,
            test: TestType::MethodTest,
            class: None,
        }
    }

    /// Create a new guard selection
    pub fn new(kind: GuardKind, test: TestType, class: Option<ClassId>) -> Self {
        Self { kind, test, class }
    }

    /// Check if a runtime test must be emitted
    pub fn is_guarded(&self) -> bool {
        self.kind != GuardKind::NoGuard
    }

    /// Replace a method test with a class test once the receiver class is
    /// known exactly.
    pub fn prefer_vft_test(mut self, fixed_class: ClassId) -> Self {
        if self.is_guarded() && self.test == TestType::MethodTest {
            self.test = TestType::VftTest;
            self.class = Some(fixed_class);
        }
        self
    }
}

impl fmt::Display for VirtualGuardSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            Some(class) => write!(f, "{:?}/{:?}({})", self.kind, self.test, class),
            None => write!(f, "{:?}/{:?}", self.kind, self.test),
        }
    }
}

/// Identity of one emitted guard within a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GuardId(pub u32);
