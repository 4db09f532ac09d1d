//! Per-method inlining policy
//!
//! Special treatment of individual methods is data: a table of
//! [`PolicyBits`] keyed by method, plus name-pattern rules for library
//! methods whose handle is not known ahead of time. Pattern rules are
//! always tagged [`PolicyBits::LEGACY`] so they show up in the decision log.

use crate::error::{InlinerError, InlinerResult};
use crate::program::MethodResolver;
use core_types::MethodId;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::ops::{BitOr, BitOrAssign};

/// Set of policy flags for one method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PolicyBits(u16);

impl PolicyBits {
    /// No special treatment
    pub const NONE: PolicyBits = PolicyBits(0);
    /// Annotated force-inline
    pub const FORCE_INLINE: PolicyBits = PolicyBits(1 << 0);
    /// Method handle plumbing that must be inlined for performance
    pub const JSR292: PolicyBits = PolicyBits(1 << 1);
    /// Known to pay off whatever the budget says
    pub const ALWAYS_WORTH_INLINING: PolicyBits = PolicyBits(1 << 2);
    /// Never inline
    pub const DONT_INLINE: PolicyBits = PolicyBits(1 << 3);
    /// Recognized cheap library operation with a fixed small size
    pub const CHEAP_LIBRARY: PolicyBits = PolicyBits(1 << 4);
    /// Folds well when arguments are constant
    pub const CONSTANT_FOLDABLE: PolicyBits = PolicyBits(1 << 5);
    /// Guard profiled receivers with a method test instead of a class test
    pub const PREFER_METHOD_TEST: PolicyBits = PolicyBits(1 << 6);
    /// Set by a name-pattern rule
    pub const LEGACY: PolicyBits = PolicyBits(1 << 7);

    const NAMES: [(PolicyBits, &'static str); 8] = [
        (Self::FORCE_INLINE, "force_inline"),
        (Self::JSR292, "jsr292"),
        (Self::ALWAYS_WORTH_INLINING, "always_worth_inlining"),
        (Self::DONT_INLINE, "dont_inline"),
        (Self::CHEAP_LIBRARY, "cheap_library"),
        (Self::CONSTANT_FOLDABLE, "constant_foldable"),
        (Self::PREFER_METHOD_TEST, "prefer_method_test"),
        (Self::LEGACY, "legacy"),
    ];

    /// Check if every flag of `other` is set
    pub fn contains(self, other: PolicyBits) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any flag of `other` is set
    pub fn intersects(self, other: PolicyBits) -> bool {
        self.0 & other.0 != 0
    }

    /// Check if no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Candidates with these bits bypass every budget
    pub fn is_must_keep(self) -> bool {
        self.intersects(Self::FORCE_INLINE | Self::JSR292 | Self::ALWAYS_WORTH_INLINING)
    }

    /// Names of the set flags, for diagnostics
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for PolicyBits {
    type Output = PolicyBits;

    fn bitor(self, rhs: PolicyBits) -> PolicyBits {
        PolicyBits(self.0 | rhs.0)
    }
}

impl BitOrAssign for PolicyBits {
    fn bitor_assign(&mut self, rhs: PolicyBits) {
        self.0 |= rhs.0;
    }
}

/// Name-pattern rule matched against `ClassName.methodName`
#[derive(Debug, Clone)]
pub struct LegacyRule {
    pattern: Regex,
    bits: PolicyBits,
    note: String,
}

impl LegacyRule {
    /// Pattern source
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Flags applied on a match, always including [`PolicyBits::LEGACY`]
    pub fn bits(&self) -> PolicyBits {
        self.bits
    }

    /// Why the rule exists
    pub fn note(&self) -> &str {
        &self.note
    }
}

/// Method policy lookup
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    entries: FxHashMap<MethodId, PolicyBits>,
    legacy: Vec<LegacyRule>,
}

impl PolicyTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table carrying the library rules the inliner has always had
    pub fn with_legacy_rules() -> Self {
        let mut table = Self::new();
        let rules = [
            (
                r"^java/lang/ThreadLocal\.(get|set)$",
                PolicyBits::PREFER_METHOD_TEST,
                "thread-local receivers are commonly subclassed per use",
            ),
            (
                r"^java/lang/Math\.(abs|min|max)$",
                PolicyBits::CHEAP_LIBRARY,
                "reduces to one or two machine instructions",
            ),
            (
                r"^java/lang/String\.(length|charAt|isEmpty)$",
                PolicyBits::CHEAP_LIBRARY,
                "field load plus bounds check",
            ),
            (
                r"^java/lang/Integer\.(valueOf|hashCode)$",
                PolicyBits::CONSTANT_FOLDABLE,
                "folds away for constant arguments",
            ),
        ];
        for (pattern, bits, note) in rules {
            // The built-in patterns are known to compile
            if let Ok(pattern) = Regex::new(pattern) {
                table.legacy.push(LegacyRule {
                    pattern,
                    bits: bits | PolicyBits::LEGACY,
                    note: note.to_string(),
                });
            }
        }
        table
    }

    /// Add flags for a method
    pub fn insert(&mut self, method: MethodId, bits: PolicyBits) {
        *self.entries.entry(method).or_default() |= bits;
    }

    /// Add a name-pattern rule
    pub fn add_legacy_rule(&mut self, pattern: &str, bits: PolicyBits, note: &str) -> InlinerResult<()> {
        let pattern = Regex::new(pattern)
            .map_err(|e| InlinerError::InvalidConfig(format!("bad legacy policy pattern: {}", e)))?;
        self.legacy.push(LegacyRule {
            pattern,
            bits: bits | PolicyBits::LEGACY,
            note: note.to_string(),
        });
        Ok(())
    }

    /// Name-pattern rules in insertion order
    pub fn legacy_rules(&self) -> &[LegacyRule] {
        &self.legacy
    }

    /// Flags that apply to a method
    ///
    /// Combines explicit entries, flags implied by the method's own
    /// properties, and every matching name-pattern rule.
    pub fn bits_for(&self, resolver: &dyn MethodResolver, method: MethodId) -> PolicyBits {
        let mut bits = self.entries.get(&method).copied().unwrap_or_default();
        let Some(info) = resolver.method(method) else {
            return bits;
        };
        if info.flags.force_inline {
            bits |= PolicyBits::FORCE_INLINE;
        }
        if info.flags.dont_inline {
            bits |= PolicyBits::DONT_INLINE;
        }
        if info.flags.is_archetype_specimen
            || info.flags.is_lambda_form
            || info.flags.is_method_handle_invoke
        {
            bits |= PolicyBits::JSR292;
        }
        if !self.legacy.is_empty() {
            let holder = resolver.class(info.holder).map_or("", |c| c.name.as_str());
            let qualified = format!("{}.{}", holder, info.name);
            for rule in &self.legacy {
                if rule.pattern.is_match(&qualified) {
                    bits |= rule.bits;
                }
            }
        }
        bits
    }
}
