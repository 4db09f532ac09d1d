//! Collaborator interfaces for class hierarchy queries and IR generation
//!
//! The inliner never owns hierarchy or bytecode data. It asks a
//! [`MethodResolver`] about dispatch and an [`IrProvider`] for callee
//! bodies. [`ProgramDatabase`] implements both over in-memory tables.

use crate::ir::MethodBody;
use core_types::{CallSiteKey, ClassId, ClassInfo, MethodId, MethodInfo};
use rustc_hash::{FxHashMap, FxHashSet};

/// Class hierarchy and dispatch queries
pub trait MethodResolver: Send + Sync {
    /// Descriptor of a method
    fn method(&self, id: MethodId) -> Option<&MethodInfo>;

    /// Descriptor of a class
    fn class(&self, id: ClassId) -> Option<&ClassInfo>;

    /// Implementation a receiver of exactly `class` dispatches `method` to
    fn resolve_in_class(&self, class: ClassId, method: MethodId) -> Option<MethodId>;

    /// Check if any loaded subclass of `receiver` dispatches `method`
    /// differently from `receiver` itself
    fn is_overridden(&self, method: MethodId, receiver: ClassId) -> bool;

    /// The only concrete implementation of `method` among loaded
    /// instances of `receiver`, if there is exactly one
    fn single_implementer(&self, receiver: ClassId, method: MethodId) -> Option<MethodId>;

    /// Check if `sub` is `sup` or one of its subtypes
    fn is_instance_of(&self, sub: ClassId, sup: ClassId) -> bool;

    /// Current target bound to a mutable call site
    fn mutable_call_site_target(&self, site: CallSiteKey) -> Option<MethodId>;
}

/// Source of method bodies
pub trait IrProvider: Send + Sync {
    /// Materialize a fresh copy of a method's IR, `None` when unavailable
    fn generate(&self, method: MethodId) -> Option<MethodBody>;
}

/// In-memory program: classes, methods and their bodies
#[derive(Debug, Clone, Default)]
pub struct ProgramDatabase {
    classes: FxHashMap<ClassId, ClassInfo>,
    methods: FxHashMap<MethodId, MethodInfo>,
    declared: FxHashMap<ClassId, Vec<MethodId>>,
    bodies: FxHashMap<MethodId, MethodBody>,
    mutable_targets: FxHashMap<CallSiteKey, MethodId>,
}

impl ProgramDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class
    pub fn add_class(&mut self, class: ClassInfo) -> ClassId {
        let id = class.id;
        self.classes.insert(id, class);
        id
    }

    /// Register a method declared by its holder class
    pub fn add_method(&mut self, method: MethodInfo) -> MethodId {
        let id = method.id;
        let declared = self.declared.entry(method.holder).or_default();
        if !declared.contains(&id) {
            declared.push(id);
        }
        self.methods.insert(id, method);
        id
    }

    /// Register the IR of a method
    pub fn add_body(&mut self, body: MethodBody) {
        self.bodies.insert(body.method(), body);
    }

    /// Bind a mutable call site to its current target
    pub fn set_mutable_call_site_target(&mut self, site: CallSiteKey, target: MethodId) {
        self.mutable_targets.insert(site, target);
    }

    /// Number of registered methods
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Loaded subtypes of `class`, itself included, in id order
    pub fn subtypes(&self, class: ClassId) -> Vec<ClassId> {
        let mut subs: Vec<ClassId> = self
            .classes
            .keys()
            .copied()
            .filter(|&c| self.is_instance_of(c, class))
            .collect();
        subs.sort();
        subs
    }

    fn declared_with_selector(&self, class: ClassId, selector: &str) -> Option<MethodId> {
        self.declared
            .get(&class)?
            .iter()
            .copied()
            .find(|m| self.methods.get(m).is_some_and(|info| info.selector() == selector))
    }

    fn is_concrete(&self, class: ClassId) -> bool {
        self.classes
            .get(&class)
            .is_some_and(|c| !c.is_interface && !c.is_abstract)
    }
}

impl MethodResolver for ProgramDatabase {
    fn method(&self, id: MethodId) -> Option<&MethodInfo> {
        self.methods.get(&id)
    }

    fn class(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(&id)
    }

    fn resolve_in_class(&self, class: ClassId, method: MethodId) -> Option<MethodId> {
        let selector = self.methods.get(&method)?.selector();
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(found) = self.declared_with_selector(c, &selector) {
                return Some(found);
            }
            current = self.classes.get(&c).and_then(|info| info.superclass);
        }
        // Fall back to a default method declared on an implemented interface
        let mut seen = FxHashSet::default();
        let mut pending = vec![class];
        while let Some(c) = pending.pop() {
            if !seen.insert(c) {
                continue;
            }
            let Some(info) = self.classes.get(&c) else {
                continue;
            };
            for &iface in &info.interfaces {
                if let Some(found) = self.declared_with_selector(iface, &selector) {
                    if self.methods.get(&found).is_some_and(|m| !m.flags.is_abstract) {
                        return Some(found);
                    }
                }
                pending.push(iface);
            }
            pending.extend(info.superclass);
        }
        None
    }

    fn is_overridden(&self, method: MethodId, receiver: ClassId) -> bool {
        let base = self.resolve_in_class(receiver, method);
        self.subtypes(receiver)
            .into_iter()
            .filter(|&c| c != receiver)
            .any(|c| self.resolve_in_class(c, method) != base)
    }

    fn single_implementer(&self, receiver: ClassId, method: MethodId) -> Option<MethodId> {
        let mut found: Option<MethodId> = None;
        for class in self.subtypes(receiver) {
            if !self.is_concrete(class) {
                continue;
            }
            let target = self.resolve_in_class(class, method)?;
            if self.methods.get(&target).is_some_and(|m| m.flags.is_abstract) {
                return None;
            }
            match found {
                None => found = Some(target),
                Some(previous) if previous == target => {}
                Some(_) => return None,
            }
        }
        found
    }

    fn is_instance_of(&self, sub: ClassId, sup: ClassId) -> bool {
        let mut seen = FxHashSet::default();
        let mut pending = vec![sub];
        while let Some(c) = pending.pop() {
            if c == sup {
                return true;
            }
            if !seen.insert(c) {
                continue;
            }
            if let Some(info) = self.classes.get(&c) {
                pending.extend(info.superclass);
                pending.extend(info.interfaces.iter().copied());
            }
        }
        false
    }

    fn mutable_call_site_target(&self, site: CallSiteKey) -> Option<MethodId> {
        self.mutable_targets.get(&site).copied()
    }
}

impl IrProvider for ProgramDatabase {
    fn generate(&self, method: MethodId) -> Option<MethodBody> {
        self.bodies.get(&method).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{MethodFlags, ValueType};

    const SHAPE: ClassId = ClassId(1);
    const CIRCLE: ClassId = ClassId(2);
    const SQUARE: ClassId = ClassId(3);
    const AREA: ClassId = ClassId(4);

    fn area_method(id: u32, holder: ClassId, is_abstract: bool) -> MethodInfo {
        MethodInfo::new(MethodId(id), holder, "area", "()I", vec![], ValueType::Int).with_flags(
            MethodFlags {
                is_abstract,
                ..Default::default()
            },
        )
    }

    fn shapes() -> ProgramDatabase {
        let mut db = ProgramDatabase::new();
        db.add_class(ClassInfo::interface(AREA, "Area"));
        db.add_class(ClassInfo::new(SHAPE, "Shape", None).abstract_class().implementing(AREA));
        db.add_class(ClassInfo::new(CIRCLE, "Circle", Some(SHAPE)));
        db.add_class(ClassInfo::new(SQUARE, "Square", Some(SHAPE)).final_class());
        db.add_method(area_method(10, AREA, true));
        db.add_method(area_method(11, SHAPE, true));
        db.add_method(area_method(12, CIRCLE, false));
        db
    }

    #[test]
    fn test_resolve_walks_superclasses() {
        let db = shapes();
        assert_eq!(db.resolve_in_class(CIRCLE, MethodId(11)), Some(MethodId(12)));
        assert_eq!(db.resolve_in_class(SQUARE, MethodId(11)), Some(MethodId(11)));
    }

    #[test]
    fn test_is_instance_of_through_interfaces() {
        let db = shapes();
        assert!(db.is_instance_of(SQUARE, AREA));
        assert!(db.is_instance_of(CIRCLE, SHAPE));
        assert!(!db.is_instance_of(SHAPE, CIRCLE));
    }

    #[test]
    fn test_is_overridden() {
        let db = shapes();
        assert!(db.is_overridden(MethodId(11), SHAPE));
        assert!(!db.is_overridden(MethodId(12), CIRCLE));
    }

    #[test]
    fn test_single_implementer_requires_concrete_target() {
        let mut db = shapes();
        // Square inherits the abstract method
        assert_eq!(db.single_implementer(SHAPE, MethodId(11)), None);
        db.add_method(area_method(13, SQUARE, false));
        assert_eq!(db.single_implementer(SHAPE, MethodId(11)), None);
        assert_eq!(db.single_implementer(CIRCLE, MethodId(11)), Some(MethodId(12)));
    }

    #[test]
    fn test_generate_returns_copy() {
        let mut db = shapes();
        db.add_body(MethodBody::new(MethodId(12), &[ValueType::Reference(CIRCLE)]));
        let body = db.generate(MethodId(12)).unwrap();
        assert_eq!(body.method(), MethodId(12));
        assert!(db.generate(MethodId(11)).is_none());
    }

    #[test]
    fn test_mutable_call_site_target() {
        let mut db = shapes();
        let site = CallSiteKey::new(MethodId(1), 7);
        assert_eq!(db.mutable_call_site_target(site), None);
        db.set_mutable_call_site_target(site, MethodId(12));
        assert_eq!(db.mutable_call_site_target(site), Some(MethodId(12)));
    }
}
