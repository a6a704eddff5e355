// Registered declaring-unit records, flattened for per-call lookups

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::records::{ConstantRecord, MemberRecord, ModuleRecord, UnitRecord};

#[derive(Debug, Default, Clone)]
pub struct UnitTable {
    units: HashMap<String, Arc<UnitRecord>>,
    functions: HashMap<String, MemberRecord>,
    /// unit -> member -> nearest unit in the chain declaring it
    resolved: HashMap<String, HashMap<String, String>>,
    /// parent name -> units naming it as parent, registered or not
    children: HashMap<String, HashSet<String>>,
}

impl UnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add everything a module declares. Re-registering a unit replaces it.
    pub fn register(&mut self, module: &ModuleRecord) {
        for unit in &module.units {
            if let Some(previous) = self.units.get(&unit.name) {
                debug!(unit = %unit.name, "replacing registered unit");
                if let Some(parent) = previous.parent.as_deref() {
                    if let Some(siblings) = self.children.get_mut(parent) {
                        siblings.remove(&unit.name);
                    }
                }
            }
            if let Some(parent) = &unit.parent {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(unit.name.clone());
            }
            self.units.insert(unit.name.clone(), Arc::new(unit.clone()));
        }
        for (name, function) in &module.functions {
            self.functions.insert(name.clone(), function.clone());
        }
        self.flatten(module.units.iter().map(|unit| unit.name.as_str()));
    }

    /// Recompute the member map of each changed unit and everything that
    /// inherits from it. Parents come before their children.
    fn flatten<'a>(&mut self, changed: impl Iterator<Item = &'a str>) {
        let mut queue: VecDeque<String> = changed.map(str::to_string).collect();
        let mut seen: HashSet<String> = queue.iter().cloned().collect();
        let mut count = 0usize;
        while let Some(name) = queue.pop_front() {
            let members = self.flatten_unit(&name);
            self.resolved.insert(name.clone(), members);
            count += 1;
            if let Some(children) = self.children.get(&name) {
                for child in children {
                    if self.units.contains_key(child) && seen.insert(child.clone()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        debug!(units = count, "flattened units");
    }

    fn flatten_unit(&self, name: &str) -> HashMap<String, String> {
        let mut members: HashMap<String, String> = HashMap::new();
        for unit in self.ancestors(name) {
            let Some(record) = self.units.get(&unit) else {
                continue;
            };
            for member in record.members.keys() {
                members.entry(member.clone()).or_insert_with(|| unit.clone());
            }
        }
        members
    }

    pub fn get(&self, unit: &str) -> Option<&UnitRecord> {
        self.units.get(unit).map(Arc::as_ref)
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }

    pub fn parent_of(&self, unit: &str) -> Option<&str> {
        self.units.get(unit)?.parent.as_deref()
    }

    /// `unit` followed by its parents, nearest first. Stops at the first
    /// unregistered parent (which is still included) or at a cycle.
    pub fn ancestors(&self, unit: &str) -> Vec<String> {
        let mut chain = vec![unit.to_string()];
        let mut seen = HashSet::from([unit.to_string()]);
        let mut current = unit;
        while let Some(parent) = self.parent_of(current) {
            if !seen.insert(parent.to_string()) {
                warn!(unit, parent, "inheritance cycle in registered units");
                break;
            }
            chain.push(parent.to_string());
            current = parent;
        }
        chain
    }

    /// Whether `descendant` is `ancestor` or inherits from it
    pub fn is_subunit(&self, descendant: &str, ancestor: &str) -> bool {
        self.ancestors(descendant).iter().any(|u| u == ancestor)
    }

    /// Whether the unit itself (not a parent) declares the member
    pub fn declares(&self, unit: &str, member: &str) -> bool {
        self.units
            .get(unit)
            .is_some_and(|record| record.members.contains_key(member))
    }

    /// Nearest unit in the chain of `unit` declaring `member`
    pub fn declaring_unit(&self, unit: &str, member: &str) -> Option<&str> {
        self.resolved.get(unit)?.get(member).map(String::as_str)
    }

    /// Member record as seen from `unit`, inherited or not
    pub fn member(&self, unit: &str, member: &str) -> Option<&MemberRecord> {
        let declaring = self.declaring_unit(unit, member)?;
        self.units.get(declaring)?.members.get(member)
    }

    pub fn function(&self, name: &str) -> Option<&MemberRecord> {
        self.functions.get(name)
    }

    /// Constant declared by the unit itself
    pub fn constant_decl(&self, unit: &str, name: &str) -> Option<&ConstantRecord> {
        self.units.get(unit)?.constants.get(name)
    }

    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.functions.is_empty()
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.functions.clear();
        self.resolved.clear();
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AstBridge, HostBridge};

    fn table(source: &str) -> UnitTable {
        let program = HostBridge.parse(source).expect("parse");
        let mut table = UnitTable::new();
        table.register(&ModuleRecord::collect(&program, None));
        table
    }

    #[test]
    fn test_flattened_members() {
        let table = table(
            "class A { fn m() {} fn n() {} } class B extends A { fn n() {} } class C extends B {}",
        );
        assert_eq!(table.declaring_unit("C", "m"), Some("A"));
        assert_eq!(table.declaring_unit("C", "n"), Some("B"));
        assert_eq!(table.declaring_unit("A", "n"), Some("A"));
        assert_eq!(table.declaring_unit("C", "missing"), None);
        assert!(table.declares("B", "n"));
        assert!(!table.declares("C", "n"));
        assert_eq!(table.ancestors("C"), vec!["C", "B", "A"]);
        assert!(table.is_subunit("C", "A"));
        assert!(!table.is_subunit("A", "C"));
    }

    #[test]
    fn test_parent_registered_later() {
        let mut table = table("class Child extends Base {}");
        assert_eq!(table.ancestors("Child"), vec!["Child", "Base"]);
        assert_eq!(table.declaring_unit("Child", "run"), None);

        let program = HostBridge.parse("class Base { fn run() {} }").expect("parse");
        table.register(&ModuleRecord::collect(&program, None));
        assert_eq!(table.declaring_unit("Child", "run"), Some("Base"));
    }

    fn register(table: &mut UnitTable, source: &str) {
        let program = HostBridge.parse(source).expect("parse");
        table.register(&ModuleRecord::collect(&program, None));
    }

    #[test]
    fn test_registration_order_does_not_matter() {
        let modules = [
            "class Leaf extends Middle { fn leaf() {} }",
            "class Middle extends Root { fn shared() {} }",
            "class Root { fn root() {} fn shared() {} }",
        ];
        let mut forward = UnitTable::new();
        let mut backward = UnitTable::new();
        for source in modules {
            register(&mut forward, source);
        }
        for source in modules.iter().rev() {
            register(&mut backward, source);
        }

        for table in [&forward, &backward] {
            assert_eq!(table.declaring_unit("Leaf", "root"), Some("Root"));
            assert_eq!(table.declaring_unit("Leaf", "shared"), Some("Middle"));
            assert_eq!(table.declaring_unit("Middle", "root"), Some("Root"));
            assert_eq!(table.declaring_unit("Leaf", "leaf"), Some("Leaf"));
        }
    }

    #[test]
    fn test_replacing_a_unit_updates_descendants_only() {
        let mut table = table("class Root { fn run() {} } class Other { fn run() {} }");
        register(&mut table, "class Child extends Root {}");
        assert_eq!(table.declaring_unit("Child", "run"), Some("Root"));

        // Moving Child under Other drops it from Root's descendants
        register(&mut table, "class Child extends Other {}");
        assert_eq!(table.declaring_unit("Child", "run"), Some("Other"));
        register(&mut table, "class Root { fn stop() {} }");
        assert_eq!(table.declaring_unit("Child", "stop"), None);
        assert_eq!(table.declaring_unit("Root", "stop"), Some("Root"));
        assert_eq!(table.declaring_unit("Root", "run"), None);
    }

    #[test]
    fn test_cycle_is_cut() {
        let table = table("class A extends B {} class B extends A {}");
        assert_eq!(table.ancestors("A"), vec!["A", "B"]);
    }
}
