// Inheritance-consistent override lookup for callables
//
// A prologue knows the unit it was written in (lexical) and the runtime unit
// of the call (dynamic). The override that applies is found by walking from
// the dynamic unit toward the lexical one.

use tracing::debug;

use super::behavior::InterceptionId;
use super::units::UnitTable;

/// Find the active override for a call, if any.
///
/// `active` answers whether an id holds an override that is not currently
/// bypassed by a call-through.
pub fn resolve_callable<F>(
    units: &UnitTable,
    lexical: Option<&str>,
    dynamic: Option<&str>,
    member: &str,
    active: F,
) -> Option<InterceptionId>
where
    F: Fn(&InterceptionId) -> bool,
{
    let Some(lexical) = lexical else {
        let id = InterceptionId::function(member);
        return active(&id).then_some(id);
    };

    let check = |unit: &str| {
        let id = InterceptionId::method(unit, member);
        active(&id).then_some(id)
    };

    let start = dynamic.unwrap_or(lexical);
    for unit in units.ancestors(start) {
        if unit == lexical {
            return check(&unit);
        }
        // Reached the lexical body through `parent::` from a redeclaration
        if units.declares(&unit, member) {
            debug!(unit = %unit, member, lexical, "skipping redeclaring unit");
            continue;
        }
        if let Some(id) = check(&unit) {
            return Some(id);
        }
    }

    debug!(dynamic = ?dynamic, lexical, member, "dynamic chain never reached the lexical unit");
    check(lexical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{AstBridge, HostBridge};
    use crate::records::ModuleRecord;
    use std::collections::HashSet;

    fn table(source: &str) -> UnitTable {
        let program = HostBridge.parse(source).expect("parse");
        let mut table = UnitTable::new();
        table.register(&ModuleRecord::collect(&program, None));
        table
    }

    fn lookup(
        units: &UnitTable,
        installed: &[InterceptionId],
        lexical: &str,
        dynamic: &str,
        member: &str,
    ) -> Option<InterceptionId> {
        let installed: HashSet<&InterceptionId> = installed.iter().collect();
        resolve_callable(units, Some(lexical), Some(dynamic), member, |id| {
            installed.contains(id)
        })
    }

    const HIERARCHY: &str = "
        class Base { fn getter() { return 10; } }
        class Empty extends Base {}
        class EmptyEmpty extends Empty {}
        class Replacing extends Base { fn getter() { return 20; } }
    ";

    #[test]
    fn test_inherited_member_uses_nearest_override() {
        let units = table(HIERARCHY);
        let on_empty = [InterceptionId::method("Empty", "getter")];
        assert_eq!(
            lookup(&units, &on_empty, "Base", "EmptyEmpty", "getter"),
            Some(InterceptionId::method("Empty", "getter"))
        );
        assert_eq!(lookup(&units, &on_empty, "Base", "Base", "getter"), None);
    }

    #[test]
    fn test_redeclaration_shields_base_override() {
        let units = table(HIERARCHY);
        let on_base = [InterceptionId::method("Base", "getter")];
        // Replacing's own body has its own prologue; nothing installed there
        assert_eq!(lookup(&units, &on_base, "Replacing", "Replacing", "getter"), None);
        // Base's body reached through `parent::getter()` from Replacing
        assert_eq!(
            lookup(&units, &on_base, "Base", "Replacing", "getter"),
            Some(InterceptionId::method("Base", "getter"))
        );

        let on_replacing = [InterceptionId::method("Replacing", "getter")];
        assert_eq!(lookup(&units, &on_replacing, "Base", "Replacing", "getter"), None);
    }

    #[test]
    fn test_unrelated_dynamic_unit_checks_lexical() {
        let units = table(HIERARCHY);
        let on_base = [InterceptionId::method("Base", "getter")];
        assert_eq!(
            lookup(&units, &on_base, "Base", "Stranger", "getter"),
            Some(InterceptionId::method("Base", "getter"))
        );
    }

    #[test]
    fn test_functions_match_directly() {
        let units = UnitTable::new();
        let id = InterceptionId::function("helper");
        assert_eq!(
            resolve_callable(&units, None, None, "helper", |candidate| candidate == &id),
            Some(id.clone())
        );
        assert_eq!(resolve_callable(&units, None, None, "other", |c| c == &id), None);
    }
}
