//! Declaring-unit records.
//!
//! Built once per file while rewriting, embedded in the rewritten output via
//! the `declare` hook, and loaded into the runtime unit table. `BTreeMap`s keep
//! the serialized form stable so identical input yields identical output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::{contains_yield, HostAst, UnitMember, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableKind {
    Function,
    Method,
    Constructor,
    Generator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub kind: CallableKind,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantRecord {
    pub visibility: Visibility,
    /// Initializer as written, evaluated lazily by the constant accessor.
    /// Serialized as source text so the JSON stays flat however long the
    /// expression is.
    #[serde(with = "initializer_source")]
    pub value: HostAst,
}

mod initializer_source {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ast::{HostAst, ToSource};
    use crate::parser::parse_expression;

    pub fn serialize<S: Serializer>(value: &HostAst, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_source())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HostAst, D::Error> {
        let source = String::deserialize(deserializer)?;
        parse_expression(&source)
            .map_err(|err| D::Error::custom(format!("constant initializer `{source}`: {err}")))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub members: BTreeMap<String, MemberRecord>,
    #[serde(default)]
    pub constants: BTreeMap<String, ConstantRecord>,
}

impl UnitRecord {
    pub fn from_definition(
        name: &str,
        parent: Option<&str>,
        is_abstract: bool,
        members: &[UnitMember],
    ) -> Self {
        let mut record = UnitRecord {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            is_abstract,
            ..Default::default()
        };

        for member in members {
            match member {
                UnitMember::Constant {
                    name,
                    value,
                    visibility,
                } => {
                    record.constants.insert(
                        name.clone(),
                        ConstantRecord {
                            visibility: *visibility,
                            value: value.clone(),
                        },
                    );
                }
                UnitMember::Property { .. } => {}
                UnitMember::Method {
                    name,
                    body,
                    visibility,
                    is_static,
                    by_ref,
                    ..
                } => {
                    let kind = match body {
                        Some(body) if contains_yield(body) => CallableKind::Generator,
                        _ => CallableKind::Method,
                    };
                    record.members.insert(
                        name.clone(),
                        MemberRecord {
                            kind,
                            visibility: *visibility,
                            is_static: *is_static,
                            is_abstract: body.is_none(),
                            by_ref: *by_ref,
                        },
                    );
                }
                UnitMember::Constructor { visibility, .. } => {
                    record.members.insert(
                        member.name().to_string(),
                        MemberRecord {
                            kind: CallableKind::Constructor,
                            visibility: *visibility,
                            is_static: false,
                            is_abstract: false,
                            by_ref: false,
                        },
                    );
                }
            }
        }

        record
    }

    pub fn member(&self, name: &str) -> Option<&MemberRecord> {
        self.members.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&ConstantRecord> {
        self.constants.get(name)
    }
}

/// Everything one source file declares
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleRecord {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    #[serde(default)]
    pub functions: BTreeMap<String, MemberRecord>,
}

impl ModuleRecord {
    /// Collect the top-level declarations of a parsed program
    pub fn collect(program: &HostAst, source: Option<String>) -> Self {
        let mut record = ModuleRecord {
            source,
            ..Default::default()
        };
        let items: &[HostAst] = match program {
            HostAst::Program(items) => items,
            other => std::slice::from_ref(other),
        };

        for item in items {
            match item {
                HostAst::UnitDef {
                    name,
                    parent,
                    is_abstract,
                    members,
                } => record.units.push(UnitRecord::from_definition(
                    name,
                    parent.as_deref(),
                    *is_abstract,
                    members,
                )),
                HostAst::FunctionDef {
                    name, body, by_ref, ..
                } => {
                    let kind = if contains_yield(body) {
                        CallableKind::Generator
                    } else {
                        CallableKind::Function
                    };
                    record.functions.insert(
                        name.clone(),
                        MemberRecord {
                            kind,
                            visibility: Visibility::Public,
                            is_static: false,
                            is_abstract: false,
                            by_ref: *by_ref,
                        },
                    );
                }
                _ => {}
            }
        }

        record
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.functions.is_empty()
    }

    pub fn unit(&self, name: &str) -> Option<&UnitRecord> {
        self.units.iter().find(|unit| unit.name == name)
    }

    /// Kind of a callable declared in this file; `unit` is `None` for functions
    pub fn callable_kind(&self, unit: Option<&str>, member: &str) -> Option<CallableKind> {
        match unit {
            Some(unit) => self.unit(unit)?.member(member).map(|m| m.kind),
            None => self.functions.get(member).map(|m| m.kind),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
