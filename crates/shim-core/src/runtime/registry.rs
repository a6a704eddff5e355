/*!
# Mock Registry

Process-wide override table consulted by rewritten code through the hooks in
[`crate::hooks`].

The registry is owned by the thread that created it: every mutation checks
the calling thread. State sits behind a `parking_lot::RwLock`; no lock is held
while a replacement runs, so replacements may re-enter the registry (for
example to call through to the original).
*/

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::hooks::Hook;
use crate::records::{CallableKind, ModuleRecord, UnitRecord};

use super::behavior::{
    Behavior, CallSite, InterceptionId, Invocation, OverrideEntry, PointKind, Replacement,
};
use super::constants::{ConstantAccess, ConstantError, ConstantResolver};
use super::dispatch::resolve_callable;
use super::generator::{ByValue, HostGenerator};
use super::units::UnitTable;
use super::value::Value;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("class {unit} is not registered")]
    UnknownUnit { unit: String },

    #[error("class {unit} has no member {member}")]
    UnknownMember { unit: String, member: String },

    #[error("{id} is a {expected} and cannot take a {found} replacement")]
    KindMismatch {
        id: InterceptionId,
        expected: PointKind,
        found: &'static str,
    },

    #[error("invalid replacement: {message}")]
    InvalidReplacement { message: String },

    #[error("missing argument {position} (`{param}`) for replacement")]
    MissingArgument { param: String, position: usize },

    #[error("the registry can only be changed from the thread that created it")]
    NotOwner,

    #[error("the mock registry has not been initialised")]
    Uninitialized,

    #[error("bad arguments for hook {hook}: {message}")]
    InvalidHookArguments { hook: String, message: String },

    #[error("no override is installed for {member}")]
    NoOverride { member: String },

    #[error("replacement for {id} is host source and must be evaluated by the host")]
    RequiresHost { id: InterceptionId },

    #[error("replacement for {id} failed: {source}")]
    Replacement {
        id: InterceptionId,
        #[source]
        source: anyhow::Error,
    },

    #[error("original body of {id} failed: {source}")]
    Original {
        id: InterceptionId,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Constant(#[from] ConstantError),

    #[error("declaring-unit records: {0}")]
    Records(#[from] serde_json::Error),
}

/// Type alias for the function performing a real process exit
pub type Terminator = Arc<dyn Fn(i32) + Send + Sync>;

#[derive(Default)]
struct State {
    units: UnitTable,
    overrides: HashMap<InterceptionId, OverrideEntry>,
    /// Entries skipped while a call-through to the original runs
    bypassed: HashMap<InterceptionId, usize>,
    next_order: u64,
}

impl State {
    fn active(&self, id: &InterceptionId) -> bool {
        self.overrides.contains_key(id) && !self.bypassed.contains_key(id)
    }

    fn constant_override(&self, unit: &str, name: &str) -> Option<Value> {
        match self.overrides.get(&InterceptionId::constant(unit, name)) {
            Some(OverrideEntry {
                behavior: Behavior::Value(value),
                ..
            }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Kind of an interception point, or why it cannot take `behavior`
    fn validate(
        &self,
        id: &InterceptionId,
        behavior: &Behavior,
    ) -> Result<PointKind, RegistryError> {
        let kind = match id {
            InterceptionId::Callable {
                unit: Some(unit),
                member,
            } => {
                if !self.units.contains(unit) {
                    return Err(RegistryError::UnknownUnit { unit: unit.clone() });
                }
                let record = self.units.member(unit, member).ok_or_else(|| {
                    RegistryError::UnknownMember {
                        unit: unit.clone(),
                        member: member.clone(),
                    }
                })?;
                match record.kind {
                    CallableKind::Generator => PointKind::Generator,
                    CallableKind::Constructor => PointKind::Constructor,
                    CallableKind::Method | CallableKind::Function => PointKind::Method,
                }
            }
            // Functions no module declares are host functions, redirected at
            // their call sites
            InterceptionId::Callable { unit: None, member } => match self.units.function(member) {
                Some(record) if record.kind == CallableKind::Generator => PointKind::Generator,
                _ => PointKind::Function,
            },
            InterceptionId::Constant { unit, .. } => {
                if !self.units.contains(unit) {
                    return Err(RegistryError::UnknownUnit { unit: unit.clone() });
                }
                PointKind::Constant
            }
            InterceptionId::ProcessExit => PointKind::ProcessExit,
        };

        let accepted = match kind {
            PointKind::Generator => matches!(behavior, Behavior::Generator(_)),
            PointKind::Constant => matches!(behavior, Behavior::Value(_)),
            PointKind::ProcessExit => matches!(behavior, Behavior::Callable(_) | Behavior::Value(_)),
            _ => !matches!(behavior, Behavior::Generator(_)),
        };
        if !accepted {
            return Err(RegistryError::KindMismatch {
                id: id.clone(),
                expected: kind,
                found: behavior.kind_name(),
            });
        }
        Ok(kind)
    }

    /// Whether the intercepted declaration yields by reference
    fn yields_by_ref(&self, site: &CallSite) -> bool {
        let record = match &site.lexical {
            Some(unit) => self.units.member(unit, &site.member),
            None => self.units.function(&site.member),
        };
        record.is_some_and(|record| record.by_ref)
    }
}

/// Result of [`MockRegistry::invoke_hook`]
pub enum HookOutcome {
    Value(Value),
    Replacement(Replacement),
    Generator(Box<dyn HostGenerator>),
}

impl fmt::Debug for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            HookOutcome::Replacement(replacement) => {
                f.debug_tuple("Replacement").field(replacement).finish()
            }
            HookOutcome::Generator(_) => f.write_str("Generator(<generator>)"),
        }
    }
}

/// The override table plus the declaring-unit records it validates against
pub struct MockRegistry {
    state: RwLock<State>,
    owner: ThreadId,
    terminator: Terminator,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MockRegistry")
            .field("units", &state.units.len())
            .field("overrides", &state.overrides.len())
            .field("owner", &self.owner)
            .finish()
    }
}

impl MockRegistry {
    /// A registry owned by the calling thread
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            owner: thread::current().id(),
            terminator: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Replace the real process exit performed when no exit hook is installed
    pub fn with_terminator<F>(mut self, terminator: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.terminator = Arc::new(terminator);
        self
    }

    fn ensure_owner(&self) -> Result<(), RegistryError> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            Err(RegistryError::NotOwner)
        }
    }

    // Declaring-unit records

    /// Load the records of one rewritten file
    pub fn register_module(&self, module: &ModuleRecord) -> Result<(), RegistryError> {
        self.ensure_owner()?;
        self.state.write().units.register(module);
        debug!(
            source = ?module.source,
            units = module.units.len(),
            functions = module.functions.len(),
            "registered module"
        );
        Ok(())
    }

    /// Record a unit created at runtime, with no rewritten source behind it,
    /// so constants and inherited methods can be overridden on it
    pub fn register_unit(&self, name: &str, parent: Option<&str>) -> Result<(), RegistryError> {
        self.ensure_owner()?;
        let mut state = self.state.write();
        if let Some(parent) = parent {
            if !state.units.contains(parent) {
                return Err(RegistryError::UnknownUnit {
                    unit: parent.to_string(),
                });
            }
        }
        let module = ModuleRecord {
            units: vec![UnitRecord {
                name: name.to_string(),
                parent: parent.map(str::to_string),
                ..UnitRecord::default()
            }],
            ..ModuleRecord::default()
        };
        state.units.register(&module);
        debug!(unit = name, parent = ?parent, "registered runtime unit");
        Ok(())
    }

    /// Runtime end of the `declare` hook
    pub fn declare_json(&self, json: &str) -> Result<(), RegistryError> {
        let module = ModuleRecord::from_json(json)?;
        self.register_module(&module)
    }

    /// Read access to the registered units
    pub fn units(&self) -> MappedRwLockReadGuard<'_, UnitTable> {
        RwLockReadGuard::map(self.state.read(), |state| &state.units)
    }

    // Installing and restoring

    /// Install `behavior` for `id`, replacing any existing entry
    pub fn install(&self, id: InterceptionId, behavior: Behavior) -> Result<(), RegistryError> {
        self.ensure_owner()?;
        let mut state = self.state.write();
        let kind = state.validate(&id, &behavior)?;
        let order = state.next_order;
        state.next_order += 1;
        debug!(%id, %kind, behavior = behavior.kind_name(), "installing override");
        state.overrides.insert(
            id.clone(),
            OverrideEntry {
                id,
                kind,
                behavior,
                order,
            },
        );
        Ok(())
    }

    /// Compile and install a host-source replacement
    pub fn install_source(
        &self,
        id: InterceptionId,
        params: &str,
        body: &str,
    ) -> Result<(), RegistryError> {
        self.install(id, Behavior::source(params, body)?)
    }

    pub fn install_generator<F>(
        &self,
        unit: Option<&str>,
        member: &str,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&MockRegistry, &Invocation) -> anyhow::Result<Box<dyn HostGenerator>>
            + Send
            + Sync
            + 'static,
    {
        let id = match unit {
            Some(unit) => InterceptionId::method(unit, member),
            None => InterceptionId::function(member),
        };
        self.install(id, Behavior::generator(factory))
    }

    pub fn redefine_constant(
        &self,
        unit: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), RegistryError> {
        self.install(InterceptionId::constant(unit, name), Behavior::value(value))
    }

    /// Route every `exit` through `hook`; its result is what `exit` evaluates to
    pub fn install_exit_hook<F>(&self, hook: F) -> Result<(), RegistryError>
    where
        F: Fn(&MockRegistry, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let behavior = Behavior::callable(move |registry, invocation| {
            let status = invocation.arg(0).cloned().unwrap_or_default();
            hook(registry, &status)
        });
        self.install(InterceptionId::ProcessExit, behavior)
    }

    pub fn restore_exit_hook(&self) -> Result<(), RegistryError> {
        self.restore(&InterceptionId::ProcessExit)
    }

    /// Remove the entry for `id`; no-op if absent
    pub fn restore(&self, id: &InterceptionId) -> Result<(), RegistryError> {
        self.ensure_owner()?;
        if self.state.write().overrides.remove(id).is_some() {
            debug!(%id, "restored");
        }
        Ok(())
    }

    /// Remove every entry of every kind
    pub fn restore_all(&self) -> Result<(), RegistryError> {
        self.ensure_owner()?;
        let mut state = self.state.write();
        let count = state.overrides.len();
        state.overrides.clear();
        state.bypassed.clear();
        if count > 0 {
            info!(count, "restored all overrides");
        }
        Ok(())
    }

    /// Active entries in install order
    pub fn entries(&self) -> Vec<OverrideEntry> {
        let mut entries: Vec<OverrideEntry> =
            self.state.read().overrides.values().cloned().collect();
        entries.sort_by_key(|entry| entry.order);
        entries
    }

    pub fn is_installed(&self, id: &InterceptionId) -> bool {
        self.state.read().overrides.contains_key(id)
    }

    // Hook runtime ends

    fn resolve(&self, site: &CallSite) -> Option<(InterceptionId, Behavior)> {
        let state = self.state.read();
        if state.overrides.is_empty() {
            return None;
        }
        let id = resolve_callable(
            &state.units,
            site.lexical.as_deref(),
            site.dynamic.as_deref(),
            &site.member,
            |id| state.active(id),
        )?;
        let behavior = state.overrides.get(&id)?.behavior.clone();
        Some((id, behavior))
    }

    /// `__shim::intercepted`: whether a call from this site is redirected
    pub fn intercepted(&self, lexical: Option<&str>, dynamic: Option<&str>, member: &str) -> bool {
        let site = CallSite {
            lexical: lexical.map(str::to_string),
            dynamic: dynamic.map(str::to_string),
            member: member.to_string(),
        };
        self.resolve(&site).is_some()
    }

    /// `__shim::call`: run the replacement for a call from this site
    pub fn call(
        &self,
        site: CallSite,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> Result<Replacement, RegistryError> {
        let (id, behavior) = self.resolve(&site).ok_or_else(|| RegistryError::NoOverride {
            member: site.member.clone(),
        })?;
        debug!(%id, dynamic = ?site.dynamic, "redirecting call");

        let invocation = Invocation {
            site,
            id: id.clone(),
            args,
            this,
        };
        match behavior {
            Behavior::Value(value) => Ok(Replacement::Returned(value)),
            Behavior::Callable(f) => f(self, &invocation)
                .map(Replacement::Returned)
                .map_err(|source| RegistryError::Replacement { id, source }),
            Behavior::Source(source) => Ok(Replacement::Evaluate { source, invocation }),
            Behavior::Generator(_) => Err(RegistryError::KindMismatch {
                id,
                expected: PointKind::Method,
                found: "generator",
            }),
        }
    }

    /// `__shim::generator`: the installed generator for a call from this site.
    /// Yields are detached unless the intercepted declaration yields by reference.
    pub fn generator(
        &self,
        site: CallSite,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> Result<Box<dyn HostGenerator>, RegistryError> {
        let (id, behavior) = self.resolve(&site).ok_or_else(|| RegistryError::NoOverride {
            member: site.member.clone(),
        })?;
        let factory = match behavior {
            Behavior::Generator(factory) => factory,
            other => {
                return Err(RegistryError::KindMismatch {
                    id,
                    expected: PointKind::Generator,
                    found: other.kind_name(),
                })
            }
        };
        let by_ref = self.state.read().yields_by_ref(&site);
        debug!(%id, by_ref, "delegating generator");

        let invocation = Invocation {
            site,
            id: id.clone(),
            args,
            this,
        };
        let generator =
            factory(self, &invocation).map_err(|source| RegistryError::Replacement { id, source })?;
        if by_ref {
            Ok(generator)
        } else {
            Ok(Box::new(ByValue::new(generator)))
        }
    }

    /// `__shim::constant`: read a class constant
    pub fn constant(
        &self,
        lexical: Option<&str>,
        resolution: &str,
        name: &str,
    ) -> Result<Value, RegistryError> {
        self.read_constant(&ConstantAccess::new(lexical, resolution, name))
    }

    pub fn read_constant(&self, access: &ConstantAccess) -> Result<Value, RegistryError> {
        let state = self.state.read();
        let resolver = ConstantResolver::new(&state.units, |unit: &str, name: &str| {
            state.constant_override(unit, name)
        });
        Ok(resolver.resolve(access)?)
    }

    /// `__shim::exit`: run the exit hook, or terminate the process
    pub fn exit(&self, status: &Value) -> Result<Value, RegistryError> {
        let hook = self
            .state
            .read()
            .overrides
            .get(&InterceptionId::ProcessExit)
            .map(|entry| entry.behavior.clone());

        match hook {
            Some(Behavior::Callable(f)) => {
                let invocation = Invocation {
                    site: CallSite::function("exit"),
                    id: InterceptionId::ProcessExit,
                    args: vec![status.clone()],
                    this: None,
                };
                f(self, &invocation).map_err(|source| RegistryError::Replacement {
                    id: InterceptionId::ProcessExit,
                    source,
                })
            }
            Some(Behavior::Value(value)) => Ok(value),
            _ => {
                let code = match status {
                    Value::String(message) => {
                        print!("{message}");
                        0
                    }
                    other => other
                        .as_int()
                        .and_then(|code| i32::try_from(code).ok())
                        .unwrap_or(0),
                };
                info!(code, "terminating process");
                (self.terminator)(code);
                Ok(Value::Null)
            }
        }
    }

    // Embedding conveniences

    /// Run a call the way a rewritten prologue does: the replacement when one
    /// applies, `original` otherwise
    pub fn dispatch<F>(
        &self,
        site: CallSite,
        args: Vec<Value>,
        this: Option<Value>,
        original: F,
    ) -> Result<Value, RegistryError>
    where
        F: FnOnce(&[Value]) -> anyhow::Result<Value>,
    {
        let (lexical, dynamic) = (site.lexical.as_deref(), site.dynamic.as_deref());
        if !self.intercepted(lexical, dynamic, &site.member) {
            return run_original(&site, &args, original);
        }
        match self.call(site, args, this)? {
            Replacement::Returned(value) => Ok(value),
            Replacement::Evaluate { invocation, .. } => Err(RegistryError::RequiresHost {
                id: invocation.id,
            }),
        }
    }

    pub fn dispatch_generator<F>(
        &self,
        site: CallSite,
        args: Vec<Value>,
        this: Option<Value>,
        original: F,
    ) -> Result<Box<dyn HostGenerator>, RegistryError>
    where
        F: FnOnce(&[Value]) -> Box<dyn HostGenerator>,
    {
        let (lexical, dynamic) = (site.lexical.as_deref(), site.dynamic.as_deref());
        if self.intercepted(lexical, dynamic, &site.member) {
            self.generator(site, args, this)
        } else {
            Ok(original(&args))
        }
    }

    /// Run the un-overridden body of `id` with its entry bypassed.
    ///
    /// Succeeds whether or not `id` holds an entry, and whether or not its
    /// unit is on the caller's inheritance chain.
    pub fn call_original<F>(
        &self,
        id: &InterceptionId,
        args: &[Value],
        original: F,
    ) -> anyhow::Result<Value>
    where
        F: FnOnce(&[Value]) -> anyhow::Result<Value>,
    {
        let _bypass = Bypass::new(self, id);
        debug!(%id, "calling original");
        original(args)
    }

    /// Map a hook name and its value arguments onto the entry points above
    pub fn invoke_hook(&self, name: &str, args: Vec<Value>) -> Result<HookOutcome, RegistryError> {
        let invalid = |message: String| RegistryError::InvalidHookArguments {
            hook: name.to_string(),
            message,
        };
        let hook = Hook::from_name(name).ok_or_else(|| invalid("unknown hook".to_string()))?;
        if args.len() != hook.arity() {
            return Err(invalid(format!(
                "expected {} arguments, got {}",
                hook.arity(),
                args.len()
            )));
        }

        let text = |index: usize| -> Result<&str, RegistryError> {
            args[index]
                .as_str()
                .ok_or_else(|| invalid(format!("argument {index} must be a string")))
        };
        let optional = |index: usize| -> Result<Option<&str>, RegistryError> {
            match &args[index] {
                Value::Null => Ok(None),
                _ => text(index).map(Some),
            }
        };

        match hook {
            Hook::Declare => {
                self.declare_json(text(0)?)?;
                Ok(HookOutcome::Value(Value::Null))
            }
            Hook::Intercepted => Ok(HookOutcome::Value(Value::Boolean(self.intercepted(
                optional(0)?,
                optional(1)?,
                text(2)?,
            )))),
            Hook::Call | Hook::Generator => {
                let site = CallSite {
                    lexical: optional(0)?.map(str::to_string),
                    dynamic: optional(1)?.map(str::to_string),
                    member: text(2)?.to_string(),
                };
                let call_args = match &args[3] {
                    Value::List(items) => items.clone(),
                    _ => return Err(invalid("argument 3 must be a list".to_string())),
                };
                let this = match &args[4] {
                    Value::Null => None,
                    other => Some(other.clone()),
                };
                if hook == Hook::Call {
                    self.call(site, call_args, this).map(HookOutcome::Replacement)
                } else {
                    self.generator(site, call_args, this).map(HookOutcome::Generator)
                }
            }
            Hook::Constant => self
                .constant(optional(0)?, text(1)?, text(2)?)
                .map(HookOutcome::Value),
            Hook::Exit => self.exit(&args[0]).map(HookOutcome::Value),
        }
    }
}

fn run_original<F>(site: &CallSite, args: &[Value], original: F) -> Result<Value, RegistryError>
where
    F: FnOnce(&[Value]) -> anyhow::Result<Value>,
{
    let id = match &site.lexical {
        Some(unit) => InterceptionId::method(unit.as_str(), site.member.as_str()),
        None => InterceptionId::function(site.member.as_str()),
    };
    original(args).map_err(|source| RegistryError::Original { id, source })
}

/// Marks an entry bypassed until dropped
struct Bypass<'a> {
    registry: &'a MockRegistry,
    id: InterceptionId,
}

impl<'a> Bypass<'a> {
    fn new(registry: &'a MockRegistry, id: &InterceptionId) -> Self {
        *registry
            .state
            .write()
            .bypassed
            .entry(id.clone())
            .or_insert(0) += 1;
        Self {
            registry,
            id: id.clone(),
        }
    }
}

impl Drop for Bypass<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.write();
        if let Some(count) = state.bypassed.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                state.bypassed.remove(&self.id);
            }
        }
    }
}
