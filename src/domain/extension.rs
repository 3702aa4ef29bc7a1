//! Extension loading.
//!
//! An extension is either a script (an identifier ending in `.algo`) or the
//! dotted name of a module compiled into the binary. Both register
//! components into the host's [`ComponentRegistry`].
//!
//! - Scripts run in a fresh namespace every time they are loaded
//! - A module initializer runs at most once per host, even on reload
//! - Identifiers are recorded as loaded only after they succeed

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::domain::blotter::{Blotter, CancelPolicy, SimulationBlotter};
use crate::domain::error::{EvalError, ExtensionError, RunError};
use crate::domain::expr::Value;
use crate::domain::expr_eval::{arity, Builtins};
use crate::domain::metrics::{self, MetricsSet};
use crate::domain::namespace::Namespace;
use crate::domain::paths::{self, Environ};
use crate::domain::registry::ComponentRegistry;
use crate::domain::script;

pub const SCRIPT_SUFFIX: &str = ".algo";

pub type ModuleInit = Arc<dyn Fn(&mut ComponentRegistry) -> Result<(), ExtensionError> + Send + Sync>;

pub fn is_script(extension: &str) -> bool {
    extension.ends_with(SCRIPT_SUFFIX)
}

/// Statically linked extension modules, keyed by dotted name.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, ModuleInit>,
    imported: HashSet<String>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, init: ModuleInit) {
        self.modules.insert(name.to_string(), init);
    }

    /// Run the initializer for `name` unless it already succeeded.
    pub fn import(
        &mut self,
        name: &str,
        registry: &mut ComponentRegistry,
    ) -> Result<(), ExtensionError> {
        if self.imported.contains(name) {
            debug!(module = name, "module already imported");
            return Ok(());
        }
        let init = self
            .modules
            .get(name)
            .ok_or_else(|| ExtensionError::ModuleNotFound {
                module: name.to_string(),
            })?;
        init(registry)?;
        self.imported.insert(name.to_string());
        Ok(())
    }
}

/// Outcome of one `load_extensions` call.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, ExtensionError)>,
}

pub struct ExtensionHost {
    loaded: Mutex<BTreeSet<String>>,
    registry: RwLock<ComponentRegistry>,
    modules: Mutex<ModuleCatalog>,
}

static GLOBAL_HOST: Lazy<ExtensionHost> = Lazy::new(ExtensionHost::new);

impl ExtensionHost {
    pub fn new() -> Self {
        Self::with_registry(ComponentRegistry::with_builtins())
    }

    pub fn with_registry(registry: ComponentRegistry) -> Self {
        ExtensionHost {
            loaded: Mutex::new(BTreeSet::new()),
            registry: RwLock::new(registry),
            modules: Mutex::new(ModuleCatalog::new()),
        }
    }

    /// Process-lifetime host used by [`crate::run_algo::run_algorithm`].
    pub fn global() -> &'static ExtensionHost {
        &GLOBAL_HOST
    }

    pub fn add_module(&self, name: &str, init: ModuleInit) {
        self.modules.lock().add(name, init);
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, ComponentRegistry> {
        self.registry.read()
    }

    pub fn is_loaded(&self, extension: &str) -> bool {
        self.loaded.lock().contains(extension)
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().iter().cloned().collect()
    }

    /// Load `extensions` in order, preceded by the default extension file
    /// when `load_default` is set.
    ///
    /// With `strict`, the first failure is returned and later identifiers
    /// are not attempted. Otherwise failures are logged, reported and left
    /// out of the loaded set so a later call retries them. Partial effects
    /// of a failed script are kept either way.
    pub fn load_extensions(
        &self,
        load_default: bool,
        extensions: &[String],
        strict: bool,
        environ: &Environ,
        reload: bool,
    ) -> Result<LoadReport, RunError> {
        let mut queue = Vec::with_capacity(extensions.len() + 1);
        if load_default {
            let default = paths::default_extension(environ);
            paths::ensure_file(&default)?;
            queue.push(default.to_string_lossy().into_owned());
        }
        queue.extend(extensions.iter().cloned());

        let mut loaded = self.loaded.lock();
        let mut report = LoadReport::default();
        for ext in queue {
            if !reload && loaded.contains(&ext) {
                debug!(extension = %ext, "extension already loaded");
                report.skipped.push(ext);
                continue;
            }
            match self.load_one(&ext, environ) {
                Ok(()) => {
                    info!(extension = %ext, "loaded extension");
                    loaded.insert(ext.clone());
                    report.loaded.push(ext);
                }
                Err(source) if strict => {
                    return Err(RunError::ExtensionLoad {
                        extension: ext,
                        source,
                    });
                }
                Err(source) => {
                    warn!(extension = %ext, error = %source, "failed to load extension");
                    report.failed.push((ext, source));
                }
            }
        }
        Ok(report)
    }

    fn load_one(&self, extension: &str, environ: &Environ) -> Result<(), ExtensionError> {
        if is_script(extension) {
            let text =
                std::fs::read_to_string(Path::new(extension)).map_err(|source| {
                    ExtensionError::Read {
                        path: extension.to_string(),
                        source,
                    }
                })?;
            let mut registry = self.registry.write();
            let mut builtins = RegistrationBuiltins {
                registry: &mut *registry,
                environ,
            };
            let mut namespace = Namespace::new();
            script::execute(&text, &mut namespace, &mut builtins)?;
            Ok(())
        } else {
            let mut modules = self.modules.lock();
            let mut registry = self.registry.write();
            modules.import(extension, &mut *registry)
        }
    }
}

impl Default for ExtensionHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Functions available to extension scripts on top of the core builtins.
pub struct RegistrationBuiltins<'a> {
    pub registry: &'a mut ComponentRegistry,
    pub environ: &'a Environ,
}

fn host_error(err: impl ToString) -> EvalError {
    EvalError::Host {
        message: err.to_string(),
    }
}

fn str_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    value.as_str().ok_or_else(|| {
        EvalError::type_error(format!(
            "{function}() expected str, got {}",
            value.type_name()
        ))
    })
}

impl RegistrationBuiltins<'_> {
    fn register_metrics_set(&mut self, args: &[Value]) -> Result<Value, EvalError> {
        let [name, kinds] = args else {
            return Err(arity("register_metrics_set", "2", args.len()));
        };
        let name = str_arg("register_metrics_set", name)?;
        let Value::List(kinds) = kinds else {
            return Err(EvalError::type_error(format!(
                "register_metrics_set() expected list of metric names, got {}",
                kinds.type_name()
            )));
        };
        let mut ctors = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let kind = str_arg("register_metrics_set", kind)?;
            let ctor = metrics::builtin_metric(kind)
                .ok_or_else(|| host_error(format!("unknown metric {kind:?}")))?;
            ctors.push(ctor);
        }
        self.registry
            .metrics_sets
            .register(
                name,
                Arc::new(move || MetricsSet::new(ctors.iter().map(|ctor| ctor()).collect())),
            )
            .map_err(host_error)?;
        Ok(Value::None)
    }

    fn register_blotter(&mut self, args: &[Value]) -> Result<Value, EvalError> {
        let (name, policy) = match args {
            [name] => (str_arg("register_blotter", name)?, CancelPolicy::Never),
            [name, policy] => (
                str_arg("register_blotter", name)?,
                str_arg("register_blotter", policy)?
                    .parse::<CancelPolicy>()
                    .map_err(host_error)?,
            ),
            _ => return Err(arity("register_blotter", "1 or 2", args.len())),
        };
        self.registry
            .blotters
            .register(
                name,
                Arc::new(move || Box::new(SimulationBlotter::new(policy)) as Box<dyn Blotter>),
            )
            .map_err(host_error)?;
        Ok(Value::None)
    }

    fn getenv(&self, args: &[Value]) -> Result<Value, EvalError> {
        let (key, default) = match args {
            [key] => (str_arg("getenv", key)?, Value::None),
            [key, default] => (str_arg("getenv", key)?, default.clone()),
            _ => return Err(arity("getenv", "1 or 2", args.len())),
        };
        Ok(self
            .environ
            .get(key)
            .map(|v| Value::Str(v.clone()))
            .unwrap_or(default))
    }
}

impl Builtins for RegistrationBuiltins<'_> {
    fn call(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
        let result = match name {
            "register_metrics_set" => self.register_metrics_set(args),
            "register_blotter" => self.register_blotter(args),
            "unregister_metrics_set" | "unregister_blotter" => {
                let [target] = args else {
                    return Some(Err(arity(name, "1", args.len())));
                };
                str_arg(name, target).and_then(|target| {
                    let removed = if name == "unregister_metrics_set" {
                        self.registry.metrics_sets.unregister(target)
                    } else {
                        self.registry.blotters.unregister(target)
                    };
                    removed.map(|_| Value::None).map_err(host_error)
                })
            }
            "getenv" => self.getenv(args),
            _ => return None,
        };
        Some(result)
    }
}
