//! The module/script graph loader.
//!
//! Files split into two classes: a **module** contains at least one
//! top-level `import` or `export` and gets its own scope; every other file
//! is a **script**, shares the global scope, and may pull in other scripts
//! through `/// <reference path="…">` directives. The loader resolves the
//! graph depth-first, detects cycles, caches every file so it executes at
//! most once, and hands back a dependencies-first execution order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, trace};
use thiserror::Error;

use crate::parser::ast::{ImportName, Program, StmtKind};
use crate::parser::{parse, ParseError};
use crate::typechecker::{check_program, Type, TypeError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not load '{path}': not found")]
    NotFound { path: String },
    #[error("circular reference between '{from}' and '{to}'")]
    Circular { from: String, to: String },
    #[error("'{path}' is a module; reference directives are only valid in script files")]
    ReferenceInModule { path: String },
    #[error("referenced file '{path}' is a module, not a script")]
    ReferencedModule { path: String },
    #[error("{0}")]
    Syntax(#[from] ParseError),
    #[error("{error} in {path}")]
    Check { error: TypeError, path: String },
}

/// One loaded file with everything later stages need.
#[derive(Debug)]
pub struct Unit {
    pub path: PathBuf,
    pub source: String,
    pub program: Rc<Program>,
    pub is_module: bool,
    /// Resolved reference targets, in source order.
    pub references: Vec<PathBuf>,
    /// `import` statements with their resolved targets, in source order.
    pub imports: Vec<(Vec<ImportName>, PathBuf)>,
}

impl Unit {
    /// Names this module exports (empty for scripts).
    pub fn export_names(&self) -> Vec<String> {
        let mut names = vec![];
        for stmt in &self.program.body {
            let StmtKind::Export(inner) = &stmt.kind else {
                continue;
            };
            match &inner.kind {
                StmtKind::VarDecl { declarations, .. } => {
                    for declarator in declarations {
                        declarator.pattern.bound_names(&mut names);
                    }
                }
                StmtKind::FunctionDecl(func) => {
                    if let Some(name) = &func.name {
                        names.push(name.clone());
                    }
                }
                StmtKind::ClassDecl(decl) => {
                    if let Some(name) = &decl.name {
                        names.push(name.clone());
                    }
                }
                _ => {}
            }
        }
        names
    }
}

#[derive(Default)]
pub struct Loader {
    cache: HashMap<PathBuf, Rc<Unit>>,
    /// Depth-first in-progress stack for cycle detection.
    stack: Vec<PathBuf>,
    /// Dependencies-first execution order.
    order: Vec<Rc<Unit>>,
}

impl Loader {
    pub fn new() -> Self {
        Loader::default()
    }

    /// Load the file graph rooted at `entry` and return every unit in
    /// execution order: dependencies before dependents, references before
    /// the referencing script's own body, each file exactly once.
    pub fn load(mut self, entry: &Path) -> Result<Vec<Rc<Unit>>, LoadError> {
        self.load_unit(entry)?;
        Ok(self.order)
    }

    fn load_unit(&mut self, path: &Path) -> Result<Rc<Unit>, LoadError> {
        let canonical = path.canonicalize().map_err(|_| LoadError::NotFound {
            path: path.to_string_lossy().to_string(),
        })?;

        // a second reference to a loaded file is a cache hit
        if let Some(unit) = self.cache.get(&canonical) {
            trace!("cache hit for '{}'", canonical.to_string_lossy());
            return Ok(unit.clone());
        }
        if let Some(position) = self.stack.iter().position(|p| p == &canonical) {
            return Err(LoadError::Circular {
                from: self.stack[position..]
                    .last()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default(),
                to: canonical.to_string_lossy().to_string(),
            });
        }

        debug!("loading '{}'", canonical.to_string_lossy());
        let source = std::fs::read_to_string(&canonical).map_err(|_| LoadError::NotFound {
            path: canonical.to_string_lossy().to_string(),
        })?;
        let program = parse(&source)?;
        let is_module = program.is_module();

        if is_module && !program.references.is_empty() {
            return Err(LoadError::ReferenceInModule {
                path: canonical.to_string_lossy().to_string(),
            });
        }

        self.stack.push(canonical.clone());
        let result = self.load_dependencies(&canonical, &program);
        self.stack.pop();
        let (references, imports) = result?;

        let unit = Rc::new(Unit {
            path: canonical.clone(),
            source,
            program: Rc::new(program),
            is_module,
            references,
            imports,
        });
        self.cache.insert(canonical, unit.clone());
        self.order.push(unit.clone());
        Ok(unit)
    }

    #[allow(clippy::type_complexity)]
    fn load_dependencies(
        &mut self,
        path: &Path,
        program: &Program,
    ) -> Result<(Vec<PathBuf>, Vec<(Vec<ImportName>, PathBuf)>), LoadError> {
        let mut references = vec![];
        for directive in &program.references {
            let target = resolve_path(path, &directive.path)?;
            let dep = self.load_unit(&target)?;
            if dep.is_module {
                return Err(LoadError::ReferencedModule {
                    path: dep.path.to_string_lossy().to_string(),
                });
            }
            references.push(dep.path.clone());
        }

        let mut imports = vec![];
        for stmt in &program.body {
            let StmtKind::Import { names, source } = &stmt.kind else {
                continue;
            };
            let target = resolve_path(path, source)?;
            let dep = self.load_unit(&target)?;
            imports.push((names.clone(), dep.path.clone()));
        }

        Ok((references, imports))
    }
}

/// Resolve a dependency path relative to the referencing file. A missing
/// trailing extension is retried with the referencing file's extension.
fn resolve_path(from: &Path, spec: &str) -> Result<PathBuf, LoadError> {
    let base = from.parent().unwrap_or_else(|| Path::new("."));
    let direct = base.join(spec);
    if direct.is_file() {
        return Ok(direct);
    }
    if direct.extension().is_none() {
        if let Some(extension) = from.extension() {
            let retried = direct.with_extension(extension);
            if retried.is_file() {
                return Ok(retried);
            }
        }
    }
    Err(LoadError::NotFound {
        path: direct.to_string_lossy().to_string(),
    })
}

/// Type check every unit in execution order, threading module exports and
/// script globals to their dependents.
pub fn check_units(units: &[Rc<Unit>]) -> Result<(), LoadError> {
    let mut script_globals: HashMap<String, Type> = HashMap::new();
    let mut script_global_types: HashMap<String, Type> = HashMap::new();
    let mut module_exports: HashMap<PathBuf, (HashMap<String, Type>, HashMap<String, Type>)> =
        HashMap::new();

    for unit in units {
        let mut imports = if unit.is_module {
            HashMap::new()
        } else {
            script_globals.clone()
        };
        let mut import_types = if unit.is_module {
            HashMap::new()
        } else {
            script_global_types.clone()
        };
        for (names, target) in &unit.imports {
            let Some((exports, export_types)) = module_exports.get(target) else {
                continue;
            };
            for name in names {
                let bound = name.alias.as_ref().unwrap_or(&name.name);
                if let Some(ty) = exports.get(&name.name) {
                    imports.insert(bound.clone(), ty.clone());
                }
                if let Some(ty) = export_types.get(&name.name) {
                    import_types.insert(bound.clone(), ty.clone());
                }
            }
        }

        let output = check_program(&unit.program, &imports, &import_types).map_err(|error| {
            LoadError::Check {
                error,
                path: unit.path.to_string_lossy().to_string(),
            }
        })?;

        if unit.is_module {
            module_exports.insert(unit.path.clone(), (output.exports, output.export_types));
        } else {
            script_globals.extend(output.top_level);
            script_global_types.extend(output.top_level_types);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn test_reference_graph_loads_dependencies_first() {
        let units = Loader::new().load(&fixture("main.ts")).unwrap();
        let names: Vec<String> = units
            .iter()
            .map(|u| u.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        // util is referenced by both helper and main but executes once
        assert_eq!(names, vec!["util.ts", "helper.ts", "main.ts"]);
    }

    #[test]
    fn test_circular_references_are_detected() {
        let error = Loader::new().load(&fixture("cycle_a.ts")).unwrap_err();
        assert!(error.to_string().contains("circular"), "{error}");
    }

    #[test]
    fn test_missing_file_mentions_not_found() {
        let error = Loader::new().load(&fixture("no_such_file.ts")).unwrap_err();
        assert!(error.to_string().contains("not found"), "{error}");
    }

    #[test]
    fn test_module_cannot_carry_reference_directives() {
        let error = Loader::new()
            .load(&fixture("bad_module_ref.ts"))
            .unwrap_err();
        assert!(error.to_string().contains("script"), "{error}");
    }

    #[test]
    fn test_referencing_a_module_is_an_error() {
        let error = Loader::new()
            .load(&fixture("refs_a_module.ts"))
            .unwrap_err();
        assert!(error.to_string().contains("module"), "{error}");
    }
}
