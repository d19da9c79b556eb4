//! Units, their imports and exports, and load ordering.
//!
//! Every loaded source becomes a [`Unit`]. Import and export statements
//! are taken out of the unit's statements when it is scanned; the imports
//! are linked to the most recently registered unit exporting the module,
//! and pending units are evaluated in an order where every unit runs after
//! the units it imports from.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use menter_lexer::TokenKind;
use menter_parser::{Element, NodeKind, ParserNode};
use menter_types::{ErrorCode, MenterError, Result};
use tracing::debug;

use crate::env::{new_symbols, Symbols};
use crate::options::RuntimeOptions;
use crate::value::Value;

/// `export [a, b] as name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub symbols: Vec<String>,
}

impl Module {
    pub fn exports(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

/// `import name`, `import name inline` or `import name as alias`.
#[derive(Debug, Clone)]
pub struct Import {
    pub name: String,
    pub alias: Option<String>,
    pub inline: bool,
    /// The unit providing the module, once linked.
    pub target: Option<Rc<Unit>>,
}

impl Import {
    pub fn new(name: impl Into<String>, alias: Option<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            alias,
            inline,
            target: None,
        }
    }

    /// The name the module is bound to in the importing unit.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// One loaded source: its globals, imports, exported modules and the
/// statements still waiting to be evaluated.
pub struct Unit {
    pub name: String,
    pub symbols: Symbols,
    imports: RefCell<Vec<Import>>,
    modules: RefCell<Vec<Module>>,
    pending: RefCell<Vec<Element>>,
    evaluated: Cell<bool>,
}

impl std::fmt::Debug for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("modules", &self.modules.borrow())
            .field("evaluated", &self.evaluated.get())
            .finish()
    }
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            symbols: new_symbols(),
            imports: RefCell::new(Vec::new()),
            modules: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            evaluated: Cell::new(false),
        })
    }

    pub fn imports(&self) -> Ref<'_, Vec<Import>> {
        self.imports.borrow()
    }

    pub fn modules(&self) -> Ref<'_, Vec<Module>> {
        self.modules.borrow()
    }

    pub fn module(&self, name: &str) -> Option<Module> {
        self.modules.borrow().iter().find(|m| m.name == name).cloned()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.symbols.borrow().get(name).cloned()
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated.get()
    }

    pub fn is_pending(&self) -> bool {
        !self.evaluated.get()
    }

    pub(crate) fn mark_evaluated(&self) {
        self.evaluated.set(true);
    }

    pub(crate) fn take_pending(&self) -> Vec<Element> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub(crate) fn push_pending(&self, statements: Vec<Element>) {
        self.pending.borrow_mut().extend(statements);
        self.evaluated.set(false);
    }

    pub(crate) fn add_module(&self, module: Module) {
        self.modules.borrow_mut().push(module);
    }

    /// Add `symbol` to the exports of `module`, creating the module.
    pub(crate) fn export(&self, module: &str, symbol: &str) {
        let mut modules = self.modules.borrow_mut();
        match modules.iter_mut().find(|m| m.name == module) {
            Some(existing) if !existing.exports(symbol) => existing.symbols.push(symbol.to_string()),
            Some(_) => {}
            None => modules.push(Module {
                name: module.to_string(),
                symbols: vec![symbol.to_string()],
            }),
        }
    }

    /// Look up the import bound to `binding`, together with its target.
    pub(crate) fn import_for(&self, binding: &str) -> Option<(Import, Rc<Unit>)> {
        self.imports
            .borrow()
            .iter()
            .find(|i| !i.inline && i.binding() == binding)
            .and_then(|i| i.target.clone().map(|t| (i.clone(), t)))
    }

    /// The inline import whose module exports `symbol`.
    pub(crate) fn inline_import_for(&self, symbol: &str) -> Option<(Import, Rc<Unit>)> {
        self.imports
            .borrow()
            .iter()
            .filter(|i| i.inline)
            .find_map(|i| {
                let target = i.target.clone()?;
                let exported = target.module(&i.name)?.exports(symbol);
                exported.then(|| (i.clone(), target))
            })
    }

    /// Separate the imports and exports of a parsed unit from its
    /// statements. The statements are queued for evaluation.
    pub(crate) fn absorb(&self, root: ParserNode, options: &RuntimeOptions) -> Result<()> {
        let mut imports = Vec::new();
        let mut statements = Vec::new();

        for element in root.children {
            match element {
                Element::Node(node) if node.kind == NodeKind::ExportStatement => {
                    let module = self.export_of(&node)?;
                    let duplicate = self.modules.borrow().iter().any(|m| m.name == module.name);
                    if duplicate {
                        return Err(self.error(
                            ErrorCode::DUPLICATE_MODULE,
                            format!("Duplicate module name: {}", module.name),
                        ));
                    }
                    self.add_module(module);
                }
                Element::Node(node)
                    if matches!(
                        node.kind,
                        NodeKind::ImportStatement
                            | NodeKind::ImportAsStatement
                            | NodeKind::ImportInlineStatement
                    ) =>
                {
                    imports.push(self.import_of(&node)?);
                }
                other => statements.push(other),
            }
        }

        let mut bound_here: Vec<String> = Vec::new();
        for import in imports {
            if bound_here.iter().any(|b| b == import.binding()) {
                return Err(self.error(
                    ErrorCode::DUPLICATE_IMPORT,
                    format!("Duplicate import name: {}", import.binding()),
                ));
            }
            bound_here.push(import.binding().to_string());
            if self.check_import(&import, options)? {
                self.imports.borrow_mut().push(import);
            }
        }

        let auto_imports = options
            .auto_import_list()
            .map_err(|e| self.error(ErrorCode::UNKNOWN_MODULE, e.to_string()))?;
        for import in auto_imports {
            let exported_here = self.modules.borrow().iter().any(|m| m.name == import.name);
            let bound = self.imports.borrow().iter().any(|i| i.binding() == import.binding());
            if !exported_here && !bound && !options.is_forbidden(&import.name) {
                self.imports.borrow_mut().push(import);
            }
        }

        self.push_pending(statements);
        Ok(())
    }

    /// Whether `import` is new to this unit. An identical import from an
    /// earlier snippet is ignored; rebinding the name is an error.
    fn check_import(&self, import: &Import, options: &RuntimeOptions) -> Result<bool> {
        if options.is_forbidden(&import.name) {
            return Err(self.error(
                ErrorCode::FORBIDDEN_IMPORT,
                format!("Import of module {} is forbidden", import.name),
            ));
        }
        let imports = self.imports.borrow();
        let Some(existing) = imports.iter().find(|i| i.binding() == import.binding()) else {
            return Ok(true);
        };
        if existing.name == import.name && existing.inline == import.inline {
            return Ok(false);
        }
        Err(self.error(
            ErrorCode::DUPLICATE_IMPORT,
            format!("Duplicate import name: {}", import.binding()),
        ))
    }

    fn import_of(&self, node: &ParserNode) -> Result<Import> {
        let names: Vec<String> = node
            .children
            .iter()
            .filter_map(|c| c.as_token())
            .map(|t| t.text.clone())
            .collect();
        match (node.kind, names.as_slice()) {
            (NodeKind::ImportStatement, [name]) => Ok(Import::new(name, None, false)),
            (NodeKind::ImportInlineStatement, [name]) => Ok(Import::new(name, None, true)),
            (NodeKind::ImportAsStatement, [name, alias]) => {
                Ok(Import::new(name, Some(alias.clone()), false))
            }
            _ => Err(self.error(
                ErrorCode::MALFORMED_NODE,
                format!("Malformed import: {}", node.reconstruct()),
            )),
        }
    }

    fn export_of(&self, node: &ParserNode) -> Result<Module> {
        let malformed = || {
            self.error(
                ErrorCode::MALFORMED_NODE,
                format!("Exports must list identifiers: {}", node.reconstruct()),
            )
        };
        let (Some(Element::Node(list)), Some(Element::Token(name))) = (node.child(0), node.child(1))
        else {
            return Err(malformed());
        };
        let mut symbols = Vec::with_capacity(list.children.len());
        for symbol in &list.children {
            match symbol {
                Element::Token(t) if t.kind == TokenKind::Identifier => symbols.push(t.text.clone()),
                _ => return Err(malformed()),
            }
        }
        Ok(Module {
            name: name.text.clone(),
            symbols,
        })
    }

    fn error(&self, code: ErrorCode, message: String) -> MenterError {
        MenterError::new(self.name.clone(), code, message)
    }
}

/// Point every unlinked import of `unit` at the most recently registered
/// other unit that exports the module.
pub(crate) fn link(unit: &Rc<Unit>, units: &[Rc<Unit>]) -> Result<()> {
    let mut imports = unit.imports.borrow_mut();
    for import in imports.iter_mut().filter(|i| i.target.is_none()) {
        let target = units
            .iter()
            .rev()
            .filter(|u| !Rc::ptr_eq(u, unit))
            .find(|u| u.modules.borrow().iter().any(|m| m.name == import.name))
            .cloned();
        match target {
            Some(target) => import.target = Some(target),
            None => {
                return Err(MenterError::new(
                    unit.name.clone(),
                    ErrorCode::UNKNOWN_MODULE,
                    format!("Unknown module: {}", import.name),
                ))
            }
        }
    }
    Ok(())
}

/// Order `pending` so that every unit follows the units it imports from.
///
/// Units that are already evaluated count as ordered. The search gives up
/// after twice as many passes as there are units and reports the units it
/// could not place.
pub(crate) fn order(pending: &[Rc<Unit>], unit_count: usize) -> Result<Vec<Rc<Unit>>> {
    let mut ordered: Vec<Rc<Unit>> = Vec::with_capacity(pending.len());
    let is_ordered = |ordered: &[Rc<Unit>], unit: &Rc<Unit>| {
        unit.is_evaluated() || ordered.iter().any(|o| Rc::ptr_eq(o, unit))
    };

    let max_passes = unit_count.max(1) * 2;
    for _ in 0..max_passes {
        if ordered.len() == pending.len() {
            break;
        }
        for unit in pending {
            if is_ordered(&ordered, unit) {
                continue;
            }
            let ready = unit
                .imports()
                .iter()
                .filter_map(|i| i.target.as_ref())
                .all(|target| is_ordered(&ordered, target));
            if ready {
                ordered.push(unit.clone());
            }
        }
    }

    if ordered.len() < pending.len() {
        let unresolved: Vec<&str> = pending
            .iter()
            .filter(|u| !ordered.iter().any(|o| Rc::ptr_eq(o, u)))
            .map(|u| u.name.as_str())
            .collect();
        return Err(MenterError::new(
            unresolved.first().copied().unwrap_or_default(),
            ErrorCode::CIRCULAR_IMPORT,
            format!(
                "Circular import detected between units: [{}]",
                unresolved.join(", ")
            ),
        ));
    }

    let names: Vec<&str> = ordered.iter().map(|u| u.name.as_str()).collect();
    debug!(order = ?names, "unit evaluation order");
    Ok(ordered)
}
