//! Scopes and symbol tables
//!
//! Scopes form a tree with parent back-pointers, stored as a flat arena
//! addressed by index. The table tracks the current (innermost) scope
//! while the analyzer walks the program; after analysis the current
//! pointer is back at the global scope.
//!
//! User-defined struct types live in a separate flat registry keyed by
//! name, not in ordinary scopes.

use crate::types::Type;
use std::collections::HashMap;

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
    /// Wraps the methods of an `impl` block; carries the target name for
    /// `self` resolution.
    Struct,
}

/// Parameter metadata recorded on a function symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable {
        ty: Type,
        mutable: bool,
        initialized: bool,
    },
    Parameter {
        ty: Type,
        index: usize,
        mutable: bool,
    },
    Function {
        return_type: Type,
        params: Vec<ParamInfo>,
    },
    /// Nominal struct entry in the type registry.
    Struct { fields: Vec<(String, Type)> },
    Field { ty: Type },
}

impl Symbol {
    /// The value type of a variable or parameter symbol.
    pub fn value_type(&self) -> Option<&Type> {
        match self {
            Symbol::Variable { ty, .. } | Symbol::Parameter { ty, .. } | Symbol::Field { ty } => {
                Some(ty)
            }
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    symbols: HashMap<String, Symbol>,
    /// Declared return type, for Function scopes.
    pub return_type: Option<Type>,
    /// Implementing struct name, for Struct scopes.
    pub struct_name: Option<String>,
    /// Nesting depth from the global scope.
    pub level: usize,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, level: usize) -> Self {
        Scope {
            kind,
            parent,
            symbols: HashMap::new(),
            return_type: None,
            struct_name: None,
            level,
        }
    }
}

/// Registry entry for a user-defined struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructInfo {
    pub name: String,
    /// Ordered as declared in the source.
    pub fields: Vec<(String, Type)>,
}

impl StructInfo {
    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
    structs: HashMap<String, StructInfo>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::new(ScopeKind::Global, None, 0)],
            current: 0,
            structs: HashMap::new(),
        }
    }

    pub fn current_scope(&self) -> &Scope {
        &self.scopes[self.current]
    }

    pub fn at_global_scope(&self) -> bool {
        self.current == 0
    }

    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let level = self.scopes[self.current].level + 1;
        let id = self.scopes.len();
        self.scopes.push(Scope::new(kind, Some(self.current), level));
        self.current = id;
        id
    }

    pub fn push_function_scope(&mut self, return_type: Type) -> ScopeId {
        let id = self.push_scope(ScopeKind::Function);
        self.scopes[id].return_type = Some(return_type);
        id
    }

    pub fn push_struct_scope(&mut self, struct_name: impl Into<String>) -> ScopeId {
        let id = self.push_scope(ScopeKind::Struct);
        self.scopes[id].struct_name = Some(struct_name.into());
        id
    }

    /// Return to the parent scope. Popping the global scope is a bug in
    /// the analyzer's push/pop discipline.
    pub fn pop_scope(&mut self) {
        let parent = self.scopes[self.current]
            .parent
            .expect("pop_scope on global scope");
        self.current = parent;
    }

    /// Define a symbol in the current scope. Fails if the name is already
    /// taken in this scope (shadowing an outer scope is fine).
    pub fn define(&mut self, name: impl Into<String>, symbol: Symbol) -> Result<(), ()> {
        let name = name.into();
        let scope = &mut self.scopes[self.current];
        if scope.symbols.contains_key(&name) {
            return Err(());
        }
        scope.symbols.insert(name, symbol);
        Ok(())
    }

    /// Look a name up, walking from the current scope toward global.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            let scope = &self.scopes[id];
            if let Some(symbol) = scope.symbols.get(name) {
                return Some(symbol);
            }
            scope_id = scope.parent;
        }
        None
    }

    /// Mutable lookup along the scope chain (used to flip a variable's
    /// initialized flag on first assignment).
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            if self.scopes[id].symbols.contains_key(name) {
                return self.scopes[id].symbols.get_mut(name);
            }
            scope_id = self.scopes[id].parent;
        }
        None
    }

    /// The declared return type of the nearest enclosing Function scope.
    pub fn enclosing_return_type(&self) -> Option<&Type> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            let scope = &self.scopes[id];
            if scope.kind == ScopeKind::Function {
                return scope.return_type.as_ref();
            }
            scope_id = scope.parent;
        }
        None
    }

    /// The target name of the nearest enclosing Struct (impl) scope.
    pub fn enclosing_struct_name(&self) -> Option<&str> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            let scope = &self.scopes[id];
            if scope.kind == ScopeKind::Struct {
                return scope.struct_name.as_deref();
            }
            scope_id = scope.parent;
        }
        None
    }

    // ---- type registry --------------------------------------------------

    pub fn define_struct(&mut self, info: StructInfo) -> Result<(), ()> {
        if self.structs.contains_key(&info.name) {
            return Err(());
        }
        self.structs.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn struct_info(&self, name: &str) -> Option<&StructInfo> {
        self.structs.get(name)
    }
}
