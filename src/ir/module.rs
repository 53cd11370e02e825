//! Modules and global symbols

use super::function::Function;
use super::types::{DataLayout, Type};
use super::value::{Constant, FuncId, GlobalId};
use crate::{Error, Result};
use std::collections::BTreeSet;

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Visible to (and resolvable by) code outside the module
    External,
    /// Private to the module
    Internal,
}

/// Global variable or constant
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    /// Symbol name
    pub name: String,
    /// Type of the stored value; the symbol itself is a pointer to it
    pub ty: Type,
    /// Linkage
    pub linkage: Linkage,
    /// Read-only after load
    pub is_constant: bool,
    /// Definition; `None` makes this a declaration resolved elsewhere
    pub initializer: Option<Constant>,
}

/// Compilation unit: functions, globals and module-level flags
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module identifier used in diagnostics
    pub name: String,
    /// Target data layout
    pub data_layout: DataLayout,
    /// Function definitions and declarations
    pub functions: Vec<Function>,
    /// Global symbols
    pub globals: Vec<Global>,
    flags: BTreeSet<String>,
}

impl Module {
    /// Creates an empty module for a 64-bit target
    pub fn new(name: &str) -> Self {
        Self::with_layout(name, DataLayout::default())
    }

    /// Creates an empty module with an explicit data layout
    pub fn with_layout(name: &str, data_layout: DataLayout) -> Self {
        Self {
            name: name.to_string(),
            data_layout,
            functions: Vec::new(),
            globals: Vec::new(),
            flags: BTreeSet::new(),
        }
    }

    /// Adds a function and returns its handle
    pub fn add_function(&mut self, func: Function) -> FuncId {
        self.functions.push(func);
        FuncId(self.functions.len() as u32 - 1)
    }

    /// Function by handle
    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    /// Mutable function by handle
    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id.0 as usize)
    }

    /// Function handle by symbol name
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    /// Global by handle
    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.0 as usize)
    }

    /// Global handle by symbol name
    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    /// Adds a new global symbol. Fails if the name is taken.
    pub fn add_global(&mut self, global: Global) -> Result<GlobalId> {
        if self.global_by_name(&global.name).is_some() {
            return Err(Error::SymbolConflict {
                name: global.name,
                reason: "symbol already defined in module".to_string(),
            });
        }
        self.globals.push(global);
        Ok(GlobalId(self.globals.len() as u32 - 1))
    }

    /// Returns the global named `name`, declaring an external,
    /// uninitialized global of type `ty` if none exists.
    ///
    /// An existing global of a different type is a conflict.
    pub fn get_or_insert_global(&mut self, name: &str, ty: Type) -> Result<GlobalId> {
        if let Some(id) = self.global_by_name(name) {
            let existing = &self.globals[id.0 as usize];
            if existing.ty != ty {
                return Err(Error::SymbolConflict {
                    name: name.to_string(),
                    reason: format!("expected type {}, found {}", ty, existing.ty),
                });
            }
            return Ok(id);
        }
        self.add_global(Global {
            name: name.to_string(),
            ty,
            linkage: Linkage::External,
            is_constant: false,
            initializer: None,
        })
    }

    /// Sets a module-level flag
    pub fn set_flag(&mut self, flag: &str) {
        self.flags.insert(flag.to_string());
    }

    /// Returns true if the module-level flag is set
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// Snapshot of symbol names and address types, shareable while
    /// functions are mutated
    pub fn symbols(&self) -> SymbolTable {
        SymbolTable {
            globals: self
                .globals
                .iter()
                .map(|g| (g.name.clone(), g.ty.clone().ptr_to()))
                .collect(),
            functions: self
                .functions
                .iter()
                .map(|f| (f.name.clone(), f.signature().ptr_to()))
                .collect(),
        }
    }
}

/// Names and address types of a module's symbols
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    globals: Vec<(String, Type)>,
    functions: Vec<(String, Type)>,
}

impl SymbolTable {
    /// Pointer type of a global's address
    pub fn global(&self, id: GlobalId) -> Result<Type> {
        self.globals
            .get(id.0 as usize)
            .map(|(_, ty)| ty.clone())
            .ok_or_else(|| Error::Ir(format!("unknown global #{}", id.0)))
    }

    /// Pointer type of a function's address
    pub fn function(&self, id: FuncId) -> Result<Type> {
        self.functions
            .get(id.0 as usize)
            .map(|(_, ty)| ty.clone())
            .ok_or_else(|| Error::Ir(format!("unknown function #{}", id.0)))
    }

    /// Symbol name of a global
    pub fn global_name(&self, id: GlobalId) -> Option<&str> {
        self.globals.get(id.0 as usize).map(|(name, _)| name.as_str())
    }

    /// Symbol name of a function
    pub fn function_name(&self, id: FuncId) -> Option<&str> {
        self.functions.get(id.0 as usize).map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert_global_reuses_symbol() {
        let mut module = Module::new("m");
        let a = module.get_or_insert_global("g", Type::i64()).unwrap();
        let b = module.get_or_insert_global("g", Type::i64()).unwrap();
        assert_eq!(a, b);
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].linkage, Linkage::External);
        assert!(module.globals[0].initializer.is_none());
    }

    #[test]
    fn test_get_or_insert_global_type_conflict() {
        let mut module = Module::new("m");
        module.get_or_insert_global("g", Type::i32()).unwrap();
        let err = module.get_or_insert_global("g", Type::i64()).unwrap_err();
        assert!(matches!(err, Error::SymbolConflict { .. }));
    }

    #[test]
    fn test_symbol_table() {
        let mut module = Module::new("m");
        let g = module.get_or_insert_global("g", Type::i64()).unwrap();
        let f = module.add_function(Function::new("f", vec![Type::i32()], Type::Void));
        let symbols = module.symbols();
        assert_eq!(symbols.global(g).unwrap(), Type::i64().ptr_to());
        assert!(symbols.function(f).unwrap().is_pointer());
        assert!(symbols.global(GlobalId(7)).is_err());
        assert_eq!(symbols.global_name(g), Some("g"));
        assert_eq!(symbols.function_name(f), Some("f"));
    }
}
