use std::cell::Cell;
use std::fmt;

use rustc_hash::{FxBuildHasher, FxHashMap};
use smol_str::SmolStr;

use crate::builtin;
use crate::number::Number;
use crate::ops::{BinaryOp, UnaryOp};
use crate::vector::VectorView;
use crate::{Shared, SharedCell};

/// Handle to a scalar variable's storage. The storage is owned by the
/// symbol table; expression trees hold clones of the handle and read/write
/// through it without ever owning the cell.
#[derive(Debug, Clone)]
pub struct ScalarRef {
    name: SmolStr,
    cell: Shared<Cell<Number>>,
}

impl ScalarRef {
    pub fn new(name: impl Into<SmolStr>, value: Number) -> Self {
        Self {
            name: name.into(),
            cell: Shared::new(Cell::new(value)),
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    #[inline(always)]
    pub fn get(&self) -> Number {
        self.cell.get()
    }

    #[inline(always)]
    pub fn set(&self, value: Number) {
        self.cell.set(value);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.cell, &other.cell)
    }

    /// Number of live handles, used by lifetime tests.
    pub fn handle_count(&self) -> usize {
        Shared::strong_count(&self.cell)
    }
}

impl PartialEq for ScalarRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Handle to a string variable's storage, shared the same way as
/// [`ScalarRef`].
#[derive(Debug, Clone)]
pub struct StringRef {
    name: SmolStr,
    buf: Shared<SharedCell<String>>,
}

impl StringRef {
    pub fn new(name: impl Into<SmolStr>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buf: Shared::new(SharedCell::new(value.into())),
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn get(&self) -> String {
        self.buf.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.buf.borrow().chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.borrow().is_empty()
    }

    pub fn set(&self, value: String) {
        *self.buf.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.buf, &other.buf)
    }
}

impl PartialEq for StringRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Expected argument count for a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(u8),
    AtLeast(u8),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n as usize,
            Arity::AtLeast(n) => count >= *n as usize,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "{}+", n),
        }
    }
}

pub enum FunctionKind {
    /// One-argument builtin that specializes into a unary node.
    Unary(UnaryOp),
    /// Two-argument builtin equivalent to a binary operator (e.g. `pow`).
    Binary(BinaryOp),
    /// Plain function pointer, used for the builtin catalogue.
    Native(fn(&[Number]) -> Number),
    /// Host-registered closure.
    Closure(Box<dyn Fn(&[Number]) -> Number>),
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Unary(op) => write!(f, "Unary({:?})", op),
            FunctionKind::Binary(op) => write!(f, "Binary({:?})", op),
            FunctionKind::Native(_) => write!(f, "Native"),
            FunctionKind::Closure(_) => write!(f, "Closure"),
        }
    }
}

#[derive(Debug)]
pub struct FunctionEntry {
    pub name: SmolStr,
    pub arity: Arity,
    pub kind: FunctionKind,
}

impl FunctionEntry {
    pub fn call(&self, args: &[Number]) -> Number {
        match &self.kind {
            FunctionKind::Unary(op) => op.apply(args[0]),
            FunctionKind::Binary(op) => op.apply(args[0], args[1]),
            FunctionKind::Native(f) => f(args),
            FunctionKind::Closure(f) => f(args),
        }
    }
}

/// A name bound in the symbol table.
#[derive(Debug, Clone)]
pub enum Symbol {
    Variable(ScalarRef),
    Constant(Number),
    Str(StringRef),
    Vector(VectorView),
    Function(Shared<FunctionEntry>),
}

/// Name → storage binding consulted once per symbol at compile time.
///
/// The parser binds the resulting storage handle directly into the node it
/// constructs, so evaluation never goes through the table again. The table
/// owns all storage; trees only borrow it (via shared handles).
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: FxHashMap<SmolStr, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: FxHashMap::with_capacity_and_hasher(64, FxBuildHasher),
        }
    }

    /// A table pre-populated with the builtin math library and the usual
    /// constants (`pi`, `e`, `inf`, `nan`).
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        builtin::install(&mut table);
        table
    }

    pub fn add_variable(&mut self, name: &str, value: Number) -> ScalarRef {
        let var = ScalarRef::new(name, value);
        self.symbols
            .insert(SmolStr::new(name), Symbol::Variable(var.clone()));
        var
    }

    pub fn add_constant(&mut self, name: &str, value: Number) {
        self.symbols
            .insert(SmolStr::new(name), Symbol::Constant(value));
    }

    pub fn add_string(&mut self, name: &str, value: impl Into<String>) -> StringRef {
        let var = StringRef::new(name, value);
        self.symbols
            .insert(SmolStr::new(name), Symbol::Str(var.clone()));
        var
    }

    pub fn add_vector(&mut self, name: &str, view: VectorView) -> VectorView {
        self.symbols
            .insert(SmolStr::new(name), Symbol::Vector(view.clone()));
        view
    }

    pub fn add_function(
        &mut self,
        name: &str,
        arity: Arity,
        f: impl Fn(&[Number]) -> Number + 'static,
    ) {
        self.add_entry(FunctionEntry {
            name: SmolStr::new(name),
            arity,
            kind: FunctionKind::Closure(Box::new(f)),
        });
    }

    pub(crate) fn add_entry(&mut self, entry: FunctionEntry) {
        self.symbols
            .insert(entry.name.clone(), Symbol::Function(Shared::new(entry)));
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<ScalarRef> {
        match self.symbols.get(name) {
            Some(Symbol::Variable(var)) => Some(var.clone()),
            _ => None,
        }
    }

    pub fn string(&self, name: &str) -> Option<StringRef> {
        match self.symbols.get(name) {
            Some(Symbol::Str(var)) => Some(var.clone()),
            _ => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<VectorView> {
        match self.symbols.get(name) {
            Some(Symbol::Vector(view)) => Some(view.clone()),
            _ => None,
        }
    }

    /// Convenience accessor for the current value of a scalar variable.
    pub fn value_of(&self, name: &str) -> Option<Number> {
        match self.symbols.get(name) {
            Some(Symbol::Variable(var)) => Some(var.get()),
            Some(Symbol::Constant(value)) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_storage_is_shared() {
        let mut table = SymbolTable::new();
        let x = table.add_variable("x", Number::new(1.0));
        x.set(Number::new(5.0));
        assert_eq!(table.value_of("x"), Some(Number::new(5.0)));
    }

    #[test]
    fn test_constant_lookup() {
        let table = SymbolTable::with_builtins();
        let pi = table.value_of("pi").unwrap();
        assert!((pi.value() - std::f64::consts::PI).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builtin_function_lookup() {
        let table = SymbolTable::with_builtins();
        assert!(matches!(table.lookup("sin"), Some(Symbol::Function(_))));
        assert!(matches!(table.lookup("min"), Some(Symbol::Function(_))));
        assert!(table.lookup("no_such_symbol").is_none());
    }

    #[test]
    fn test_host_closure() {
        let mut table = SymbolTable::new();
        table.add_function("twice", Arity::Exact(1), |args| {
            args[0] + args[0]
        });
        match table.lookup("twice") {
            Some(Symbol::Function(entry)) => {
                assert_eq!(entry.call(&[Number::new(21.0)]), Number::new(42.0));
            }
            _ => panic!("function not registered"),
        }
    }

    #[test]
    fn test_string_storage() {
        let mut table = SymbolTable::new();
        let s = table.add_string("s", "abc");
        s.set("xyz".to_string());
        assert_eq!(table.string("s").unwrap().get(), "xyz");
    }
}
