use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use super::{callable::Callable, ExecError, Frame};

/// Something bound to a name.
pub enum Symbol<E> {
    Constant(E),
    /// Computed on every read.
    Getter(Rc<dyn Fn() -> Result<E, ExecError>>),
    Callable(Rc<dyn Callable<E>>),
}

impl<E: Clone> Clone for Symbol<E> {
    fn clone(&self) -> Self {
        match self {
            Symbol::Constant(value) => Symbol::Constant(value.clone()),
            Symbol::Getter(getter) => Symbol::Getter(Rc::clone(getter)),
            Symbol::Callable(callable) => Symbol::Callable(Rc::clone(callable)),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Symbol<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Symbol::Getter(_) => f.write_str("Getter"),
            Symbol::Callable(_) => f.write_str("Callable"),
        }
    }
}

impl<E: Clone + 'static> Symbol<E> {
    pub fn getter(getter: impl Fn() -> Result<E, ExecError> + 'static) -> Self {
        Symbol::Getter(Rc::new(getter))
    }

    pub fn callable(callable: impl Callable<E> + 'static) -> Self {
        Symbol::Callable(Rc::new(callable))
    }

    pub fn get(&self) -> Result<E, ExecError> {
        match self {
            Symbol::Constant(value) => Ok(value.clone()),
            Symbol::Getter(getter) => getter(),
            Symbol::Callable(_) => Err(ExecError::NotGettable),
        }
    }

    /// Values behave like zero-argument functions returning themselves.
    pub fn call(
        &self,
        frame: &Frame<E>,
        args: Option<usize>,
        returns: Option<usize>,
    ) -> Result<(), ExecError> {
        match self {
            Symbol::Callable(callable) => callable.call(frame, args, returns),
            _ => {
                if let Some(actual) = args.filter(|a| *a != 0) {
                    return Err(ExecError::ArgumentCount {
                        expected: 0,
                        actual,
                    });
                }
                if let Some(actual) = returns.filter(|r| *r != 1) {
                    return Err(ExecError::ReturnCount {
                        expected: 1,
                        actual,
                    });
                }
                frame.stack().push(self.get()?);
                Ok(())
            }
        }
    }
}

/// Attribute lookup on a value, backing a composite scope.
pub trait AttributeSource<E> {
    fn attribute(&self, target: &E, name: &str, frame: &Frame<E>) -> Result<Option<E>, ExecError>;
}

enum ScopeKind<E> {
    Top,
    Local,
    /// Rejects redefinition of a name it already holds.
    Protection,
    /// Resolves attributes of `target` before falling back to the parent. Read-only.
    Composite {
        target: E,
        attributes: Rc<dyn AttributeSource<E>>,
    },
}

struct Scope<E> {
    kind: ScopeKind<E>,
    parent: Option<SymbolMap<E>>,
    symbols: RefCell<HashMap<Box<str>, Symbol<E>>>,
}

/// Chain of scopes. Cloning shares the scope.
pub struct SymbolMap<E>(Rc<Scope<E>>);

impl<E> Clone for SymbolMap<E> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<E> fmt::Debug for SymbolMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.kind {
            ScopeKind::Top => "top",
            ScopeKind::Local => "local",
            ScopeKind::Protection => "protection",
            ScopeKind::Composite { .. } => "composite",
        };
        let symbols = self.0.symbols.borrow();
        let mut names: Vec<_> = symbols.keys().collect();
        names.sort();
        f.debug_struct("SymbolMap")
            .field("kind", &kind)
            .field("names", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}

impl<E> SymbolMap<E> {
    fn with_kind(kind: ScopeKind<E>, parent: Option<&SymbolMap<E>>) -> Self {
        Self(Rc::new(Scope {
            kind,
            parent: parent.cloned(),
            symbols: RefCell::new(HashMap::new()),
        }))
    }

    pub fn top() -> Self {
        Self::with_kind(ScopeKind::Top, None)
    }

    pub fn local(parent: &SymbolMap<E>) -> Self {
        Self::with_kind(ScopeKind::Local, Some(parent))
    }

    pub fn protection(parent: &SymbolMap<E>) -> Self {
        Self::with_kind(ScopeKind::Protection, Some(parent))
    }

    pub fn composite(
        parent: &SymbolMap<E>,
        target: E,
        attributes: Rc<dyn AttributeSource<E>>,
    ) -> Self {
        Self::with_kind(ScopeKind::Composite { target, attributes }, Some(parent))
    }

    pub fn parent(&self) -> Option<&SymbolMap<E>> {
        self.0.parent.as_ref()
    }

    pub fn ptr_eq(&self, other: &SymbolMap<E>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `name` is bound in this scope itself, ignoring parents.
    pub fn defines(&self, name: &str) -> bool {
        self.0.symbols.borrow().contains_key(name)
    }

    /// Binds without any scope checks.
    pub(crate) fn insert(&self, name: &str, symbol: Symbol<E>) {
        self.0.symbols.borrow_mut().insert(name.into(), symbol);
    }

    pub fn put(&self, name: &str, symbol: Symbol<E>) -> Result<(), ExecError> {
        match self.0.kind {
            ScopeKind::Top | ScopeKind::Local => {}
            ScopeKind::Protection if self.defines(name) => {
                return Err(ExecError::AlreadyDefined { name: name.into() });
            }
            ScopeKind::Protection => {}
            ScopeKind::Composite { .. } => {
                return Err(ExecError::ReadOnlyScope { name: name.into() });
            }
        }
        self.insert(name, symbol);
        Ok(())
    }

    pub fn put_value(&self, name: &str, value: E) -> Result<(), ExecError> {
        self.put(name, Symbol::Constant(value))
    }
}

impl<E: Clone> SymbolMap<E> {
    /// Resolves `name` through this scope and its ancestors.
    pub fn get(&self, name: &str) -> Result<Option<Symbol<E>>, ExecError> {
        let mut scope = self;
        loop {
            match &scope.0.kind {
                ScopeKind::Composite { target, attributes } => {
                    if let Some(parent) = scope.parent() {
                        let frame = Frame::from_symbols(parent.clone());
                        if let Some(value) = attributes.attribute(target, name, &frame)? {
                            return Ok(Some(Symbol::Constant(value)));
                        }
                    }
                }
                _ => {
                    if let Some(symbol) = scope.0.symbols.borrow().get(name) {
                        return Ok(Some(symbol.clone()));
                    }
                }
            }

            match scope.parent() {
                Some(parent) => scope = parent,
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{AttributeSource, Symbol, SymbolMap};
    use crate::runtime::{ExecError, Frame};
    use assert2::{check, let_assert};

    fn value(map: &SymbolMap<i32>, name: &str) -> Option<i32> {
        let_assert!(Ok(symbol) = map.get(name));
        symbol.map(|s| {
            let_assert!(Ok(v) = s.get());
            v
        })
    }

    #[test]
    fn lookup_walks_parents() {
        let top = SymbolMap::top();
        let_assert!(Ok(()) = top.put_value("x", 1));
        let local = SymbolMap::local(&top);
        let_assert!(Ok(()) = local.put_value("y", 2));

        check!(value(&local, "x") == Some(1));
        check!(value(&local, "y") == Some(2));
        check!(value(&top, "y") == None);

        // shadowing never writes through to the parent
        let_assert!(Ok(()) = local.put_value("x", 3));
        check!(value(&local, "x") == Some(3));
        check!(value(&top, "x") == Some(1));
    }

    #[test]
    fn protection_rejects_redefinition() {
        let top = SymbolMap::top();
        let_assert!(Ok(()) = top.put_value("a", 1));
        let group = SymbolMap::protection(&top);
        check!(group.put_value("a", 2) == Ok(()));
        check!(group.put_value("a", 3) == Err(ExecError::AlreadyDefined { name: "a".into() }));
        check!(value(&group, "a") == Some(2));
    }

    struct Fields;

    impl AttributeSource<i32> for Fields {
        fn attribute(
            &self,
            target: &i32,
            name: &str,
            _frame: &Frame<i32>,
        ) -> Result<Option<i32>, ExecError> {
            Ok(match name {
                "double" => Some(target * 2),
                _ => None,
            })
        }
    }

    #[test]
    fn composite_scope() {
        let top = SymbolMap::top();
        let_assert!(Ok(()) = top.put_value("double", 0));
        let_assert!(Ok(()) = top.put_value("other", 7));
        let composite = SymbolMap::composite(&top, 21, Rc::new(Fields));

        check!(value(&composite, "double") == Some(42));
        check!(value(&composite, "other") == Some(7));
        check!(
            composite.put_value("x", 1) == Err(ExecError::ReadOnlyScope { name: "x".into() })
        );
    }

    #[test]
    fn values_called_as_functions() {
        let frame = Frame::top();
        let symbol = Symbol::Constant(5);
        check!(symbol.call(&frame, None, None) == Ok(()));
        check!(symbol.call(&frame, Some(0), Some(1)) == Ok(()));
        check!(
            symbol.call(&frame, Some(1), None)
                == Err(ExecError::ArgumentCount {
                    expected: 0,
                    actual: 1
                })
        );
        check!(frame.stack().to_vec() == vec![5, 5]);
    }

    #[test]
    fn functions_are_not_values() {
        let symbol = Symbol::<i32>::callable(
            |_: &Frame<i32>, _: Option<usize>, _: Option<usize>| Ok(()),
        );
        check!(symbol.get() == Err(ExecError::NotGettable));
    }
}
