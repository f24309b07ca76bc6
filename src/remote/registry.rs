//! The string-keyed function registry behind the host call primitive.
//!
//! The host addresses functions by name, so the namespace stays
//! string-keyed; everything layered on top (the proxy operation set)
//! dispatches through closed enums instead.

use crate::error::Result;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A registered function. Handlers run synchronously from the host's point
/// of view; two-phase handlers built by the desynchronization layer return
/// a correlation key and finish their work in a spawned task.
pub(crate) type Handler = dyn Fn(&crate::instance::Instance, Vec<Value>) -> Result<Value>;

struct Entry {
    handler: Rc<Handler>,
    /// Two-phase handlers expect the caller identity prepended and cannot
    /// be invoked like ordinary functions.
    desync: bool,
}

#[derive(Default)]
pub(crate) struct FunctionRegistry {
    functions: RefCell<HashMap<String, Entry>>,
}

impl FunctionRegistry {
    pub(crate) fn insert(&self, name: &str, handler: Rc<Handler>, desync: bool) {
        self.functions
            .borrow_mut()
            .insert(name.to_owned(), Entry { handler, desync });
    }

    /// Returns a clone of the handler so the registry borrow is released
    /// before the handler runs; handlers may re-enter the registry.
    pub(crate) fn get(&self, name: &str) -> Option<Rc<Handler>> {
        self.functions
            .borrow()
            .get(name)
            .map(|entry| Rc::clone(&entry.handler))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    pub(crate) fn is_desync(&self, name: &str) -> bool {
        self.functions
            .borrow()
            .get(name)
            .is_some_and(|entry| entry.desync)
    }

    pub(crate) fn len(&self) -> usize {
        self.functions.borrow().len()
    }
}
