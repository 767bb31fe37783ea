use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;
use crate::slots::{Access, Permission, PermissionFlag, SlotTable};
use crate::symbol::Symbol;

/// Shared handle to a scope frame
pub type Env = Rc<Environment>;

/// A lexical scope frame.
///
/// Frames own a [`SlotTable`] for their bindings. The parent link is a plain
/// field rather than a binding, so no language operation can observe or
/// replace the scope chain.
#[derive(Debug, Default)]
pub struct Environment {
    slots: RefCell<SlotTable>,
    parent: Option<Env>,
}

impl Environment {
    pub fn new_global() -> Env {
        Rc::new(Environment::default())
    }

    pub fn with_parent(parent: &Env) -> Env {
        Rc::new(Environment {
            slots: RefCell::new(SlotTable::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Add a binding to this frame. Fails if the frame already has one.
    pub fn define(&self, name: &Symbol, value: Value) -> Result<(), Error> {
        self.slots.borrow_mut().define_value(name, value)
    }

    /// Overwrite or create a binding in this frame without checks
    pub(crate) fn bind(&self, name: &Symbol, value: Value) {
        self.slots.borrow_mut().store(name, value);
    }

    pub fn lookup(&self, name: &Symbol) -> Result<Value, Error> {
        let frame = self.frame_for(name)?;
        let slots = frame.slots.borrow();
        slots.get(name, Access::External)
    }

    /// Rebind an existing name in the nearest frame that has it
    pub fn assign(&self, name: &Symbol, value: Value) -> Result<(), Error> {
        let frame = self.frame_for(name)?;
        let mut slots = frame.slots.borrow_mut();
        slots.set(name, value, Access::External)
    }

    pub fn chmod(&self, name: &Symbol, flags: &[PermissionFlag]) -> Result<Permission, Error> {
        let frame = self.frame_for(name)?;
        let mut slots = frame.slots.borrow_mut();
        slots.chmod(name, flags)
    }

    pub fn is_bound_locally(&self, name: &Symbol) -> bool {
        self.slots.borrow().contains(name)
    }

    /// Get all bindings in this environment and its parents
    /// Returns (name, value) pairs ordered by name; unset slots are skipped
    pub fn bindings(&self) -> Vec<(Symbol, Value)> {
        let mut bindings = BTreeMap::new();
        let mut frames = Vec::new();
        let mut frame = Some(self);
        while let Some(current) = frame {
            frames.push(current);
            frame = current.parent.as_deref();
        }

        // Outermost first so inner frames override
        for current in frames.into_iter().rev() {
            let slots = current.slots.borrow();
            for (name, variable) in slots.variables() {
                if let Some(value) = &variable.value {
                    bindings.insert(name.clone(), value.clone());
                }
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        result
    }

    fn frame_for(&self, name: &Symbol) -> Result<&Environment, Error> {
        let mut frame = self;
        loop {
            if frame.slots.borrow().contains(name) {
                return Ok(frame);
            }
            match &frame.parent {
                Some(parent) => frame = parent.as_ref(),
                None => return Err(Error::MissingSym(name.to_string())),
            }
        }
    }
}
