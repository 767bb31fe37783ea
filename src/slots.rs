//! Permissioned slot tables.
//!
//! A [`SlotTable`] maps names to [`Variable`]s. Each variable carries a
//! [`Permission`] deciding who may read or write it, an optional declared
//! [`Datatype`], and a value that stays unset until first written. The same
//! table backs lexical scope frames and class objects.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::Error;
use crate::ast::Value;
use crate::procedure::LambdaKind;
use crate::symbol::Symbol;

/// Who is asking for a slot.
///
/// `Internal` is only handed out while a method of the owning class runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    External,
    Internal,
}

/// Access bits of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub class_read: bool,
    pub class_write: bool,
    pub any_read: bool,
    pub any_write: bool,
    /// Placeholder slot; denies all access until inherited by a subclass
    pub virtual_: bool,
}

impl Default for Permission {
    fn default() -> Self {
        Permission {
            class_read: true,
            class_write: true,
            any_read: true,
            any_write: true,
            virtual_: false,
        }
    }
}

impl Permission {
    pub fn allows_read(&self, access: Access) -> bool {
        !self.virtual_ && (self.any_read || (access == Access::Internal && self.class_read))
    }

    pub fn allows_write(&self, access: Access) -> bool {
        !self.virtual_ && (self.any_write || (access == Access::Internal && self.class_write))
    }

    pub fn apply(&mut self, flag: PermissionFlag) {
        match flag {
            PermissionFlag::Enable(bit) => self.set_bit(bit, true),
            PermissionFlag::Disable(bit) => self.set_bit(bit, false),
            PermissionFlag::ReadOnly => {
                self.class_write = false;
                self.any_write = false;
            }
            PermissionFlag::Private => {
                self.any_read = false;
                self.any_write = false;
            }
        }
    }

    fn set_bit(&mut self, bit: PermissionBit, on: bool) {
        match bit {
            PermissionBit::ClassRead => self.class_read = on,
            PermissionBit::ClassWrite => self.class_write = on,
            PermissionBit::AnyRead => self.any_read = on,
            PermissionBit::AnyWrite => self.any_write = on,
            PermissionBit::Virtual => self.virtual_ = on,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = [
            (self.class_read, PermissionBit::ClassRead),
            (self.class_write, PermissionBit::ClassWrite),
            (self.any_read, PermissionBit::AnyRead),
            (self.any_write, PermissionBit::AnyWrite),
            (self.virtual_, PermissionBit::Virtual),
        ];
        let names: Vec<&str> = bits
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, bit)| bit.name())
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionBit {
    ClassRead,
    ClassWrite,
    AnyRead,
    AnyWrite,
    Virtual,
}

impl PermissionBit {
    pub fn name(&self) -> &'static str {
        match self {
            PermissionBit::ClassRead => "class-read",
            PermissionBit::ClassWrite => "class-write",
            PermissionBit::AnyRead => "any-read",
            PermissionBit::AnyWrite => "any-write",
            PermissionBit::Virtual => "virtual",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "class-read" => Some(PermissionBit::ClassRead),
            "class-write" => Some(PermissionBit::ClassWrite),
            "any-read" => Some(PermissionBit::AnyRead),
            "any-write" => Some(PermissionBit::AnyWrite),
            "virtual" => Some(PermissionBit::Virtual),
            _ => None,
        }
    }
}

/// One `chmod` instruction.
///
/// Written as `bit` or `+bit` to enable, `-bit` to disable, or one of the
/// composites `read-only` and `private`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionFlag {
    Enable(PermissionBit),
    Disable(PermissionBit),
    /// Clears both write bits
    ReadOnly,
    /// Clears both `any-*` bits
    Private,
}

impl FromStr for PermissionFlag {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        let unknown = || Error::InvalidForm(format!("unknown permission flag: {text}"));
        match text {
            "read-only" => Ok(PermissionFlag::ReadOnly),
            "private" => Ok(PermissionFlag::Private),
            _ => {
                if let Some(name) = text.strip_prefix('+') {
                    PermissionBit::from_name(name)
                        .map(PermissionFlag::Enable)
                        .ok_or_else(unknown)
                } else if let Some(name) = text.strip_prefix('-') {
                    PermissionBit::from_name(name)
                        .map(PermissionFlag::Disable)
                        .ok_or_else(unknown)
                } else {
                    PermissionBit::from_name(text)
                        .map(PermissionFlag::Enable)
                        .ok_or_else(unknown)
                }
            }
        }
    }
}

/// Declared type of a slot, checked on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Integer,
    String,
    Bool,
    Symbol,
    Pair,
    Nil,
    Procedure,
    Macro,
    Class,
}

impl Datatype {
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Datatype::Integer, Value::Integer(_))
            | (Datatype::String, Value::String(_))
            | (Datatype::Bool, Value::Bool(_))
            | (Datatype::Symbol, Value::Symbol(_))
            | (Datatype::Pair, Value::Pair(_))
            | (Datatype::Nil, Value::Nil)
            | (Datatype::Procedure, Value::Builtin(_))
            | (Datatype::Class, Value::Class(_)) => true,
            (Datatype::Procedure, Value::Lambda(lambda)) => lambda.kind == LambdaKind::Function,
            (Datatype::Macro, Value::Lambda(lambda)) => lambda.kind == LambdaKind::Macro,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Datatype::Integer => "integer",
            Datatype::String => "string",
            Datatype::Bool => "bool",
            Datatype::Symbol => "symbol",
            Datatype::Pair => "pair",
            Datatype::Nil => "nil",
            Datatype::Procedure => "procedure",
            Datatype::Macro => "macro",
            Datatype::Class => "class",
        }
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        match text {
            "integer" => Ok(Datatype::Integer),
            "string" => Ok(Datatype::String),
            "bool" => Ok(Datatype::Bool),
            "symbol" => Ok(Datatype::Symbol),
            "pair" => Ok(Datatype::Pair),
            "nil" => Ok(Datatype::Nil),
            "procedure" => Ok(Datatype::Procedure),
            "macro" => Ok(Datatype::Macro),
            "class" => Ok(Datatype::Class),
            _ => Err(Error::InvalidForm(format!("unknown datatype: {text}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub permission: Permission,
    pub datatype: Option<Datatype>,
    /// `None` until the slot is first written
    pub value: Option<Value>,
}

impl Variable {
    fn declared(datatype: Option<Datatype>) -> Self {
        Variable {
            permission: Permission::default(),
            datatype,
            value: None,
        }
    }
}

/// Name to variable mapping with permission checks and a one-way finalise switch.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: BTreeMap<Symbol, Variable>,
    finalised: bool,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &Symbol) -> bool {
        self.slots.contains_key(name)
    }

    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    pub fn finalise(&mut self) {
        self.finalised = true;
    }

    /// Declare a new, unset slot with the default permission.
    pub fn define(&mut self, name: &Symbol, datatype: Option<Datatype>) -> Result<(), Error> {
        if self.finalised {
            return Err(Error::InvalidPermission(format!(
                "cannot define {name}: table is finalised"
            )));
        }
        if self.slots.contains_key(name) {
            return Err(Error::AlreadyDefined(name.to_string()));
        }
        self.slots
            .insert(name.clone(), Variable::declared(datatype));
        Ok(())
    }

    /// Declare a slot and write its first value in one step.
    pub fn define_value(&mut self, name: &Symbol, value: Value) -> Result<(), Error> {
        self.define(name, None)?;
        self.store(name, value);
        Ok(())
    }

    pub fn set(&mut self, name: &Symbol, value: Value, access: Access) -> Result<(), Error> {
        let variable = self
            .slots
            .get_mut(name)
            .ok_or_else(|| Error::MissingSym(name.to_string()))?;
        if !variable.permission.allows_write(access) {
            return Err(Error::InvalidPermission(format!("cannot write {name}")));
        }
        if let Some(datatype) = variable.datatype
            && !datatype.admits(&value)
        {
            return Err(Error::TypeError(format!(
                "{name} holds {}, got {}",
                datatype.name(),
                value.type_name()
            )));
        }
        variable.value = Some(value);
        Ok(())
    }

    pub fn get(&self, name: &Symbol, access: Access) -> Result<Value, Error> {
        let variable = self
            .slots
            .get(name)
            .ok_or_else(|| Error::MissingSym(name.to_string()))?;
        if !variable.permission.allows_read(access) {
            return Err(Error::InvalidPermission(format!("cannot read {name}")));
        }
        variable
            .value
            .clone()
            .ok_or_else(|| Error::UnsetValue(name.to_string()))
    }

    pub fn chmod(&mut self, name: &Symbol, flags: &[PermissionFlag]) -> Result<Permission, Error> {
        if self.finalised {
            return Err(Error::InvalidPermission(format!(
                "cannot chmod {name}: table is finalised"
            )));
        }
        let variable = self
            .slots
            .get_mut(name)
            .ok_or_else(|| Error::MissingSym(name.to_string()))?;
        for flag in flags {
            variable.permission.apply(*flag);
        }
        Ok(variable.permission)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&Symbol, &Variable)> {
        self.slots.iter()
    }

    /// Copy a variable from an ancestor, replacing any earlier copy.
    /// The copy is always concrete.
    pub(crate) fn inherit(&mut self, name: &Symbol, variable: &Variable) {
        let mut copy = variable.clone();
        copy.permission.virtual_ = false;
        self.slots.insert(name.clone(), copy);
    }

    /// Write without permission checks. Used for bootstrap bindings.
    pub(crate) fn store(&mut self, name: &Symbol, value: Value) {
        let variable = self
            .slots
            .entry(name.clone())
            .or_insert_with(|| Variable::declared(None));
        variable.value = Some(value);
    }
}
