//! Runtime value model: a tagged variant with shared `Array`/`Object`
//! containers. Operator dispatch pattern-matches on the pair of tags.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::Statement;
use crate::environment::EnvId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Invalid operands for '{op}': {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Invalid operand for unary '{op}': {operand}")]
    InvalidUnaryOperand {
        op: &'static str,
        operand: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Modulo requires integer operands")]
    NonIntegerModulo,
    #[error("Array index must be an integer, got {got}")]
    ArrayIndexType { got: &'static str },
    #[error("Array index out of bounds: index {index}, len {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Object key must be a string, got {got}")]
    ObjectKeyType { got: &'static str },
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },
    #[error("Cannot index value of type {type_name}")]
    NotIndexable { type_name: &'static str },
    #[error("Cannot access member '{member}' of {type_name}")]
    InvalidMemberAccess {
        member: String,
        type_name: &'static str,
    },
    #[error("Unknown device member '{member}'")]
    UnknownDeviceMember { member: String },
    #[error("Value of type {type_name} is not callable")]
    NotCallable { type_name: &'static str },
    #[error("Expected {expected} arguments but got {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("ForEach requires an array, got {got}")]
    ForEachNotArray { got: &'static str },
    #[error("Value of type {type_name} does not have a length")]
    NoLength { type_name: &'static str },
    #[error("Array is empty")]
    EmptyArray,
    #[error("Return statement outside of function")]
    ReturnOutsideFunction,
    #[error("Break statement outside of loop")]
    BreakOutsideLoop,
    #[error("Continue statement outside of loop")]
    ContinueOutsideLoop,
    #[error("{message}")]
    Native { message: String },
}

impl RuntimeError {
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native {
            message: message.into(),
        }
    }
}

pub type ValueArray = Rc<RefCell<Vec<Value>>>;
pub type ValueMap = Rc<RefCell<BTreeMap<String, Value>>>;

/// Externally provided callable registered in the global scope.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, RuntimeError>;

/// User-defined function: parameters, shared body block, and the scope it
/// was defined in. The captured scope is an arena index, so a function
/// stored inside an object it closes over cannot form a leaking cycle.
#[derive(Clone)]
pub struct FunctionObject {
    pub params: Vec<String>,
    pub body: Rc<Statement>,
    pub closure: EnvId,
}

/// Descriptive record for a connected device, produced by the host bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceHandle {
    pub serial: String,
    pub model: String,
    pub screen_width: i64,
    pub screen_height: i64,
    pub android_version: String,
}

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(ValueArray),
    Object(ValueMap),
    Function(Rc<FunctionObject>),
    Native(Rc<NativeFn>),
    Device(Rc<DeviceHandle>),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    pub fn native(func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static) -> Self {
        Value::Native(Rc::new(func))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Native(_) => "native_function",
            Value::Device(_) => "device",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::Array(values) => !values.borrow().is_empty(),
            Value::Object(entries) => !entries.borrow().is_empty(),
            Value::Function(_) | Value::Native(_) | Value::Device(_) => true,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, RuntimeError> {
        // String concatenation wins over numeric addition.
        if matches!(self, Value::Str(_)) || matches!(other, Value::Str(_)) {
            return Ok(Value::Str(format!("{self}{other}")));
        }
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => Ok(Value::Int(left.wrapping_add(*right))),
            _ if self.is_number() && other.is_number() => Ok(Value::Float(
                self.as_f64().unwrap_or_default() + other.as_f64().unwrap_or_default(),
            )),
            _ => Err(self.invalid_operands("+", other)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => Ok(Value::Int(left.wrapping_sub(*right))),
            _ if self.is_number() && other.is_number() => Ok(Value::Float(
                self.as_f64().unwrap_or_default() - other.as_f64().unwrap_or_default(),
            )),
            _ => Err(self.invalid_operands("-", other)),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => Ok(Value::Int(left.wrapping_mul(*right))),
            _ if self.is_number() && other.is_number() => Ok(Value::Float(
                self.as_f64().unwrap_or_default() * other.as_f64().unwrap_or_default(),
            )),
            _ => Err(self.invalid_operands("*", other)),
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => {
                if *right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Ok(Value::Int(left.wrapping_div(*right)))
            }
            _ if self.is_number() && other.is_number() => {
                let divisor = other.as_f64().unwrap_or_default();
                if divisor == 0.0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Ok(Value::Float(self.as_f64().unwrap_or_default() / divisor))
            }
            _ => Err(self.invalid_operands("/", other)),
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value, RuntimeError> {
        match (self, other) {
            (Value::Int(left), Value::Int(right)) => {
                if *right == 0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                Ok(Value::Int(left.wrapping_rem(*right)))
            }
            _ => Err(RuntimeError::NonIntegerModulo),
        }
    }

    pub fn neg(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Int(value) => Ok(Value::Int(value.wrapping_neg())),
            Value::Float(value) => Ok(Value::Float(-value)),
            other => Err(RuntimeError::InvalidUnaryOperand {
                op: "-",
                operand: other.type_name(),
            }),
        }
    }

    pub fn not(&self) -> Value {
        Value::Bool(!self.is_truthy())
    }

    pub fn less_than(&self, other: &Value) -> Result<bool, RuntimeError> {
        match (self, other) {
            (Value::Str(left), Value::Str(right)) => Ok(left < right),
            _ if self.is_number() && other.is_number() => Ok(self.as_f64().unwrap_or_default()
                < other.as_f64().unwrap_or_default()),
            _ => Err(self.invalid_operands("<", other)),
        }
    }

    pub fn less_equal(&self, other: &Value) -> Result<bool, RuntimeError> {
        Ok(self.less_than(other)? || self == other)
    }

    pub fn greater_than(&self, other: &Value) -> Result<bool, RuntimeError> {
        Ok(!self.less_equal(other)?)
    }

    pub fn greater_equal(&self, other: &Value) -> Result<bool, RuntimeError> {
        Ok(!self.less_than(other)?)
    }

    pub fn index_get(&self, index: &Value) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(values) => {
                let Value::Int(index) = index else {
                    return Err(RuntimeError::ArrayIndexType {
                        got: index.type_name(),
                    });
                };
                let values = values.borrow();
                usize::try_from(*index)
                    .ok()
                    .and_then(|i| values.get(i).cloned())
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index: *index,
                        len: values.len(),
                    })
            }
            Value::Object(entries) => {
                let Value::Str(key) = index else {
                    return Err(RuntimeError::ObjectKeyType {
                        got: index.type_name(),
                    });
                };
                entries
                    .borrow()
                    .get(key)
                    .cloned()
                    .ok_or_else(|| RuntimeError::KeyNotFound { key: key.clone() })
            }
            other => Err(RuntimeError::NotIndexable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Member-path read on an object: a missing key yields `Nil`.
    pub fn member_get(&self, name: &str) -> Result<Value, RuntimeError> {
        match self {
            Value::Object(entries) => Ok(entries
                .borrow()
                .get(name)
                .cloned()
                .unwrap_or(Value::Nil)),
            Value::Device(device) => match name {
                "serial" => Ok(Value::Str(device.serial.clone())),
                "model" => Ok(Value::Str(device.model.clone())),
                "screenWidth" => Ok(Value::Int(device.screen_width)),
                "screenHeight" => Ok(Value::Int(device.screen_height)),
                "androidVersion" => Ok(Value::Str(device.android_version.clone())),
                other => Err(RuntimeError::UnknownDeviceMember {
                    member: other.to_string(),
                }),
            },
            other => Err(RuntimeError::InvalidMemberAccess {
                member: name.to_string(),
                type_name: other.type_name(),
            }),
        }
    }

    /// Index-path write on an object: inserts when the key is missing.
    pub fn set_key(&self, key: impl Into<String>, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Object(entries) => {
                entries.borrow_mut().insert(key.into(), value);
                Ok(())
            }
            other => Err(RuntimeError::native(format!(
                "Value is not an object, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn push(&self, value: Value) -> Result<(), RuntimeError> {
        match self {
            Value::Array(values) => {
                values.borrow_mut().push(value);
                Ok(())
            }
            other => Err(RuntimeError::native(format!(
                "Push() requires an array, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn pop(&self) -> Result<Value, RuntimeError> {
        match self {
            Value::Array(values) => values.borrow_mut().pop().ok_or(RuntimeError::EmptyArray),
            other => Err(RuntimeError::native(format!(
                "Pop() requires an array, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn length(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Str(value) => Ok(value.chars().count() as i64),
            Value::Array(values) => Ok(values.borrow().len() as i64),
            Value::Object(entries) => Ok(entries.borrow().len() as i64),
            other => Err(RuntimeError::NoLength {
                type_name: other.type_name(),
            }),
        }
    }

    fn invalid_operands(&self, op: &'static str, other: &Value) -> RuntimeError {
        RuntimeError::InvalidOperands {
            op,
            left: self.type_name(),
            right: other.type_name(),
        }
    }
}

impl PartialEq for Value {
    /// Language equality: false across differing tags, float equality
    /// within 1e-10, container identity for arrays and objects, serial
    /// identity for devices. Functions never compare equal.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(left), Value::Bool(right)) => left == right,
            (Value::Int(left), Value::Int(right)) => left == right,
            (Value::Float(left), Value::Float(right)) => (left - right).abs() < 1e-10,
            (Value::Str(left), Value::Str(right)) => left == right,
            (Value::Array(left), Value::Array(right)) => Rc::ptr_eq(left, right),
            (Value::Object(left), Value::Object(right)) => Rc::ptr_eq(left, right),
            (Value::Device(left), Value::Device(right)) => left.serial == right.serial,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Object(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "<function>"),
            Value::Native(_) => write!(f, "<native function>"),
            Value::Device(device) => write!(f, "Device({})", device.serial),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(value) => write!(f, "Str({value:?})"),
            Value::Function(func) => write!(f, "Function(arity {})", func.params.len()),
            Value::Native(_) => write!(f, "Native"),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}
