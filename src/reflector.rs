//! Call a method by name with string arguments.
//!
//! Types opt in by implementing [`Reflect`], which lists their callable
//! methods with declared parameter types. [`invoke`] picks the first
//! same-named method of matching arity whose arguments all convert.

use std::fmt;

use strum::Display;
use thiserror::Error;
use tracing::debug;

use crate::backend::{Cursor, DriverKind};
use crate::error::ShellError;

/// Declared parameter type of a reflectable method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ParamType {
    #[strum(serialize = "String")]
    Str,
    #[strum(serialize = "byte")]
    Byte,
    #[strum(serialize = "short")]
    Short,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "long")]
    Long,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "double")]
    Double,
    #[strum(serialize = "boolean")]
    Bool,
    #[strum(serialize = "char")]
    Char,
    /// Resolved by name against the compiled-in driver kinds.
    #[strum(serialize = "Type")]
    TypeName,
}

pub enum Value {
    Null,
    Unit,
    Str(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(char),
    Type(DriverKind),
    Cursor(Box<dyn Cursor>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unit => Ok(()),
            Value::Str(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Type(v) => write!(f, "{v}"),
            Value::Cursor(_) => write!(f, "<cursor>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Cursor(cursor) => f
                .debug_struct("Cursor")
                .field("columns", &cursor.columns())
                .finish(),
            other => write!(f, "Value({other})"),
        }
    }
}

pub type MethodFn<T> = fn(&mut T, Vec<Value>) -> Result<Value, ShellError>;

pub struct MethodSpec<T: ?Sized> {
    pub name: &'static str,
    pub params: &'static [ParamType],
    pub call: MethodFn<T>,
}

impl<T: ?Sized> MethodSpec<T> {
    pub fn new(name: &'static str, params: &'static [ParamType], call: MethodFn<T>) -> Self {
        Self { name, params, call }
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// A type whose methods can be called by name.
pub trait Reflect {
    fn methods() -> Vec<MethodSpec<Self>>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("No method matching \"{name}\" was found")]
    NoMatchingMethod { name: String, candidates: Vec<String> },

    #[error("Cannot convert \"{value}\" to {ty}")]
    ArgumentConversion { value: String, ty: ParamType },
}

/// Signatures of every method `T` exposes, in declaration order.
pub fn signatures<T: Reflect + ?Sized>() -> Vec<String> {
    T::methods().iter().map(|m| m.signature()).collect()
}

/// Invokes `name` on `target`. `None` arguments, like the literal `"null"`,
/// convert to [`Value::Null`] for every parameter type.
pub fn invoke<T: Reflect + ?Sized>(
    target: &mut T,
    name: &str,
    args: &[Option<String>],
) -> Result<Value, ShellError> {
    let methods = T::methods();
    let mut candidates = Vec::new();

    for method in methods.iter().filter(|m| m.name.eq_ignore_ascii_case(name)) {
        candidates.push(method.signature());
        if method.params.len() != args.len() {
            continue;
        }

        let mut converted = Vec::with_capacity(args.len());
        for (ty, arg) in method.params.iter().zip(args) {
            match convert(*ty, arg.as_deref())? {
                Some(value) => converted.push(value),
                None => break,
            }
        }
        if converted.len() != args.len() {
            debug!("[reflector::invoke] {} did not accept {:?}", method.signature(), args);
            continue;
        }

        debug!("[reflector::invoke] Calling {}", method.signature());
        return (method.call)(target, converted);
    }

    Err(InvokeError::NoMatchingMethod {
        name: name.to_string(),
        candidates,
    }
    .into())
}

/// `Ok(None)` means the argument does not fit this parameter and the next
/// candidate should be tried.
fn convert(ty: ParamType, arg: Option<&str>) -> Result<Option<Value>, InvokeError> {
    let Some(arg) = arg.filter(|a| *a != "null") else {
        return Ok(Some(Value::Null));
    };

    let value = match ty {
        ParamType::Str => Some(Value::Str(arg.to_string())),
        ParamType::Byte => arg.parse().ok().map(Value::Byte),
        ParamType::Short => arg.parse().ok().map(Value::Short),
        ParamType::Int => arg.parse().ok().map(Value::Int),
        ParamType::Long => arg.parse().ok().map(Value::Long),
        ParamType::Float => arg.parse().ok().map(Value::Float),
        ParamType::Double => arg.parse().ok().map(Value::Double),
        ParamType::Bool => Some(Value::Bool(parse_flag(arg))),
        ParamType::Char => arg.chars().next().map(Value::Char),
        ParamType::TypeName => {
            let kind = arg
                .parse::<DriverKind>()
                .map_err(|_| InvokeError::ArgumentConversion {
                    value: arg.to_string(),
                    ty,
                })?;
            Some(Value::Type(kind))
        }
    };
    Ok(value)
}

/// True only for `true`, `1`, `on` and `yes`, exactly as written.
pub fn parse_flag(value: &str) -> bool {
    matches!(value, "true" | "1" | "on" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Default)]
    struct Target {
        calls: Vec<String>,
    }

    impl Reflect for Target {
        fn methods() -> Vec<MethodSpec<Self>> {
            vec![
                MethodSpec::new("resize", &[ParamType::Int], |t, args| {
                    t.calls.push(format!("resize(int {})", args[0]));
                    Ok(Value::Unit)
                }),
                MethodSpec::new("resize", &[ParamType::Str], |t, args| {
                    t.calls.push(format!("resize(String {})", args[0]));
                    Ok(Value::Unit)
                }),
                MethodSpec::new("resize", &[ParamType::Int, ParamType::Int], |t, args| {
                    t.calls.push(format!("resize({}, {})", args[0], args[1]));
                    Ok(Value::Unit)
                }),
                MethodSpec::new("toggle", &[ParamType::Bool], |_, args| {
                    Ok(Value::Bool(args[0].as_bool().unwrap_or(false)))
                }),
                MethodSpec::new("kind", &[ParamType::TypeName], |_, mut args| Ok(args.remove(0))),
            ]
        }
    }

    fn some(args: &[&str]) -> Vec<Option<String>> {
        args.iter().map(|a| Some(a.to_string())).collect()
    }

    #[rstest]
    fn test_first_convertible_candidate_wins() {
        let mut target = Target::default();
        invoke(&mut target, "resize", &some(&["42"])).unwrap();
        invoke(&mut target, "RESIZE", &some(&["big"])).unwrap();
        invoke(&mut target, "Resize", &some(&["1", "2"])).unwrap();
        assert_eq!(
            target.calls,
            vec!["resize(int 42)", "resize(String big)", "resize(1, 2)"]
        );
    }

    #[rstest]
    fn test_null_converts_for_any_type() {
        let mut target = Target::default();
        invoke(&mut target, "resize", &some(&["null"])).unwrap();
        invoke(&mut target, "resize", &[None]).unwrap();
        assert_eq!(target.calls, vec!["resize(int null)", "resize(int null)"]);
    }

    #[rstest]
    #[case("true", true)]
    #[case("1", true)]
    #[case("on", true)]
    #[case("yes", true)]
    #[case("TRUE", false)]
    #[case("Yes", false)]
    #[case("notabool", false)]
    #[case("0", false)]
    fn test_boolean_conversion(#[case] arg: &str, #[case] expected: bool) {
        let mut target = Target::default();
        let value = invoke(&mut target, "toggle", &some(&[arg])).unwrap();
        assert_eq!(value.as_bool(), Some(expected));
    }

    #[rstest]
    fn test_wrong_arity_lists_candidates() {
        let mut target = Target::default();
        let err = invoke(&mut target, "resize", &some(&["1", "2", "3"])).unwrap_err();
        match err {
            ShellError::Reflection(InvokeError::NoMatchingMethod { name, candidates }) => {
                assert_eq!(name, "resize");
                assert_eq!(
                    candidates,
                    vec!["resize(int)", "resize(String)", "resize(int, int)"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    fn test_unknown_method_has_no_candidates() {
        let mut target = Target::default();
        let err = invoke(&mut target, "shrink", &[]).unwrap_err();
        assert!(matches!(
            err,
            ShellError::Reflection(InvokeError::NoMatchingMethod { ref candidates, .. }) if candidates.is_empty()
        ));
    }

    #[rstest]
    fn test_type_name_resolution() {
        let mut target = Target::default();
        let value = invoke(&mut target, "kind", &some(&["PostgreSQL"])).unwrap();
        assert!(matches!(value, Value::Type(DriverKind::Postgres)));

        let err = invoke(&mut target, "kind", &some(&["oracle"])).unwrap_err();
        assert!(matches!(
            err,
            ShellError::Reflection(InvokeError::ArgumentConversion { .. })
        ));
    }

    #[rstest]
    fn test_signatures_in_declaration_order() {
        let sigs = signatures::<Target>();
        assert_eq!(sigs[0], "resize(int)");
        assert_eq!(sigs.last().map(String::as_str), Some("kind(Type)"));
    }
}
