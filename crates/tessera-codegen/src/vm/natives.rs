//! Built-in methods of primitives, strings, tuples and the runtime helpers

use std::rc::Rc;

use crate::codegen::{INTRINSICS_CLASS, TUPLE_CLASS};
use crate::types::PrimitiveKind;

use super::value::{ArithOp, Object, Value};

/// Result type for native methods
pub type NativeResult = Result<Value, String>;

/// Class of the iterator returned by `Tuple.iterator()`
pub const TUPLE_ITERATOR_CLASS: &str = "TupleIterator";

/// Run the built-in `class.method`; `None` when there is no such built-in.
///
/// Instance methods receive their receiver as `args[0]`.
pub fn call(class: &str, method: &str, args: &[Value]) -> Option<NativeResult> {
    if let Some(kind) = PrimitiveKind::from_name(class) {
        return primitive_method(kind, method, args);
    }
    match class {
        "String" => string_method(method, args),
        TUPLE_CLASS => tuple_method(method, args),
        TUPLE_ITERATOR_CLASS => tuple_iterator_method(method, args),
        INTRINSICS_CLASS => intrinsics_method(method, args),
        "Any" => any_method(method, args),
        _ => None,
    }
}

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<(), String> {
    if args.len() == count {
        Ok(())
    } else {
        Err(format!(
            "{name}() expects {} argument(s), got {}",
            count.saturating_sub(1),
            args.len().saturating_sub(1)
        ))
    }
}

/// Kind of the result of a mixed primitive operation
fn promote(a: PrimitiveKind, b: PrimitiveKind) -> PrimitiveKind {
    use PrimitiveKind::{Byte, Char, Int, Short};
    match (a, b) {
        (Char, Char) => Int,
        (Char, _) => Char,
        _ => {
            let wider = if a.widens_to(b) { b } else { a };
            match wider {
                Byte | Short => Int,
                other => other,
            }
        }
    }
}

fn kind_of(value: &Value) -> Result<PrimitiveKind, String> {
    value
        .primitive_kind()
        .ok_or_else(|| format!("expected a primitive, got {}", value.class_name()))
}

fn primitive_method(kind: PrimitiveKind, method: &str, args: &[Value]) -> Option<NativeResult> {
    let arith = match method {
        "plus" => Some(ArithOp::Add),
        "minus" => Some(ArithOp::Sub),
        "times" => Some(ArithOp::Mul),
        "div" => Some(ArithOp::Div),
        "rem" => Some(ArithOp::Rem),
        _ => None,
    };
    let result = match (method, arith) {
        (_, Some(op)) => primitive_binary(kind, method, op, args),
        ("compareTo", None) => expect_args(method, args, 2).and_then(|()| {
            Value::compare(&args[0], &args[1])
                .map(Value::Int)
                .map_err(|e| e.to_string())
        }),
        ("unaryMinus" | "unaryPlus", None) => expect_args(method, args, 1).and_then(|()| {
            let target = match kind {
                PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Char => PrimitiveKind::Int,
                other => other,
            };
            let value = args[0].convert(target).map_err(|e| e.to_string())?;
            if method == "unaryMinus" {
                value.negate(target).map_err(|e| e.to_string())
            } else {
                Ok(value)
            }
        }),
        ("inc" | "dec", None) => expect_args(method, args, 1).and_then(|()| {
            let op = if method == "inc" { ArithOp::Add } else { ArithOp::Sub };
            Value::arithmetic(op, kind, &args[0], &Value::Int(1)).map_err(|e| e.to_string())
        }),
        ("not", None) if kind == PrimitiveKind::Bool => expect_args(method, args, 1)
            .and_then(|()| args[0].as_bool("not").map(|b| Value::Bool(!b)).map_err(|e| e.to_string())),
        ("equals", None) => {
            expect_args(method, args, 2).map(|()| Value::Bool(args[0].structural_eq(&args[1])))
        }
        ("toString", None) => expect_args(method, args, 1).map(|()| Value::string(args[0].to_string())),
        _ => return None,
    };
    Some(result)
}

fn primitive_binary(kind: PrimitiveKind, method: &str, op: ArithOp, args: &[Value]) -> NativeResult {
    expect_args(method, args, 2)?;
    let result_kind = promote(kind, kind_of(&args[1])?);
    // Char arithmetic happens on code points
    let operand_kind = if result_kind == PrimitiveKind::Char {
        PrimitiveKind::Int
    } else {
        result_kind
    };
    let a = args[0].convert(operand_kind).map_err(|e| e.to_string())?;
    let b = args[1].convert(operand_kind).map_err(|e| e.to_string())?;
    let value = Value::arithmetic(op, operand_kind, &a, &b).map_err(|e| e.to_string())?;
    value.convert(result_kind).map_err(|e| e.to_string())
}

fn string_method(method: &str, args: &[Value]) -> Option<NativeResult> {
    let result = match method {
        "plus" => expect_args(method, args, 2).map(|()| Value::string(format!("{}{}", args[0], args[1]))),
        "compareTo" => expect_args(method, args, 2).and_then(|()| {
            Value::compare(&args[0], &args[1])
                .map(Value::Int)
                .map_err(|e| e.to_string())
        }),
        "equals" => expect_args(method, args, 2).map(|()| Value::Bool(args[0].structural_eq(&args[1]))),
        "length$get" => expect_args(method, args, 1).and_then(|()| match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i32)),
            other => Err(format!("length of {}", other.class_name())),
        }),
        "get" => expect_args(method, args, 2).and_then(|()| match (&args[0], &args[1]) {
            (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(Value::Char)
                .ok_or_else(|| format!("index {i} out of bounds for length {}", s.chars().count())),
            _ => Err("String.get() expects an Int index".to_string()),
        }),
        "toString" => expect_args(method, args, 1).map(|()| args[0].clone()),
        _ => return None,
    };
    Some(result)
}

fn tuple_index(items: &[Value], index: &Value) -> Result<usize, String> {
    match index {
        Value::Int(i) => usize::try_from(*i)
            .ok()
            .filter(|i| *i < items.len())
            .ok_or_else(|| format!("index {i} out of bounds for tuple of {}", items.len())),
        other => Err(format!("tuple index must be Int, got {}", other.class_name())),
    }
}

fn tuple_method(method: &str, args: &[Value]) -> Option<NativeResult> {
    if method == "of" {
        return Some(Ok(Value::tuple(args.to_vec())));
    }
    let Some(Value::Tuple(items)) = args.first() else {
        return Some(Err(format!("Tuple.{method}() called on a non-tuple")));
    };
    let result = match method {
        "get" => expect_args(method, args, 2).and_then(|()| {
            let items = items.borrow();
            let index = tuple_index(&items, &args[1])?;
            Ok(items[index].clone())
        }),
        "set" => expect_args(method, args, 3).and_then(|()| {
            let mut items = items.borrow_mut();
            let index = tuple_index(&items, &args[1])?;
            items[index] = args[2].clone();
            Ok(Value::Unit)
        }),
        "size$get" => expect_args(method, args, 1).map(|()| Value::Int(items.borrow().len() as i32)),
        "iterator" => expect_args(method, args, 1).map(|()| {
            let iterator = Object::new(Rc::from(TUPLE_ITERATOR_CLASS));
            iterator.set_field(Rc::from("tuple"), args[0].clone());
            iterator.set_field(Rc::from("index"), Value::Int(0));
            Value::Object(Rc::new(iterator))
        }),
        "toString" => expect_args(method, args, 1).map(|()| Value::string(args[0].to_string())),
        _ => return None,
    };
    Some(result)
}

fn tuple_iterator_method(method: &str, args: &[Value]) -> Option<NativeResult> {
    let Some(Value::Object(iterator)) = args.first() else {
        return Some(Err(format!("TupleIterator.{method}() called on a non-iterator")));
    };
    let state = match (iterator.field("tuple"), iterator.field("index")) {
        (Some(Value::Tuple(items)), Some(Value::Int(index))) => Ok((items, index)),
        _ => Err("corrupt tuple iterator".to_string()),
    };
    let result = match method {
        "hasNext" => state.map(|(items, index)| {
            Value::Bool(usize::try_from(index).map_or(false, |i| i < items.borrow().len()))
        }),
        "next" => state.and_then(|(items, index)| {
            let items = items.borrow();
            let position = tuple_index(&items, &Value::Int(index))?;
            iterator.set_field(Rc::from("index"), Value::Int(index + 1));
            Ok(items[position].clone())
        }),
        _ => return None,
    };
    Some(result)
}

fn intrinsics_method(method: &str, args: &[Value]) -> Option<NativeResult> {
    match method {
        "areEqual" => Some(if args.len() == 2 {
            Ok(Value::Bool(args[0].structural_eq(&args[1])))
        } else {
            Err(format!("areEqual() expects 2 arguments, got {}", args.len()))
        }),
        _ => None,
    }
}

fn any_method(method: &str, args: &[Value]) -> Option<NativeResult> {
    let result = match method {
        "equals" => expect_args(method, args, 2).map(|()| Value::Bool(args[0].structural_eq(&args[1]))),
        "toString" => expect_args(method, args, 1).map(|()| Value::string(args[0].to_string())),
        _ => return None,
    };
    Some(result)
}
