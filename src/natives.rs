//! Host intrinsics bound in the outermost scope.
//!
//! `print` and `take` talk to whatever sinks the host hands in, so tests and
//! embedders can swap stdout/stdin for buffers.

use crate::environment::Environment;
use crate::value::{NativeFunction, StructValue, Value};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("{0}")]
    Type(String),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Where `take` gets its lines from.
pub trait LineSource {
    /// Appends one line (including its terminator) to `buf`; `Ok(0)` at end of input.
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize>;
}

impl<T: BufRead> LineSource for T {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        BufRead::read_line(self, buf)
    }
}

/// Reads through the process-wide stdin buffer, so lines `take` leaves
/// unread are still there for whoever reads stdin next.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedStdin;

impl LineSource for SharedStdin {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        io::stdin().read_line(buf)
    }
}

pub type Output = Rc<RefCell<dyn Write>>;
pub type Input = Rc<RefCell<dyn LineSource>>;

pub fn install(globals: &mut Environment, output: Output, input: Input) {
    let natives = [
        print(Rc::clone(&output)),
        take(output, input),
        NativeFunction::new("len", Some(1), len),
        NativeFunction::new("type", Some(1), |args| {
            let [value] = arguments::<1>("type", args)?;
            Ok(Value::String(value.type_name().to_string()))
        }),
        NativeFunction::new("struct", Some(1), new_struct),
        NativeFunction::new("push", Some(2), push),
    ];

    for native in natives {
        let name = native.name.clone();
        if let Err(error) = globals.define(&name, Value::NativeFunction(native), false) {
            warn!(%error, "skipping intrinsic '{}'", name);
        }
    }
}

/// Checks the argument count for callers that bypass the evaluator's arity check.
fn arguments<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<&'a [Value; N], NativeError> {
    args.try_into().map_err(|_| {
        NativeError::Type(format!(
            "{}() expects {} argument(s), got {}",
            name,
            N,
            args.len()
        ))
    })
}

fn print(output: Output) -> NativeFunction {
    NativeFunction::new("print", None, move |args| {
        let line = args
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let mut out = output.borrow_mut();
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(Value::Null)
    })
}

fn take(output: Output, input: Input) -> NativeFunction {
    NativeFunction::new("take", None, move |args| {
        match args {
            [] => {}
            [prompt] => {
                let mut out = output.borrow_mut();
                write!(out, "{}", prompt)?;
                out.flush()?;
            }
            _ => {
                return Err(NativeError::Type(format!(
                    "take() accepts at most 1 argument, got {}",
                    args.len()
                )))
            }
        }

        let mut line = String::new();
        if input.borrow_mut().read_line(&mut line)? == 0 {
            return Ok(Value::Null);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        Ok(Value::String(trimmed.to_string()))
    })
}

fn len(args: &[Value]) -> Result<Value, NativeError> {
    match arguments::<1>("len", args)? {
        [Value::String(s)] => Ok(Value::Number(s.chars().count() as f64)),
        [Value::Array(elements)] => Ok(Value::Number(elements.len() as f64)),
        [Value::Struct(record)] => Ok(Value::Number(record.fields.len() as f64)),
        [other] => Err(NativeError::Type(format!(
            "len() not supported for {}",
            other.type_name()
        ))),
    }
}

fn new_struct(args: &[Value]) -> Result<Value, NativeError> {
    match arguments::<1>("struct", args)? {
        [Value::String(name)] => Ok(Value::Struct(StructValue::new(name.as_str()))),
        [other] => Err(NativeError::Type(format!(
            "struct() expects a name string, got {}",
            other.type_name()
        ))),
    }
}

fn push(args: &[Value]) -> Result<Value, NativeError> {
    match arguments::<2>("push", args)? {
        [Value::Array(elements), value] => {
            let mut elements = elements.clone();
            elements.push(value.clone());
            Ok(Value::Array(elements))
        }
        [other, _] => Err(NativeError::Type(format!(
            "push() expects an array, got {}",
            other.type_name()
        ))),
    }
}
