use crate::ast::{Expr, Stmt};
use crate::evaluator::Evaluator;
use crate::natives::{Input, LineSource, Output, SharedStdin};
use crate::runner;
use crate::value::Value;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// Interactive loop on stdin/stdout.
pub fn start(max_call_depth: usize) {
    println!("Sable Interpreter v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let output: Output = Rc::new(RefCell::new(io::stdout()));
    let input: Input = Rc::new(RefCell::new(SharedStdin));
    let mut evaluator = Evaluator::with_io(Rc::clone(&output), Rc::clone(&input))
        .with_max_call_depth(max_call_depth);

    if let Err(error) = run_session(&mut evaluator, &input, &output) {
        eprintln!("Error reading input: {}", error);
    }
}

/// Reads commands from `input` until end of input or `exit`.
///
/// `input` should be the same source the evaluator's `take` reads from, so a
/// line consumed by `take` is never also run as a command. Bindings persist
/// between lines because one evaluator serves the whole session.
pub fn run_session(evaluator: &mut Evaluator, input: &Input, output: &Output) -> io::Result<()> {
    loop {
        {
            let mut out = output.borrow_mut();
            write!(out, "> ")?;
            out.flush()?;
        }

        let mut line = String::new();
        if input.borrow_mut().read_line(&mut line)? == 0 {
            // EOF reached (Ctrl+D or piped input ended)
            writeln!(output.borrow_mut())?;
            return Ok(());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            writeln!(output.borrow_mut(), "Goodbye!")?;
            return Ok(());
        }

        run_repl_command(line, evaluator, output)?;
    }
}

fn run_repl_command(source: &str, evaluator: &mut Evaluator, output: &Output) -> io::Result<()> {
    let program = match runner::parse(source) {
        Ok(program) => program,
        Err(error) => {
            error.report(source, None);
            return Ok(());
        }
    };

    // A lone expression echoes its value, unless it is an assignment or yields null.
    if let [Stmt::Expression { expr, .. }] = program.statements.as_slice() {
        match evaluator.evaluate_expression(expr) {
            Ok(Value::Null) => {}
            Ok(_) if matches!(expr, Expr::Assign { .. }) => {}
            Ok(value) => writeln!(output.borrow_mut(), "{}", value)?,
            Err(error) => error.report(source, None),
        }
        return Ok(());
    }

    if let Err(error) = evaluator.evaluate_program(&program) {
        error.report(source, None);
    }
    Ok(())
}
