use crate::ast::Program;
use crate::error::SableError;
use crate::evaluator::Evaluator;
use crate::lexer::{Lexer, Token};
use crate::parser::Parser;
use crate::printer::AstPrinter;
use tracing::debug;

/// Optional debug output produced on the way to evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dump_tokens: bool,
    pub dump_ast: bool,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, SableError> {
    Lexer::new(source.to_string()).scan_tokens()
}

pub fn parse(source: &str) -> Result<Program, SableError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse()
}

/// Lexes, parses and evaluates `source` against `evaluator`, stopping at the first error.
pub fn interpret(source: &str, evaluator: &mut Evaluator) -> Result<(), SableError> {
    let program = parse(source)?;
    evaluator.evaluate_program(&program)
}

/// Runs a whole script with a fresh evaluator, reporting any failure.
/// Returns whether the run completed.
pub fn run(source: &str, filename: Option<&str>, options: RunOptions) -> bool {
    let mut evaluator = Evaluator::new();
    run_with(source, filename, options, &mut evaluator)
}

pub fn run_with(
    source: &str,
    filename: Option<&str>,
    options: RunOptions,
    evaluator: &mut Evaluator,
) -> bool {
    debug!(file = filename.unwrap_or("<repl>"), "running source");

    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(error) => {
            error.report(source, filename);
            return false;
        }
    };

    if options.dump_tokens {
        for token in &tokens {
            println!("{:>4}:{:<3} {}", token.line(), token.column(), token);
        }
    }

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(error) => {
            error.report(source, filename);
            return false;
        }
    };

    if options.dump_ast {
        print!("{}", AstPrinter::print(&program));
    }

    match evaluator.evaluate_program(&program) {
        Ok(()) => true,
        Err(error) => {
            error.report(source, filename);
            false
        }
    }
}
