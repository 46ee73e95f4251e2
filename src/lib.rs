// Sable Language Interpreter Library
//
// Lexer, parser and tree-walking evaluator for Sable, a small dynamically
// typed scripting language with closures, constants, arrays and structs.

// Public modules
pub mod ast;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod natives;
pub mod parser;
pub mod printer;
pub mod repl;
pub mod runner;
pub mod stack;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use environment::{BindingError, Environment};
pub use error::{ErrorKind, SableError, Span};
pub use evaluator::Evaluator;
pub use lexer::{Lexer, Literal, Token, TokenType};
pub use parser::Parser;
pub use printer::AstPrinter;
pub use value::Value;

// Re-export main functions
pub use repl::start as start_repl;
pub use runner::{interpret, run, RunOptions};
