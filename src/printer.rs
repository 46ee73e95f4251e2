//! Read-only renderings of the AST.
//!
//! [`AstPrinter`] produces the indented tree used by `--ast`; the `Display`
//! impl on [`Expr`] produces a compact, fully parenthesized form such as
//! `(2 + (3 * 4))`.

use crate::ast::{Expr, LiteralValue, Program, Stmt};
use crate::stack::ensure_sufficient_stack;
use std::fmt::{self, Write};

pub struct AstPrinter {
    output: String,
    indent: usize,
}

impl AstPrinter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn print(program: &Program) -> String {
        let mut printer = Self::new();
        printer.line("(PROGRAM");
        printer.nested(|p| {
            for statement in &program.statements {
                p.statement(statement);
            }
        });
        printer.line(")");
        printer.output
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str("  ");
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        self.indent += 1;
        body(self);
        self.indent -= 1;
    }

    fn null(&mut self) {
        self.line("(null)");
    }

    fn statement(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.statement_inner(stmt))
    }

    fn statement_inner(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr, .. } => self.expression(expr),
            Stmt::Var {
                name, initializer, ..
            } => {
                self.line(&format!("(VAR_DECLARATION {}", name));
                self.nested(|p| p.expression(initializer));
                self.line(")");
            }
            Stmt::Const {
                name, initializer, ..
            } => {
                self.line(&format!("(CONST_DECLARATION {}", name));
                self.nested(|p| p.expression(initializer));
                self.line(")");
            }
            Stmt::Block { statements, .. } => {
                self.line("(BLOCK");
                self.nested(|p| {
                    for statement in statements {
                        p.statement(statement);
                    }
                });
                self.line(")");
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let tag = if else_branch.is_some() { "(IF_ELSE" } else { "(IF" };
                self.line(tag);
                self.nested(|p| {
                    p.expression(condition);
                    p.statement(then_branch);
                    if let Some(else_branch) = else_branch {
                        p.statement(else_branch);
                    }
                });
                self.line(")");
            }
            Stmt::Loop {
                condition, body, ..
            } => {
                self.line("(LOOP");
                self.nested(|p| {
                    match condition {
                        Some(condition) => p.expression(condition),
                        None => p.null(),
                    }
                    p.statement(body);
                });
                self.line(")");
            }
            Stmt::Next { .. } => self.line("(NEXT)"),
            Stmt::Stop { .. } => self.line("(STOP)"),
            Stmt::Function(declaration) => {
                let params: Vec<&str> = declaration
                    .params
                    .iter()
                    .map(|param| param.name.as_str())
                    .collect();
                self.line(&format!(
                    "(FUNCTION_DECLARATION {} ({})",
                    declaration.name,
                    params.join(", ")
                ));
                self.nested(|p| {
                    for statement in &declaration.body {
                        p.statement(statement);
                    }
                });
                self.line(")");
            }
            Stmt::Return { value, .. } => {
                self.line("(RETURN");
                self.nested(|p| match value {
                    Some(value) => p.expression(value),
                    None => p.null(),
                });
                self.line(")");
            }
        }
    }

    fn expression(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.expression_inner(expr))
    }

    fn expression_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { value, .. } => {
                let text = match value {
                    LiteralValue::Number(n) => format!("(NUMBER {})", n),
                    LiteralValue::String(s) => format!("(STRING \"{}\")", s),
                    LiteralValue::Boolean(b) => format!("(BOOLEAN {})", b),
                    LiteralValue::Null => "(NULL)".to_string(),
                };
                self.line(&text);
            }
            Expr::Identifier { name, .. } => self.line(&format!("(IDENTIFIER {})", name)),
            Expr::Assign { target, value, .. } => {
                self.line("(ASSIGNMENT");
                self.nested(|p| {
                    p.expression(target);
                    p.expression(value);
                });
                self.line(")");
            }
            Expr::Binary {
                left,
                operator,
                right,
                ..
            } => {
                self.line(&format!("(BINARY_OP {}", operator.symbol()));
                self.nested(|p| {
                    p.expression(left);
                    p.expression(right);
                });
                self.line(")");
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                self.line(&format!("(BINARY_OP {}", operator.symbol()));
                self.nested(|p| {
                    p.expression(left);
                    p.expression(right);
                });
                self.line(")");
            }
            Expr::Unary {
                operator, operand, ..
            } => {
                self.line(&format!("(UNARY_OP {}", operator.symbol()));
                self.nested(|p| p.expression(operand));
                self.line(")");
            }
            Expr::Call { callee, args, .. } => {
                self.line("(FUNCTION_CALL");
                self.nested(|p| {
                    p.expression(callee);
                    for arg in args {
                        p.expression(arg);
                    }
                });
                self.line(")");
            }
            Expr::Grouping { expr, .. } => self.expression(expr),
            Expr::Array { elements, .. } => {
                self.line("(ARRAY");
                self.nested(|p| {
                    for element in elements {
                        p.expression(element);
                    }
                });
                self.line(")");
            }
            Expr::ArrayAccess { array, index, .. } => {
                self.line("(ARRAY_ACCESS");
                self.nested(|p| {
                    p.expression(array);
                    p.expression(index);
                });
                self.line(")");
            }
            Expr::PropertyAccess {
                object, property, ..
            } => {
                self.line(&format!("(PROPERTY_ACCESS .{}", property));
                self.nested(|p| p.expression(object));
                self.line(")");
            }
        }
    }
}

impl Default for AstPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        ensure_sufficient_stack(|| self.render(f))
    }
}

impl Expr {
    fn render(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => match value {
                LiteralValue::Number(n) => write!(f, "{}", n),
                LiteralValue::String(s) => write!(f, "\"{}\"", s),
                LiteralValue::Boolean(b) => write!(f, "{}", b),
                LiteralValue::Null => f.write_str("null"),
            },
            Expr::Identifier { name, .. } => f.write_str(name),
            Expr::Assign { target, value, .. } => write!(f, "({} = {})", target, value),
            Expr::Binary {
                left,
                operator,
                right,
                ..
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
            Expr::Unary {
                operator, operand, ..
            } => write!(f, "({}{})", operator.symbol(), operand),
            Expr::Call { callee, args, .. } => {
                write!(f, "{}(", callee)?;
                write_list(f, args)?;
                f.write_char(')')
            }
            // Binary forms already carry their own parentheses.
            Expr::Grouping { expr, .. } => write!(f, "{}", expr),
            Expr::Array { elements, .. } => {
                f.write_char('[')?;
                write_list(f, elements)?;
                f.write_char(']')
            }
            Expr::ArrayAccess { array, index, .. } => write!(f, "{}[{}]", array, index),
            Expr::PropertyAccess {
                object, property, ..
            } => write!(f, "{}.{}", object, property),
        }
    }
}

fn write_list(f: &mut fmt::Formatter, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
