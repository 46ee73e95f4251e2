use crate::ast::{BinaryOp, Expr, LiteralValue, LogicalOp, Program, Stmt, UnaryOp};
use crate::environment::{BindingError, Environment};
use crate::error::{ErrorKind, SableError, Span};
use crate::natives::{self, Input, NativeError, Output, SharedStdin};
use crate::stack::ensure_sufficient_stack;
use crate::value::{Function, NativeFunction, Value};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tracing::{debug, trace};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// How a statement finished. Anything other than `Normal` unwinds until a
/// loop (`Stop`, `Next`) or a function call (`Return`) handles it.
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Stop,
    Next,
}

/// One step of an assignment target below its root variable.
enum Accessor {
    Field(String, Span),
    Index(usize, Span),
}

pub struct Evaluator {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    call_depth: usize,
    max_call_depth: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        let output: Output = Rc::new(RefCell::new(io::stdout()));
        let input: Input = Rc::new(RefCell::new(SharedStdin));
        Self::with_io(output, input)
    }

    /// Builds an evaluator whose `print`/`take` use the given sinks.
    pub fn with_io(output: Output, input: Input) -> Self {
        let mut globals = Environment::new();
        natives::install(&mut globals, output, input);
        let globals = Rc::new(RefCell::new(globals));
        let environment = Environment::child_of(&globals);

        Self {
            globals,
            environment,
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Registers an extra intrinsic next to `print` and `take`.
    pub fn define_native(&mut self, native: NativeFunction) -> Result<(), BindingError> {
        let name = native.name.clone();
        self.globals
            .borrow_mut()
            .define(&name, Value::NativeFunction(native), false)
    }

    /// The scope top-level statements run in. It persists across programs.
    pub fn environment(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(&self.environment)
    }

    pub fn globals(&self) -> Rc<RefCell<Environment>> {
        Rc::clone(&self.globals)
    }

    pub fn evaluate_program(&mut self, program: &Program) -> Result<(), SableError> {
        for statement in &program.statements {
            let flow = self.execute_statement(statement).map_err(|error| {
                debug!(kind = ?error.kind, message = %error.message, "evaluation aborted");
                error
            })?;
            if let Some(error) = stray_signal(&flow, statement.span()) {
                return Err(error);
            }
        }
        Ok(())
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Flow, SableError> {
        ensure_sufficient_stack(|| self.execute_statement_inner(stmt))
    }

    fn execute_statement_inner(&mut self, stmt: &Stmt) -> Result<Flow, SableError> {
        match stmt {
            Stmt::Expression { expr, .. } => {
                self.evaluate_expression(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Var {
                name,
                initializer,
                span,
            } => self.declare(name, initializer, false, span),
            Stmt::Const {
                name,
                initializer,
                span,
            } => self.declare(name, initializer, true, span),
            Stmt::Block { statements, .. } => {
                let scope = Environment::child_of(&self.environment);
                self.execute_block(statements, scope)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.condition(condition, "if")? {
                    self.execute_statement(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute_statement(else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Loop {
                condition, body, ..
            } => {
                loop {
                    if let Some(condition) = condition {
                        if !self.condition(condition, "loop")? {
                            break;
                        }
                    }

                    // The body is a block, so every iteration gets a fresh scope.
                    match self.execute_statement(body)? {
                        Flow::Stop => break,
                        Flow::Next | Flow::Normal => {}
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Next { .. } => Ok(Flow::Next),
            Stmt::Stop { .. } => Ok(Flow::Stop),
            Stmt::Function(declaration) => {
                let function = Value::Function(Function {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(&self.environment),
                });
                self.environment
                    .borrow_mut()
                    .define(&declaration.name, function, false)
                    .map_err(|error| binding_error(&declaration.span, error))?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate_expression(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    fn declare(
        &mut self,
        name: &str,
        initializer: &Expr,
        constant: bool,
        span: &Span,
    ) -> Result<Flow, SableError> {
        let value = self.evaluate_expression(initializer)?;
        self.environment
            .borrow_mut()
            .define(name, value, constant)
            .map_err(|error| binding_error(span, error))?;
        Ok(Flow::Normal)
    }

    /// Runs `statements` in `scope`, restoring the current scope afterwards
    /// whether or not they succeed.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        scope: Rc<RefCell<Environment>>,
    ) -> Result<Flow, SableError> {
        trace!(statements = statements.len(), "enter scope");
        let previous = std::mem::replace(&mut self.environment, scope);

        let result = (|| -> Result<Flow, SableError> {
            for statement in statements {
                match self.execute_statement(statement)? {
                    Flow::Normal => {}
                    signal => return Ok(signal),
                }
            }
            Ok(Flow::Normal)
        })();

        self.environment = previous;
        result
    }

    fn condition(&mut self, expr: &Expr, construct: &str) -> Result<bool, SableError> {
        match self.evaluate_expression(expr)? {
            Value::Boolean(b) => Ok(b),
            other => Err(SableError::new_with_help(
                ErrorKind::Type,
                *expr.span(),
                format!("{} condition must be a boolean, got {}", construct, other.type_name()),
                "Conditions are not coerced; compare explicitly, e.g. (x != 0).".to_string(),
            )),
        }
    }

    pub fn evaluate_expression(&mut self, expr: &Expr) -> Result<Value, SableError> {
        ensure_sufficient_stack(|| self.evaluate_expression_inner(expr))
    }

    fn evaluate_expression_inner(&mut self, expr: &Expr) -> Result<Value, SableError> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::String(s) => Value::String(s.clone()),
                LiteralValue::Boolean(b) => Value::Boolean(*b),
                LiteralValue::Null => Value::Null,
            }),
            Expr::Identifier { name, span } => self
                .environment
                .borrow()
                .get(name)
                .map_err(|error| binding_error(span, error)),
            Expr::Assign { target, value, .. } => {
                let value = self.evaluate_expression(value)?;
                self.assign_to(target, value.clone())?;
                Ok(value)
            }
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let left_val = self.evaluate_expression(left)?;
                let right_val = self.evaluate_expression(right)?;
                evaluate_binary_op(*operator, left_val, right_val, span)
            }
            Expr::Unary {
                operator,
                operand,
                span,
            } => {
                let operand_val = self.evaluate_expression(operand)?;
                evaluate_unary_op(*operator, operand_val, span)
            }
            Expr::Logical {
                left,
                operator,
                right,
                ..
            } => {
                let left_val = self.logical_operand(left, *operator)?;

                // The right operand only runs when the left one does not decide the result.
                match (operator, left_val) {
                    (LogicalOp::And, false) => Ok(Value::Boolean(false)),
                    (LogicalOp::Or, true) => Ok(Value::Boolean(true)),
                    _ => Ok(Value::Boolean(self.logical_operand(right, *operator)?)),
                }
            }
            Expr::Call { callee, args, span } => {
                let function_value = self.evaluate_expression(callee)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.evaluate_expression(arg)?);
                }
                self.call_value(function_value, arg_values, span)
            }
            Expr::Grouping { expr, .. } => self.evaluate_expression(expr),
            Expr::Array { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate_expression(element)?);
                }
                Ok(Value::Array(values))
            }
            Expr::ArrayAccess { array, index, span } => {
                let container = self.evaluate_expression(array)?;
                let index_value = self.evaluate_expression(index)?;
                match container {
                    Value::Array(elements) => {
                        let i = to_index(&index_value, span)?;
                        elements
                            .get(i)
                            .cloned()
                            .ok_or_else(|| out_of_bounds(i, elements.len(), span))
                    }
                    Value::String(text) => {
                        let i = to_index(&index_value, span)?;
                        let count = text.chars().count();
                        text.chars()
                            .nth(i)
                            .map(|c| Value::String(c.to_string()))
                            .ok_or_else(|| out_of_bounds(i, count, span))
                    }
                    other => Err(SableError::type_error(
                        *span,
                        format!("Cannot index into {}", other.type_name()),
                    )),
                }
            }
            Expr::PropertyAccess {
                object,
                property,
                span,
            } => match self.evaluate_expression(object)? {
                Value::Struct(record) => record.get(property).cloned().ok_or_else(|| {
                    SableError::binding_error(
                        *span,
                        format!("Struct '{}' has no field '{}'", record.name, property),
                    )
                }),
                other => Err(SableError::type_error(
                    *span,
                    format!("Property access not supported for {}", other.type_name()),
                )),
            },
        }
    }

    fn logical_operand(&mut self, expr: &Expr, operator: LogicalOp) -> Result<bool, SableError> {
        match self.evaluate_expression(expr)? {
            Value::Boolean(b) => Ok(b),
            other => Err(SableError::type_error(
                *expr.span(),
                format!(
                    "Operands of '{}' must be booleans, got {}",
                    operator.symbol(),
                    other.type_name()
                ),
            )),
        }
    }

    fn assign_to(&mut self, target: &Expr, value: Value) -> Result<(), SableError> {
        if let Expr::Identifier { name, span } = target {
            return self
                .environment
                .borrow_mut()
                .assign(name, value)
                .map_err(|error| binding_error(span, error));
        }

        let mut path = Vec::new();
        let (root_name, root_span) = self.assignment_path(target, &mut path)?;

        let mut root = self
            .environment
            .borrow()
            .get(&root_name)
            .map_err(|error| binding_error(&root_span, error))?;
        if self.environment.borrow().is_constant(&root_name) == Some(true) {
            return Err(binding_error(
                &root_span,
                BindingError::ConstantReassignment(root_name),
            ));
        }

        set_path(&mut root, &path, value)?;
        self.environment
            .borrow_mut()
            .assign(&root_name, root)
            .map_err(|error| binding_error(&root_span, error))
    }

    /// Flattens `a.b[i].c` into its root name and the accessors below it,
    /// evaluating index expressions left to right.
    fn assignment_path(
        &mut self,
        target: &Expr,
        path: &mut Vec<Accessor>,
    ) -> Result<(String, Span), SableError> {
        match target {
            Expr::Identifier { name, span } => Ok((name.clone(), *span)),
            Expr::PropertyAccess {
                object,
                property,
                span,
            } => {
                let root = self.assignment_path(object, path)?;
                path.push(Accessor::Field(property.clone(), *span));
                Ok(root)
            }
            Expr::ArrayAccess { array, index, span } => {
                let root = self.assignment_path(array, path)?;
                let index_value = self.evaluate_expression(index)?;
                path.push(Accessor::Index(to_index(&index_value, span)?, *span));
                Ok(root)
            }
            other => Err(SableError::runtime_error(
                *other.span(),
                "Invalid assignment target".to_string(),
            )),
        }
    }

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        span: &Span,
    ) -> Result<Value, SableError> {
        match callee {
            Value::Function(function) => self.call_function(&function, args, span),
            Value::NativeFunction(native) => {
                if let Some(arity) = native.arity {
                    if args.len() != arity {
                        return Err(SableError::arity_error(
                            *span,
                            format!(
                                "{}() expects {} argument(s), got {}",
                                native.name,
                                arity,
                                args.len()
                            ),
                        ));
                    }
                }
                trace!(name = %native.name, args = args.len(), "native call");
                native.call(&args).map_err(|error| match error {
                    NativeError::Type(message) => SableError::type_error(*span, message),
                    NativeError::Io(_) => SableError::runtime_error(
                        *span,
                        format!("{}() failed: {}", native.name, error),
                    ),
                })
            }
            other => Err(SableError::new_with_help(
                ErrorKind::Type,
                *span,
                format!("Cannot call a value of type {}", other.type_name()),
                "Only functions and native functions can be called.".to_string(),
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Value>,
        span: &Span,
    ) -> Result<Value, SableError> {
        let declaration = &function.declaration;
        if args.len() != declaration.arity() {
            return Err(SableError::arity_error(
                *span,
                format!(
                    "Function '{}' expects {} argument(s), got {}",
                    declaration.name,
                    declaration.arity(),
                    args.len()
                ),
            ));
        }
        if self.call_depth >= self.max_call_depth {
            return Err(SableError::resource_error(
                *span,
                format!("Maximum call depth of {} exceeded", self.max_call_depth),
            ));
        }

        let frame = Environment::child_of(&function.closure);
        {
            let mut scope = frame.borrow_mut();
            for (param, arg) in declaration.params.iter().zip(args) {
                scope
                    .define(&param.name, arg, false)
                    .map_err(|error| binding_error(&param.span, error))?;
            }
        }

        self.call_depth += 1;
        trace!(name = %declaration.name, depth = self.call_depth, "call");
        let result = self.execute_block(&declaration.body, frame);
        self.call_depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
            flow => Err(stray_signal(&flow, &declaration.span).unwrap_or_else(|| {
                SableError::runtime_error(declaration.span, "Unexpected control flow".to_string())
            })),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn binding_error(span: &Span, error: BindingError) -> SableError {
    let help = match error {
        BindingError::Undefined(_) => "Declare it first with 'let' or 'const'.",
        BindingError::ConstantReassignment(_) => {
            "Constants cannot change; declare it with 'let' to allow reassignment."
        }
        BindingError::ConstantRedefinition(_) => "Pick a different name or use an inner block.",
    };
    SableError::new_with_help(
        ErrorKind::Binding,
        *span,
        error.to_string(),
        help.to_string(),
    )
}

/// A `return`, `stop` or `next` that escaped the construct meant to catch it.
fn stray_signal(flow: &Flow, span: &Span) -> Option<SableError> {
    let keyword = match flow {
        Flow::Normal => return None,
        Flow::Return(_) => "return",
        Flow::Stop => "stop",
        Flow::Next => "next",
    };
    Some(SableError::runtime_error(
        *span,
        format!("'{}' escaped its enclosing construct", keyword),
    ))
}

fn to_index(value: &Value, span: &Span) -> Result<usize, SableError> {
    match value {
        Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
        Value::Number(n) => Err(SableError::runtime_error(
            *span,
            format!("Index must be a non-negative whole number, got {}", n),
        )),
        other => Err(SableError::type_error(
            *span,
            format!("Index must be a number, got {}", other.type_name()),
        )),
    }
}

fn out_of_bounds(index: usize, len: usize, span: &Span) -> SableError {
    SableError::runtime_error(
        *span,
        format!("Index {} out of bounds for length {}", index, len),
    )
}

fn set_path(slot: &mut Value, path: &[Accessor], value: Value) -> Result<(), SableError> {
    let (accessor, rest) = match path.split_first() {
        Some(split) => split,
        None => {
            *slot = value;
            return Ok(());
        }
    };

    match accessor {
        Accessor::Field(name, span) => match slot {
            Value::Struct(record) => {
                if rest.is_empty() {
                    record.set(name, value);
                    return Ok(());
                }
                let struct_name = record.name.clone();
                let child = record.get_mut(name).ok_or_else(|| {
                    SableError::binding_error(
                        *span,
                        format!("Struct '{}' has no field '{}'", struct_name, name),
                    )
                })?;
                set_path(child, rest, value)
            }
            other => Err(SableError::type_error(
                *span,
                format!("Cannot set property '{}' on {}", name, other.type_name()),
            )),
        },
        Accessor::Index(index, span) => match slot {
            Value::Array(elements) => {
                let len = elements.len();
                let child = elements
                    .get_mut(*index)
                    .ok_or_else(|| out_of_bounds(*index, len, span))?;
                set_path(child, rest, value)
            }
            other => Err(SableError::type_error(
                *span,
                format!("Cannot assign by index into {}", other.type_name()),
            )),
        },
    }
}

fn numeric_operands(
    operator: BinaryOp,
    left: Value,
    right: Value,
    span: &Span,
) -> Result<(f64, f64), SableError> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok((l, r)),
        (l, r) => Err(SableError::type_error(
            *span,
            format!(
                "Operator '{}' cannot be applied to {} and {}",
                operator.symbol(),
                l.type_name(),
                r.type_name()
            ),
        )),
    }
}

fn evaluate_binary_op(
    operator: BinaryOp,
    left: Value,
    right: Value,
    span: &Span,
) -> Result<Value, SableError> {
    match operator {
        BinaryOp::Equal => return Ok(Value::Boolean(left == right)),
        BinaryOp::NotEqual => return Ok(Value::Boolean(left != right)),
        _ => {}
    }

    let (l, r) = numeric_operands(operator, left, right, span)?;
    let value = match operator {
        BinaryOp::Add => Value::Number(l + r),
        BinaryOp::Subtract => Value::Number(l - r),
        BinaryOp::Multiply => Value::Number(l * r),
        BinaryOp::Divide => {
            if r == 0.0 {
                return Err(SableError::runtime_error_with_help(
                    *span,
                    "Division by zero".to_string(),
                    "Check the divisor before dividing, e.g. if (d != 0) { ... }".to_string(),
                ));
            }
            Value::Number(l / r)
        }
        BinaryOp::Greater => Value::Boolean(l > r),
        BinaryOp::GreaterEqual => Value::Boolean(l >= r),
        BinaryOp::Less => Value::Boolean(l < r),
        BinaryOp::LessEqual => Value::Boolean(l <= r),
        BinaryOp::Equal | BinaryOp::NotEqual => unreachable!(),
    };
    Ok(value)
}

fn evaluate_unary_op(operator: UnaryOp, operand: Value, span: &Span) -> Result<Value, SableError> {
    match (operator, operand) {
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (operator, operand) => Err(SableError::type_error(
            *span,
            format!(
                "Operator '{}' cannot be applied to {}",
                operator.symbol(),
                operand.type_name()
            ),
        )),
    }
}
