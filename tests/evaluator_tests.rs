use pretty_assertions::assert_eq;
use sable::error::{ErrorKind, SableError};
use sable::environment::Environment;
use sable::evaluator::{Evaluator, DEFAULT_MAX_CALL_DEPTH};
use sable::natives::{self, Input, NativeError, Output};
use sable::value::{NativeFunction, Value};
use sable::interpret;
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

/// An evaluator whose `print` writes into a buffer and whose `take` reads `input`.
struct Session {
    evaluator: Evaluator,
    output: Rc<RefCell<Vec<u8>>>,
}

impl Session {
    fn new() -> Self {
        Self::with_input("")
    }

    fn with_input(input: &str) -> Self {
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink: Output = output.clone();
        let source: Input = Rc::new(RefCell::new(Cursor::new(input.as_bytes().to_vec())));
        Self {
            evaluator: Evaluator::with_io(sink, source),
            output,
        }
    }

    fn run(&mut self, source: &str) -> Result<(), SableError> {
        interpret(source, &mut self.evaluator)
    }

    fn output(&self) -> String {
        String::from_utf8(self.output.borrow().clone()).unwrap()
    }
}

fn output_of(source: &str) -> String {
    let mut session = Session::new();
    if let Err(error) = session.run(source) {
        panic!("program failed: {}", error);
    }
    session.output()
}

fn error_of(source: &str) -> SableError {
    let mut session = Session::new();
    session.run(source).expect_err("program should fail")
}

#[test]
fn declarations_and_constants() {
    let mut session = Session::new();
    session
        .run("let x = 5;\nconst y = 10;\nlet sum = x + y;\nprint(sum);")
        .unwrap();
    assert_eq!(session.output(), "15\n");

    let error = session.run("y = 1").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Cannot assign to constant 'y'");

    // The failed assignment left everything as it was.
    session.run("x = x + 1; print(x, y);").unwrap();
    assert_eq!(session.output(), "15\n6 10\n");
}

#[test]
fn blocks_scope_their_declarations() {
    assert_eq!(
        output_of("let x = 1; if (true) { let x = 2; print(x); } print(x);"),
        "2\n1\n"
    );
    assert_eq!(
        output_of("let x = 1; { x = 3; } print(x);"),
        "3\n"
    );

    let error = error_of("{ let inner = 1; } print(inner);");
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Undefined variable 'inner'");
}

#[test]
fn else_if_chains_pick_one_branch() {
    let program = "
        function grade(n) {
            if (n > 90) { return \"a\"; }
            else if (n > 80) { return \"b\"; }
            else { return \"c\"; }
        }
        print(grade(95), grade(85), grade(10));
    ";
    assert_eq!(output_of(program), "a b c\n");
}

#[test]
fn loops() {
    assert_eq!(
        output_of("let i = 0; loop (i > 0) { print(i); } print(\"done\");"),
        "done\n"
    );
    assert_eq!(
        output_of("let i = 0; loop (i < 3) { print(i); i = i + 1; }"),
        "0\n1\n2\n"
    );
    assert_eq!(
        output_of(
            "let i = 0; let sum = 0;
             loop (i < 5) { i = i + 1; if (i == 3) { next; } sum = sum + i; }
             print(sum);"
        ),
        "12\n"
    );
    assert_eq!(
        output_of("let n = 0; loop () { n = n + 1; if (n == 4) { stop; } } print(n);"),
        "4\n"
    );
}

#[test]
fn stop_only_leaves_the_innermost_loop() {
    let program = "
        let outer = 0; let total = 0;
        loop (outer < 3) {
            outer = outer + 1;
            let inner = 0;
            loop () { inner = inner + 1; if (inner == 2) { stop; } total = total + 1; }
        }
        print(outer, total);
    ";
    assert_eq!(output_of(program), "3 3\n");
}

#[test]
fn constants_in_a_loop_body_are_fresh_each_iteration() {
    assert_eq!(
        output_of("let i = 0; loop (i < 3) { const sq = i * i; print(sq); i = i + 1; }"),
        "0\n1\n4\n"
    );
}

#[test]
fn functions_and_returns() {
    assert_eq!(
        output_of("function add(a, b) { return a + b; } print(add(2, 3));"),
        "5\n"
    );
    assert_eq!(
        output_of("function f() { let x = 1; } print(f());"),
        "null\n"
    );
    assert_eq!(
        output_of("function g() { return; } print(g());"),
        "null\n"
    );
    assert_eq!(
        output_of(
            "function find() { let i = 0; loop () { i = i + 1; if (i == 3) { return i; } } }
             print(find());"
        ),
        "3\n"
    );
}

#[test]
fn arity_is_checked() {
    let error = error_of("function add(a, b) { return a + b; } add(1);");
    assert_eq!(error.kind, ErrorKind::Arity);
    assert_eq!(error.message, "Function 'add' expects 2 argument(s), got 1");

    let error = error_of("len(1, 2);");
    assert_eq!(error.kind, ErrorKind::Arity);
    assert_eq!(error.message, "len() expects 1 argument(s), got 2");
}

#[test]
fn closures_keep_their_own_state() {
    let program = "
        function makeCounter() {
            let count = 0;
            function increment() { count = count + 1; return count; }
            return increment;
        }
        const c = makeCounter();
        print(c());
        print(c());
        const d = makeCounter();
        print(d());
        print(c());
    ";
    assert_eq!(output_of(program), "1\n2\n1\n3\n");
}

#[test]
fn recursion() {
    assert_eq!(
        output_of(
            "function fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }
             print(fib(10));"
        ),
        "55\n"
    );
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let output: Output = Rc::new(RefCell::new(Vec::new()));
    let input: Input = Rc::new(RefCell::new(Cursor::new(Vec::new())));
    let mut evaluator = Evaluator::with_io(output, input).with_max_call_depth(50);

    let error = interpret("function r(n) { return r(n + 1); } r(0);", &mut evaluator)
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::Resource);
    assert_eq!(error.message, "Maximum call depth of 50 exceeded");

    // The evaluator is usable again afterwards.
    interpret("function ok() { return 1; } ok();", &mut evaluator).unwrap();
}

#[test]
fn arithmetic_follows_precedence() {
    assert_eq!(output_of("print(3.5 * (5.75 + 4));"), "34.125\n");
    assert_eq!(output_of("print(2 + 3 * 4, 10 - 4 - 3, 7 / 2, -2 * 3);"), "14 3 3.5 -6\n");
}

#[test]
fn division_by_zero() {
    let error = error_of("let z = 0; print(1 / z);");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.message, "Division by zero");
}

#[test]
fn constant_rules() {
    let error = error_of("const a = 1; const a = 2;");
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Constant 'a' is already defined in this scope");

    let error = error_of("const a = 1; let a = 2;");
    assert_eq!(error.kind, ErrorKind::Binding);

    assert_eq!(
        output_of("const a = 1; { let a = 2; print(a); } print(a);"),
        "2\n1\n"
    );
    assert_eq!(output_of("let b = 1; let b = 2; print(b);"), "2\n");
}

#[test]
fn undefined_variable_points_at_the_use() {
    let error = error_of("let a = 1;\nprint(  b);");
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Undefined variable 'b'");
    assert_eq!((error.line(), error.column()), (2, 9));

    let error = error_of("nope = 3;");
    assert_eq!(error.kind, ErrorKind::Binding);
}

#[test]
fn operands_are_type_checked() {
    let error = error_of("1 + \"a\";");
    assert_eq!(error.kind, ErrorKind::Type);
    assert_eq!(error.message, "Operator '+' cannot be applied to number and string");

    for source in [
        "if (1) { }",
        "loop (null) { }",
        "!5;",
        "-true;",
        "true && 1;",
        "\"a\" < \"b\";",
        "let x = 1; x();",
        "let n = 5; n[0];",
        "let n = 5; n.field;",
    ] {
        assert_eq!(error_of(source).kind, ErrorKind::Type, "{}", source);
    }
}

#[test]
fn equality_never_coerces() {
    assert_eq!(
        output_of("print(1 == \"1\", null == null, [1, 2] == [1, 2], 1 != 2, 0 == false);"),
        "false true true true false\n"
    );
    assert_eq!(
        output_of(
            "function f() { } function g() { }
             let h = f;
             print(f == h, f == g);"
        ),
        "true false\n"
    );
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(
        output_of("print(false && missing, true || missing);"),
        "false true\n"
    );
    assert_eq!(
        output_of(
            "let calls = 0;
             function touch() { calls = calls + 1; return true; }
             let r = true && touch();
             r = false || touch();
             print(calls, r);"
        ),
        "2 true\n"
    );
}

#[test]
fn arrays() {
    assert_eq!(
        output_of("let a = [1, [2, 3]]; a[1][0] = 9; print(a); print(a[1][0]);"),
        "[1, [9, 3]]\n9\n"
    );
    // Arrays are copied on assignment.
    assert_eq!(
        output_of("let a = [1, 2]; let b = a; b[0] = 5; print(a[0], b[0]);"),
        "1 5\n"
    );
    assert_eq!(
        output_of("let a = [1]; let b = push(a, \"x\"); print(a, b, len(b));"),
        "[1] [1, \"x\"] 2\n"
    );

    let error = error_of("let a = [1]; print(a[3]);");
    assert_eq!(error.kind, ErrorKind::Runtime);
    assert_eq!(error.message, "Index 3 out of bounds for length 1");

    assert_eq!(error_of("let a = [1]; a[1.5];").kind, ErrorKind::Runtime);
    assert_eq!(error_of("let a = [1]; a[\"0\"];").kind, ErrorKind::Type);
}

#[test]
fn strings_index_by_character() {
    assert_eq!(
        output_of("let s = \"hey\"; print(s[1], len(s), type(s[0]));"),
        "e 3 string\n"
    );
    assert_eq!(
        error_of("let s = \"hey\"; s[0] = \"H\";").kind,
        ErrorKind::Type
    );
}

#[test]
fn structs() {
    assert_eq!(
        output_of(
            "let p = struct(\"Point\"); p.x = 5; p.y = 2; print(p); print(p.x + p.y, type(p));"
        ),
        "Point { x: 5, y: 2 }\n7 struct\n"
    );
    assert_eq!(output_of("print(struct(\"Empty\"));"), "Empty {}\n");
    assert_eq!(
        output_of(
            "let p = struct(\"Point\"); p.x = 5;
             let l = struct(\"Line\"); l.start = p; l.start.x = 1;
             print(l.start.x, p.x);"
        ),
        "1 5\n"
    );
    assert_eq!(
        output_of("let t = struct(\"T\"); t.name = \"n\"; t.items = [1]; t.items[0] = 2; print(t);"),
        "T { name: \"n\", items: [2] }\n"
    );

    let error = error_of("let p = struct(\"Point\"); print(p.z);");
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Struct 'Point' has no field 'z'");

    let error = error_of("const q = struct(\"Q\"); q.a = 1;");
    assert_eq!(error.kind, ErrorKind::Binding);
    assert_eq!(error.message, "Cannot assign to constant 'q'");
}

#[test]
fn print_renders_values() {
    assert_eq!(
        output_of("function f() { } print(f, print, null, true, \"plain\", 2.50);"),
        "<function f> <native print> null true plain 2.5\n"
    );
    assert_eq!(output_of("print();"), "\n");
}

#[test]
fn take_reads_lines_until_end_of_input() {
    let mut session = Session::with_input("alice\nbob\n");
    session
        .run("let a = take(\"name? \"); let b = take(); let c = take(); print(a, b, c);")
        .unwrap();
    assert_eq!(session.output(), "name? alice bob null\n");
}

#[test]
fn host_natives_can_be_added() {
    let mut session = Session::new();
    session
        .evaluator
        .define_native(NativeFunction::new("double", Some(1), |args| match &args[0] {
            Value::Number(n) => Ok(Value::Number(n * 2.0)),
            other => Err(NativeError::Type(format!(
                "double() expects a number, got {}",
                other.type_name()
            ))),
        }))
        .unwrap();

    session.run("print(double(21));").unwrap();
    assert_eq!(session.output(), "42\n");

    let error = session.run("double(\"x\");").unwrap_err();
    assert_eq!(error.kind, ErrorKind::Type);
    assert_eq!(error.message, "double() expects a number, got string");
}

#[test]
fn state_persists_between_programs() {
    let mut session = Session::new();
    session.run("let x = 1; function bump() { x = x + 1; }").unwrap();
    session.run("bump(); bump();").unwrap();
    session.run("print(x);").unwrap();
    assert_eq!(session.output(), "3\n");
}

#[test]
fn failed_block_restores_the_scope() {
    let mut session = Session::new();
    assert!(session.run("{ let inner = 1; missing; }").is_err());
    assert_eq!(
        session.run("print(inner);").unwrap_err().kind,
        ErrorKind::Binding
    );
    session.run("let ok = 2; print(ok);").unwrap();
    assert_eq!(session.output(), "2\n");
}

#[test]
fn assignment_is_an_expression() {
    assert_eq!(
        output_of("let a = 0; let b = 0; a = b = 4; print(a, b, (a = 7));"),
        "4 4 7\n"
    );
}

#[test]
fn program_scope_can_be_inspected() {
    let mut session = Session::new();
    session
        .run("let x = 5; const y = 10; let sum = x + y;")
        .unwrap();

    let scope = session.evaluator.environment();
    let scope = scope.borrow();
    assert_eq!(scope.get("x"), Ok(Value::Number(5.0)));
    assert_eq!(scope.get("sum"), Ok(Value::Number(15.0)));
    assert_eq!(scope.is_constant("x"), Some(false));
    assert_eq!(scope.is_constant("y"), Some(true));
    assert_eq!(scope.is_constant("sum"), Some(false));
    // Intrinsics live one scope further out.
    assert!(!scope.contains_local("print"));
    assert!(session.evaluator.globals().borrow().contains_local("print"));
}

#[test]
fn branch_bindings_stay_in_the_branch() {
    let mut session = Session::new();
    session
        .run("if (1 > 0) { let r = 1; print(r); } else { let r = 2; print(r); }")
        .unwrap();
    assert_eq!(session.output(), "1\n");
    assert!(session.run("print(r);").is_err());
}

#[test]
fn stop_ends_a_loop_after_one_pass() {
    assert_eq!(
        output_of("let n = 0; loop (true) { n = n + 1; stop; } print(n);"),
        "1\n"
    );
}

#[test]
fn default_depth_limit_holds_for_nested_bodies() {
    let expected = format!("Maximum call depth of {} exceeded", DEFAULT_MAX_CALL_DEPTH);

    let error = error_of("function r(n) { return r(n + 1); } r(0);");
    assert_eq!(error.kind, ErrorKind::Resource);
    assert_eq!(error.message, expected);

    let error = error_of(
        "function r(n) {
             loop (true) { if (true) { { if (true) { { return r(-(-(n + 1))); } } } } }
         }
         r(0);",
    );
    assert_eq!(error.kind, ErrorKind::Resource);
    assert_eq!(error.message, expected);
}

#[test]
fn deeply_nested_source_runs() {
    let depth = 2000;
    let grouped = format!("let x = {}1{}; print(x);", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(output_of(&grouped), "1\n");

    let negated = format!("print({}7);", "-".repeat(depth + 1));
    assert_eq!(output_of(&negated), "-7\n");
}

#[test]
fn natives_reject_missing_arguments_when_called_directly() {
    let session = Session::new();
    let globals = session.evaluator.globals();

    for (name, args) in [
        ("len", vec![]),
        ("type", vec![]),
        ("struct", vec![]),
        ("push", vec![Value::Array(Vec::new())]),
    ] {
        let native = match globals.borrow().get(name) {
            Ok(Value::NativeFunction(native)) => native,
            other => panic!("{} is not a native: {:?}", name, other),
        };
        match native.call(&args) {
            Err(NativeError::Type(message)) => {
                assert!(message.starts_with(&format!("{}() expects", name)), "{}", message)
            }
            other => panic!("{} accepted {} argument(s): {:?}", name, args.len(), other),
        }
    }
}

#[test]
fn installing_natives_keeps_existing_constants() {
    let mut globals = Environment::new();
    globals.define("print", Value::Number(1.0), true).unwrap();

    let output: Output = Rc::new(RefCell::new(Vec::new()));
    let input: Input = Rc::new(RefCell::new(Cursor::new(Vec::new())));
    natives::install(&mut globals, output, input);

    assert_eq!(globals.get("print"), Ok(Value::Number(1.0)));
    assert!(matches!(globals.get("len"), Ok(Value::NativeFunction(_))));
    assert!(matches!(globals.get("take"), Ok(Value::NativeFunction(_))));
}
