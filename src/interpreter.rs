use std::collections::{HashMap, VecDeque};

use crate::{
    error::{LispError, LispResult},
    functions::{self, UserFunction},
    number::Number,
    parser,
    syntax::Value,
};

/// A live session: the partial-input buffer, the queue of parsed forms
/// waiting to run, and the global variable and function tables.
pub struct Interpreter {
    buffer: String,
    queue: VecDeque<Value>,
    exit: bool,
    globals: HashMap<String, Value>,
    functions: HashMap<String, UserFunction>,
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter {
            buffer: String::new(),
            queue: VecDeque::new(),
            exit: false,
            globals: HashMap::from([("PI".to_string(), Value::Number(Number::pi()))]),
            functions: HashMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.exit
    }

    /// Appends input to the buffer, dropping any `;` comment first.
    /// Lines are concatenated with no separator.
    pub fn ingest(&mut self, input: &str) {
        let code = match input.find(';') {
            Some(index) => &input[..index],
            None => input,
        };
        self.buffer.push_str(code);
    }

    /// Parses the buffer and evaluates every complete form in order,
    /// returning their printed results joined with newlines. Errors
    /// become output text; an evaluation error drops the rest of the
    /// queue, a parse error drops the buffer.
    pub fn drain_and_evaluate(&mut self) -> String {
        let mut output = String::new();
        let mut buffer = std::mem::take(&mut self.buffer);
        match parser::process_buffer(&mut buffer) {
            Ok(values) => {
                self.buffer = buffer;
                self.queue.extend(values);
            }
            Err(error) => return error.to_string(),
        }
        while let Some(value) = self.queue.pop_front() {
            if let Value::List(list) = &value {
                let exiting = list
                    .items
                    .first()
                    .is_some_and(|first| first.to_string() == "EXIT");
                if exiting {
                    self.exit = true;
                    self.queue.clear();
                    return output;
                }
            }
            match value.evaluate(self) {
                Ok(result) => {
                    output.push_str(&result.to_string());
                    if !self.queue.is_empty() {
                        output.push('\n');
                    }
                }
                Err(error) => {
                    output.push_str(&error.to_string());
                    self.queue.clear();
                }
            }
        }
        output
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: String, value: Value) {
        self.globals.insert(name, value);
    }

    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn user_function(&self, name: &str) -> Option<UserFunction> {
        self.functions.get(name).cloned()
    }

    pub fn define_function(&mut self, function: UserFunction) {
        self.functions.insert(function.name.clone(), function);
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Value {
    /// Numbers and frozen values are themselves. A symbol is a global
    /// lookup. A list applies its head, and the application's result is
    /// evaluated once more.
    pub fn evaluate(&self, ctx: &mut Interpreter) -> LispResult<Value> {
        match self {
            Value::Number(_) => Ok(self.clone()),
            Value::Symbol(symbol) => {
                if self.is_literal() {
                    Ok(self.clone())
                } else {
                    ctx.global(symbol.name())
                        .cloned()
                        .ok_or_else(|| LispError::UndefinedVariable(symbol.name().to_string()))
                }
            }
            Value::List(list) => {
                if list.literal {
                    Ok(self.clone())
                } else {
                    functions::execute_function(ctx, &list.items)?.evaluate(ctx)
                }
            }
        }
    }
}

#[cfg(test)]
fn run(ctx: &mut Interpreter, line: &str) -> String {
    ctx.ingest(line);
    ctx.drain_and_evaluate()
}

#[test]
fn test_arithmetic_session() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(+ 1 2)"), "3");
    assert_eq!(run(&mut ctx, "(* 3 (+ 1 1))"), "6");
    assert_eq!(run(&mut ctx, "(+ 0.5 0.5)"), "1.0");
    assert_eq!(run(&mut ctx, "007"), "007");
}

#[test]
fn test_literals_idempotent() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "'(1 2 3)"), "(1 2 3)");
    assert_eq!(run(&mut ctx, "(QUOTE X)"), "X");
    assert_eq!(run(&mut ctx, "'X"), "X");
    assert_eq!(run(&mut ctx, "'(A . B)"), "(A . B)");
    assert_eq!(run(&mut ctx, "T"), "T");
    assert_eq!(run(&mut ctx, "NIL"), "NIL");
}

#[test]
fn test_variables() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(SETQ A 1 B 2)"), "2");
    assert_eq!(run(&mut ctx, "(+ A B)"), "3");
    assert_eq!(
        run(&mut ctx, "(SETQ A 1 B)"),
        "SETQ: odd number of arguments: (A 1 B)."
    );
    assert_eq!(run(&mut ctx, "(SETQ)"), "NIL");
    assert_eq!(run(&mut ctx, "(SET 'C 7)"), "7");
    assert_eq!(run(&mut ctx, "C"), "7");
    assert_eq!(run(&mut ctx, "D"), "Variable D is undefined.");
    assert_eq!(run(&mut ctx, "(MAKUNBOUND 'A)"), "A");
    assert_eq!(run(&mut ctx, "(BOUNDP 'A)"), "NIL");
    assert_eq!(run(&mut ctx, "A"), "Variable A is undefined.");
    assert_eq!(run(&mut ctx, "(BOUNDP 'PI)"), "T");
    assert_eq!(run(&mut ctx, "PI"), "3.14159265358979323846");
}

#[test]
fn test_user_functions() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(DEFUN SQUARE (X) (* X X))"), "SQUARE");
    assert_eq!(run(&mut ctx, "(SQUARE 5)"), "25");
    assert_eq!(run(&mut ctx, "(SQUARE (SQUARE 2))"), "16");
    assert_eq!(run(&mut ctx, "(DEFUN IDENT (X) X)"), "IDENT");
    assert_eq!(run(&mut ctx, "(IDENT 9)"), "9");
    assert_eq!(run(&mut ctx, "(DEFUN SEVEN () 7)"), "SEVEN");
    assert_eq!(run(&mut ctx, "(SEVEN)"), "7");
    assert_eq!(
        run(&mut ctx, "(SQUARE 1 2)"),
        "Wrong number of arguments for function SQUARE."
    );
    // A function body can call a function defined later; names resolve
    // at call time.
    assert_eq!(run(&mut ctx, "(DEFUN TWICE (X) (DOUBLE (DOUBLE X)))"), "TWICE");
    assert_eq!(run(&mut ctx, "(DEFUN DOUBLE (X) (* 2 X))"), "DOUBLE");
    assert_eq!(run(&mut ctx, "(TWICE 3)"), "12");
}

#[test]
fn test_recursion() {
    let mut ctx = Interpreter::new();
    run(
        &mut ctx,
        "(DEFUN FACT (N) (IF (< N 2) 1 (* N (FACT (- N 1)))))",
    );
    assert_eq!(run(&mut ctx, "(FACT 5)"), "120");
    assert_eq!(run(&mut ctx, "(FACT 10)"), "3628800");
}

#[test]
fn test_eval() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(SETQ A 5)"), "5");
    assert_eq!(run(&mut ctx, "(EVAL 'A)"), "5");
    assert_eq!(run(&mut ctx, "(EVAL '(+ 1 2))"), "3");
    assert_eq!(run(&mut ctx, "(SETQ FORM '(* 2 3))"), "(* 2 3)");
    assert_eq!(run(&mut ctx, "(EVAL FORM)"), "6");
    assert_eq!(run(&mut ctx, "(EVAL ''A)"), "A");
}

#[test]
fn test_conditionals() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(IF NIL 1 2)"), "2");
    assert_eq!(run(&mut ctx, "(IF 0 1 2)"), "1");
    assert_eq!(run(&mut ctx, "(IF NIL 1)"), "NIL");
    assert_eq!(run(&mut ctx, "(COND (NIL 1) (T 2))"), "2");
    assert_eq!(run(&mut ctx, "(COND ((= 1 1) 'YES))"), "YES");
    assert_eq!(run(&mut ctx, "(COND (NIL 1))"), "NIL");
}

#[test]
fn test_loops() {
    let mut ctx = Interpreter::new();
    run(&mut ctx, "(SETQ S 0)");
    assert_eq!(run(&mut ctx, "(DOTIMES (I 3) (SETQ S (+ S I)))"), "NIL");
    assert_eq!(run(&mut ctx, "S"), "3");
    assert_eq!(run(&mut ctx, "(DOTIMES (I 0 'DONE) NIL)"), "DONE");
    run(&mut ctx, "(SETQ S 0)");
    assert_eq!(run(&mut ctx, "(DOLIST (X '(1 2 3) S) (SETQ S (+ S X)))"), "6");
    // Exactly one body form: nothing more, nothing less.
    assert_eq!(
        run(&mut ctx, "(DOTIMES (I 0 'DONE))"),
        "Wrong number of arguments for function DOTIMES."
    );
    assert_eq!(
        run(&mut ctx, "(DOTIMES (I 2) (SETQ S 0) (SETQ S 1))"),
        "Wrong number of arguments for function DOTIMES."
    );
    assert_eq!(
        run(&mut ctx, "(DOLIST (X '(1)))"),
        "Wrong number of arguments for function DOLIST."
    );
}

#[test]
fn test_error_recovery() {
    let mut ctx = Interpreter::new();
    run(&mut ctx, "(SETQ A 1)");
    assert_eq!(run(&mut ctx, "(/ 1 0)"), "Cannot divide by zero.");
    assert_eq!(run(&mut ctx, ")"), "Unexpected ).");
    assert_eq!(run(&mut ctx, "A"), "1");
}

#[test]
fn test_error_drops_queued_forms() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(/ 1 0) (SETQ A 9)"), "Cannot divide by zero.");
    assert_eq!(run(&mut ctx, "A"), "Variable A is undefined.");
}

#[test]
fn test_multiple_forms() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(+ 1 2) (+ 3 4)"), "3\n7");
}

#[test]
fn test_partial_input() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(+ 1"), "");
    assert_eq!(run(&mut ctx, " 2)"), "3");
}

#[test]
fn test_comments() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(+ 1 2) ; ignored )("), "3");
    assert_eq!(run(&mut ctx, "; only a comment"), "");
}

#[test]
fn test_exit() {
    let mut ctx = Interpreter::new();
    assert!(ctx.is_running());
    assert_eq!(run(&mut ctx, "(EXIT) (+ 1 2)"), "");
    assert!(!ctx.is_running());
}

#[test]
fn test_load_missing_file() {
    let mut ctx = Interpreter::new();
    assert_eq!(run(&mut ctx, "(LOAD 'NO-SUCH-FILE)"), "NIL");
}
