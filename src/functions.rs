use std::{cmp::Ordering, collections::HashMap, fs};

use enum_map::{Enum, EnumMap};
use lazy_static::lazy_static;
use literally::hmap;
use rand::Rng;

use crate::{
    error::{LispError, LispResult},
    interpreter::Interpreter,
    number::Number,
    syntax::{combine_with_space, List, Value},
};

/// Every built-in function. Name strings exist only at the lookup
/// boundary; past `execute_function` everything dispatches on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Builtin {
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    Defun,
    Quote,
    Set,
    Setq,
    Eval,
    Makunbound,
    Load,
    First,
    Rest,
    Last,
    Length,
    ListLength,
    Append,
    Cons,
    MakeList,
    Reverse,
    Member,
    Remove,
    Subst,
    Null,
    Endp,
    Atom,
    Listp,
    Symbolp,
    Numberp,
    Minusp,
    Plusp,
    Zerop,
    Boundp,
    Eq,
    Eql,
    Equal,
    Not,
    And,
    Or,
    NumEq,
    NumNe,
    Lt,
    Le,
    Gt,
    Ge,
    If,
    Cond,
    Dolist,
    Dotimes,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Mod,
    Abs,
    Round,
    Random,
    Exp,
    Expt,
    Log,
    Min,
    Max,
    Gcd,
}

impl Builtin {
    pub const TEXT: EnumMap<Builtin, &'static str> = EnumMap::from_array([
        "+",
        "-",
        "*",
        "/",
        "1+",
        "1-",
        "DEFUN",
        "QUOTE",
        "SET",
        "SETQ",
        "EVAL",
        "MAKUNBOUND",
        "LOAD",
        "FIRST",
        "REST",
        "LAST",
        "LENGTH",
        "LIST-LENGTH",
        "APPEND",
        "CONS",
        "LIST",
        "REVERSE",
        "MEMBER",
        "REMOVE",
        "SUBST",
        "NULL",
        "ENDP",
        "ATOM",
        "LISTP",
        "SYMBOLP",
        "NUMBERP",
        "MINUSP",
        "PLUSP",
        "ZEROP",
        "BOUNDP",
        "EQ",
        "EQL",
        "EQUAL",
        "NOT",
        "AND",
        "OR",
        "=",
        "/=",
        "<",
        "<=",
        ">",
        ">=",
        "IF",
        "COND",
        "DOLIST",
        "DOTIMES",
        "SQRT",
        "SIN",
        "COS",
        "TAN",
        "ASIN",
        "ACOS",
        "ATAN",
        "MOD",
        "ABS",
        "ROUND",
        "RANDOM",
        "EXP",
        "EXPT",
        "LOG",
        "MIN",
        "MAX",
        "GCD",
    ]);
}

/// Argument kind expected by a fixed-signature builtin, checked against
/// the evaluated argument.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Any,
    List,
    Number,
    Symbol,
}

const ANY1: &[Kind] = &[Kind::Any];
const ANY_ANY: &[Kind] = &[Kind::Any, Kind::Any];
const ANY_LIST: &[Kind] = &[Kind::Any, Kind::List];
const ANY_ANY_LIST: &[Kind] = &[Kind::Any, Kind::Any, Kind::List];
const NUM: &[Kind] = &[Kind::Number];
const NUM_NUM: &[Kind] = &[Kind::Number, Kind::Number];
const LIST1: &[Kind] = &[Kind::List];
const SYM: &[Kind] = &[Kind::Symbol];
const SYM_ANY: &[Kind] = &[Kind::Symbol, Kind::Any];

lazy_static! {
    pub(crate) static ref BUILTINS: HashMap<&'static str, Builtin> = Builtin::TEXT
        .iter()
        .map(|(builtin, &text)| (text, builtin))
        .collect();

    /// Builtins with a fixed arity whose arguments are evaluated and
    /// kind-checked up front. Builtins absent here manage their own
    /// arguments (variadic, lazy, or unevaluated).
    static ref SIGNATURES: HashMap<Builtin, &'static [Kind]> = hmap! {
        Builtin::Add => NUM_NUM,
        Builtin::Sub => NUM_NUM,
        Builtin::Mul => NUM_NUM,
        Builtin::Div => NUM_NUM,
        Builtin::Inc => NUM,
        Builtin::Dec => NUM,
        Builtin::Set => SYM_ANY,
        Builtin::Makunbound => SYM,
        Builtin::Load => SYM,
        Builtin::First => LIST1,
        Builtin::Rest => LIST1,
        Builtin::Last => LIST1,
        Builtin::Length => LIST1,
        Builtin::ListLength => LIST1,
        Builtin::Cons => ANY_ANY,
        Builtin::MakeList => ANY1,
        Builtin::Reverse => LIST1,
        Builtin::Member => ANY_LIST,
        Builtin::Remove => ANY_LIST,
        Builtin::Subst => ANY_ANY_LIST,
        Builtin::Null => ANY1,
        Builtin::Endp => ANY1,
        Builtin::Atom => ANY1,
        Builtin::Listp => ANY1,
        Builtin::Symbolp => ANY1,
        Builtin::Numberp => ANY1,
        Builtin::Minusp => NUM,
        Builtin::Plusp => NUM,
        Builtin::Zerop => NUM,
        Builtin::Boundp => SYM,
        Builtin::Eq => ANY_ANY,
        Builtin::Eql => ANY_ANY,
        Builtin::Equal => ANY_ANY,
        Builtin::Not => ANY1,
        Builtin::NumEq => NUM_NUM,
        Builtin::NumNe => NUM_NUM,
        Builtin::Lt => NUM_NUM,
        Builtin::Le => NUM_NUM,
        Builtin::Gt => NUM_NUM,
        Builtin::Ge => NUM_NUM,
        Builtin::Sqrt => NUM,
        Builtin::Sin => NUM,
        Builtin::Cos => NUM,
        Builtin::Tan => NUM,
        Builtin::Asin => NUM,
        Builtin::Acos => NUM,
        Builtin::Atan => NUM,
        Builtin::Mod => NUM_NUM,
        Builtin::Abs => NUM,
        Builtin::Round => NUM,
        Builtin::Random => NUM,
        Builtin::Exp => NUM,
        Builtin::Expt => NUM_NUM,
    };
}

/// Applies the head of a non-literal list to its arguments: builtins
/// first, then the CAR/CDR compositions, then user-defined functions.
pub(crate) fn execute_function(ctx: &mut Interpreter, items: &[Value]) -> LispResult<Value> {
    let Some((head, args)) = items.split_first() else {
        return Ok(Value::nil());
    };
    let fname = head.to_string();
    if let Some(&builtin) = BUILTINS.get(fname.as_str()) {
        return if let Some(kinds) = SIGNATURES.get(&builtin) {
            let evaluated = check_args(ctx, &fname, kinds, args)?;
            execute_checked(ctx, builtin, &fname, evaluated)
        } else {
            execute_special(ctx, builtin, &fname, args)
        };
    }
    if let Some(ops) = cr_operations(&fname) {
        return execute_cr(ctx, &fname, &ops, args);
    }
    if let Some(function) = ctx.user_function(&fname) {
        return function.invoke(ctx, args);
    }
    Err(LispError::UndefinedFunction(fname))
}

/// Arity first, then each argument is evaluated once and kind-checked.
/// Kind errors name the argument as written, not its value.
fn check_args(
    ctx: &mut Interpreter,
    fname: &str,
    kinds: &[Kind],
    args: &[Value],
) -> LispResult<Vec<Value>> {
    if args.len() != kinds.len() {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    let mut evaluated = Vec::with_capacity(args.len());
    for (arg, kind) in args.iter().zip(kinds) {
        let value = arg.evaluate(ctx)?;
        match kind {
            Kind::Any => {}
            Kind::List => {
                if !value.is_list() {
                    return Err(LispError::NotAList(arg.to_string()));
                }
            }
            Kind::Number => {
                if !matches!(value, Value::Number(_)) {
                    return Err(LispError::NotANumber(arg.to_string()));
                }
            }
            Kind::Symbol => {
                if !matches!(value, Value::Symbol(_)) {
                    return Err(LispError::NotASymbol(arg.to_string()));
                }
            }
        }
        evaluated.push(value);
    }
    Ok(evaluated)
}

fn take<const N: usize>(fname: &str, args: Vec<Value>) -> LispResult<[Value; N]> {
    args.try_into()
        .map_err(|_| LispError::WrongArgumentCount(fname.to_string()))
}

fn take_numbers<const N: usize>(fname: &str, args: Vec<Value>) -> LispResult<[Number; N]> {
    let numbers = args
        .into_iter()
        .map(Value::into_number)
        .collect::<LispResult<Vec<_>>>()?;
    numbers
        .try_into()
        .map_err(|_| LispError::WrongArgumentCount(fname.to_string()))
}

fn float_op(number: Number, op: impl Fn(f64) -> f64) -> LispResult<Value> {
    Number::from_f64(op(number.to_f64()?)).map(Value::Number)
}

fn execute_checked(
    ctx: &mut Interpreter,
    builtin: Builtin,
    fname: &str,
    args: Vec<Value>,
) -> LispResult<Value> {
    match builtin {
        Builtin::Add => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::Number(&a + &b))
        }
        Builtin::Sub => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::Number(&a - &b))
        }
        Builtin::Mul => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::Number(&a * &b))
        }
        Builtin::Div => {
            let [a, b] = take_numbers(fname, args)?;
            a.div(&b).map(Value::Number)
        }
        Builtin::Inc => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::Number(&a + &Number::from(1)))
        }
        Builtin::Dec => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::Number(&a - &Number::from(1)))
        }
        Builtin::Set => {
            let [symbol, value] = take(fname, args)?;
            let stored = value.evaluate(ctx)?;
            ctx.set_global(symbol.into_symbol()?.name().to_string(), stored);
            Ok(value)
        }
        Builtin::Makunbound => {
            let [symbol] = take(fname, args)?;
            let mut symbol = symbol;
            ctx.remove_global(symbol.clone().into_symbol()?.name());
            symbol.set_literal(true);
            Ok(symbol)
        }
        Builtin::Load => {
            let [symbol] = take(fname, args)?;
            load_file(ctx, symbol.into_symbol()?.name())
        }
        Builtin::First => {
            let [list] = take(fname, args)?;
            let mut result = car(list.into_list()?);
            result.set_literal(true);
            Ok(result)
        }
        Builtin::Rest => {
            let [list] = take(fname, args)?;
            let mut result = cdr(list.into_list()?)?;
            result.set_literal(true);
            Ok(result)
        }
        Builtin::Last => {
            let [list] = take(fname, args)?;
            let list = list.into_list()?;
            let mut result = match list.items.last() {
                Some(last) => Value::List(List {
                    items: vec![last.clone()],
                    dotted: list.dotted,
                    literal: false,
                }),
                None => Value::List(list),
            };
            result.set_literal(true);
            Ok(result)
        }
        Builtin::Length | Builtin::ListLength => {
            let [list] = take(fname, args)?;
            let list = list.into_list()?;
            if list.dotted {
                let last = list.items.last().map(Value::to_string).unwrap_or_default();
                return Err(LispError::InvalidListEnding(last));
            }
            Ok(Value::Number(Number::from(list.items.len() as i64)))
        }
        Builtin::Cons => {
            let [head, tail] = take(fname, args)?;
            let list = List {
                items: vec![head],
                dotted: false,
                literal: false,
            };
            append_onto(list, vec![tail]).map(Value::List)
        }
        Builtin::MakeList => {
            let [item] = take(fname, args)?;
            let mut list = List {
                items: vec![item],
                dotted: false,
                literal: false,
            };
            list.set_literal(true);
            Ok(Value::List(list))
        }
        Builtin::Reverse => {
            let [list] = take(fname, args)?;
            let mut list = list.into_list()?;
            list.items.reverse();
            list.set_literal(true);
            Ok(Value::List(list))
        }
        Builtin::Member => {
            let [key, list] = take(fname, args)?;
            let list = list.into_list()?;
            match list.items.iter().position(|item| *item == key) {
                Some(index) => {
                    let mut tail = list.get_range(index, list.items.len() - index)?;
                    tail.set_literal(true);
                    Ok(Value::List(tail))
                }
                None => Ok(Value::nil()),
            }
        }
        Builtin::Remove => {
            let [key, list] = take(fname, args)?;
            let mut list = list.into_list()?;
            let removed_tail = list.dotted && list.items.last().is_some_and(|item| *item == key);
            list.items.retain(|item| *item != key);
            if removed_tail {
                list.dotted = false;
            }
            list.set_literal(true);
            Ok(Value::List(list))
        }
        Builtin::Subst => {
            let [new, old, list] = take(fname, args)?;
            let list = list.into_list()?;
            let map = HashMap::from([(old.to_string(), new)]);
            let mut result = list.replace(&map, true);
            result.set_literal(true);
            Ok(Value::List(result))
        }
        Builtin::Null | Builtin::Endp => {
            let [value] = take(fname, args)?;
            Ok(Value::from(!value.is_truthy()))
        }
        Builtin::Atom => {
            let [value] = take(fname, args)?;
            Ok(Value::from(value.is_atom()))
        }
        Builtin::Listp => {
            let [value] = take(fname, args)?;
            Ok(Value::from(value.is_list()))
        }
        Builtin::Symbolp => {
            let [value] = take(fname, args)?;
            Ok(Value::from(
                matches!(value, Value::Symbol(_)) || (value.is_list() && value.is_atom()),
            ))
        }
        Builtin::Numberp => {
            let [value] = take(fname, args)?;
            Ok(Value::from(matches!(value, Value::Number(_))))
        }
        Builtin::Minusp => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::from(a.is_negative()))
        }
        Builtin::Plusp => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::from(!a.is_negative()))
        }
        Builtin::Zerop => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::from(a.is_zero()))
        }
        Builtin::Boundp => {
            let [symbol] = take(fname, args)?;
            Ok(Value::from(ctx.has_global(symbol.into_symbol()?.name())))
        }
        Builtin::Eq | Builtin::Eql | Builtin::Equal => {
            let [a, b] = take(fname, args)?;
            Ok(Value::from(a == b))
        }
        Builtin::Not => {
            let [value] = take(fname, args)?;
            Ok(Value::from(!value.is_truthy()))
        }
        Builtin::NumEq => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) == Ordering::Equal))
        }
        Builtin::NumNe => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) != Ordering::Equal))
        }
        Builtin::Lt => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) == Ordering::Less))
        }
        Builtin::Le => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) != Ordering::Greater))
        }
        Builtin::Gt => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) == Ordering::Greater))
        }
        Builtin::Ge => {
            let [a, b] = take_numbers(fname, args)?;
            Ok(Value::from(a.cmp_digits(&b) != Ordering::Less))
        }
        Builtin::Sqrt => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::sqrt)
        }
        Builtin::Sin => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::sin)
        }
        Builtin::Cos => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::cos)
        }
        Builtin::Tan => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::tan)
        }
        Builtin::Asin => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::asin)
        }
        Builtin::Acos => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::acos)
        }
        Builtin::Atan => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::atan)
        }
        Builtin::Mod => {
            let [a, b] = take_numbers(fname, args)?;
            a.rem(&b).map(Value::Number)
        }
        Builtin::Abs => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::Number(a.abs()))
        }
        Builtin::Round => {
            let [a] = take_numbers(fname, args)?;
            Ok(Value::Number(a.round()))
        }
        Builtin::Random => {
            let [limit] = take_numbers(fname, args)?;
            random(&limit)
        }
        Builtin::Exp => {
            let [a] = take_numbers(fname, args)?;
            float_op(a, f64::exp)
        }
        Builtin::Expt => {
            let [a, b] = take_numbers(fname, args)?;
            Number::from_f64(a.to_f64()?.powf(b.to_f64()?)).map(Value::Number)
        }
        _ => Err(LispError::UndefinedFunction(fname.to_string())),
    }
}

fn execute_special(
    ctx: &mut Interpreter,
    builtin: Builtin,
    fname: &str,
    args: &[Value],
) -> LispResult<Value> {
    match builtin {
        Builtin::Defun => defun(ctx, fname, args),
        Builtin::Quote => {
            if args.len() != 1 {
                return Err(LispError::WrongArgumentCount(fname.to_string()));
            }
            let mut quoted = args[0].clone();
            quoted.set_literal(true);
            Ok(quoted)
        }
        Builtin::Setq => setq(ctx, fname, args),
        Builtin::Eval => {
            if args.len() != 1 {
                return Err(LispError::WrongArgumentCount(fname.to_string()));
            }
            // Thaw a copy of the raw argument, run it, and thaw the
            // result; the application's own re-evaluation then provides
            // the second pass that executes previously-quoted data.
            let mut form = args[0].clone();
            form.set_literal(false);
            let mut result = form.evaluate(ctx)?;
            result.set_literal(false);
            Ok(result)
        }
        Builtin::Append => {
            let Some((first, rest)) = args.split_first() else {
                return Ok(Value::nil());
            };
            let first = first.evaluate(ctx)?;
            if rest.is_empty() {
                return Ok(first);
            }
            let list = first.into_list()?;
            let values = rest
                .iter()
                .map(|arg| arg.evaluate(ctx))
                .collect::<LispResult<Vec<_>>>()?;
            append_onto(list, values).map(Value::List)
        }
        Builtin::And => {
            for arg in args {
                if !arg.evaluate(ctx)?.is_truthy() {
                    return Ok(Value::from(false));
                }
            }
            Ok(Value::from(true))
        }
        Builtin::Or => {
            for arg in args {
                if arg.evaluate(ctx)?.is_truthy() {
                    return Ok(Value::from(true));
                }
            }
            Ok(Value::from(false))
        }
        Builtin::If => {
            if !(2..=3).contains(&args.len()) {
                return Err(LispError::WrongArgumentCount(fname.to_string()));
            }
            if args[0].evaluate(ctx)?.is_truthy() {
                args[1].evaluate(ctx)
            } else {
                match args.get(2) {
                    Some(form) => form.evaluate(ctx),
                    None => Ok(Value::nil()),
                }
            }
        }
        Builtin::Cond => {
            for arg in args {
                let Value::List(clause) = arg else {
                    return Err(LispError::NotAList(arg.to_string()));
                };
                let (Some(test), Some(result)) = (clause.items.first(), clause.items.last())
                else {
                    continue;
                };
                if test.evaluate(ctx)?.is_truthy() {
                    return result.evaluate(ctx);
                }
            }
            Ok(Value::nil())
        }
        Builtin::Dolist => dolist(ctx, fname, args),
        Builtin::Dotimes => dotimes(ctx, fname, args),
        Builtin::Log => log(ctx, fname, args),
        Builtin::Min => extremum(ctx, fname, args, Ordering::Less),
        Builtin::Max => extremum(ctx, fname, args, Ordering::Greater),
        Builtin::Gcd => gcd(ctx, fname, args),
        _ => Err(LispError::UndefinedFunction(fname.to_string())),
    }
}

fn defun(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    if args.len() != 3 {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    let Value::Symbol(name) = &args[0] else {
        return Err(LispError::NotASymbol(args[0].to_string()));
    };
    let Value::List(params) = &args[1] else {
        return Err(LispError::NotAList(args[1].to_string()));
    };
    let params = params
        .items
        .iter()
        .map(|item| match item {
            Value::Symbol(symbol) => Ok(symbol.name().to_string()),
            value => Err(LispError::NotASymbol(value.to_string())),
        })
        .collect::<LispResult<Vec<_>>>()?;
    ctx.define_function(UserFunction {
        name: name.name().to_string(),
        params,
        body: args[2].clone(),
    });
    let mut result = args[0].clone();
    result.set_literal(true);
    Ok(result)
}

fn setq(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    if args.len() % 2 != 0 {
        let text = args
            .iter()
            .fold("(".to_string(), |acc, arg| {
                combine_with_space(&acc, &arg.to_string())
            })
            + ")";
        return Err(LispError::OddArgumentCount(fname.to_string(), text));
    }
    if args.is_empty() {
        return Ok(Value::nil());
    }
    for pair in args.chunks(2) {
        let Value::Symbol(symbol) = &pair[0] else {
            return Err(LispError::NotASymbol(pair[0].to_string()));
        };
        let value = pair[1].evaluate(ctx)?;
        ctx.set_global(symbol.name().to_string(), value);
    }
    // The result is the last variable's fresh value.
    args[args.len() - 2].evaluate(ctx)
}

fn dolist(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    let (control, body) = control_and_body(fname, args)?;
    let var = control.items[0].clone().into_symbol()?;
    let list = control.items[1].evaluate(ctx)?.into_list()?;
    for item in list.items {
        ctx.set_global(var.name().to_string(), item);
        body.evaluate(ctx)?;
    }
    match control.items.get(2) {
        Some(result) => result.evaluate(ctx),
        None => Ok(Value::nil()),
    }
}

/// The counter variable is a global, visible to the body, and runs DOWN
/// from n-1 to 0. The body may reassign it to change the iteration.
fn dotimes(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    let (control, body) = control_and_body(fname, args)?;
    let var = control.items[0].clone().into_symbol()?;
    let count = control.items[1].evaluate(ctx)?.into_number()?;
    ctx.set_global(
        var.name().to_string(),
        Value::Number(&count - &Number::from(1)),
    );
    loop {
        let current = counter_value(ctx, var.name())?;
        if current.to_i64()? < 0 {
            break;
        }
        body.evaluate(ctx)?;
        let current = counter_value(ctx, var.name())?;
        ctx.set_global(
            var.name().to_string(),
            Value::Number(&current - &Number::from(1)),
        );
    }
    match control.items.get(2) {
        Some(result) => result.evaluate(ctx),
        None => Ok(Value::nil()),
    }
}

// Exactly one body form after the control list.
fn control_and_body<'a>(fname: &str, args: &'a [Value]) -> LispResult<(&'a List, &'a Value)> {
    let [control, body] = args else {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    };
    let Value::List(control) = control else {
        return Err(LispError::NotAList(control.to_string()));
    };
    if !(2..=3).contains(&control.items.len()) {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    Ok((control, body))
}

fn counter_value(ctx: &mut Interpreter, name: &str) -> LispResult<Number> {
    ctx.global(name)
        .cloned()
        .ok_or_else(|| LispError::UndefinedVariable(name.to_string()))?
        .into_number()
}

fn log(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    if !(1..=2).contains(&args.len()) {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    let number = match args[0].evaluate(ctx)? {
        Value::Number(number) => number,
        _ => return Err(LispError::NotANumber(args[0].to_string())),
    };
    let result = match args.get(1) {
        Some(base) => {
            let base = match base.evaluate(ctx)? {
                Value::Number(number) => number,
                _ => return Err(LispError::NotANumber(base.to_string())),
            };
            number.to_f64()?.ln() / base.to_f64()?.ln()
        }
        None => number.to_f64()?.ln(),
    };
    Number::from_f64(result).map(Value::Number)
}

fn extremum(
    ctx: &mut Interpreter,
    fname: &str,
    args: &[Value],
    keep: Ordering,
) -> LispResult<Value> {
    if args.is_empty() {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    let mut best: Option<Number> = None;
    for arg in args {
        let Value::Number(number) = arg.evaluate(ctx)? else {
            return Err(LispError::NotANumber(arg.to_string()));
        };
        best = Some(match best {
            Some(current) if number.cmp_digits(&current) != keep => current,
            _ => number,
        });
    }
    match best {
        Some(number) => Ok(Value::Number(number)),
        None => Ok(Value::nil()),
    }
}

fn gcd(ctx: &mut Interpreter, fname: &str, args: &[Value]) -> LispResult<Value> {
    if args.is_empty() {
        return Err(LispError::WrongArgumentCount(fname.to_string()));
    }
    let mut result: Option<Number> = None;
    for arg in args {
        let Value::Number(number) = arg.evaluate(ctx)? else {
            return Err(LispError::NotANumber(arg.to_string()));
        };
        result = Some(match result {
            Some(current) => euclid(current, number.abs())?,
            None => number.abs(),
        });
    }
    match result {
        Some(number) => Ok(Value::Number(number)),
        None => Ok(Value::nil()),
    }
}

fn euclid(mut a: Number, mut b: Number) -> LispResult<Number> {
    while !b.is_zero() {
        let r = a.rem(&b)?;
        a = std::mem::replace(&mut b, r);
    }
    Ok(a)
}

fn random(limit: &Number) -> LispResult<Value> {
    let mut rng = rand::thread_rng();
    if limit.is_decimal() {
        Number::from_f64(rng.gen::<f64>() * limit.to_f64()?).map(Value::Number)
    } else {
        let bound = limit.to_i64()?;
        if bound == 0 {
            return Err(LispError::DivisionByZero);
        }
        // unsigned_abs keeps i64::MIN in range; the sampled value fits
        // back into i64 because the range is half-open.
        let value = rng.gen_range(0..bound.unsigned_abs()) as i64;
        Ok(Value::Number(Number::from(value)))
    }
}

fn load_file(ctx: &mut Interpreter, name: &str) -> LispResult<Value> {
    let path = if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.lsp")
    };
    match fs::read_to_string(&path) {
        Ok(contents) => {
            for line in contents.lines() {
                ctx.ingest(&format!(" {line} "));
            }
            // A nested drain runs the file's forms; their output is
            // dropped, along with any forms queued behind the LOAD.
            let _ = ctx.drain_and_evaluate();
            Ok(Value::from(true))
        }
        Err(_) => Ok(Value::nil()),
    }
}

/// Names matching `C[AD]+R` compose FIRST/REST operations, applied
/// right to left.
fn cr_operations(fname: &str) -> Option<String> {
    let middle = fname.strip_prefix('C')?.strip_suffix('R')?;
    if !middle.is_empty() && middle.chars().all(|c| c == 'A' || c == 'D') {
        Some(middle.to_string())
    } else {
        None
    }
}

fn execute_cr(ctx: &mut Interpreter, fname: &str, ops: &str, args: &[Value]) -> LispResult<Value> {
    let evaluated = check_args(ctx, fname, LIST1, args)?;
    let [value] = take(fname, evaluated)?;
    let mut current = value;
    for op in ops.chars().rev() {
        let list = current.into_list()?;
        current = match op {
            'A' => car(list),
            _ => cdr(list)?,
        };
    }
    current.set_literal(true);
    Ok(current)
}

/// Both accessors pass the empty list through unchanged.
fn car(list: List) -> Value {
    match list.items.first() {
        Some(first) => first.clone(),
        None => Value::List(list),
    }
}

fn cdr(list: List) -> LispResult<Value> {
    if list.items.is_empty() {
        return Ok(Value::List(list));
    }
    if list.items.len() == 2 && list.dotted {
        // The tail of a dotted pair is the raw value.
        return Ok(list.items[1].clone());
    }
    list.get_range(1, list.items.len() - 1).map(Value::List)
}

/// Appends already-evaluated values onto a list. A non-list value closes
/// the list as a dotted pair, after which nothing more can be appended.
fn append_onto(mut list: List, values: Vec<Value>) -> LispResult<List> {
    for value in values {
        if list.dotted {
            let last = list.items.last().map(Value::to_string).unwrap_or_default();
            return Err(LispError::InvalidListEnding(last));
        }
        match value {
            // An appended list's own dotted flag is dropped; only a
            // non-list value closes the result as a dotted pair.
            Value::List(other) => {
                list.items.extend(other.items);
            }
            atom => {
                list.items.push(atom);
                list.dotted = true;
            }
        }
    }
    list.set_literal(true);
    Ok(list)
}

/// A user-defined function. Invocation substitutes evaluated arguments
/// for parameter symbols in a copy of the body, then evaluates the copy,
/// so bindings are call-time textual, not lexical.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) body: Value,
}

impl UserFunction {
    pub(crate) fn invoke(&self, ctx: &mut Interpreter, args: &[Value]) -> LispResult<Value> {
        if args.len() != self.params.len() {
            return Err(LispError::WrongArgumentCount(self.name.clone()));
        }
        match &self.body {
            Value::Number(_) => self.body.evaluate(ctx),
            Value::List(body) => {
                let mut bindings = HashMap::new();
                for (param, arg) in self.params.iter().zip(args) {
                    bindings.insert(param.clone(), arg.evaluate(ctx)?);
                }
                Value::List(body.replace(&bindings, false)).evaluate(ctx)
            }
            // A bare-symbol body is the identity function when it names
            // the first parameter; any other symbol resolves globally.
            Value::Symbol(symbol) => {
                if self.params.first().is_some_and(|param| param == symbol.name()) {
                    args[0].evaluate(ctx)
                } else {
                    self.body.evaluate(ctx)
                }
            }
        }
    }
}

#[cfg(test)]
fn eval_one(ctx: &mut Interpreter, source: &str) -> LispResult<Value> {
    let mut buffer = source.to_string();
    let values = crate::parser::process_buffer(&mut buffer).unwrap();
    assert_eq!(values.len(), 1);
    values[0].evaluate(ctx)
}

#[cfg(test)]
fn eval_text(ctx: &mut Interpreter, source: &str) -> String {
    match eval_one(ctx, source) {
        Ok(value) => value.to_string(),
        Err(error) => error.to_string(),
    }
}

#[test]
fn test_cons() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(CONS 1 '(2 3))"), "(1 2 3)");
    assert_eq!(eval_text(&mut ctx, "(CONS 'A 'B)"), "(A . B)");
    assert_eq!(eval_text(&mut ctx, "(CONS 'A NIL)"), "(A)");
    assert_eq!(eval_text(&mut ctx, "(CONS 1 '(2 . 3))"), "(1 2 3)");
}

#[test]
fn test_append() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(APPEND)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(APPEND '(1 2))"), "(1 2)");
    assert_eq!(eval_text(&mut ctx, "(APPEND '(1 2) '(3) '(4))"), "(1 2 3 4)");
    assert_eq!(eval_text(&mut ctx, "(APPEND '(1) 2)"), "(1 . 2)");
    // The appended list's dotted flag does not survive the splice.
    assert_eq!(eval_text(&mut ctx, "(APPEND '(1) '(2 . 3))"), "(1 2 3)");
    assert_eq!(eval_text(&mut ctx, "(APPEND '(1) '(2 . 3) '(4))"), "(1 2 3 4)");
    assert_eq!(
        eval_text(&mut ctx, "(APPEND '(1 . 2) '(3))"),
        "A proper list cannot end with 2."
    );
}

#[test]
fn test_cr_compositions() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(CAR '(1 2 3))"), "1");
    assert_eq!(eval_text(&mut ctx, "(CDR '(1 2 3))"), "(2 3)");
    assert_eq!(eval_text(&mut ctx, "(CADR '(1 2 3))"), "2");
    assert_eq!(eval_text(&mut ctx, "(CADDR '(1 2 3))"), "3");
    assert_eq!(eval_text(&mut ctx, "(CAAR '((1 2) 3))"), "1");
    assert_eq!(eval_text(&mut ctx, "(CAR NIL)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(CDR NIL)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(CDR '(A . B))"), "B");
    assert_eq!(eval_text(&mut ctx, "(CADR '(1))"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(CAR 5)"), "5 is not a list.");
    assert_eq!(eval_text(&mut ctx, "(CBR '(1))"), "Undefined function CBR.");
}

#[test]
fn test_list_functions() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(LIST 5)"), "(5)");
    assert_eq!(eval_text(&mut ctx, "(LENGTH '(A B C))"), "3");
    assert_eq!(eval_text(&mut ctx, "(LIST-LENGTH NIL)"), "0");
    assert_eq!(
        eval_text(&mut ctx, "(LENGTH '(A . B))"),
        "A proper list cannot end with B."
    );
    assert_eq!(eval_text(&mut ctx, "(REVERSE '(1 2 3))"), "(3 2 1)");
    assert_eq!(eval_text(&mut ctx, "(LAST '(1 2 3))"), "(3)");
    assert_eq!(eval_text(&mut ctx, "(LAST NIL)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(LAST '(A . B))"), "(. B)");
    assert_eq!(eval_text(&mut ctx, "(MEMBER 2 '(1 2 3))"), "(2 3)");
    assert_eq!(eval_text(&mut ctx, "(MEMBER 9 '(1 2 3))"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(REMOVE 2 '(1 2 3 2))"), "(1 3)");
    assert_eq!(eval_text(&mut ctx, "(SUBST 'Y 'X '(X (X) Z))"), "(Y (Y) Z)");
}

#[test]
fn test_predicates() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(NULL NIL)"), "T");
    assert_eq!(eval_text(&mut ctx, "(NULL '(1))"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(ATOM 'A)"), "T");
    assert_eq!(eval_text(&mut ctx, "(ATOM NIL)"), "T");
    assert_eq!(eval_text(&mut ctx, "(ATOM '(1))"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(LISTP NIL)"), "T");
    assert_eq!(eval_text(&mut ctx, "(LISTP 5)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(SYMBOLP 'A)"), "T");
    assert_eq!(eval_text(&mut ctx, "(SYMBOLP NIL)"), "T");
    assert_eq!(eval_text(&mut ctx, "(SYMBOLP 5)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(NUMBERP 5)"), "T");
    assert_eq!(eval_text(&mut ctx, "(MINUSP -1)"), "T");
    assert_eq!(eval_text(&mut ctx, "(PLUSP 0)"), "T");
    assert_eq!(eval_text(&mut ctx, "(ZEROP 0.0)"), "T");
    assert_eq!(eval_text(&mut ctx, "(ZEROP 0.1)"), "NIL");
}

#[test]
fn test_logic() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(AND T T 1)"), "T");
    assert_eq!(eval_text(&mut ctx, "(AND T NIL)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(OR NIL NIL)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(OR NIL 1)"), "T");
    assert_eq!(eval_text(&mut ctx, "(NOT NIL)"), "T");
    assert_eq!(eval_text(&mut ctx, "(EQL '(1) '(1))"), "T");
    assert_eq!(eval_text(&mut ctx, "(EQ 'A 'B)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(EQUAL 1 1.0)"), "NIL");
}

#[test]
fn test_comparisons() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(< 2 10)"), "T");
    assert_eq!(eval_text(&mut ctx, "(> 2 10)"), "NIL");
    assert_eq!(eval_text(&mut ctx, "(<= 3 3)"), "T");
    assert_eq!(eval_text(&mut ctx, "(= 3 3)"), "T");
    assert_eq!(eval_text(&mut ctx, "(/= 3 4)"), "T");
}

#[test]
fn test_math() {
    let mut ctx = Interpreter::new();
    assert_eq!(eval_text(&mut ctx, "(ABS -4)"), "4");
    assert_eq!(eval_text(&mut ctx, "(ROUND 2.5)"), "3");
    assert_eq!(eval_text(&mut ctx, "(SQRT 4)"), "2");
    assert_eq!(eval_text(&mut ctx, "(EXPT 2 10)"), "1024");
    assert_eq!(eval_text(&mut ctx, "(MOD 7 3)"), "1");
    assert_eq!(eval_text(&mut ctx, "(MIN 3 1 2)"), "1");
    assert_eq!(eval_text(&mut ctx, "(MAX 3 1 2)"), "3");
    assert_eq!(eval_text(&mut ctx, "(GCD 12 18)"), "6");
    assert_eq!(eval_text(&mut ctx, "(LOG 1)"), "0");
    assert_eq!(eval_text(&mut ctx, "(EXP 0)"), "1");
    assert_eq!(
        eval_text(&mut ctx, "(LOG 'A)"),
        "(QUOTE A) is not a numeric atom."
    );
    assert_eq!(eval_text(&mut ctx, "(1+ 41)"), "42");
    assert_eq!(eval_text(&mut ctx, "(1- 43)"), "42");
    assert_eq!(
        eval_text(&mut ctx, "(RANDOM 0)"),
        "Cannot divide by zero."
    );
}

#[test]
fn test_argument_errors() {
    let mut ctx = Interpreter::new();
    assert_eq!(
        eval_text(&mut ctx, "(+ 1)"),
        "Wrong number of arguments for function +."
    );
    assert_eq!(eval_text(&mut ctx, "(+ 1 'A)"), "(QUOTE A) is not a numeric atom.");
    assert_eq!(
        eval_text(&mut ctx, "(FOO 1)"),
        "Undefined function FOO."
    );
}

#[test]
fn test_random_range() {
    let mut ctx = Interpreter::new();
    for _ in 0..20 {
        let value = eval_one(&mut ctx, "(RANDOM 5)").unwrap();
        let number = value.into_number().unwrap().to_i64().unwrap();
        assert!((0..5).contains(&number));
    }
}

#[test]
fn test_random_extreme_bound() {
    let mut ctx = Interpreter::new();
    // The bound's magnitude does not fit in i64; sampling must still
    // answer a non-negative number instead of dying.
    let value = eval_one(&mut ctx, "(RANDOM -9223372036854775808)").unwrap();
    assert!(!value.into_number().unwrap().is_negative());
}
