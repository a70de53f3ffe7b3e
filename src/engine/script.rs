//! Built-in s-expression engine.
//!
//! A compact interpreter sufficient to exercise the evaluation pipeline:
//! global `define`, first-class `lambda` closures, `if`, explicit `print`
//! into a captured output stream, and a handful of numeric, list, and
//! string builtins. Assignment and print forms produce invisible results;
//! everything else auto-renders.

use std::sync::Arc;

use super::ast::{Expr, Script};
use super::parser::parse_script;
use super::value::{Binding, Closure, Value};
use super::{Engine, EngineFault, Evaluated};

/// Call-depth ceiling for closure application.
const MAX_CALL_DEPTH: usize = 128;

/// Names of built-in functions, resolvable when no binding shadows them.
const BUILTINS: &[&str] = &[
    "+",
    "-",
    "*",
    "/",
    "<",
    ">",
    "<=",
    ">=",
    "=",
    "list",
    "nth",
    "len",
    "concat",
    "str",
    "not",
    "print",
    "environment",
];

/// The built-in scripting engine. One instance owns one global scope and
/// one captured output stream; the pipeline gives each worker its own.
#[derive(Default)]
pub struct ScriptEngine {
    // Insertion-ordered: persistence enumerates this order.
    globals: Vec<(String, Value)>,
    output: String,
}

impl ScriptEngine {
    /// Create an engine with an empty global scope.
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, name: &str, locals: &[(String, Value)]) -> Result<Value, EngineFault> {
        for (local, value) in locals.iter().rev() {
            if local == name {
                return Ok(value.clone());
            }
        }
        for (global, value) in &self.globals {
            if global == name {
                return Ok(value.clone());
            }
        }
        if let Some(canonical) = BUILTINS.iter().copied().find(|builtin| *builtin == name) {
            return Ok(Value::Builtin(canonical));
        }
        Err(EngineFault::Unbound(name.to_string()))
    }

    fn define(&mut self, name: &str, value: Value) {
        for (global, slot) in &mut self.globals {
            if global == name {
                *slot = value;
                return;
            }
        }
        self.globals.push((name.to_string(), value));
    }

    fn eval_form(
        &mut self,
        expr: &Expr,
        locals: &[(String, Value)],
        depth: usize,
    ) -> Result<Value, EngineFault> {
        match expr {
            Expr::Symbol(name) => self.lookup(name, locals),
            Expr::Keyword(kw) => Ok(Value::Keyword(kw.clone())),
            Expr::String(text) => Ok(Value::Text(text.clone())),
            Expr::Integer(num) => Ok(Value::Integer(*num)),
            Expr::Float(num) => Ok(Value::Float(*num)),
            Expr::Boolean(flag) => Ok(Value::Boolean(*flag)),
            Expr::List(items) => self.eval_list(items, locals, depth),
        }
    }

    fn eval_list(
        &mut self,
        items: &[Expr],
        locals: &[(String, Value)],
        depth: usize,
    ) -> Result<Value, EngineFault> {
        let Some(head) = items.first() else {
            return Ok(Value::List(Vec::new()));
        };

        if let Expr::Symbol(name) = head {
            match name.as_str() {
                "define" => return self.eval_define(&items[1..], locals, depth),
                "lambda" => return eval_lambda(&items[1..]),
                "if" => return self.eval_if(&items[1..], locals, depth),
                _ => {}
            }
        }

        let callee = self.eval_form(head, locals, depth)?;
        let mut args = Vec::with_capacity(items.len() - 1);
        for item in &items[1..] {
            args.push(self.eval_form(item, locals, depth)?);
        }
        self.apply(callee, args, depth)
    }

    fn eval_define(
        &mut self,
        rest: &[Expr],
        locals: &[(String, Value)],
        depth: usize,
    ) -> Result<Value, EngineFault> {
        match rest {
            [Expr::Symbol(name), init] => {
                let value = self.eval_form(init, locals, depth)?;
                self.define(name, value.clone());
                Ok(value)
            }
            // (define (f a b) body...) sugar for a named lambda
            [Expr::List(signature), body @ ..] if !body.is_empty() => {
                let [Expr::Symbol(name), params @ ..] = signature.as_slice() else {
                    return Err(EngineFault::Eval(
                        "define signature must start with a symbol".into(),
                    ));
                };
                let params = param_names(params)?;
                let closure = Value::Closure(Arc::new(Closure {
                    params,
                    body: body.to_vec(),
                }));
                self.define(name, closure.clone());
                Ok(closure)
            }
            _ => Err(EngineFault::Eval(
                "define expects a name and a value".into(),
            )),
        }
    }

    fn eval_if(
        &mut self,
        rest: &[Expr],
        locals: &[(String, Value)],
        depth: usize,
    ) -> Result<Value, EngineFault> {
        let (condition, branches) = rest
            .split_first()
            .ok_or_else(|| EngineFault::Eval("if expects a condition".into()))?;
        let test = self.eval_form(condition, locals, depth)?;
        let truthy = !matches!(test, Value::Boolean(false));
        match (truthy, branches) {
            (true, [then, ..]) => self.eval_form(then, locals, depth),
            (false, [_, otherwise, ..]) => self.eval_form(otherwise, locals, depth),
            (false, [_]) => Ok(Value::Boolean(false)),
            _ => Err(EngineFault::Eval("if expects a then-branch".into())),
        }
    }

    fn apply(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, EngineFault> {
        match callee {
            Value::Closure(closure) => {
                if depth >= MAX_CALL_DEPTH {
                    return Err(EngineFault::Eval("recursion limit exceeded".into()));
                }
                if closure.params.len() != args.len() {
                    return Err(EngineFault::Eval(format!(
                        "expected {} arguments, got {}",
                        closure.params.len(),
                        args.len()
                    )));
                }
                let frame: Vec<(String, Value)> = closure
                    .params
                    .iter()
                    .cloned()
                    .zip(args)
                    .collect();
                let mut result = Value::Boolean(false);
                for form in &closure.body {
                    result = self.eval_form(form, &frame, depth + 1)?;
                }
                Ok(result)
            }
            Value::Builtin(name) => self.apply_builtin(name, args),
            other => Err(EngineFault::Eval(format!("not callable: {}", other))),
        }
    }

    fn apply_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, EngineFault> {
        match name {
            "+" | "-" | "*" | "/" => numeric_fold(name, &args),
            "<" | ">" | "<=" | ">=" => numeric_compare(name, &args),
            "=" => {
                let [a, b] = args.as_slice() else {
                    return Err(EngineFault::Eval("= expects two arguments".into()));
                };
                Ok(Value::Boolean(a == b))
            }
            "list" => Ok(Value::List(args)),
            "nth" => match args.as_slice() {
                [Value::List(items), Value::Integer(index)] => {
                    let slot = usize::try_from(*index)
                        .ok()
                        .and_then(|i| items.get(i))
                        .ok_or_else(|| {
                            EngineFault::Eval(format!("index {} out of bounds", index))
                        })?;
                    Ok(slot.clone())
                }
                _ => Err(EngineFault::Eval("nth expects a list and an index".into())),
            },
            "len" => match args.as_slice() {
                [Value::List(items)] => Ok(Value::Integer(items.len() as i64)),
                [Value::Text(text)] => Ok(Value::Integer(text.chars().count() as i64)),
                _ => Err(EngineFault::Eval("len expects a list or string".into())),
            },
            "concat" => {
                let mut items = Vec::new();
                for arg in &args {
                    match arg {
                        Value::List(inner) => items.extend(inner.iter().cloned()),
                        other => {
                            return Err(EngineFault::Eval(format!(
                                "concat expects lists, got {}",
                                other
                            )));
                        }
                    }
                }
                Ok(Value::List(items))
            }
            "str" => {
                let rendered: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
                Ok(Value::Text(rendered.concat()))
            }
            "not" => match args.as_slice() {
                [Value::Boolean(flag)] => Ok(Value::Boolean(!flag)),
                _ => Err(EngineFault::Eval("not expects a boolean".into())),
            },
            "print" => {
                let (first, _) = args
                    .split_first()
                    .ok_or_else(|| EngineFault::Eval("print expects an argument".into()))?;
                let rendered: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
                self.output.push_str(&rendered.join(" "));
                self.output.push('\n');
                Ok(first.clone())
            }
            "environment" => {
                if !args.is_empty() {
                    return Err(EngineFault::Eval("environment expects no arguments".into()));
                }
                Ok(Value::Environment)
            }
            other => Err(EngineFault::Eval(format!("unknown builtin: {}", other))),
        }
    }
}

impl Engine for ScriptEngine {
    type Expr = Script;

    fn parse(&self, source: &str) -> Result<Option<Script>, EngineFault> {
        parse_script(source)
    }

    fn evaluate(&mut self, script: &Script) -> Result<Evaluated, EngineFault> {
        self.output.clear();

        let mut last = Value::Boolean(false);
        let mut visible = false;
        for form in &script.forms {
            last = self.eval_form(form, &[], 0)?;
            visible = !is_invisible_form(form);
        }

        Ok(Evaluated {
            value: last,
            visible,
            output: std::mem::take(&mut self.output),
        })
    }

    fn global_bindings(&self) -> Vec<Binding> {
        self.globals
            .iter()
            .map(|(name, value)| Binding::new(name.clone(), value.clone()))
            .collect()
    }

    fn set_global(&mut self, name: &str, value: Value) {
        self.define(name, value);
    }

    fn clear_globals(&mut self) {
        self.globals.clear();
    }

    fn render(&self, value: &Value) -> String {
        value.to_string()
    }
}

/// Assignments and explicit prints do not auto-render their result.
fn is_invisible_form(form: &Expr) -> bool {
    if let Expr::List(items) = form {
        if let Some(Expr::Symbol(head)) = items.first() {
            return head == "define" || head == "print";
        }
    }
    false
}

fn eval_lambda(rest: &[Expr]) -> Result<Value, EngineFault> {
    let [Expr::List(params), body @ ..] = rest else {
        return Err(EngineFault::Eval(
            "lambda expects a parameter list and a body".into(),
        ));
    };
    if body.is_empty() {
        return Err(EngineFault::Eval("lambda body is empty".into()));
    }
    Ok(Value::Closure(Arc::new(Closure {
        params: param_names(params)?,
        body: body.to_vec(),
    })))
}

fn param_names(params: &[Expr]) -> Result<Vec<String>, EngineFault> {
    params
        .iter()
        .map(|param| match param {
            Expr::Symbol(name) => Ok(name.clone()),
            other => Err(EngineFault::Eval(format!(
                "parameter must be a symbol, found {:?}",
                other
            ))),
        })
        .collect()
}

fn numeric_fold(op: &str, args: &[Value]) -> Result<Value, EngineFault> {
    if args.is_empty() {
        return Err(EngineFault::Eval(format!(
            "{} expects at least one argument",
            op
        )));
    }

    // Integer arguments stay in integer arithmetic except for inexact division.
    if all_integers(args) && op != "/" {
        let ints: Vec<i64> = args
            .iter()
            .map(|arg| match arg {
                Value::Integer(num) => *num,
                _ => unreachable!(),
            })
            .collect();
        let (first, rest) = ints.split_first().unwrap();
        if rest.is_empty() && op == "-" {
            return first
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| EngineFault::Eval("integer overflow".into()));
        }
        let mut acc = *first;
        for num in rest {
            let next = match op {
                "+" => acc.checked_add(*num),
                "-" => acc.checked_sub(*num),
                "*" => acc.checked_mul(*num),
                _ => unreachable!(),
            };
            acc = next.ok_or_else(|| EngineFault::Eval("integer overflow".into()))?;
        }
        return Ok(Value::Integer(acc));
    }

    let numbers = as_numbers(op, args)?;
    let (first, rest) = numbers.split_first().unwrap();
    if rest.is_empty() && op == "-" {
        return Ok(Value::Float(-first));
    }

    let mut acc = *first;
    for num in rest {
        acc = match op {
            "+" => acc + num,
            "-" => acc - num,
            "*" => acc * num,
            "/" => {
                if *num == 0.0 {
                    return Err(EngineFault::Eval("division by zero".into()));
                }
                acc / num
            }
            _ => unreachable!(),
        };
    }

    if op == "/" && all_integers(args) && acc.fract() == 0.0 {
        return Ok(Value::Integer(acc as i64));
    }
    Ok(Value::Float(acc))
}

fn numeric_compare(op: &str, args: &[Value]) -> Result<Value, EngineFault> {
    let numbers = as_numbers(op, args)?;
    let [a, b] = numbers.as_slice() else {
        return Err(EngineFault::Eval(format!("{} expects two arguments", op)));
    };
    let result = match op {
        "<" => a < b,
        ">" => a > b,
        "<=" => a <= b,
        ">=" => a >= b,
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

fn as_numbers(op: &str, args: &[Value]) -> Result<Vec<f64>, EngineFault> {
    args.iter()
        .map(|arg| match arg {
            Value::Integer(num) => Ok(*num as f64),
            Value::Float(num) => Ok(*num),
            other => Err(EngineFault::Eval(format!(
                "{} expects numbers, got {}",
                op, other
            ))),
        })
        .collect()
}

fn all_integers(args: &[Value]) -> bool {
    args.iter().all(|arg| matches!(arg, Value::Integer(_)))
}
