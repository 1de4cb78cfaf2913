//! Tree-walking interpreter for the inline-code language.
//!
//! Output goes straight to [`TemplateServices::write`], and `$this->...`
//! calls are forwarded to the same service surface, so nested partial
//! renders interleave with the caller's output in source order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use cms_rs_core::error::{EngineError, ValidationError};
use cms_rs_core::options::{CombineOptions, PartialOptions};
use cms_rs_core::{CmsError, CmsResult, Scope};

use super::parser::{is_this_data, AssignOp, BinaryOp, Expr, FunctionDef, Program, Stmt, StmtKind};
use super::value::{
    as_integer, compare, count, escape_html, is_truthy, key_string, loose_eq, number,
    number_format, strict_eq, to_display, to_number,
};
use crate::engine::TemplateServices;

const MAX_CALL_DEPTH: usize = 64;

enum Flow {
    Next,
    Return(Value),
}

/// One step of an assignment path.
enum PathKey {
    Key(Value),
    Push,
}

/// Runs a program's top-level statements with `scope` as the local variables.
///
/// # Errors
///
/// Engine diagnostics, thrown validation and business-logic errors, and any
/// error raised by a nested service call.
pub fn execute(program: &Program, scope: &Scope, services: &dyn TemplateServices) -> CmsResult<()> {
    let mut locals = scope.clone();
    Interpreter::new(services, &program.functions).run(&program.body, &mut locals)?;
    Ok(())
}

/// Calls a function declared in `program` by name.
///
/// # Errors
///
/// A fatal diagnostic if no such function exists, otherwise whatever the
/// function body raises.
pub fn call(
    program: &Program,
    name: &str,
    args: Vec<Value>,
    services: &dyn TemplateServices,
) -> CmsResult<Value> {
    let mut interpreter = Interpreter::new(services, &program.functions);
    let def = program
        .functions
        .get(&name.to_ascii_lowercase())
        .cloned()
        .ok_or_else(|| interpreter.fatal(format!("Call to undefined function {name}()")))?;
    interpreter.call_function(&def, args)
}

struct Interpreter<'a> {
    services: &'a dyn TemplateServices,
    functions: &'a HashMap<String, Arc<FunctionDef>>,
    line: usize,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    fn new(
        services: &'a dyn TemplateServices,
        functions: &'a HashMap<String, Arc<FunctionDef>>,
    ) -> Self {
        Self {
            services,
            functions,
            line: 1,
            depth: 0,
        }
    }

    fn warning(&self, message: impl Into<String>) -> CmsError {
        CmsError::Engine(EngineError::warning(message, self.line))
    }

    fn fatal(&self, message: impl Into<String>) -> CmsError {
        CmsError::Engine(EngineError::fatal(message, Some(self.line)))
    }

    fn run(&mut self, body: &[Stmt], locals: &mut Scope) -> CmsResult<Value> {
        match self.exec_block(body, locals)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Null),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], locals: &mut Scope) -> CmsResult<Flow> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt, locals)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt, locals: &mut Scope) -> CmsResult<Flow> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Text(text) => self.services.write(text),
            StmtKind::Echo(exprs) => {
                for expr in exprs {
                    let value = self.eval(expr, locals)?;
                    self.services.write(&to_display(&value));
                }
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, locals)?;
            }
            StmtKind::Assign { target, op, value } => self.assign(target, *op, value, locals)?,
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if is_truthy(&self.eval(cond, locals)?) {
                        return self.exec_block(body, locals);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body, locals);
                }
            }
            StmtKind::Foreach {
                subject,
                key,
                value,
                body,
            } => return self.exec_foreach(subject, key.as_deref(), value, body, locals),
            StmtKind::Block(body) => return self.exec_block(body, locals),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, locals)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Throw { class, args } => {
                let args = self.eval_args(args, locals)?;
                return Err(self.throw(class, &args));
            }
        }
        Ok(Flow::Next)
    }

    fn exec_foreach(
        &mut self,
        subject: &Expr,
        key_var: Option<&str>,
        value_var: &str,
        body: &[Stmt],
        locals: &mut Scope,
    ) -> CmsResult<Flow> {
        let entries: Vec<(Value, Value)> = match self.eval(subject, locals)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            _ => return Err(self.warning("Invalid argument supplied for foreach()")),
        };

        for (key, value) in entries {
            if let Some(key_var) = key_var {
                locals.insert(key_var.to_string(), key);
            }
            locals.insert(value_var.to_string(), value);
            if let Flow::Return(value) = self.exec_block(body, locals)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    /// Maps a thrown class onto the error taxonomy.
    fn throw(&self, class: &str, args: &[Value]) -> CmsError {
        let message = args.first().map(to_display).unwrap_or_default();
        match class.to_ascii_lowercase().as_str() {
            "validationerror" | "validationexception" => {
                let mut err = ValidationError::new(message);
                if let Some(field) = args.get(1).filter(|v| !v.is_null()) {
                    err = err.with_field(to_display(field));
                }
                CmsError::Validation(err)
            }
            "businesslogicerror" | "applicationexception" => CmsError::BusinessLogic(message),
            "exception" | "runtimeexception" => {
                self.fatal(format!("Uncaught exception '{class}' with message '{message}'"))
            }
            _ => self.fatal(format!("Class '{class}' not found")),
        }
    }

    fn call_function(&mut self, def: &FunctionDef, args: Vec<Value>) -> CmsResult<Value> {
        if args.len() < def.params.len() {
            return Err(self.fatal(format!(
                "Too few arguments to function {}(), {} passed and exactly {} expected",
                def.name,
                args.len(),
                def.params.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.fatal(format!(
                "Maximum function nesting level of '{MAX_CALL_DEPTH}' reached"
            )));
        }

        let mut locals: Scope = def.params.iter().cloned().zip(args).collect();
        let caller_line = self.line;
        self.depth += 1;
        let result = self.run(&def.body, &mut locals);
        self.depth -= 1;
        if result.is_ok() {
            self.line = caller_line;
        }
        result
    }

    fn eval_args(&mut self, args: &[Expr], locals: &mut Scope) -> CmsResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, locals)).collect()
    }

    fn eval(&mut self, expr: &Expr, locals: &mut Scope) -> CmsResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| self.warning(format!("Undefined variable: {name}"))),
            Expr::This => Err(self.fatal("Cannot use $this as a value")),
            Expr::Array(entries) => self.eval_array(entries, locals),
            Expr::Index(base, index) => {
                let base = self.eval(base, locals)?;
                let index = self.eval(index, locals)?;
                self.index(&base, &index)
            }
            Expr::Push(_) => Err(self.fatal("Cannot use [] for reading")),
            Expr::Property(base, name) => self.property(base, name, locals),
            Expr::MethodCall(target, method, args) => {
                if **target != Expr::This {
                    return Err(self.fatal(format!(
                        "Call to a member function {method}() on a non-object"
                    )));
                }
                let args = self.eval_args(args, locals)?;
                self.call_service(method, &args)
            }
            Expr::Call(name, args) => {
                let args = self.eval_args(args, locals)?;
                self.call_named(name, args)
            }
            Expr::Isset(exprs) => {
                for expr in exprs {
                    if self.lookup(expr, locals)?.map_or(true, |v| v.is_null()) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&self.eval(inner, locals)?))),
            Expr::Neg(inner) => {
                let value = self.eval(inner, locals)?;
                Ok(match value.as_i64() {
                    Some(n) => n.checked_neg().map_or_else(|| number(-(n as f64)), Value::from),
                    None => number(-to_number(&value)),
                })
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, locals),
            Expr::Ternary(cond, then, otherwise) => {
                let cond_value = self.eval(cond, locals)?;
                if is_truthy(&cond_value) {
                    match then {
                        Some(then) => self.eval(then, locals),
                        None => Ok(cond_value),
                    }
                } else {
                    self.eval(otherwise, locals)
                }
            }
        }
    }

    /// Evaluates a variable, index or property without raising
    /// undefined-name warnings. Used by `isset`.
    fn lookup(&mut self, expr: &Expr, locals: &mut Scope) -> CmsResult<Option<Value>> {
        match expr {
            Expr::Var(name) => Ok(locals.get(name).cloned()),
            Expr::Index(base, index) => {
                let Some(base) = self.lookup(base, locals)? else {
                    return Ok(None);
                };
                let index = self.eval(index, locals)?;
                Ok(match &base {
                    Value::Array(items) => as_integer(&index)
                        .and_then(|i| usize::try_from(i).ok())
                        .and_then(|i| items.get(i).cloned()),
                    Value::Object(map) => map.get(&key_string(&index)).cloned(),
                    _ => None,
                })
            }
            Expr::Property(base, name) if **base == Expr::This => Ok(if name == "data" {
                Some(Value::Object(self.services.data()))
            } else {
                locals.get(name).cloned()
            }),
            Expr::Property(base, name) => Ok(self
                .lookup(base, locals)?
                .and_then(|v| v.get(name.as_str()).cloned())),
            other => self.eval(other, locals).map(Some),
        }
    }

    fn eval_array(&mut self, entries: &[(Option<Expr>, Expr)], locals: &mut Scope) -> CmsResult<Value> {
        if entries.iter().all(|(key, _)| key.is_none()) {
            let items = entries
                .iter()
                .map(|(_, value)| self.eval(value, locals))
                .collect::<CmsResult<Vec<_>>>()?;
            return Ok(Value::Array(items));
        }

        let mut map = Map::new();
        let mut next_index: i64 = 0;
        for (key, value) in entries {
            let key = match key {
                Some(key) => {
                    let key = self.eval(key, locals)?;
                    if let Some(n) = as_integer(&key).filter(|_| !key.is_string() || is_int_key(&key)) {
                        next_index = next_index.max(n + 1);
                    }
                    key_string(&key)
                }
                None => {
                    let key = next_index.to_string();
                    next_index += 1;
                    key
                }
            };
            let value = self.eval(value, locals)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    fn index(&self, base: &Value, index: &Value) -> CmsResult<Value> {
        match base {
            Value::Array(items) => {
                let position = as_integer(index).and_then(|i| usize::try_from(i).ok());
                position
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| self.warning(format!("Undefined offset: {}", key_string(index))))
            }
            Value::Object(map) => {
                let key = key_string(index);
                map.get(&key)
                    .cloned()
                    .ok_or_else(|| self.warning(format!("Undefined index: {key}")))
            }
            Value::String(s) => {
                let position = as_integer(index).and_then(|i| usize::try_from(i).ok());
                position
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| {
                        self.warning(format!("Uninitialized string offset: {}", key_string(index)))
                    })
            }
            Value::Null => Ok(Value::Null),
            _ => Err(self.warning("Cannot use a scalar value as an array")),
        }
    }

    fn property(&mut self, base: &Expr, name: &str, locals: &mut Scope) -> CmsResult<Value> {
        if *base == Expr::This {
            if name == "data" {
                return Ok(Value::Object(self.services.data()));
            }
            return locals
                .get(name)
                .cloned()
                .ok_or_else(|| self.warning(format!("Undefined property: Controller::${name}")));
        }
        match self.eval(base, locals)? {
            Value::Object(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| self.warning(format!("Undefined property: {name}"))),
            _ => Err(self.warning(format!("Trying to get property '{name}' of non-object"))),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        locals: &mut Scope,
    ) -> CmsResult<Value> {
        match op {
            BinaryOp::And => {
                let result =
                    is_truthy(&self.eval(left, locals)?) && is_truthy(&self.eval(right, locals)?);
                return Ok(Value::Bool(result));
            }
            BinaryOp::Or => {
                let result =
                    is_truthy(&self.eval(left, locals)?) || is_truthy(&self.eval(right, locals)?);
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        let l = self.eval(left, locals)?;
        let r = self.eval(right, locals)?;
        self.apply(op, &l, &r)
    }

    fn apply(&self, op: BinaryOp, l: &Value, r: &Value) -> CmsResult<Value> {
        use std::cmp::Ordering::{Greater, Less};

        Ok(match op {
            BinaryOp::Concat => Value::String(to_display(l) + &to_display(r)),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                let exact = match (as_exact_int(l), as_exact_int(r)) {
                    (Some(a), Some(b)) => match op {
                        BinaryOp::Add => a.checked_add(b),
                        BinaryOp::Sub => a.checked_sub(b),
                        _ => a.checked_mul(b),
                    },
                    _ => None,
                };
                exact.map_or_else(
                    || {
                        let (a, b) = (to_number(l), to_number(r));
                        Value::from(match op {
                            BinaryOp::Add => a + b,
                            BinaryOp::Sub => a - b,
                            _ => a * b,
                        })
                    },
                    Value::from,
                )
            }
            BinaryOp::Div => {
                let divisor = to_number(r);
                if divisor == 0.0 {
                    return Err(self.fatal("Division by zero"));
                }
                number(to_number(l) / divisor)
            }
            BinaryOp::Mod => {
                let divisor = as_integer(r).unwrap_or_else(|| to_number(r) as i64);
                if divisor == 0 {
                    return Err(self.fatal("Modulo by zero"));
                }
                let dividend = as_integer(l).unwrap_or_else(|| to_number(l) as i64);
                Value::from(dividend.wrapping_rem(divisor))
            }
            BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
            BinaryOp::NotEq => Value::Bool(!loose_eq(l, r)),
            BinaryOp::Identical => Value::Bool(strict_eq(l, r)),
            BinaryOp::NotIdentical => Value::Bool(!strict_eq(l, r)),
            BinaryOp::Lt => Value::Bool(compare(l, r) == Less),
            BinaryOp::Gt => Value::Bool(compare(l, r) == Greater),
            BinaryOp::LtEq => Value::Bool(compare(l, r) != Greater),
            BinaryOp::GtEq => Value::Bool(compare(l, r) != Less),
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are handled by eval_binary"),
        })
    }

    fn assign(&mut self, target: &Expr, op: AssignOp, value: &Expr, locals: &mut Scope) -> CmsResult<()> {
        let mut value = self.eval(value, locals)?;
        if op != AssignOp::Set {
            let current = self.eval(target, locals)?;
            value = self.apply(
                match op {
                    AssignOp::Concat => BinaryOp::Concat,
                    AssignOp::Add => BinaryOp::Add,
                    _ => BinaryOp::Sub,
                },
                &current,
                &value,
            )?;
        }

        // Unwind the index chain down to its root.
        let mut keys = Vec::new();
        let mut root = target;
        loop {
            match root {
                Expr::Index(base, index) => {
                    keys.push(Some(&**index));
                    root = &**base;
                }
                Expr::Push(base) => {
                    keys.push(None);
                    root = &**base;
                }
                _ => break,
            }
        }
        keys.reverse();
        let mut path = Vec::with_capacity(keys.len());
        for key in keys {
            path.push(match key {
                Some(index) => PathKey::Key(self.eval(index, locals)?),
                None => PathKey::Push,
            });
        }

        match root {
            Expr::Var(name) => {
                let slot = locals.entry(name.clone()).or_insert(Value::Null);
                self.set_path(slot, &path, value)
            }
            _ if is_this_data(root) => {
                let Some((PathKey::Key(first), rest)) = path.split_first() else {
                    return Err(self.fatal("Cannot assign to $this->data directly"));
                };
                let key = key_string(first);
                let mut data = self.services.data();
                let mut slot = data.remove(&key).unwrap_or(Value::Null);
                self.set_path(&mut slot, rest, value)?;
                self.services.set_data(&key, slot);
                Ok(())
            }
            _ => Err(self.fatal("Cannot assign to this expression")),
        }
    }

    fn set_path(&self, slot: &mut Value, path: &[PathKey], value: Value) -> CmsResult<()> {
        let Some((key, rest)) = path.split_first() else {
            *slot = value;
            return Ok(());
        };

        if slot.is_null() {
            let starts_list = match key {
                PathKey::Push => true,
                PathKey::Key(k) => as_exact_int(k) == Some(0),
            };
            *slot = if starts_list {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
        }

        if let Value::Array(items) = slot {
            let position = match key {
                PathKey::Push => Some(items.len()),
                PathKey::Key(k) => as_exact_int(k).and_then(|i| usize::try_from(i).ok()),
            };
            match position {
                Some(i) if i < items.len() => return self.set_path(&mut items[i], rest, value),
                Some(i) if i == items.len() => {
                    items.push(Value::Null);
                    return self.set_path(&mut items[i], rest, value);
                }
                _ => {
                    let map = std::mem::take(items)
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect();
                    *slot = Value::Object(map);
                }
            }
        }

        match slot {
            Value::Object(map) => {
                let key = match key {
                    PathKey::Key(k) => key_string(k),
                    PathKey::Push => map
                        .keys()
                        .filter_map(|k| k.parse::<i64>().ok())
                        .max()
                        .map_or(0, |n| n + 1)
                        .to_string(),
                };
                let entry = map.entry(key).or_insert(Value::Null);
                self.set_path(entry, rest, value)
            }
            _ => Err(self.warning("Cannot use a scalar value as an array")),
        }
    }

    fn call_named(&mut self, name: &str, args: Vec<Value>) -> CmsResult<Value> {
        let lowered = name.to_ascii_lowercase();
        if let Some(result) = self.call_builtin(&lowered, &args)? {
            return Ok(result);
        }
        match self.functions.get(&lowered) {
            Some(def) => {
                let def = Arc::clone(def);
                self.call_function(&def, args)
            }
            None => Err(self.fatal(format!("Call to undefined function {name}()"))),
        }
    }

    /// `Ok(None)` when `name` is not a builtin.
    fn call_builtin(&self, name: &str, args: &[Value]) -> CmsResult<Option<Value>> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
        let text = |i: usize| to_display(&arg(i));

        let result = match name {
            "h" | "htmlspecialchars" => Value::String(escape_html(&text(0))),
            "strtoupper" => Value::String(text(0).to_uppercase()),
            "strtolower" => Value::String(text(0).to_lowercase()),
            "trim" => Value::String(text(0).trim().to_string()),
            "strlen" => Value::from(text(0).len()),
            "count" => Value::from(count(&arg(0))),
            "implode" => {
                let (glue, pieces) = match (arg(0), arg(1)) {
                    (pieces @ (Value::Array(_) | Value::Object(_)), glue) => (to_display(&glue), pieces),
                    (glue, pieces) => (to_display(&glue), pieces),
                };
                let parts: Vec<String> = match pieces {
                    Value::Array(items) => items.iter().map(to_display).collect(),
                    Value::Object(map) => map.values().map(to_display).collect(),
                    _ => return Err(self.warning("implode(): Invalid arguments passed")),
                };
                Value::String(parts.join(&glue))
            }
            "json_encode" => Value::String(serde_json::to_string(&arg(0))?),
            "number_format" => {
                let decimals = as_integer(&arg(1))
                    .and_then(|d| usize::try_from(d).ok())
                    .unwrap_or(0);
                let point = args.get(2).map_or_else(|| ".".to_string(), to_display);
                let separator = args.get(3).map_or_else(|| ",".to_string(), to_display);
                Value::String(number_format(to_number(&arg(0)), decimals, &point, &separator))
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    /// `$this->method(...)` onto the service surface.
    fn call_service(&self, method: &str, args: &[Value]) -> CmsResult<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
        let opt_text = |i: usize| args.get(i).filter(|v| !v.is_null()).map(to_display);
        let services = self.services;

        match method.to_ascii_lowercase().as_str() {
            "render_partial" => {
                let name = to_display(&arg(0));
                let params = self.scope_arg(&arg(1))?;
                let options = match arg(2) {
                    Value::Object(map) => serde_json::from_value::<PartialOptions>(Value::Object(map))
                        .map_err(|e| self.fatal(format!("Invalid partial options: {e}")))?,
                    _ => PartialOptions::default(),
                };
                Ok(services
                    .render_partial(&name, params, options)?
                    .map_or(Value::Null, Value::String))
            }
            "render_page" => services.render_page().map(|()| Value::Null),
            "render_head" => services.render_head().map(|()| Value::Null),
            "render_block" => services
                .render_block(&to_display(&arg(0)), opt_text(1).as_deref())
                .map(|()| Value::Null),
            "request_param" => {
                let index = as_integer(&arg(0)).unwrap_or(0);
                Ok(services
                    .request_param(index, opt_text(1).as_deref())
                    .map_or(Value::Null, Value::String))
            }
            "global_content" => Ok(services
                .global_content(&to_display(&arg(0)))
                .map_or(Value::Null, Value::String)),
            "redirect_url" => {
                let index = as_integer(&arg(1)).unwrap_or(0);
                Ok(Value::String(services.redirect_url(&to_display(&arg(0)), index)))
            }
            "js_combine" | "css_combine" => {
                let files = file_list(&arg(0));
                let options: CombineOptions = match arg(1) {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => CombineOptions::new(),
                };
                let show_tag = args.get(2).map_or(true, is_truthy);
                let output = if method.eq_ignore_ascii_case("js_combine") {
                    services.js_combine(&files, &options, show_tag)
                } else {
                    services.css_combine(&files, &options, show_tag)
                };
                Ok(Value::String(output))
            }
            _ => Err(self.fatal(format!("Call to undefined method Controller::{method}()"))),
        }
    }

    fn scope_arg(&self, value: &Value) -> CmsResult<Scope> {
        match value {
            Value::Object(map) => Ok(map.clone()),
            Value::Null => Ok(Scope::new()),
            Value::Array(items) if items.is_empty() => Ok(Scope::new()),
            _ => Err(self.warning("Partial parameters must be an associative array")),
        }
    }
}

fn file_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(to_display).collect(),
        Value::Object(map) => map.values().map(to_display).collect(),
        Value::Null => Vec::new(),
        other => vec![to_display(other)],
    }
}

/// An integer operand for exact arithmetic: integral numbers and integer strings.
fn as_exact_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Null => Some(0),
        _ => None,
    }
}

fn is_int_key(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.parse::<i64>().is_ok_and(|n| n.to_string() == s))
}
