//! Tree-walking evaluator.
//!
//! Statements execute against a current-scope pointer into the
//! environment arena. Control flow (return/break/continue) travels as a
//! tagged result from statement execution; each loop or call boundary
//! inspects the tag and either consumes it or passes it outward. Every
//! top-level statement is an error boundary: a runtime error or a leaked
//! control-flow effect is recorded and the next statement still runs.

use std::mem;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expression, Literal, Statement, UnaryOp};
use crate::environment::{EnvArena, EnvId};
use crate::value::{FunctionObject, RuntimeError, Value};

/// Control-flow marker produced by statement execution.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    envs: EnvArena,
    current: EnvId,
    errors: Vec<RuntimeError>,
}

impl Interpreter {
    pub fn new() -> Self {
        let envs = EnvArena::new();
        let current = envs.global();
        Self {
            envs,
            current,
            errors: Vec::new(),
        }
    }

    /// The host registers named values (native callables) here before
    /// execution begins.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let global = self.envs.global();
        self.envs.define(global, name, value);
    }

    pub fn execute(&mut self, statements: &[Statement]) {
        for statement in statements {
            match self.exec_statement(statement) {
                Ok(Flow::Normal) => {}
                Ok(Flow::Return(_)) => self.errors.push(RuntimeError::ReturnOutsideFunction),
                Ok(Flow::Break) => self.errors.push(RuntimeError::BreakOutsideLoop),
                Ok(Flow::Continue) => self.errors.push(RuntimeError::ContinueOutsideLoop),
                Err(error) => self.errors.push(error),
            }
        }
    }

    pub fn errors(&self) -> &[RuntimeError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn exec_statement(&mut self, statement: &Statement) -> Result<Flow, RuntimeError> {
        match statement {
            Statement::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Statement::Assign { name, value } => {
                let value = self.eval(value)?;
                self.envs.assign(self.current, name, value);
                Ok(Flow::Normal)
            }
            Statement::Block(statements) => {
                let scope = self.envs.child(self.current);
                self.exec_in_scope(scope, |interp| interp.exec_sequence(statements))
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.exec_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_statement(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::While { condition, body } => {
                while self.eval(condition)?.is_truthy() {
                    match self.exec_statement(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::For {
                init,
                condition,
                step,
                body,
            } => {
                // The whole loop gets one scope so the initializer's
                // binding stays local to it.
                let scope = self.envs.child(self.current);
                self.exec_in_scope(scope, |interp| {
                    interp.exec_for(init.as_deref(), condition.as_ref(), step.as_deref(), body)
                })
            }
            Statement::ForEach {
                variable,
                iterable,
                body,
            } => self.exec_foreach(variable, iterable, body),
            Statement::FunctionDef { name, params, body } => {
                let function = FunctionObject {
                    params: params.clone(),
                    body: Rc::clone(body),
                    closure: self.current,
                };
                self.envs
                    .define(self.current, name, Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
        }
    }

    fn exec_sequence(&mut self, statements: &[Statement]) -> Result<Flow, RuntimeError> {
        for statement in statements {
            match self.exec_statement(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Runs `body` with `scope` as the current environment, restoring the
    /// previous scope on every exit path.
    fn exec_in_scope<T>(
        &mut self,
        scope: EnvId,
        body: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let previous = mem::replace(&mut self.current, scope);
        let result = body(self);
        self.current = previous;
        result
    }

    fn exec_for(
        &mut self,
        init: Option<&Statement>,
        condition: Option<&Expression>,
        step: Option<&Statement>,
        body: &Statement,
    ) -> Result<Flow, RuntimeError> {
        if let Some(init) = init {
            self.exec_statement(init)?;
        }
        loop {
            if let Some(condition) = condition
                && !self.eval(condition)?.is_truthy()
            {
                break;
            }
            match self.exec_statement(body)? {
                // Continue still runs the step clause.
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
            if let Some(step) = step {
                self.exec_statement(step)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_foreach(
        &mut self,
        variable: &str,
        iterable: &Expression,
        body: &Statement,
    ) -> Result<Flow, RuntimeError> {
        let values = match self.eval(iterable)? {
            Value::Array(values) => values,
            other => {
                return Err(RuntimeError::ForEachNotArray {
                    got: other.type_name(),
                });
            }
        };

        // Snapshot so mutation of the array inside the body cannot alter
        // the traversal (or hold a borrow across it).
        let snapshot: Vec<Value> = values.borrow().clone();
        for item in snapshot {
            let scope = self.envs.child(self.current);
            self.envs.define(scope, variable, item);
            match self.exec_in_scope(scope, |interp| interp.exec_statement(body))? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expression) -> Result<Value, RuntimeError> {
        match expr {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Nil => Value::Nil,
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Int(value) => Value::Int(*value),
                Literal::Float(value) => Value::Float(*value),
                Literal::Str(value) => Value::Str(value.clone()),
            }),
            Expression::Variable(name) => {
                self.envs
                    .get(self.current, name)
                    .ok_or_else(|| RuntimeError::UndefinedVariable {
                        name: name.clone(),
                    })
            }
            Expression::Binary { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                apply_binary(&left, *op, &right)
            }
            Expression::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => operand.neg(),
                    UnaryOp::Not => Ok(operand.not()),
                }
            }
            Expression::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element)?);
                }
                Ok(Value::array(values))
            }
            Expression::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg)?);
                }
                self.call_value(callee, evaluated)
            }
            Expression::Member { object, name } => {
                let object = self.eval(object)?;
                object.member_get(name)
            }
            Expression::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                object.index_get(&index)
            }
        }
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Native(func) => func(&args),
            Value::Function(func) => {
                if args.len() != func.params.len() {
                    return Err(RuntimeError::ArityMismatch {
                        expected: func.params.len(),
                        found: args.len(),
                    });
                }
                let scope = self.envs.child(func.closure);
                for (param, value) in func.params.iter().zip(args) {
                    self.envs.define(scope, param.as_str(), value);
                }
                let flow =
                    self.exec_in_scope(scope, |interp| interp.exec_statement(&func.body))?;
                match flow {
                    Flow::Normal => Ok(Value::Nil),
                    Flow::Return(value) => Ok(value),
                    // No loop inside the function consumed the effect and
                    // it cannot cross the call boundary.
                    Flow::Break => Err(RuntimeError::BreakOutsideLoop),
                    Flow::Continue => Err(RuntimeError::ContinueOutsideLoop),
                }
            }
            other => Err(RuntimeError::NotCallable {
                type_name: other.type_name(),
            }),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_binary(left: &Value, op: BinaryOp, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Add => left.add(right),
        BinaryOp::Sub => left.sub(right),
        BinaryOp::Mul => left.mul(right),
        BinaryOp::Div => left.div(right),
        BinaryOp::Mod => left.rem(right),
        BinaryOp::Equal => Ok(Value::Bool(left == right)),
        BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
        BinaryOp::Less => Ok(Value::Bool(left.less_than(right)?)),
        BinaryOp::LessEqual => Ok(Value::Bool(left.less_equal(right)?)),
        BinaryOp::Greater => Ok(Value::Bool(left.greater_than(right)?)),
        BinaryOp::GreaterEqual => Ok(Value::Bool(left.greater_equal(right)?)),
        // Both sides are already evaluated: the logical operators combine
        // truthiness without short-circuiting.
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;
    use std::cell::RefCell;

    /// Runs a script with a capturing `Print`, returning printed lines and
    /// recorded runtime errors.
    fn run(source: &str) -> (Vec<String>, Vec<RuntimeError>) {
        let (tokens, lex_errors) = lexer::tokenize(source);
        assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
        let (program, parse_errors) = parser::parse(tokens);
        assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");

        let mut interpreter = Interpreter::new();
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);
        interpreter.define_global(
            "Print",
            Value::native(move |args| {
                let line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.borrow_mut().push(line);
                Ok(Value::Nil)
            }),
        );
        interpreter.execute(&program);
        let lines = output.borrow().clone();
        (lines, interpreter.errors)
    }

    fn run_ok(source: &str) -> Vec<String> {
        let (lines, errors) = run(source);
        assert!(errors.is_empty(), "runtime errors: {errors:?}");
        lines
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        assert_eq!(run_ok("Print(1 + 2 * 3)"), vec!["7"]);
    }

    #[test]
    fn concatenates_strings() {
        assert_eq!(
            run_ok(r#"$s = "hi"; Print($s + " " + "there")"#),
            vec!["hi there"]
        );
    }

    #[test]
    fn indexes_arrays() {
        assert_eq!(run_ok("$a = [10, 20, 30]; Print($a[1])"), vec!["20"]);
    }

    #[test]
    fn while_loop_counts_and_break_exits() {
        let source = indoc! {"
            $i = 0
            while ($i < 3) {
                Print($i)
                $i = $i + 1
            }
        "};
        assert_eq!(run_ok(source), vec!["0", "1", "2"]);
    }

    #[test]
    fn for_loop_with_break_stops_accumulating() {
        let source = indoc! {"
            $x = 0
            for ($i = 1; $i <= 4; $i = $i + 1) {
                if ($i == 3) { break }
                $x = $x + $i
            }
            Print($x)
        "};
        assert_eq!(run_ok(source), vec!["3"]);
    }

    #[test]
    fn continue_in_for_loop_still_runs_the_step() {
        let source = indoc! {"
            $sum = 0
            for ($i = 0; $i < 5; $i = $i + 1) {
                if ($i % 2 == 0) { continue }
                $sum = $sum + $i
            }
            Print($sum)
        "};
        assert_eq!(run_ok(source), vec!["4"]);
    }

    #[test]
    fn for_initializer_binding_is_loop_local() {
        let (lines, errors) = run(indoc! {"
            for ($i = 0; $i < 1; $i = $i + 1) { }
            Print($i)
        "});
        assert!(lines.is_empty());
        assert_eq!(
            errors,
            vec![RuntimeError::UndefinedVariable {
                name: "$i".to_string()
            }]
        );
    }

    #[test]
    fn foreach_binds_each_element_in_its_own_scope() {
        let source = indoc! {"
            $total = 0
            foreach ($n in [1, 2, 3]) {
                $total = $total + $n
            }
            Print($total)
        "};
        assert_eq!(run_ok(source), vec!["6"]);
    }

    #[test]
    fn foreach_loop_variable_does_not_leak() {
        let (_, errors) = run(indoc! {"
            foreach ($n in [1]) { }
            Print($n)
        "});
        assert_eq!(
            errors,
            vec![RuntimeError::UndefinedVariable {
                name: "$n".to_string()
            }]
        );
    }

    #[test]
    fn foreach_supports_break_and_continue() {
        let source = indoc! {"
            foreach ($n in [1, 2, 3, 4]) {
                if ($n == 2) { continue }
                if ($n == 4) { break }
                Print($n)
            }
        "};
        assert_eq!(run_ok(source), vec!["1", "3"]);
    }

    #[test]
    fn foreach_requires_an_array() {
        let (_, errors) = run("foreach ($n in 42) { }");
        assert_eq!(errors, vec![RuntimeError::ForEachNotArray { got: "integer" }]);
    }

    #[test]
    fn functions_return_values_and_fall_through_to_nil() {
        let source = indoc! {"
            function add($a, $b) {
                return $a + $b
            }
            function noop() { }
            Print(add(4, 5))
            Print(noop())
        "};
        assert_eq!(run_ok(source), vec!["9", "null"]);
    }

    #[test]
    fn return_stops_the_function_body() {
        let source = indoc! {"
            function f() {
                return 7
                Print(\"unreachable\")
            }
            Print(f())
        "};
        assert_eq!(run_ok(source), vec!["7"]);
    }

    #[test]
    fn closures_capture_their_defining_scope() {
        let source = indoc! {"
            function makeCounter() {
                $count = 0
                function tick() {
                    $count = $count + 1
                    return $count
                }
                return tick
            }
            $counter = makeCounter()
            Print($counter())
            Print($counter())
        "};
        assert_eq!(run_ok(source), vec!["1", "2"]);
    }

    #[test]
    fn function_locals_do_not_leak_into_globals() {
        let (_, errors) = run(indoc! {"
            function f() {
                $local = 42
            }
            f()
            Print($local)
        "});
        assert_eq!(
            errors,
            vec![RuntimeError::UndefinedVariable {
                name: "$local".to_string()
            }]
        );
    }

    #[test]
    fn assignment_mutates_enclosing_bindings_from_inner_blocks() {
        let source = indoc! {"
            $x = 1
            {
                $x = 2
            }
            Print($x)
        "};
        assert_eq!(run_ok(source), vec!["2"]);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let (_, errors) = run(indoc! {"
            function f($a) { }
            f(1, 2)
        "});
        assert_eq!(
            errors,
            vec![RuntimeError::ArityMismatch {
                expected: 1,
                found: 2
            }]
        );
    }

    #[test]
    fn calling_a_non_callable_is_an_error() {
        let (_, errors) = run("$x = 1 $x()");
        assert_eq!(errors, vec![RuntimeError::NotCallable { type_name: "integer" }]);
    }

    #[test]
    fn logical_operators_evaluate_both_sides() {
        // The right-hand call runs even though the left side already
        // decides the result.
        let source = indoc! {"
            function mark() {
                $hit = $hit + 1
                return false
            }
            $hit = 0
            $r = false && mark()
            $r = true || mark()
            Print($hit)
        "};
        assert_eq!(run_ok(source), vec!["2"]);
    }

    #[test]
    fn logical_operators_combine_truthiness() {
        assert_eq!(run_ok("Print(1 && \"x\")"), vec!["true"]);
        assert_eq!(run_ok("Print(0 || [])"), vec!["false"]);
        assert_eq!(run_ok("Print(!0)"), vec!["true"]);
        assert_eq!(run_ok("Print(!!3.5)"), vec!["true"]);
    }

    #[test]
    fn runtime_errors_do_not_stop_later_statements() {
        let (lines, errors) = run(indoc! {"
            Print(10 / 0)
            Print(\"still here\")
        "});
        assert_eq!(errors, vec![RuntimeError::DivisionByZero]);
        assert_eq!(lines, vec!["still here"]);
    }

    #[test]
    fn control_flow_effects_leaking_to_top_level_are_errors() {
        let (_, errors) = run("break");
        assert_eq!(errors, vec![RuntimeError::BreakOutsideLoop]);

        let (_, errors) = run("continue");
        assert_eq!(errors, vec![RuntimeError::ContinueOutsideLoop]);

        let (_, errors) = run("return 1");
        assert_eq!(errors, vec![RuntimeError::ReturnOutsideFunction]);
    }

    #[test]
    fn break_escaping_a_function_body_is_an_error() {
        let (_, errors) = run(indoc! {"
            function f() { break }
            while (true) { f() }
        "});
        assert_eq!(errors, vec![RuntimeError::BreakOutsideLoop]);
    }

    #[test]
    fn shared_arrays_are_mutated_through_any_alias() {
        let source = indoc! {"
            function second($arr) {
                return $arr[1]
            }
            $a = [1, 2]
            $b = $a
            Print(second($b))
            Print($a == $b)
        "};
        assert_eq!(run_ok(source), vec!["2", "true"]);
    }

    #[test]
    fn nested_loops_break_only_the_innermost() {
        let source = indoc! {"
            $count = 0
            for ($i = 0; $i < 2; $i = $i + 1) {
                while (true) { break }
                $count = $count + 1
            }
            Print($count)
        "};
        assert_eq!(run_ok(source), vec!["2"]);
    }

    #[test]
    fn return_unwinds_through_nested_loops_and_blocks() {
        let source = indoc! {"
            function find($values, $wanted) {
                foreach ($v in $values) {
                    if ($v == $wanted) {
                        return \"found\"
                    }
                }
                return \"missing\"
            }
            Print(find([1, 2, 3], 2))
            Print(find([1, 2, 3], 9))
        "};
        assert_eq!(run_ok(source), vec!["found", "missing"]);
    }

    #[test]
    fn native_errors_surface_at_the_call_site() {
        let mut interpreter = Interpreter::new();
        interpreter.define_global(
            "Fail",
            Value::native(|_| Err(RuntimeError::native("device unreachable"))),
        );
        let (tokens, _) = lexer::tokenize("Fail()");
        let (program, _) = parser::parse(tokens);
        interpreter.execute(&program);
        assert_eq!(
            interpreter.errors(),
            &[RuntimeError::native("device unreachable")]
        );
    }

    #[test]
    fn literal_values_match_their_tokens() {
        assert_eq!(
            run_ok("Print(null) Print(true) Print(false) Print(42) Print(2.5) Print(\"s\")"),
            vec!["null", "true", "false", "42", "2.5", "s"]
        );
    }
}
