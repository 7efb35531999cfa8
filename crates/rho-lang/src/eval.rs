use smallvec::SmallVec;

use crate::ast::node::{
    GuardHandle, IndexRange, Node, Operand, RangeEndpoint, StagedResult, StrExpr, VecRhs,
};
use crate::error::RuntimeError;
use crate::number::{self, Number};

/// Non-local control transfer raised out of `value()`.
///
/// `Break`/`Continue` are caught by the nearest enclosing loop node;
/// `Return` unwinds all the way to the expression envelope, which reads the
/// staged results; `Violation` is fatal and surfaces to the caller.
#[derive(Debug, PartialEq)]
pub enum Interrupt {
    Break(Number),
    Continue,
    Return,
    Violation(RuntimeError),
}

pub type EvalResult = Result<Number, Interrupt>;

fn operand_value(operand: &Operand) -> EvalResult {
    match operand {
        Operand::Const(n) => Ok(*n),
        Operand::Var(var) => Ok(var.get()),
        Operand::Expr(node) => node.value(),
    }
}

/// Increments the pass counter and consults the guard. Called once per
/// iteration before the loop body runs, so a cap of N lets the body run
/// exactly N times.
fn guard_check(guard: &Option<GuardHandle>, iterations: &mut u64) -> Result<(), Interrupt> {
    if let Some(guard) = guard {
        *iterations += 1;
        if *iterations > guard.max_iterations() || !guard.check() {
            return Err(Interrupt::Violation(RuntimeError::LoopViolation {
                iterations: *iterations - 1,
            }));
        }
    }
    Ok(())
}

impl Node {
    /// Evaluates this subtree against the current bound storage.
    pub fn value(&self) -> EvalResult {
        match self {
            Node::Const(n) => Ok(*n),
            Node::Var(var) => Ok(var.get()),
            Node::VecRef(_, view) => Ok(view.front()),
            // String results travel through the text channel; the numeric
            // channel sees quiet NaN.
            Node::Str(_) => Ok(number::NAN),
            Node::Unary { op, child } => Ok(op.apply(child.value()?)),
            Node::Binary { op, lhs, rhs } => Ok(op.apply(lhs.value()?, rhs.value()?)),
            Node::UnaryVar { op, child } => Ok(op.apply(child.get())),
            Node::BinaryVV { op, lhs, rhs } => Ok(op.apply(lhs.get(), rhs.get())),
            Node::BinaryVC { op, lhs, rhs } => Ok(op.apply(lhs.get(), *rhs)),
            Node::BinaryCV { op, lhs, rhs } => Ok(op.apply(*lhs, rhs.get())),
            Node::BinaryVN { op, lhs, rhs } => Ok(op.apply(lhs.get(), rhs.value()?)),
            Node::BinaryNV { op, lhs, rhs } => Ok(op.apply(lhs.value()?, rhs.get())),
            Node::BinaryCN { op, lhs, rhs } => Ok(op.apply(*lhs, rhs.value()?)),
            Node::BinaryNC { op, lhs, rhs } => Ok(op.apply(lhs.value()?, *rhs)),
            Node::FusedLeft {
                outer,
                inner,
                a,
                b,
                c,
            } => {
                let a = operand_value(a)?;
                let b = operand_value(b)?;
                let c = operand_value(c)?;
                Ok(outer.apply(inner.apply(a, b), c))
            }
            Node::FusedRight {
                outer,
                inner,
                a,
                b,
                c,
            } => {
                let a = operand_value(a)?;
                let b = operand_value(b)?;
                let c = operand_value(c)?;
                Ok(outer.apply(a, inner.apply(b, c)))
            }
            Node::FusedQuad {
                outer,
                left,
                right,
                a,
                b,
                c,
                d,
            } => {
                let a = operand_value(a)?;
                let b = operand_value(b)?;
                let c = operand_value(c)?;
                let d = operand_value(d)?;
                Ok(outer.apply(left.apply(a, b), right.apply(c, d)))
            }
            Node::AxnB { a, x, n, b } => {
                let a = operand_value(a)?;
                let x = x.get();
                let b = operand_value(b)?;
                Ok(a * x.pow(*n) + b)
            }
            Node::VecElem {
                view, index, check, ..
            } => {
                let n = index.value()?;
                let idx = n.to_int();
                if n.is_nan() || idx < 0 || idx as usize >= view.len() {
                    if *check {
                        return Err(Interrupt::Violation(RuntimeError::RangeViolation {
                            index: idx,
                            len: view.len(),
                        }));
                    }
                    return Ok(number::NAN);
                }
                Ok(view.get(idx as usize))
            }
            Node::Agg { op, view, .. } => Ok(op.apply(view)),
            Node::StrCompare { op, lhs, rhs } => {
                let lhs = lhs.eval()?;
                let rhs = rhs.eval()?;
                Ok(op.apply_ordering(lhs.cmp(&rhs)))
            }
            Node::Call { entry, args } => {
                let mut values: SmallVec<[Number; 4]> = SmallVec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.value()?);
                }
                Ok(entry.call(&values))
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.value()?.is_true() {
                    then.value()
                } else {
                    match otherwise {
                        Some(node) => node.value(),
                        None => Ok(number::NAN),
                    }
                }
            }
            Node::Switch { arms, default } => {
                for (cond, value) in arms {
                    if cond.value()?.is_true() {
                        return value.value();
                    }
                }
                match default {
                    Some(node) => node.value(),
                    None => Ok(number::NAN),
                }
            }
            Node::While { cond, body, guard } => {
                let mut result = number::NAN;
                let mut iterations = 0u64;
                while cond.value()?.is_true() {
                    guard_check(guard, &mut iterations)?;
                    match body.value() {
                        Ok(v) => result = v,
                        Err(Interrupt::Break(v)) => return Ok(v),
                        Err(Interrupt::Continue) => {}
                        Err(other) => return Err(other),
                    }
                }
                Ok(result)
            }
            Node::RepeatUntil { body, cond, guard } => {
                let mut result = number::NAN;
                let mut iterations = 0u64;
                loop {
                    guard_check(guard, &mut iterations)?;
                    match body.value() {
                        Ok(v) => result = v,
                        Err(Interrupt::Break(v)) => return Ok(v),
                        Err(Interrupt::Continue) => {}
                        Err(other) => return Err(other),
                    }
                    if cond.value()?.is_true() {
                        return Ok(result);
                    }
                }
            }
            Node::For {
                init,
                cond,
                incr,
                body,
                guard,
            } => {
                if let Some(init) = init {
                    init.value()?;
                }
                let mut result = number::NAN;
                let mut iterations = 0u64;
                loop {
                    if let Some(cond) = cond {
                        if !cond.value()?.is_true() {
                            return Ok(result);
                        }
                    }
                    guard_check(guard, &mut iterations)?;
                    match body.value() {
                        Ok(v) => result = v,
                        Err(Interrupt::Break(v)) => return Ok(v),
                        Err(Interrupt::Continue) => {}
                        Err(other) => return Err(other),
                    }
                    if let Some(incr) = incr {
                        incr.value()?;
                    }
                }
            }
            Node::Block(nodes) => {
                let mut result = number::NAN;
                for node in nodes {
                    result = node.value()?;
                }
                Ok(result)
            }
            Node::Break(value) => {
                let v = match value {
                    Some(node) => node.value()?,
                    None => number::NAN,
                };
                Err(Interrupt::Break(v))
            }
            Node::Continue => Err(Interrupt::Continue),
            Node::Return { args, slot } => {
                let mut staged = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Node::Str(se) => staged.push(StagedResult::Str(se.eval()?)),
                        other => staged.push(StagedResult::Number(other.value()?)),
                    }
                }
                *slot.borrow_mut() = staged;
                Err(Interrupt::Return)
            }
            Node::Assign { target, rhs } => {
                let v = rhs.value()?;
                target.set(v);
                Ok(v)
            }
            Node::OpAssign { op, target, rhs } => {
                let v = op.apply(target.get(), rhs.value()?);
                target.set(v);
                Ok(v)
            }
            Node::VecElemAssign {
                view,
                index,
                op,
                rhs,
                check,
                ..
            } => {
                let n = index.value()?;
                let idx = n.to_int();
                if n.is_nan() || idx < 0 || idx as usize >= view.len() {
                    if *check {
                        return Err(Interrupt::Violation(RuntimeError::RangeViolation {
                            index: idx,
                            len: view.len(),
                        }));
                    }
                    // Unchecked out-of-bounds writes are dropped.
                    let _ = rhs.value()?;
                    return Ok(number::NAN);
                }
                let idx = idx as usize;
                let v = match op {
                    Some(op) => op.apply(view.get(idx), rhs.value()?),
                    None => rhs.value()?,
                };
                view.set(idx, v);
                Ok(v)
            }
            Node::VecAssign { target, rhs, .. } => match rhs {
                VecRhs::Vector(_, src) => {
                    target.reconcile_size(src);
                    target.assign_from(src);
                    Ok(target.front())
                }
                VecRhs::VectorOp(op, _, src) => {
                    target.reconcile_size(src);
                    target.combine_from(src, |a, b| op.apply(a, b));
                    Ok(target.front())
                }
                VecRhs::Scalar(node) => {
                    let v = node.value()?;
                    target.fill(v);
                    Ok(v)
                }
                VecRhs::ScalarOp(op, node) => {
                    let v = node.value()?;
                    target.combine_scalar(v, |a, b| op.apply(a, b));
                    Ok(target.front())
                }
                VecRhs::List(nodes) => {
                    for (i, node) in nodes.iter().enumerate().take(target.len()) {
                        target.set(i, node.value()?);
                    }
                    Ok(target.front())
                }
            },
            Node::StrAssign { target, rhs } => {
                let s = rhs.eval()?;
                target.set(s);
                Ok(number::NAN)
            }
            Node::Swap { a, b } => {
                let tmp = a.get();
                a.set(b.get());
                b.set(tmp);
                Ok(a.get())
            }
        }
    }
}

impl StrExpr {
    /// Produces the string value, evaluating any embedded index
    /// expressions.
    pub fn eval(&self) -> Result<String, Interrupt> {
        match self {
            StrExpr::Lit(s) => Ok(s.clone()),
            StrExpr::Var(var) => Ok(var.get()),
            StrExpr::Concat(lhs, rhs) => {
                let mut s = lhs.eval()?;
                s.push_str(&rhs.eval()?);
                Ok(s)
            }
            StrExpr::Slice { base, range, check } => {
                let s = base.eval()?;
                let chars: Vec<char> = s.chars().collect();
                match range.resolve(chars.len(), *check)? {
                    Some((start, end)) => Ok(chars[start..=end].iter().collect()),
                    None => Ok(String::new()),
                }
            }
        }
    }
}

impl IndexRange {
    /// Resolves both endpoints against a buffer of `len` elements. Returns
    /// `None` for an empty selection. An explicit endpoint outside the
    /// buffer is a range violation when checking is on (also for `len` 0);
    /// without checking, endpoints are clamped into bounds instead.
    pub fn resolve(&self, len: usize, check: bool) -> Result<Option<(usize, usize)>, Interrupt> {
        fn endpoint(ep: &RangeEndpoint) -> Result<Option<i64>, Interrupt> {
            match ep {
                RangeEndpoint::Const(i) => Ok(Some(*i as i64)),
                RangeEndpoint::Expr(node) => Ok(Some(node.value()?.to_int())),
                RangeEndpoint::Open => Ok(None),
            }
        }

        let max = len as i64 - 1;
        let start = endpoint(&self.start)?;
        let end = endpoint(&self.end)?;
        let out = |v: &i64| *v < 0 || *v > max;
        if start.as_ref().is_some_and(out) || end.as_ref().is_some_and(out) {
            if check {
                let index = match start {
                    Some(v) if out(&v) => v,
                    _ => end.unwrap_or(max),
                };
                return Err(Interrupt::Violation(RuntimeError::RangeViolation {
                    index,
                    len,
                }));
            }
            if len == 0 {
                return Ok(None);
            }
            let start = start.unwrap_or(0).clamp(0, max);
            let end = end.unwrap_or(max).clamp(0, max);
            return Ok((start <= end).then_some((start as usize, end as usize)));
        }
        // Open endpoints default to the ends of the buffer; for an empty
        // buffer that is the empty selection.
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(max);
        Ok((start <= end).then_some((start as usize, end as usize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shared;
    use crate::ast::parser::{Parser, ParserSettings};
    use crate::guard::CountLimit;
    use crate::lexer::Lexer;
    use crate::symbol_table::SymbolTable;
    use rstest::rstest;

    fn eval_with(input: &str, table: &mut SymbolTable) -> EvalResult {
        let tokens = Lexer::tokenize(input).unwrap();
        let mut parser = Parser::new(tokens.iter(), table, ParserSettings::default());
        let node = parser.parse().unwrap();
        let result = node.value();
        crate::ast::dispose::dispose(node);
        result
    }

    fn eval(input: &str) -> Number {
        let mut table = SymbolTable::with_builtins();
        eval_with(input, &mut table).unwrap()
    }

    #[rstest]
    #[case("2 + 3 * 4", 14.0)]
    #[case("(2 + 3) * 4", 20.0)]
    #[case("2 ^ 3 ^ 2", 512.0)]
    #[case("-2 ^ 2", -4.0)]
    #[case("7 % 4", 3.0)]
    #[case("1 < 2 and 2 < 3", 1.0)]
    #[case("1 < 2 nand 2 < 3", 0.0)]
    #[case("1 > 2 ? 10 : 20", 20.0)]
    #[case("abs(-3) + max(1, 5, 2)", 8.0)]
    #[case("clamp(0, 15, 10)", 10.0)]
    fn test_arithmetic(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(eval(input), Number::new(expected));
    }

    #[test]
    fn test_assignment_binds_storage() {
        let mut table = SymbolTable::with_builtins();
        assert_eq!(
            eval_with("x := 5; x + 1", &mut table).unwrap(),
            Number::new(6.0)
        );
        assert_eq!(table.value_of("x"), Some(Number::new(5.0)));
    }

    #[test]
    fn test_while_loop() {
        let mut table = SymbolTable::with_builtins();
        let v = eval_with("i := 0; s := 0; while (i < 5) { i += 1; s += i }; s", &mut table);
        assert_eq!(v.unwrap(), Number::new(15.0));
    }

    #[test]
    fn test_repeat_until_runs_body_at_least_once() {
        let mut table = SymbolTable::with_builtins();
        eval_with("i := 10; repeat i += 1; until (i > 0)", &mut table).unwrap();
        assert_eq!(table.value_of("i"), Some(Number::new(11.0)));
    }

    #[test]
    fn test_break_carries_value() {
        let mut table = SymbolTable::with_builtins();
        let v = eval_with(
            "i := 0; while (1) { i += 1; if (i >= 3) break[i * 10] }",
            &mut table,
        );
        assert_eq!(v.unwrap(), Number::new(30.0));
    }

    #[test]
    fn test_continue_skips_rest_of_body() {
        let mut table = SymbolTable::with_builtins();
        let v = eval_with(
            "s := 0; for (i := 0; i < 5; i += 1) { if (i % 2 == 0) continue; s += i }; s",
            &mut table,
        );
        assert_eq!(v.unwrap(), Number::new(4.0));
    }

    #[test]
    fn test_loop_guard_violation_after_exact_iterations() {
        let mut table = SymbolTable::with_builtins();
        let tokens = Lexer::tokenize("var i; for (i := 0; i < 5; i += 1) {}").unwrap();
        let settings = ParserSettings {
            guard: Some(Shared::new(CountLimit::new(3))),
            ..ParserSettings::default()
        };
        let mut parser = Parser::new(tokens.iter(), &mut table, settings);
        let node = parser.parse().unwrap();
        assert_eq!(
            node.value(),
            Err(Interrupt::Violation(RuntimeError::LoopViolation {
                iterations: 3
            }))
        );
        // The body ran exactly three times before the guard fired.
        assert_eq!(table.value_of("i"), Some(Number::new(3.0)));
        crate::ast::dispose::dispose(node);
    }

    #[test]
    fn test_switch_evaluation() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(-3.0));
        let v = eval_with(
            "switch { case x < 0 : -1; case x > 0 : 1; default : 0; }",
            &mut table,
        );
        assert_eq!(v.unwrap(), Number::new(-1.0));
    }

    #[test]
    fn test_string_concat_value_is_nan() {
        let mut table = SymbolTable::with_builtins();
        assert!(eval_with("'abc' + 'def'", &mut table).unwrap().is_nan());
    }

    #[test]
    fn test_string_compare() {
        assert_eq!(eval("'abc' < 'abd'"), Number::new(1.0));
        assert_eq!(eval("'abc' == 'abc'"), Number::new(1.0));
    }

    #[test]
    fn test_string_slice() {
        let mut table = SymbolTable::with_builtins();
        eval_with("var s := 'hello'[1:3]", &mut table).unwrap();
        assert_eq!(table.string("s").unwrap().get(), "ell");
    }

    #[test]
    fn test_string_slice_violation_when_checked() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("i", Number::new(9.0));
        let v = eval_with("var s := 'abc'[i:]", &mut table);
        assert!(matches!(
            v,
            Err(Interrupt::Violation(RuntimeError::RangeViolation { .. }))
        ));
    }

    #[test]
    fn test_empty_string_slice_checks_explicit_endpoints() {
        let mut table = SymbolTable::with_builtins();
        let v = eval_with("var s0 := ''; var s := s0[0 : 0]", &mut table);
        assert!(matches!(
            v,
            Err(Interrupt::Violation(RuntimeError::RangeViolation { index: 0, len: 0 }))
        ));
    }

    #[test]
    fn test_empty_string_open_slice_is_empty() {
        let mut table = SymbolTable::with_builtins();
        eval_with("var s0 := ''; var s := s0[:]", &mut table).unwrap();
        assert_eq!(table.string("s").unwrap().get(), "");
    }

    #[test]
    fn test_vector_ops() {
        let mut table = SymbolTable::with_builtins();
        table.add_vector(
            "v",
            crate::vector::VectorView::from_values(vec![
                Number::new(1.0),
                Number::new(2.0),
                Number::new(3.0),
            ]),
        );
        assert_eq!(eval_with("sum(v)", &mut table).unwrap(), Number::new(6.0));
        assert_eq!(eval_with("v[1]", &mut table).unwrap(), Number::new(2.0));
        eval_with("v[1] := 10", &mut table).unwrap();
        assert_eq!(eval_with("sum(v)", &mut table).unwrap(), Number::new(14.0));
        eval_with("v += 1", &mut table).unwrap();
        assert_eq!(eval_with("sum(v)", &mut table).unwrap(), Number::new(17.0));
    }

    #[test]
    fn test_vector_element_violation_when_checked() {
        let mut table = SymbolTable::with_builtins();
        table.add_vector("v", crate::vector::VectorView::new(3));
        table.add_variable("i", Number::new(7.0));
        assert!(matches!(
            eval_with("v[i]", &mut table),
            Err(Interrupt::Violation(RuntimeError::RangeViolation { index: 7, len: 3 }))
        ));
    }

    #[test]
    fn test_return_stages_results() {
        let mut table = SymbolTable::with_builtins();
        let tokens = Lexer::tokenize("return [1 + 1, 'ab' + 'c']").unwrap();
        let mut parser = Parser::new(tokens.iter(), &mut table, ParserSettings::default());
        let node = parser.parse().unwrap();
        let slot = parser.result_slot();
        assert_eq!(node.value(), Err(Interrupt::Return));
        assert_eq!(
            *slot.borrow(),
            vec![
                StagedResult::Number(Number::new(2.0)),
                StagedResult::Str("abc".to_string())
            ]
        );
        crate::ast::dispose::dispose(node);
    }

    #[test]
    fn test_swap() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("a", Number::new(1.0));
        table.add_variable("b", Number::new(2.0));
        eval_with("a <=> b", &mut table).unwrap();
        assert_eq!(table.value_of("a"), Some(Number::new(2.0)));
        assert_eq!(table.value_of("b"), Some(Number::new(1.0)));
    }

    #[test]
    fn test_division_by_zero_is_total() {
        assert!(eval("0 / 0").is_nan());
        assert_eq!(eval("1 / 0"), Number::new(f64::INFINITY));
    }
}
