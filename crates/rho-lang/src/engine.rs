use crate::ast::TreeHandle;
use crate::ast::node::{GuardHandle, Node, ResultSlot, StagedResult};
use crate::ast::parser::{Parser, ParserSettings};
use crate::bridge::SymbolicBridge;
use crate::error::{Error, InnerError, RuntimeError};
use crate::eval::Interrupt;
use crate::lexer::Lexer;
use crate::number::Number;
use crate::symbol_table::SymbolTable;

/// Compilation options.
#[derive(Debug, Default)]
pub struct Options {
    /// Disable node specialization; every application compiles to a
    /// generic node. Off means slower evaluation, identical values.
    pub disable_specialization: bool,
    /// Disable runtime bounds checking on index and slice nodes.
    pub disable_range_checks: bool,
    /// Iteration/time budget attached to every loop in the expression.
    pub guard: Option<GuardHandle>,
    /// External symbolic engine serving `integrate`/`differentiate`.
    pub bridge: Option<Box<dyn SymbolicBridge>>,
}

/// Front door: turns source text plus a symbol table into a compiled
/// [`Expression`].
#[derive(Debug, Default)]
pub struct Compiler {
    options: Options,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self { options }
    }

    /// Compiles `source` against `table`. Unknown names assigned with `:=`
    /// are added to the table; everything else unknown is a compile error.
    #[allow(clippy::result_large_err)]
    pub fn compile(&self, source: &str, table: &mut SymbolTable) -> Result<Expression, Error> {
        let tokens = Lexer::tokenize(source)
            .map_err(|e| Error::from_error(source, InnerError::Lexer(e)))?;
        let settings = ParserSettings {
            synthesis: !self.options.disable_specialization,
            range_checks: !self.options.disable_range_checks,
            guard: self.options.guard.clone(),
            bridge: self.options.bridge.as_deref(),
        };
        let mut parser = Parser::new(tokens.iter(), table, settings);
        let root = parser
            .parse()
            .map_err(|e| Error::from_error(source, InnerError::Parse(e)))?;
        let slot = parser.result_slot();
        Ok(Expression {
            root: TreeHandle::new(root),
            slot,
        })
    }
}

/// A compiled expression, evaluated repeatedly against the live symbol
/// table storage it was compiled with. Dropping it tears the tree down
/// iteratively; the bound storage stays alive in the table.
#[derive(Debug)]
pub struct Expression {
    root: TreeHandle,
    slot: ResultSlot,
}

impl Expression {
    /// Runs the tree. Returns the root's numeric value, or the first
    /// number staged by `return`. String-valued roots yield quiet NaN;
    /// read them through [`Expression::text`].
    pub fn evaluate(&self) -> Result<Number, RuntimeError> {
        self.slot.borrow_mut().clear();
        let node = match self.root.root() {
            Some(node) => node,
            None => return Ok(crate::number::NAN),
        };
        match node.value() {
            Ok(v) => Ok(v),
            Err(Interrupt::Return) => {
                let staged = self.slot.borrow();
                let first = staged.iter().find_map(|r| match r {
                    StagedResult::Number(n) => Some(*n),
                    StagedResult::Str(_) => None,
                });
                Ok(first.unwrap_or(crate::number::NAN))
            }
            Err(Interrupt::Violation(e)) => Err(e),
            // Loop signals cannot escape: the parser rejects `break` and
            // `continue` outside of a loop body.
            Err(Interrupt::Break(_)) | Err(Interrupt::Continue) => unreachable!(),
        }
    }

    /// Values staged by the most recent `return`, in source order.
    pub fn results(&self) -> Vec<StagedResult> {
        self.slot.borrow().clone()
    }

    /// Evaluates the tree through the text channel. `None` when the root
    /// is not string-valued.
    pub fn text(&self) -> Result<Option<String>, RuntimeError> {
        match self.root.root() {
            Some(Node::Str(se)) => match se.eval() {
                Ok(s) => Ok(Some(s)),
                Err(Interrupt::Violation(e)) => Err(e),
                Err(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Re-serializes the tree to parseable text. Re-compiling the result
    /// yields a tree with identical evaluation order and values.
    pub fn to_text(&self) -> String {
        match self.root.root() {
            Some(node) => node.to_string(),
            None => String::new(),
        }
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shared;
    use crate::guard::CountLimit;

    fn compile(source: &str) -> (Expression, SymbolTable) {
        let mut table = SymbolTable::with_builtins();
        let expr = Compiler::new().compile(source, &mut table).unwrap();
        (expr, table)
    }

    #[test]
    fn test_compile_and_evaluate() {
        let (expr, _table) = compile("2 + 3 * 4");
        assert_eq!(expr.evaluate().unwrap(), Number::new(14.0));
    }

    #[test]
    fn test_reevaluation_reads_live_storage() {
        let mut table = SymbolTable::with_builtins();
        let x = table.add_variable("x", Number::new(1.0));
        let expr = Compiler::new().compile("x * 10", &mut table).unwrap();
        assert_eq!(expr.evaluate().unwrap(), Number::new(10.0));
        x.set(Number::new(7.0));
        assert_eq!(expr.evaluate().unwrap(), Number::new(70.0));
    }

    #[test]
    fn test_compile_error_carries_location() {
        let mut table = SymbolTable::with_builtins();
        let err = Compiler::new().compile("1 +", &mut table).unwrap_err();
        assert_eq!(err.source_code, "1 +");
    }

    #[test]
    fn test_guarded_loop_violation() {
        let mut table = SymbolTable::with_builtins();
        let compiler = Compiler::with_options(Options {
            guard: Some(Shared::new(CountLimit::new(3))),
            ..Options::default()
        });
        let expr = compiler
            .compile("var i; for (i := 0; i < 5; i += 1) {}", &mut table)
            .unwrap();
        assert_eq!(
            expr.evaluate(),
            Err(RuntimeError::LoopViolation { iterations: 3 })
        );
    }

    #[test]
    fn test_string_result_via_text_channel() {
        let (expr, _table) = compile("'abc' + 'def'");
        assert!(expr.evaluate().unwrap().is_nan());
        assert_eq!(expr.text().unwrap(), Some("abcdef".to_string()));
    }

    #[test]
    fn test_return_results() {
        let (expr, _table) = compile("return [40 + 2, 'ok']");
        assert_eq!(expr.evaluate().unwrap(), Number::new(42.0));
        assert_eq!(
            expr.results(),
            vec![
                StagedResult::Number(Number::new(42.0)),
                StagedResult::Str("ok".to_string())
            ]
        );
    }

    #[test]
    fn test_stale_results_cleared_between_evaluations() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(1.0));
        let expr = Compiler::new()
            .compile("if (x > 0) return [x]; 0", &mut table)
            .unwrap();
        expr.evaluate().unwrap();
        assert_eq!(expr.results().len(), 1);
        table
            .variable("x")
            .unwrap()
            .set(Number::new(-1.0));
        expr.evaluate().unwrap();
        assert!(expr.results().is_empty());
    }

    #[test]
    fn test_round_trip_text() {
        let mut table = SymbolTable::with_builtins();
        table.add_variable("x", Number::new(2.0));
        let expr = Compiler::new().compile("3 * x ^ 2 + 1", &mut table).unwrap();
        let text = expr.to_text();
        let reparsed = Compiler::new().compile(&text, &mut table).unwrap();
        assert_eq!(expr.evaluate().unwrap(), reparsed.evaluate().unwrap());
        assert_eq!(reparsed.to_text(), text);
    }
}
