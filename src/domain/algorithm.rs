//! Strategy forms and the context they see while a simulation runs.
//!
//! A strategy is either a set of callbacks or source text. Source text is a
//! script run once per session against the definitions namespace, with
//! trading functions (`order`, `price`, `pipeline`, ...) available.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::blotter::{Blotter, OrderId};
use crate::domain::error::{EvalError, RunError};
use crate::domain::expr::Value;
use crate::domain::expr_eval::{arity, Builtins};
use crate::domain::data_portal::DataPortal;
use crate::domain::ledger::Ledger;
use crate::domain::namespace::Namespace;
use crate::domain::performance::Performance;
use crate::domain::pipeline::{Column, ColumnData, LoaderDispatch};
use crate::ports::bundle_port::PriceField;

pub const DEFAULT_ALGO_FILENAME: &str = "<algorithm>";

pub type Callback = Box<dyn FnMut(&mut AlgoContext<'_>) -> Result<(), RunError>>;
pub type AnalyzeCallback = Box<dyn FnMut(&Performance) -> Result<(), RunError>>;

/// Live entry points. Missing callbacks are skipped.
#[derive(Default)]
pub struct AlgoCallbacks {
    pub initialize: Option<Callback>,
    pub handle_data: Option<Callback>,
    pub before_trading_start: Option<Callback>,
    pub analyze: Option<AnalyzeCallback>,
}

impl AlgoCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(
        mut self,
        f: impl FnMut(&mut AlgoContext<'_>) -> Result<(), RunError> + 'static,
    ) -> Self {
        self.initialize = Some(Box::new(f));
        self
    }

    pub fn handle_data(
        mut self,
        f: impl FnMut(&mut AlgoContext<'_>) -> Result<(), RunError> + 'static,
    ) -> Self {
        self.handle_data = Some(Box::new(f));
        self
    }

    pub fn before_trading_start(
        mut self,
        f: impl FnMut(&mut AlgoContext<'_>) -> Result<(), RunError> + 'static,
    ) -> Self {
        self.before_trading_start = Some(Box::new(f));
        self
    }

    pub fn analyze(mut self, f: impl FnMut(&Performance) -> Result<(), RunError> + 'static) -> Self {
        self.analyze = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for AlgoCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgoCallbacks")
            .field("initialize", &self.initialize.is_some())
            .field("handle_data", &self.handle_data.is_some())
            .field("before_trading_start", &self.before_trading_start.is_some())
            .field("analyze", &self.analyze.is_some())
            .finish()
    }
}

/// How the caller supplied the strategy.
#[derive(Debug)]
pub enum StrategySpec {
    Callbacks(AlgoCallbacks),
    Source { filename: String, text: String },
}

impl StrategySpec {
    pub fn source(text: impl Into<String>) -> Self {
        StrategySpec::Source {
            filename: DEFAULT_ALGO_FILENAME.to_string(),
            text: text.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        let text = fs::read_to_string(path)?;
        Ok(StrategySpec::Source {
            filename: path.display().to_string(),
            text,
        })
    }

    pub fn is_source(&self) -> bool {
        matches!(self, StrategySpec::Source { .. })
    }
}

/// The strategy as handed to the simulation: callbacks, or source text with
/// its evaluated definitions.
#[derive(Debug)]
pub enum StrategyProgram {
    Callbacks(AlgoCallbacks),
    Script {
        filename: String,
        text: String,
        namespace: Namespace,
    },
}

/// What a strategy can see and do during one session.
pub struct AlgoContext<'a> {
    pub session: NaiveDate,
    pub session_index: usize,
    sessions: &'a [NaiveDate],
    portal: &'a DataPortal,
    blotter: &'a mut dyn Blotter,
    ledger: &'a Ledger,
    dispatch: &'a LoaderDispatch,
    orders_placed: usize,
}

impl<'a> AlgoContext<'a> {
    pub fn new(
        sessions: &'a [NaiveDate],
        session_index: usize,
        portal: &'a DataPortal,
        blotter: &'a mut dyn Blotter,
        ledger: &'a Ledger,
        dispatch: &'a LoaderDispatch,
    ) -> Self {
        AlgoContext {
            session: sessions[session_index],
            session_index,
            sessions,
            portal,
            blotter,
            ledger,
            dispatch,
            orders_placed: 0,
        }
    }

    pub fn order(&mut self, symbol: &str, amount: i64) -> OrderId {
        self.orders_placed += 1;
        self.blotter.order(symbol, amount, self.session)
    }

    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.blotter.cancel(id)
    }

    pub fn open_order_count(&self) -> usize {
        self.blotter.open_orders().len()
    }

    pub fn orders_placed(&self) -> usize {
        self.orders_placed
    }

    pub fn current(&self, symbol: &str, field: PriceField) -> Option<f64> {
        self.portal.current(symbol, field, self.session)
    }

    /// The last `bar_count` sessions up to and including the current one.
    pub fn history(&self, symbol: &str, field: PriceField, bar_count: usize) -> Vec<Option<f64>> {
        self.portal.history(symbol, field, self.window(bar_count))
    }

    /// Load `column` through the run's loader dispatch.
    pub fn pipeline_column(
        &self,
        column: &Column,
        symbols: &[String],
        window: usize,
    ) -> Result<ColumnData, RunError> {
        let loader = (self.dispatch)(column)?;
        loader.load(column, self.window(window), symbols)
    }

    pub fn cash(&self) -> f64 {
        self.ledger.cash
    }

    pub fn portfolio_value(&self) -> f64 {
        self.ledger.portfolio_value()
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.ledger
            .positions
            .get(symbol)
            .map(|p| p.amount)
            .unwrap_or(0)
    }

    fn window(&self, count: usize) -> &'a [NaiveDate] {
        let sessions: &'a [NaiveDate] = self.sessions;
        let end = self.session_index + 1;
        &sessions[end.saturating_sub(count.max(1))..end]
    }
}

/// Trading functions for source-text strategies.
///
/// A loader dispatch failure is kept in `pending` so the simulation can
/// surface the original `RunError` instead of a script error.
pub struct StrategyBuiltins<'c, 'a> {
    pub ctx: &'c mut AlgoContext<'a>,
    pub pending: Option<RunError>,
}

fn symbol_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    value.as_str().ok_or_else(|| {
        EvalError::type_error(format!(
            "{function}() expected symbol str, got {}",
            value.type_name()
        ))
    })
}

fn field_arg(function: &str, value: Option<&Value>) -> Result<PriceField, EvalError> {
    match value {
        None => Ok(PriceField::Close),
        Some(v) => symbol_arg(function, v)?
            .parse()
            .map_err(|message| EvalError::Host { message }),
    }
}

fn int_arg(function: &str, value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::type_error(format!(
            "{function}() expected int, got {}",
            other.type_name()
        ))),
    }
}

fn opt_float(value: Option<f64>) -> Value {
    value.map(Value::Float).unwrap_or(Value::None)
}

impl StrategyBuiltins<'_, '_> {
    fn pipeline(&mut self, args: &[Value]) -> Result<Value, EvalError> {
        let (column, symbol, window) = match args {
            [c, s] => (c, s, 1),
            [c, s, w] => (c, s, int_arg("pipeline", w)?.max(1) as usize),
            _ => return Err(arity("pipeline", "2 or 3", args.len())),
        };
        let column: Column = symbol_arg("pipeline", column)?
            .parse()
            .map_err(|message| EvalError::Host { message })?;
        let symbol = symbol_arg("pipeline", symbol)?.to_string();
        match self.ctx.pipeline_column(&column, &[symbol], window) {
            Ok(data) => Ok(opt_float(data.last().and_then(|row| row[0]))),
            Err(err) => {
                let message = err.to_string();
                self.pending = Some(err);
                Err(EvalError::Host { message })
            }
        }
    }
}

impl Builtins for StrategyBuiltins<'_, '_> {
    fn call(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, EvalError>> {
        let result = match (name, args) {
            ("order", [symbol, amount]) => symbol_arg(name, symbol).and_then(|symbol| {
                let amount = int_arg(name, amount)?;
                Ok(Value::Int(self.ctx.order(symbol, amount) as i64))
            }),
            ("cancel", [id]) => {
                int_arg(name, id).map(|id| Value::Bool(self.ctx.cancel(id.max(0) as OrderId)))
            }
            ("price", [symbol, rest @ ..]) if rest.len() <= 1 => {
                symbol_arg(name, symbol).and_then(|symbol| {
                    let field = field_arg(name, rest.first())?;
                    Ok(opt_float(self.ctx.current(symbol, field)))
                })
            }
            ("history", [symbol, field, count]) => symbol_arg(name, symbol).and_then(|symbol| {
                let field = field_arg(name, Some(field))?;
                let count = int_arg(name, count)?.max(1) as usize;
                Ok(Value::List(
                    self.ctx
                        .history(symbol, field, count)
                        .into_iter()
                        .map(opt_float)
                        .collect(),
                ))
            }),
            ("position", [symbol]) => {
                symbol_arg(name, symbol).map(|symbol| Value::Int(self.ctx.position(symbol)))
            }
            ("cash", []) => Ok(Value::Float(self.ctx.cash())),
            ("portfolio_value", []) => Ok(Value::Float(self.ctx.portfolio_value())),
            ("session", []) => Ok(Value::Str(self.ctx.session.to_string())),
            ("pipeline", _) => self.pipeline(args),
            ("order", _) => Err(arity(name, "2", args.len())),
            ("cancel" | "position", _) => Err(arity(name, "1", args.len())),
            ("price", _) => Err(arity(name, "1 or 2", args.len())),
            ("history", _) => Err(arity(name, "3", args.len())),
            ("cash" | "portfolio_value" | "session", _) => Err(arity(name, "0", args.len())),
            _ => return None,
        };
        Some(result)
    }
}
