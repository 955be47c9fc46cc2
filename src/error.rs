// ============================================================
// Error taxonomy
// ============================================================
// Two failure kinds originate inside the numeric engine:
//
//   Precondition         — bad shapes, ranks, widths, temperatures.
//                          Raised before any computation runs.
//   NumericalInstability — a NaN/Inf loss or gradient norm. Raised
//                          before the parameter update is applied, so
//                          corrupted values never reach the model.
//
// Collaborator I/O failures travel as anyhow errors with context.
// Cancellation is an outcome, not an error (see ml::controller).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("numerical instability in epoch {epoch}, window {window}: {quantity} is {value}")]
    NumericalInstability {
        epoch:    usize,
        window:   usize,
        quantity: &'static str,
        value:    f64,
    },
}

impl EngineError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        EngineError::Precondition(msg.into())
    }
}

/// Fail with a precondition error unless `cond` holds.
macro_rules! ensure_precondition {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::EngineError::Precondition(format!($($arg)+)).into());
        }
    };
}

pub(crate) use ensure_precondition;
