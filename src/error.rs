use thiserror::Error;

/// Returned when an empty [`Function`] is called.
///
/// [`Function`]: struct.Function.html
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("bad function call")]
pub struct BadFunctionCall;
