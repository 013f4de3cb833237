//! Session phases and the transition table.

use std::fmt;

use crate::error::{Result, ScoutError};

/// Lifecycle phase of a [`Session`](super::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase
{
    /// No round has been opened yet
    #[default]
    Created,
    /// Modules are being reported
    Reporting,
    /// The module set is final and queryable
    Ended,
    /// Finalized, with core memory attached
    Attached,
}

impl Phase
{
    /// Whether modules may be enumerated and resolved
    pub fn is_queryable(self) -> bool
    {
        matches!(self, Phase::Ended | Phase::Attached)
    }

    /// Phase reached by performing `operation` in this phase.
    ///
    /// This is the only place phase ordering is decided.
    ///
    /// | Operation | Allowed from | To |
    /// |---|---|---|
    /// | `Begin` | Created, Ended, Attached | Reporting |
    /// | `Report` | Created, Reporting | Reporting |
    /// | `End` | Created, Reporting | Ended |
    /// | `Attach` | Ended | Attached |
    /// | `Query` | Ended, Attached | unchanged |
    /// | `ReadMemory` | Attached | unchanged |
    ///
    /// ## Errors
    ///
    /// `SessionState` for every other combination.
    pub fn apply(self, operation: Operation) -> Result<Phase>
    {
        use Operation as Op;
        use Phase as P;

        match (self, operation) {
            (P::Created | P::Ended | P::Attached, Op::Begin) => Ok(P::Reporting),
            (P::Created | P::Reporting, Op::Report) => Ok(P::Reporting),
            (P::Created | P::Reporting, Op::End) => Ok(P::Ended),
            (P::Ended, Op::Attach) => Ok(P::Attached),
            (P::Ended | P::Attached, Op::Query) => Ok(self),
            (P::Attached, Op::ReadMemory) => Ok(self),
            (phase, operation) => Err(ScoutError::SessionState { operation, phase }),
        }
    }
}

impl fmt::Display for Phase
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Phase::Created => "created",
            Phase::Reporting => "reporting",
            Phase::Ended => "ended",
            Phase::Attached => "attached",
        };
        f.write_str(name)
    }
}

/// Session operations subject to phase ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation
{
    Begin,
    Report,
    End,
    Attach,
    Query,
    ReadMemory,
}

impl fmt::Display for Operation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Operation::Begin => "begin",
            Operation::Report => "report",
            Operation::End => "end",
            Operation::Attach => "attach",
            Operation::Query => "query",
            Operation::ReadMemory => "read memory",
        };
        f.write_str(name)
    }
}
