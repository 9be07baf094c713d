//! Exchange state machine
//!
//! Tracks one request/response exchange through its attempts:
//! `Idle -> AwaitingResponse -> Completed`, or through `TimedOut` back to
//! `AwaitingResponse` until the attempt budget is spent, then `Failed`.
//! A rejection goes straight to `Failed` without consuming a retry.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingResponse { attempt: u32 },
    TimedOut { attempt: u32 },
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    Transmit,
    Reply,
    Rejected,
    Timeout,
    LinkFault,
}

impl ExchangeState {
    pub fn next(self, event: ExchangeEvent, max_attempts: u32) -> ExchangeState {
        use ExchangeEvent::*;
        use ExchangeState::*;

        match (self, event) {
            (Idle, Transmit) => AwaitingResponse { attempt: 1 },
            (AwaitingResponse { .. }, Reply) => Completed,
            (AwaitingResponse { .. }, Rejected | LinkFault) => Failed,
            (AwaitingResponse { attempt }, Timeout) => TimedOut { attempt },
            (TimedOut { attempt }, Transmit) if attempt < max_attempts => AwaitingResponse {
                attempt: attempt + 1,
            },
            (TimedOut { .. }, Transmit) => Failed,
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Failed)
    }
}
