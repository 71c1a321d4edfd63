//! The part of feeding that is the same for both directions: buffering,
//! draining the event queue, and turning the outcome into a [`StreamState`].

use std::cmp;
use std::collections::VecDeque;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::connection::env::{Env, Event, Interrupt, Pause};
use crate::protocol::{Direction, HtpError, LogLevel, StreamState, TxId};

/// Input side of one direction.
#[derive(Debug)]
pub(crate) struct Stream {
    pub(crate) direction: Direction,
    /// Bytes received but not decoded yet.
    pub(crate) buf: BytesMut,
    pub(crate) pending: VecDeque<Event>,
    pub(crate) state: StreamState,
    pub(crate) consumed: usize,
    pub(crate) failure: Option<HtpError>,
}

impl Stream {
    pub(crate) fn new(direction: Direction) -> Self {
        Self {
            direction,
            buf: BytesMut::with_capacity(8 * 1024),
            pending: VecDeque::new(),
            state: StreamState::New,
            consumed: 0,
            failure: None,
        }
    }

    /// Hands queued events to the hooks, stopping at the first interruption.
    pub(crate) fn flush<U>(&mut self, env: &mut Env<'_, U>) -> Result<(), Interrupt> {
        while let Some(event) = self.pending.pop_front() {
            env.dispatch(event)?;
        }
        Ok(())
    }
}

/// One direction of a connection.
pub(crate) trait Side {
    fn stream(&mut self) -> &mut Stream;

    /// Decodes the next piece of input and queues its events.
    ///
    /// Returns `Ok(None)` when progress was made, or the reason to pause.
    fn step<U>(&mut self, env: &mut Env<'_, U>) -> Result<Option<Pause>, Interrupt>;

    /// Returns true at a message boundary.
    fn is_idle(&self) -> bool;

    /// Transaction in progress, if any.
    fn current_tx(&self) -> Option<TxId>;

    /// Drops partial message state after a failure.
    fn reset(&mut self);
}

/// Advances `side` until it runs out of input or is interrupted.
pub(crate) fn drive<S: Side, U>(side: &mut S, env: &mut Env<'_, U>) -> Result<Pause, Interrupt> {
    loop {
        side.stream().flush(env)?;
        if let Some(pause) = side.step(env)? {
            side.stream().flush(env)?;
            return Ok(pause);
        }
    }
}

/// Feeds `data` to `side` and reports the resulting state.
pub(crate) fn feed<S: Side, U>(side: &mut S, env: &mut Env<'_, U>, data: &[u8]) -> StreamState {
    let stream = side.stream();
    match stream.state {
        StreamState::Error | StreamState::Stop | StreamState::Tunnel => {
            trace!(direction = %stream.direction, state = ?stream.state, len = data.len(), "input not accepted");
            stream.consumed = 0;
            return stream.state;
        }
        StreamState::Closed => {
            warn!(direction = %stream.direction, len = data.len(), "data after close ignored");
            stream.consumed = 0;
            return stream.state;
        }
        _ => {}
    }

    stream.buf.extend_from_slice(data);
    let result = drive(side, env);
    settle(side, env, result, data.len())
}

/// Resumes a stopped direction with the input it still has.
pub(crate) fn resume<S: Side, U>(side: &mut S, env: &mut Env<'_, U>) -> StreamState {
    let stream = side.stream();
    if stream.state != StreamState::Stop {
        return stream.state;
    }
    debug!(direction = %stream.direction, pending = stream.pending.len(), "resuming");
    stream.state = StreamState::Data;

    let result = drive(side, env);
    settle(side, env, result, 0)
}

/// Works out what of the last `input_len` bytes was consumed and records the new state.
///
/// Bytes not decoded when parsing paused, up to the size of the last input, are
/// handed back: they are cut from the buffer and the host feeds them again later.
pub(crate) fn settle<S: Side, U>(
    side: &mut S,
    env: &mut Env<'_, U>,
    result: Result<Pause, Interrupt>,
    input_len: usize,
) -> StreamState {
    let tx = side.current_tx();
    let stream = side.stream();

    let unconsumed = match result {
        Ok(Pause::NeedMore) => 0,
        _ => cmp::min(stream.buf.len(), input_len),
    };
    stream.consumed = input_len - unconsumed;
    let keep = stream.buf.len() - unconsumed;
    stream.buf.truncate(keep);

    let state = match result {
        Ok(Pause::NeedMore) => StreamState::Data,
        Ok(Pause::DataOther) => StreamState::DataOther,
        Ok(Pause::Tunnel) => {
            stream.buf.clear();
            StreamState::Tunnel
        }
        Err(Interrupt::Stop) => StreamState::Stop,
        Err(Interrupt::Fail(e)) => {
            let direction = stream.direction;
            stream.buf.clear();
            stream.pending.clear();
            side.reset();

            env.log(LogLevel::Error, format!("{direction} parsing failed: {e}"), tx);
            let stream = side.stream();
            stream.failure = Some(e);
            StreamState::Error
        }
    };

    let stream = side.stream();
    trace!(direction = %stream.direction, ?state, consumed = stream.consumed, buffered = stream.buf.len(), "feed done");
    stream.state = state;
    state
}
