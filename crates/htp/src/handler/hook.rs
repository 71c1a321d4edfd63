//! The hook catalogue and the handler registry.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::trace;

use crate::handler::{Artifact, HookContext};
use crate::protocol::{Direction, HookResult};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// What a handler returns: a control signal, or the reason it could not run to completion.
pub type HandlerResult = Result<HookResult, BoxError>;

/// A registered handler. The registry owns it until it is replaced or removed.
pub type Handler<U> = Box<dyn FnMut(&mut HookContext<'_, U>, &Artifact<'_>) -> HandlerResult>;

/// The fixed set of points where handlers can observe or steer parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPoint {
    RequestStart,
    RequestLine,
    /// Fires after the target is parsed and before it is normalized.
    RequestUriNormalize,
    RequestHeaderData,
    /// Fires after the full header block is parsed and sanity checked.
    RequestHeaders,
    RequestBodyData,
    RequestFileData,
    RequestTrailerData,
    RequestTrailer,
    RequestComplete,
    ResponseStart,
    ResponseLine,
    ResponseHeaderData,
    ResponseHeaders,
    ResponseBodyData,
    ResponseTrailerData,
    ResponseTrailer,
    ResponseComplete,
    /// Fires once both sides of a transaction are complete.
    TransactionComplete,
    Log,
}

impl HookPoint {
    pub const COUNT: usize = 20;

    pub const ALL: [HookPoint; HookPoint::COUNT] = [
        HookPoint::RequestStart,
        HookPoint::RequestLine,
        HookPoint::RequestUriNormalize,
        HookPoint::RequestHeaderData,
        HookPoint::RequestHeaders,
        HookPoint::RequestBodyData,
        HookPoint::RequestFileData,
        HookPoint::RequestTrailerData,
        HookPoint::RequestTrailer,
        HookPoint::RequestComplete,
        HookPoint::ResponseStart,
        HookPoint::ResponseLine,
        HookPoint::ResponseHeaderData,
        HookPoint::ResponseHeaders,
        HookPoint::ResponseBodyData,
        HookPoint::ResponseTrailerData,
        HookPoint::ResponseTrailer,
        HookPoint::ResponseComplete,
        HookPoint::TransactionComplete,
        HookPoint::Log,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            HookPoint::RequestStart => "request_start",
            HookPoint::RequestLine => "request_line",
            HookPoint::RequestUriNormalize => "request_uri_normalize",
            HookPoint::RequestHeaderData => "request_header_data",
            HookPoint::RequestHeaders => "request_headers",
            HookPoint::RequestBodyData => "request_body_data",
            HookPoint::RequestFileData => "request_file_data",
            HookPoint::RequestTrailerData => "request_trailer_data",
            HookPoint::RequestTrailer => "request_trailer",
            HookPoint::RequestComplete => "request_complete",
            HookPoint::ResponseStart => "response_start",
            HookPoint::ResponseLine => "response_line",
            HookPoint::ResponseHeaderData => "response_header_data",
            HookPoint::ResponseHeaders => "response_headers",
            HookPoint::ResponseBodyData => "response_body_data",
            HookPoint::ResponseTrailerData => "response_trailer_data",
            HookPoint::ResponseTrailer => "response_trailer",
            HookPoint::ResponseComplete => "response_complete",
            HookPoint::TransactionComplete => "transaction_complete",
            HookPoint::Log => "log",
        }
    }

    /// The direction whose parsing fires this hook, if it belongs to one.
    pub fn direction(self) -> Option<Direction> {
        match self {
            HookPoint::RequestStart
            | HookPoint::RequestLine
            | HookPoint::RequestUriNormalize
            | HookPoint::RequestHeaderData
            | HookPoint::RequestHeaders
            | HookPoint::RequestBodyData
            | HookPoint::RequestFileData
            | HookPoint::RequestTrailerData
            | HookPoint::RequestTrailer
            | HookPoint::RequestComplete => Some(Direction::Request),
            HookPoint::ResponseStart
            | HookPoint::ResponseLine
            | HookPoint::ResponseHeaderData
            | HookPoint::ResponseHeaders
            | HookPoint::ResponseBodyData
            | HookPoint::ResponseTrailerData
            | HookPoint::ResponseTrailer
            | HookPoint::ResponseComplete => Some(Direction::Response),
            HookPoint::TransactionComplete | HookPoint::Log => None,
        }
    }

    /// Returns true for the streaming hooks that may fire several times per transaction.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            HookPoint::RequestHeaderData
                | HookPoint::RequestBodyData
                | HookPoint::RequestFileData
                | HookPoint::RequestTrailerData
                | HookPoint::ResponseHeaderData
                | HookPoint::ResponseBodyData
                | HookPoint::ResponseTrailerData
        )
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handler that could not run to completion, by returning an error or by panicking.
#[derive(Debug, Error)]
#[error("hook {point} failed: {source}")]
pub struct HookFault {
    point: HookPoint,
    panicked: bool,
    #[source]
    source: BoxError,
}

impl HookFault {
    pub(crate) fn failed(point: HookPoint, source: BoxError) -> Self {
        Self { point, panicked: false, source }
    }

    pub(crate) fn panicked(point: HookPoint, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "handler panicked".to_string()
        };
        Self { point, panicked: true, source: message.into() }
    }

    pub fn point(&self) -> HookPoint {
        self.point
    }

    /// Returns true if the handler panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        self.panicked
    }

    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// One slot per [`HookPoint`], each holding at most one handler.
pub struct Hooks<U> {
    slots: [Option<Handler<U>>; HookPoint::COUNT],
    extract_files: bool,
}

impl<U> Default for Hooks<U> {
    fn default() -> Self {
        Self { slots: std::array::from_fn(|_| None), extract_files: false }
    }
}

impl<U> fmt::Debug for Hooks<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("registered", &self.registered().collect::<Vec<_>>())
            .field("extract_files", &self.extract_files)
            .finish()
    }
}

impl<U> Hooks<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `point`, dropping the handler it replaces.
    pub fn set(&mut self, point: HookPoint, handler: Handler<U>) {
        if self.slots[point.index()].replace(handler).is_some() {
            trace!(hook = %point, "replaced hook handler");
        }
    }

    /// Removes the handler of `point`. Returns true if there was one.
    pub fn remove(&mut self, point: HookPoint) -> bool {
        if point == HookPoint::RequestFileData {
            self.extract_files = false;
        }
        self.slots[point.index()].take().is_some()
    }

    pub fn is_registered(&self, point: HookPoint) -> bool {
        self.slots[point.index()].is_some()
    }

    pub fn registered(&self) -> impl Iterator<Item = HookPoint> + '_ {
        HookPoint::ALL.into_iter().filter(|point| self.is_registered(*point))
    }

    pub(crate) fn set_extract_files(&mut self, extract: bool) {
        self.extract_files = extract;
    }

    /// Whether uploaded files are written to disk while being reported.
    pub fn extract_files(&self) -> bool {
        self.extract_files
    }

    /// Runs the handler of `point`, if any.
    ///
    /// An empty slot behaves like a handler returning [`HookResult::Declined`].
    /// A handler returning an error or panicking is reported as a [`HookFault`];
    /// the artifact is released either way once this returns.
    pub(crate) fn invoke(
        &mut self,
        point: HookPoint,
        cx: &mut HookContext<'_, U>,
        artifact: &Artifact<'_>,
    ) -> Result<HookResult, HookFault> {
        let Some(handler) = self.slots[point.index()].as_mut() else {
            return Ok(HookResult::Declined);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(cx, artifact))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) => Err(HookFault::failed(point, source)),
            Err(payload) => Err(HookFault::panicked(point, payload.as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::config::Config;

    fn invoke(hooks: &mut Hooks<()>, point: HookPoint) -> Result<HookResult, HookFault> {
        let config = Config::default();
        let mut cx = HookContext::new(point, &config, None, None);
        hooks.invoke(point, &mut cx, &Artifact::Transaction)
    }

    #[test]
    fn catalogue_is_complete() {
        assert_eq!(HookPoint::ALL.len(), HookPoint::COUNT);
        for (index, point) in HookPoint::ALL.iter().enumerate() {
            assert_eq!(point.index(), index);
        }
        assert_eq!(HookPoint::RequestUriNormalize.to_string(), "request_uri_normalize");
        assert_eq!(HookPoint::ResponseBodyData.direction(), Some(Direction::Response));
        assert_eq!(HookPoint::Log.direction(), None);
    }

    #[test]
    fn empty_slot_declines() {
        let mut hooks = Hooks::new();
        assert_eq!(invoke(&mut hooks, HookPoint::RequestLine).unwrap(), HookResult::Declined);
    }

    #[test]
    fn replacing_drops_old_handler() {
        let old_calls = Rc::new(Cell::new(0));
        let new_calls = Rc::new(Cell::new(0));
        let mut hooks = Hooks::new();

        let counter = Rc::clone(&old_calls);
        hooks.set(
            HookPoint::RequestLine,
            Box::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(HookResult::Ok)
            }),
        );
        invoke(&mut hooks, HookPoint::RequestLine).unwrap();

        let counter = Rc::clone(&new_calls);
        hooks.set(
            HookPoint::RequestLine,
            Box::new(move |_, _| {
                counter.set(counter.get() + 1);
                Ok(HookResult::Ok)
            }),
        );
        invoke(&mut hooks, HookPoint::RequestLine).unwrap();
        invoke(&mut hooks, HookPoint::RequestLine).unwrap();

        assert_eq!(old_calls.get(), 1);
        assert_eq!(new_calls.get(), 2);
        // the replaced closure, and its clone of the counter, is gone
        assert_eq!(Rc::strong_count(&old_calls), 1);
    }

    #[test]
    fn errors_and_panics_become_faults() {
        let mut hooks = Hooks::new();
        hooks.set(HookPoint::RequestHeaders, Box::new(|_, _| Err("boom".into())));
        hooks.set(HookPoint::RequestComplete, Box::new(|_, _| panic!("handler exploded")));

        let fault = invoke(&mut hooks, HookPoint::RequestHeaders).unwrap_err();
        assert_eq!(fault.point(), HookPoint::RequestHeaders);
        assert!(!fault.is_panic());
        assert_eq!(fault.cause().to_string(), "boom");

        let fault = invoke(&mut hooks, HookPoint::RequestComplete).unwrap_err();
        assert!(fault.is_panic());
        assert_eq!(fault.cause().to_string(), "handler exploded");
    }

    #[test]
    fn remove_reports_presence() {
        let mut hooks: Hooks<()> = Hooks::new();
        hooks.set(HookPoint::RequestFileData, Box::new(|_, _| Ok(HookResult::Ok)));
        hooks.set_extract_files(true);
        assert!(hooks.remove(HookPoint::RequestFileData));
        assert!(!hooks.extract_files());
        assert!(!hooks.remove(HookPoint::RequestFileData));
        assert_eq!(hooks.registered().count(), 0);
    }
}
