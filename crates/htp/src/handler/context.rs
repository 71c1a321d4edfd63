use std::fmt;

use crate::config::Config;
use crate::handler::HookPoint;
use crate::protocol::Transaction;

/// What a handler can reach while it runs.
///
/// The context borrows from the parser for the duration of one invocation. It never
/// hands out the parser itself, so a handler cannot feed data from inside a callback.
pub struct HookContext<'a, U> {
    point: HookPoint,
    config: &'a Config,
    tx: Option<&'a mut Transaction>,
    user: Option<&'a mut U>,
}

impl<'a, U> HookContext<'a, U> {
    pub(crate) fn new(
        point: HookPoint,
        config: &'a Config,
        tx: Option<&'a mut Transaction>,
        user: Option<&'a mut U>,
    ) -> Self {
        Self { point, config, tx, user }
    }

    /// The hook being fired.
    pub fn point(&self) -> HookPoint {
        self.point
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// The transaction the event belongs to. `None` for log records emitted outside a transaction.
    pub fn tx(&self) -> Option<&Transaction> {
        self.tx.as_deref()
    }

    /// Mutable access to the transaction, only granted to `request_uri_normalize`
    /// handlers so they can rewrite the parsed target before it is normalized.
    pub fn tx_mut(&mut self) -> Option<&mut Transaction> {
        if self.point == HookPoint::RequestUriNormalize {
            self.tx.as_deref_mut()
        } else {
            None
        }
    }

    /// The per-connection user context, if one is set.
    pub fn user(&self) -> Option<&U> {
        self.user.as_deref()
    }

    pub fn user_mut(&mut self) -> Option<&mut U> {
        self.user.as_deref_mut()
    }
}

impl<U> fmt::Debug for HookContext<'_, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("point", &self.point)
            .field("tx", &self.tx.as_ref().map(|tx| tx.id()))
            .field("has_user", &self.user.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TxId;

    #[test]
    fn tx_mut_only_at_normalize() {
        let config = Config::default();
        let mut tx = Transaction::new(TxId(0));
        let mut cx: HookContext<'_, ()> = HookContext::new(HookPoint::RequestLine, &config, Some(&mut tx), None);
        assert!(cx.tx().is_some());
        assert!(cx.tx_mut().is_none());

        let mut cx: HookContext<'_, ()> =
            HookContext::new(HookPoint::RequestUriNormalize, &config, Some(&mut tx), None);
        assert!(cx.tx_mut().is_some());
    }

    #[test]
    fn user_context_is_mutable() {
        let config = Config::default();
        let mut counter = 1u32;
        let mut cx = HookContext::new(HookPoint::Log, &config, None, Some(&mut counter));
        *cx.user_mut().unwrap() += 1;
        assert_eq!(cx.user(), Some(&2));
        assert!(cx.tx().is_none());
    }
}
