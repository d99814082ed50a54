//! Per-datagram dispatch
//!
//! ```text
//! datagram ──► parse ──✗──► dropped, no reply
//!                │
//!                ├─ RST ──► extract key ─► access check ─► unsubscribe ─► ACK
//!                │              ✗               ✗               ✗
//!                │          ACK 4.01        ACK 4.01        ACK 5.00
//!                │
//!                └─ other ──► protocol handler ──► its response (if any)
//! ```
//!
//! Only the Reset path authorizes at this layer; other messages rely on the
//! handler's own checks.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::access::AccessChecker;
use crate::auth;
use crate::handler::Handler;
use crate::message::{Code, Message, MessageType};
use crate::metrics::Metrics;
use crate::subscription::{self, SubscriptionService};

/// Routes parsed messages to subscription teardown or the protocol handler
pub struct Dispatcher {
    service: Arc<dyn SubscriptionService>,
    access: Arc<dyn AccessChecker>,
    handler: Arc<dyn Handler>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(
        service: Arc<dyn SubscriptionService>,
        access: Arc<dyn AccessChecker>,
        handler: Arc<dyn Handler>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Dispatcher {
            service,
            access,
            handler,
            metrics,
        }
    }

    /// Handle one datagram and return the response to send, if any
    pub fn serve(&self, data: &[u8], from: SocketAddr) -> Option<Message> {
        let msg = match Message::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::debug!("Dropping {} bytes from {}: {}", data.len(), from, e);
                Metrics::inc(&self.metrics.malformed_total);
                return None;
            }
        };

        log::trace!(
            "{:?} {} mid={} from {}",
            msg.msg_type,
            msg.code,
            msg.message_id,
            from
        );

        match msg.msg_type {
            MessageType::Reset => Some(self.cancel(&msg, from)),
            _ => self.handler.serve(from, &msg),
        }
    }

    /// Tear down the subscription a Reset refers to
    fn cancel(&self, msg: &Message, from: SocketAddr) -> Message {
        let mut res = msg.response(MessageType::Acknowledgement, msg.code);
        let resource_id = msg.resource_id().unwrap_or_default();

        let publisher = match auth::authorize(self.access.as_ref(), msg, resource_id) {
            Ok(publisher) => publisher,
            Err(e) => {
                log::debug!("Unauthorized reset from {}: {}", from, e);
                Metrics::inc(&self.metrics.auth_failures_total);
                res.code = Code::UNAUTHORIZED;
                return res;
            }
        };

        let id = subscription::subscription_id(&publisher, &msg.token);
        match self.service.unsubscribe(&id) {
            Ok(()) => Metrics::inc(&self.metrics.unsubscribes_total),
            Err(e) => {
                log::error!("Failed to tear down subscription '{}': {}", id, e);
                Metrics::inc(&self.metrics.teardown_failures_total);
                res.code = Code::INTERNAL_SERVER_ERROR;
            }
        }

        res
    }
}
