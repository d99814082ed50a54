//! Protocol handling for non-reset messages
//!
//! The dispatch loop hands every message that is not a Reset to a
//! [`Handler`]. The default [`ObserveHandler`] authorizes each request
//! itself and manages observe subscriptions:
//!
//! | Request                 | Response                          |
//! |-------------------------|-----------------------------------|
//! | empty CON (ping)        | RST                               |
//! | GET, Observe=0          | 2.05, subscription registered     |
//! | GET, Observe=1          | 2.05, subscription removed        |
//! | GET                     | 2.05                              |
//! | POST                    | 2.04                              |
//! | anything else           | 4.05                              |

use std::net::SocketAddr;
use std::sync::Arc;

use crate::access::AccessChecker;
use crate::auth;
use crate::message::{Code, Message, MessageType, OptionValue, OBSERVE};
use crate::metrics::Metrics;
use crate::subscription::{self, Registry, SubscriptionService};

/// Observe value that registers a subscription
const OBSERVE_REGISTER: u32 = 0;

/// Observe value that cancels a subscription
const OBSERVE_DEREGISTER: u32 = 1;

/// Produces the response for a non-reset message. `None` sends nothing.
pub trait Handler: Send + Sync {
    fn serve(&self, from: SocketAddr, msg: &Message) -> Option<Message>;
}

/// Default handler: authorization plus observe bookkeeping
pub struct ObserveHandler {
    access: Arc<dyn AccessChecker>,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl ObserveHandler {
    pub fn new(
        access: Arc<dyn AccessChecker>,
        registry: Arc<Registry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        ObserveHandler {
            access,
            registry,
            metrics,
        }
    }
}

impl Handler for ObserveHandler {
    fn serve(&self, from: SocketAddr, msg: &Message) -> Option<Message> {
        let res_type = match msg.msg_type {
            MessageType::Confirmable => MessageType::Acknowledgement,
            MessageType::NonConfirmable => MessageType::NonConfirmable,
            // Stray ACK/RST: nothing to answer
            MessageType::Acknowledgement | MessageType::Reset => return None,
        };

        if msg.code == Code::EMPTY {
            // CoAP ping
            return match msg.msg_type {
                MessageType::Confirmable => {
                    Some(Message::new(MessageType::Reset, Code::EMPTY, msg.message_id))
                }
                _ => None,
            };
        }

        let mut res = msg.response(res_type, Code::EMPTY);
        let resource_id = msg.resource_id().unwrap_or_default();

        let publisher = match auth::authorize(self.access.as_ref(), msg, resource_id) {
            Ok(publisher) => publisher,
            Err(e) => {
                log::debug!("Rejected {} from {}: {}", msg.code, from, e);
                Metrics::inc(&self.metrics.auth_failures_total);
                res.code = e.code();
                return Some(res);
            }
        };

        res.code = match msg.code {
            Code::GET => {
                let id = subscription::subscription_id(&publisher, &msg.token);
                match msg.observe() {
                    Some(OBSERVE_REGISTER) => {
                        self.registry.subscribe(id, from, resource_id.to_string());
                        res.add_option(OBSERVE, OptionValue::Uint(0));
                    }
                    Some(OBSERVE_DEREGISTER) => {
                        // Cancelling an unknown observation is not an error
                        let _ = self.registry.unsubscribe(&id);
                    }
                    _ => {}
                }
                Code::CONTENT
            }
            Code::POST => {
                log::debug!(
                    "Accepted {} bytes from '{}' for resource '{}'",
                    msg.payload.len(),
                    publisher,
                    resource_id
                );
                Code::CHANGED
            }
            _ => Code::METHOD_NOT_ALLOWED,
        };

        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessError;
    use crate::message::{URI_PATH, URI_QUERY};
    use std::sync::atomic::Ordering;

    /// Accepts the token "good" as publisher "thing-1"
    struct TokenChecker;

    impl AccessChecker for TokenChecker {
        fn can_access(&self, _resource_id: &str, token: &str) -> Result<String, AccessError> {
            match token {
                "good" => Ok("thing-1".to_string()),
                "down" => Err(AccessError::Unreachable("down".to_string())),
                _ => Err(AccessError::Denied("bad token".to_string())),
            }
        }
    }

    fn make_handler() -> (ObserveHandler, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        (
            ObserveHandler::new(
                Arc::new(TokenChecker),
                Arc::clone(&registry),
                Arc::new(Metrics::new()),
            ),
            registry,
        )
    }

    fn from() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn request(msg_type: MessageType, code: Code, token: &str) -> Message {
        let mut msg = Message::new(msg_type, code, 42);
        msg.token = vec![0x0A, 0x0B];
        for segment in ["channels", "chan-1", "messages"] {
            msg.add_option(URI_PATH, OptionValue::Str(segment.to_string()));
        }
        msg.add_option(URI_QUERY, OptionValue::Str(format!("key={}", token)));
        msg
    }

    #[test]
    fn test_observe_registers_subscription() {
        let (handler, registry) = make_handler();
        let mut msg = request(MessageType::Confirmable, Code::GET, "good");
        msg.add_option(OBSERVE, OptionValue::Uint(0));

        let res = handler.serve(from(), &msg).unwrap();

        assert_eq!(res.msg_type, MessageType::Acknowledgement);
        assert_eq!(res.code, Code::CONTENT);
        assert_eq!(res.observe(), Some(0));
        assert_eq!(res.message_id, 42);

        let sub = registry.get("thing-1-0a0b").unwrap();
        assert_eq!(sub.observer, from());
        assert_eq!(sub.resource_id, "chan-1");
    }

    #[test]
    fn test_observe_deregister() {
        let (handler, registry) = make_handler();
        let mut msg = request(MessageType::Confirmable, Code::GET, "good");
        msg.add_option(OBSERVE, OptionValue::Uint(0));
        handler.serve(from(), &msg).unwrap();

        let mut cancel = request(MessageType::Confirmable, Code::GET, "good");
        cancel.add_option(OBSERVE, OptionValue::Uint(1));
        let res = handler.serve(from(), &cancel).unwrap();

        assert_eq!(res.code, Code::CONTENT);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unauthorized_request() {
        let (handler, registry) = make_handler();
        let mut msg = request(MessageType::Confirmable, Code::GET, "bad");
        msg.add_option(OBSERVE, OptionValue::Uint(0));

        let res = handler.serve(from(), &msg).unwrap();

        assert_eq!(res.code, Code::UNAUTHORIZED);
        assert!(registry.is_empty());
        assert_eq!(handler.metrics.auth_failures_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_authority_down() {
        let (handler, _) = make_handler();
        let msg = request(MessageType::NonConfirmable, Code::POST, "down");

        let res = handler.serve(from(), &msg).unwrap();

        assert_eq!(res.msg_type, MessageType::NonConfirmable);
        assert_eq!(res.code, Code::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_missing_query_is_bad_request() {
        let (handler, _) = make_handler();
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1);
        msg.add_option(URI_PATH, OptionValue::Str("channels".to_string()));

        let res = handler.serve(from(), &msg).unwrap();
        assert_eq!(res.code, Code::BAD_REQUEST);
    }

    #[test]
    fn test_post_and_unsupported_method() {
        let (handler, _) = make_handler();

        let post = request(MessageType::Confirmable, Code::POST, "good");
        assert_eq!(handler.serve(from(), &post).unwrap().code, Code::CHANGED);

        let delete = request(MessageType::Confirmable, Code::DELETE, "good");
        assert_eq!(
            handler.serve(from(), &delete).unwrap().code,
            Code::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_ping() {
        let (handler, _) = make_handler();
        let ping = Message::new(MessageType::Confirmable, Code::EMPTY, 9);

        let res = handler.serve(from(), &ping).unwrap();
        assert_eq!(res.msg_type, MessageType::Reset);
        assert_eq!(res.message_id, 9);
    }

    #[test]
    fn test_stray_ack_ignored() {
        let (handler, _) = make_handler();
        let ack = Message::new(MessageType::Acknowledgement, Code::EMPTY, 9);
        assert!(handler.serve(from(), &ack).is_none());
    }
}
