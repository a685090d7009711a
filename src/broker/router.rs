//! Message fan-out
//!
//! Turns one SEND into MESSAGE frames for every matching subscription. The
//! registry is consulted once for a stable snapshot of matches; transport
//! writes happen after the lock is released, so a subscription removed
//! mid-fan-out is either delivered to or skipped whole. Pseudo-session
//! subscriptions are delivered by invoking the host callback instead of
//! writing a frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{BrokerEvent, DeliveryHandler};
use crate::codec;
use crate::destination::SubscriptionStore;
use crate::protocol::{headers, Body, Frame, Headers, MESSAGE};
use crate::session::SessionStore;

/// Routes published frames to matching subscriptions
pub struct MessageRouter {
    sessions: Arc<SessionStore>,
    subscriptions: Arc<SubscriptionStore>,
    local_handlers: Arc<DashMap<Arc<str>, DeliveryHandler>>,
    events: broadcast::Sender<BrokerEvent>,
    next_message_id: AtomicU64,
}

impl MessageRouter {
    pub(crate) fn new(
        sessions: Arc<SessionStore>,
        subscriptions: Arc<SubscriptionStore>,
        local_handlers: Arc<DashMap<Arc<str>, DeliveryHandler>>,
        events: broadcast::Sender<BrokerEvent>,
    ) -> Self {
        Self {
            sessions,
            subscriptions,
            local_handlers,
            events,
            next_message_id: AtomicU64::new(0),
        }
    }

    /// Fan a SEND out to every matching subscription on other sessions.
    /// Returns the number of deliveries.
    pub async fn route(&self, publisher_id: &Arc<str>, frame: Frame) -> usize {
        let destination: Arc<str> = match frame.headers.get(headers::DESTINATION) {
            Some(d) => Arc::from(d),
            None => return 0,
        };

        // MESSAGE header template: defaults first, then the incoming headers
        // overlaid (incoming wins), then the definitive content-length.
        let message_id = format!(
            "msg-{}",
            self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        let mut template = Headers::new();
        template.push(headers::MESSAGE_ID, message_id);
        template.push(headers::CONTENT_TYPE, "text/plain");
        for (name, value) in frame.headers.iter() {
            template.set(name, value);
        }
        let body_bytes = frame.body.to_bytes();
        template.set(headers::CONTENT_LENGTH, body_bytes.len().to_string());

        let matches = self.subscriptions.matching(&destination);
        let mut delivered = 0;

        for sub in matches {
            // The publisher never receives its own message
            if sub.session_id == *publisher_id {
                continue;
            }
            let target = match self.sessions.get(&sub.session_id) {
                Some(target) => target,
                None => continue,
            };

            let mut view = template.clone();
            view.set(headers::SUBSCRIPTION, sub.id.as_ref());

            if target.is_local() {
                let handler = self.local_handlers.get(sub.id.as_ref()).map(|h| h.clone());
                match handler {
                    Some(handler) => handler(frame.body.clone(), view),
                    None => {
                        let _ = self.events.send(BrokerEvent::Message {
                            subscription: sub.id.clone(),
                            headers: view,
                            body: frame.body.clone(),
                        });
                    }
                }
                delivered += 1;
                continue;
            }

            let transport = match target.transport() {
                Some(transport) => transport,
                None => continue,
            };
            let message = Frame {
                command: MESSAGE.to_string(),
                headers: view,
                body: Body::Binary(body_bytes.clone()),
            };
            match transport.send(codec::encode(&message)).await {
                Ok(()) => {
                    trace!(
                        subscription = %sub.id,
                        session = %sub.session_id,
                        "delivered MESSAGE"
                    );
                    delivered += 1;
                }
                Err(e) => {
                    debug!(
                        session = %sub.session_id,
                        "delivery failed: {}", e
                    );
                    let _ = self.events.send(BrokerEvent::Error {
                        session_id: Some(sub.session_id.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        let _ = self.events.send(BrokerEvent::Send {
            destination: destination.clone(),
            frame,
        });
        debug!(destination = %destination, delivered, "routed SEND");
        delivered
    }
}
