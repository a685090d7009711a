//! SUBSCRIBE and UNSUBSCRIBE handling

use tracing::{debug, trace};

use super::{frame_bytes, Connection};
use crate::broker::BrokerEvent;
use crate::destination::Subscription;
use crate::middleware::Flow;
use crate::protocol::{headers, Command, Frame, ProtocolError};

impl Connection {
    pub(crate) async fn handle_subscribe(&self, mut frame: Frame) {
        if self
            .pipeline
            .dispatch(Command::Subscribe, &self.session, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(session = %self.session_id(), "SUBSCRIBE dropped by middleware");
            return;
        }

        let Some(destination) = frame.headers.get(headers::DESTINATION).map(str::to_string)
        else {
            self.send_error(
                &ProtocolError::MissingHeader(headers::DESTINATION),
                Some(frame_bytes(&frame)),
            )
            .await;
            return;
        };
        // STOMP 1.1 requires a client-chosen id for every subscription
        let Some(id) = frame.headers.get(headers::ID).map(str::to_string) else {
            self.send_error(
                &ProtocolError::MissingHeader(headers::ID),
                Some(frame_bytes(&frame)),
            )
            .await;
            return;
        };

        if self.subscriptions.contains(self.session_id(), &id) {
            self.send_error(
                &ProtocolError::DuplicateSubscription(id),
                Some(frame_bytes(&frame)),
            )
            .await;
            return;
        }

        let subscription = Subscription::new(id, self.session_id().clone(), &destination);
        self.subscriptions.add(subscription.clone());
        debug!(
            session = %self.session_id(),
            id = %subscription.id,
            destination = %destination,
            "subscribed"
        );
        let _ = self.events.send(BrokerEvent::Subscribed(subscription));
    }

    pub(crate) async fn handle_unsubscribe(&self, mut frame: Frame) {
        if self
            .pipeline
            .dispatch(Command::Unsubscribe, &self.session, &mut frame)
            .await
            == Flow::Halt
        {
            debug!(session = %self.session_id(), "UNSUBSCRIBE dropped by middleware");
            return;
        }

        let Some(id) = frame.headers.get(headers::ID).map(str::to_string) else {
            self.send_error(
                &ProtocolError::MissingHeader(headers::ID),
                Some(frame_bytes(&frame)),
            )
            .await;
            return;
        };

        // Unknown ids are ignored; UNSUBSCRIBE is not an error path
        match self.subscriptions.take(self.session_id(), &id) {
            Some(subscription) => {
                debug!(session = %self.session_id(), id = %id, "unsubscribed");
                let _ = self.events.send(BrokerEvent::Unsubscribed(subscription));
            }
            None => {
                trace!(session = %self.session_id(), id = %id, "no matching subscription");
            }
        }
    }
}
