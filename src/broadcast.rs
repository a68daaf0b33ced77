use tracing::warn;

use crate::message::Message;
use crate::registry::ConnectionSource;

/// Tally of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub attempted: usize,
    pub failed: usize,
}

/// Sends `message` to every session live at call time. A failed send is
/// logged and skipped; it never stops delivery to the rest.
pub fn broadcast<S: ConnectionSource + ?Sized>(source: &S, message: &Message) -> Delivery {
    let mut delivery = Delivery::default();

    for session in source.snapshot() {
        delivery.attempted += 1;
        if let Err(err) = session.send(message) {
            delivery.failed += 1;
            warn!(connection = %session.id(), peer = %session.peer(), "delivery failed: {err}");
        }
    }

    delivery
}
