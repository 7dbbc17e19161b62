//! Server-sent-event stream over a bus subscription.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_web::web::Bytes;
use futures::Stream;
use tokio::time::{interval_at, Instant, Interval};

use crate::events::{RequestEvent, Subscription};
use crate::metrics::SSE_SUBSCRIBERS;

/// Idle keep-alive cadence; defeats proxy and load-balancer timeouts.
const HEARTBEAT: Duration = Duration::from_secs(25);

/// One observer's event stream. Dropping it (peer disconnect, server
/// shutdown) releases the bus slot and the heartbeat timer.
pub struct EventStream {
    sub: Subscription,
    heartbeat: Interval,
    opened: bool,
}

impl EventStream {
    pub fn new(sub: Subscription) -> Self {
        SSE_SUBSCRIBERS.inc();
        Self {
            sub,
            heartbeat: interval_at(Instant::now() + HEARTBEAT, HEARTBEAT),
            opened: false,
        }
    }
}

fn frame(event: &RequestEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(_) => Bytes::from_static(b": unserializable event\n\n"),
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // First byte goes out immediately so EventSource fires `onopen`
        // without waiting for an event or the first heartbeat.
        if !this.opened {
            this.opened = true;
            return Poll::Ready(Some(Ok(Bytes::from_static(b": ok\n\n"))));
        }

        match this.sub.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.heartbeat.reset();
                Poll::Ready(Some(Ok(frame(&event))))
            }
            // Bus side gone; end the stream.
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match this.heartbeat.poll_tick(cx) {
                Poll::Ready(_) => Poll::Ready(Some(Ok(Bytes::from_static(b": heartbeat\n\n")))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        SSE_SUBSCRIBERS.dec();
    }
}
