//! Progress reporting over a channel.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

/// Conversion progress, sent from the pipeline as pages complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Ingestion finished; page workers are starting
    Started { pages: u32 },
    /// One page was segmented (pages complete in any order)
    PageDone { page: u32, partial: bool },
    /// Reading order and export are done
    Finished { pages: u32, warnings: usize },
}

/// Create an unbounded channel for progress events.
pub fn progress_channel() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
    crossbeam_channel::unbounded()
}

/// Send an event if a listener is attached. A disconnected receiver is
/// ignored.
pub(crate) fn emit(sender: Option<&Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = sender {
        if tx.send(event).is_err() {
            log::trace!("Progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listener() {
        emit(None, ProgressEvent::Started { pages: 1 });
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        emit(Some(&tx), ProgressEvent::Finished { pages: 1, warnings: 0 });
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (tx, rx) = progress_channel();
        emit(Some(&tx), ProgressEvent::Started { pages: 2 });
        emit(Some(&tx), ProgressEvent::PageDone { page: 1, partial: false });
        drop(tx);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ProgressEvent::Started { pages: 2 });
    }
}
