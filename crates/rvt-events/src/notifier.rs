use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info};

use rvt_types::ChangeKind;

use crate::error::{EventError, EventResult};
use crate::event::ChangeEvent;

/// Filter for subscribing to a subset of change events.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// If set, only events for these drafts are delivered.
    pub drafts: Option<Vec<u32>>,
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<ChangeKind>>,
}

impl ChangeFilter {
    /// Every event for one draft.
    pub fn draft(draft: u32) -> Self {
        Self {
            drafts: Some(vec![draft]),
            kinds: None,
        }
    }

    /// Returns `true` if the given event matches this filter.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(ref drafts) = self.drafts {
            if !drafts.contains(&event.draft) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        true
    }

    fn wants(&self, kind: ChangeKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Receiving end of a subscription. Works without an async runtime through
/// `try_recv`; see [`drain`].
pub type ChangeStream = mpsc::UnboundedReceiver<ChangeEvent>;

/// Take every event currently queued on `stream`, oldest first.
pub fn drain(stream: &mut ChangeStream) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    while let Ok(event) = stream.try_recv() {
        out.push(event);
    }
    out
}

/// One subscription as registered in a kind's list. A subscription that
/// wants several kinds appears in several lists, sharing one sender.
struct Subscriber {
    id: u64,
    drafts: Option<Vec<u32>>,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl Subscriber {
    fn wants_draft(&self, draft: u32) -> bool {
        self.drafts.as_ref().map_or(true, |d| d.contains(&draft))
    }
}

struct Lists {
    by_kind: [RwLock<Vec<Subscriber>>; 3],
    next_id: AtomicU64,
    closed: AtomicBool,
}

fn slot(kind: ChangeKind) -> usize {
    match kind {
        ChangeKind::Insertion => 0,
        ChangeKind::Deletion => 1,
        ChangeKind::VersionChange => 2,
    }
}

/// Fan-out of draft edits to subscribed views.
///
/// Clones share the same subscriber lists, so a background worker can hold
/// one to enqueue version changes.
#[derive(Clone)]
pub struct ChangeNotifier {
    lists: Arc<Lists>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            lists: Arc::new(Lists {
                by_kind: Default::default(),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a subscriber for events matching `filter`.
    pub fn subscribe(&self, filter: ChangeFilter) -> EventResult<ChangeStream> {
        if self.is_closed() {
            return Err(EventError::Closed);
        }
        let kinds: Vec<ChangeKind> = ChangeKind::ALL
            .into_iter()
            .filter(|&k| filter.wants(k))
            .collect();
        if kinds.is_empty() {
            return Err(EventError::EmptyFilter);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.lists.next_id.fetch_add(1, Ordering::Relaxed);
        for kind in kinds {
            self.lists.by_kind[slot(kind)]
                .write()
                .expect("subscriber lock poisoned")
                .push(Subscriber {
                    id,
                    drafts: filter.drafts.clone(),
                    sender: tx.clone(),
                });
        }
        debug!(id, "change subscriber registered");
        Ok(rx)
    }

    /// Deliver `event` to every matching subscriber, in registration order.
    /// Subscribers whose streams were dropped are pruned. Returns how many
    /// subscribers received the event.
    pub fn notify(&self, event: ChangeEvent) -> EventResult<usize> {
        if self.is_closed() {
            return Err(EventError::Closed);
        }
        let mut subs = self.lists.by_kind[slot(event.kind)]
            .write()
            .expect("subscriber lock poisoned");
        let mut delivered = 0;
        subs.retain(|sub| {
            if !sub.wants_draft(event.draft) {
                return !sub.sender.is_closed();
            }
            let sent = sub.sender.send(event).is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });
        debug!(%event, delivered, "change event routed");
        Ok(delivered)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut ids = HashSet::new();
        for list in &self.lists.by_kind {
            let subs = list.read().expect("subscriber lock poisoned");
            ids.extend(subs.iter().filter(|s| !s.sender.is_closed()).map(|s| s.id));
        }
        ids.len()
    }

    /// Drop every subscriber and refuse further events. Open streams see
    /// the end of their channel once drained.
    pub fn close(&self) {
        self.lists.closed.store(true, Ordering::Release);
        for list in &self.lists.by_kind {
            list.write().expect("subscriber lock poisoned").clear();
        }
        info!("change notifier closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lists.closed.load(Ordering::Acquire)
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_matching_events() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier
            .subscribe(ChangeFilter {
                kinds: Some(vec![ChangeKind::Insertion]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(notifier.subscriber_count(), 1);

        assert_eq!(notifier.notify(ChangeEvent::insertion(1, 0, 3)).unwrap(), 1);
        assert_eq!(notifier.notify(ChangeEvent::deletion(1, 0, 3)).unwrap(), 0);

        let got = drain(&mut stream);
        assert_eq!(got, vec![ChangeEvent::insertion(1, 0, 3)]);
    }

    #[test]
    fn draft_filter() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe(ChangeFilter::draft(7)).unwrap();

        notifier.notify(ChangeEvent::insertion(7, 0, 1)).unwrap();
        notifier.notify(ChangeEvent::insertion(8, 0, 1)).unwrap();
        notifier.notify(ChangeEvent::version_change(7)).unwrap();

        let got = drain(&mut stream);
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|e| e.draft == 7));
    }

    #[test]
    fn events_arrive_in_order_across_kinds() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe(ChangeFilter::default()).unwrap();

        notifier.notify(ChangeEvent::insertion(1, 0, 5)).unwrap();
        notifier.notify(ChangeEvent::deletion(1, 1, 2)).unwrap();
        notifier.notify(ChangeEvent::version_change(1)).unwrap();

        let kinds: Vec<_> = drain(&mut stream).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, ChangeKind::ALL.to_vec());
    }

    #[test]
    fn dropped_streams_are_pruned() {
        let notifier = ChangeNotifier::new();
        let stream = notifier.subscribe(ChangeFilter::default()).unwrap();
        let _kept = notifier.subscribe(ChangeFilter::default()).unwrap();
        assert_eq!(notifier.subscriber_count(), 2);

        drop(stream);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(notifier.notify(ChangeEvent::insertion(1, 0, 1)).unwrap(), 1);
    }

    #[test]
    fn clones_share_subscribers() {
        let notifier = ChangeNotifier::new();
        let worker = notifier.clone();
        let mut stream = notifier.subscribe(ChangeFilter::draft(2)).unwrap();

        std::thread::spawn(move || {
            worker.notify(ChangeEvent::version_change(2)).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(drain(&mut stream), vec![ChangeEvent::version_change(2)]);
    }

    #[test]
    fn empty_kind_filter_is_rejected() {
        let notifier = ChangeNotifier::new();
        let result = notifier.subscribe(ChangeFilter {
            kinds: Some(vec![]),
            ..Default::default()
        });
        assert!(matches!(result, Err(EventError::EmptyFilter)));
    }

    #[test]
    fn closed_notifier_refuses_work() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe(ChangeFilter::default()).unwrap();
        notifier.notify(ChangeEvent::insertion(1, 0, 1)).unwrap();
        notifier.close();

        assert!(notifier.is_closed());
        assert_eq!(notifier.subscriber_count(), 0);
        assert!(matches!(
            notifier.notify(ChangeEvent::insertion(1, 0, 1)),
            Err(EventError::Closed)
        ));
        assert!(matches!(
            notifier.subscribe(ChangeFilter::default()),
            Err(EventError::Closed)
        ));
        // The queued event is still readable.
        assert_eq!(drain(&mut stream).len(), 1);
    }

    #[tokio::test]
    async fn async_receive() {
        let notifier = ChangeNotifier::new();
        let mut stream = notifier.subscribe(ChangeFilter::default()).unwrap();
        notifier.notify(ChangeEvent::deletion(4, 2, 2)).unwrap();
        notifier.close();

        assert_eq!(stream.recv().await, Some(ChangeEvent::deletion(4, 2, 2)));
        assert_eq!(stream.recv().await, None);
    }
}
