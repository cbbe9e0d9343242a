//! Interstitial ad trigger.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Continuation invoked once the ad experience is over.
pub type AdCompletion = Box<dyn FnOnce() + Send>;

/// Display collaborator for full-screen ads.
///
/// Implementations must call `on_complete` exactly once, including when no
/// ad could be loaded.
pub trait InterstitialAds {
    fn show_interstitial(&self, on_complete: AdCompletion);
}

/// Never shows anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAds;

impl InterstitialAds for NoAds {
    fn show_interstitial(&self, on_complete: AdCompletion) {
        on_complete();
    }
}

/// Resolves when the post-send flow may continue.
#[derive(Debug)]
pub struct AdContinuation {
    shown: bool,
    receiver: Option<oneshot::Receiver<()>>,
}

impl AdContinuation {
    const fn ready() -> Self {
        Self {
            shown: false,
            receiver: None,
        }
    }

    /// Whether an interstitial was requested for this send.
    pub const fn ad_shown(&self) -> bool {
        self.shown
    }
}

impl Future for AdContinuation {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.receiver.as_mut() {
            // a dropped sender also means the ad flow is over
            Some(receiver) => Pin::new(receiver).poll(cx).map(|_| ()),
            None => Poll::Ready(()),
        }
    }
}

/// Counts sends and asks for an interstitial every `every` messages.
#[derive(Debug, Clone)]
pub struct AdGate {
    every: u64,
    sent: u64,
}

impl AdGate {
    pub const fn new(every: u64) -> Self {
        Self { every, sent: 0 }
    }

    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Count one successful send. Subscribers are never shown ads.
    pub fn on_message_sent<A: InterstitialAds + ?Sized>(
        &mut self,
        ads: &A,
        is_subscriber: bool,
    ) -> AdContinuation {
        self.sent += 1;
        if is_subscriber || self.every == 0 || self.sent % self.every != 0 {
            return AdContinuation::ready();
        }

        tracing::debug!(sent = self.sent, "Requesting interstitial");
        let (sender, receiver) = oneshot::channel();
        ads.show_interstitial(Box::new(move || {
            let _ = sender.send(());
        }));
        AdContinuation {
            shown: true,
            receiver: Some(receiver),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Holds completions until the test releases them.
    #[derive(Default, Clone)]
    struct DeferredAds {
        shown: Arc<Mutex<Vec<AdCompletion>>>,
    }

    impl InterstitialAds for DeferredAds {
        fn show_interstitial(&self, on_complete: AdCompletion) {
            self.shown.lock().unwrap().push(on_complete);
        }
    }

    #[tokio::test]
    async fn every_fifteenth_send_shows_an_ad() {
        let ads = DeferredAds::default();
        let mut gate = AdGate::new(15);

        for _ in 0..14 {
            let continuation = gate.on_message_sent(&ads, false);
            assert!(!continuation.ad_shown());
            continuation.await;
        }
        let continuation = gate.on_message_sent(&ads, false);
        assert!(continuation.ad_shown());
        assert_eq!(ads.shown.lock().unwrap().len(), 1);

        let completion = ads.shown.lock().unwrap().pop().unwrap();
        completion();
        continuation.await;
    }

    #[tokio::test]
    async fn subscribers_skip_ads_but_still_count() {
        let ads = DeferredAds::default();
        let mut gate = AdGate::new(2);

        assert!(!gate.on_message_sent(&ads, true).ad_shown());
        assert!(!gate.on_message_sent(&ads, true).ad_shown());
        assert_eq!(gate.sent(), 2);
        assert!(ads.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_completion_does_not_hang() {
        let ads = DeferredAds::default();
        let mut gate = AdGate::new(1);
        let continuation = gate.on_message_sent(&ads, false);
        ads.shown.lock().unwrap().clear();
        continuation.await;
    }

    #[tokio::test]
    async fn no_ads_completes_immediately() {
        let mut gate = AdGate::new(1);
        let continuation = gate.on_message_sent(&NoAds, false);
        assert!(continuation.ad_shown());
        continuation.await;
    }
}
