//! Checkout launcher.
//!
//! The hosted checkout widget reports its result through event callbacks.
//! [`launch`] turns those into one awaited [`CheckoutOutcome`]: whichever of
//! the three events fires first settles it, later events are ignored and
//! every listener is removed once it has settled.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{ErrorCode, TebexError};

/// Events emitted by the checkout widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckoutEvent {
    /// `payment:complete`
    PaymentComplete,

    /// `payment:error`
    PaymentError,

    /// `close`
    Close,
}

impl CheckoutEvent {
    /// Every event the launcher listens for.
    pub const ALL: [Self; 3] = [Self::PaymentComplete, Self::PaymentError, Self::Close];

    /// Event name used by the widget.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentComplete => "payment:complete",
            Self::PaymentError => "payment:error",
            Self::Close => "close",
        }
    }
}

/// How a checkout ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Payment went through.
    Completed,

    /// Payment failed with the widget's reason.
    Failed(String),

    /// The user closed the widget.
    Closed,
}

/// Handle returned by [`CheckoutWidget::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Listener callback; the payload is the widget's error text, if any.
pub type CheckoutCallback = Box<dyn Fn(Option<String>) + Send + Sync>;

/// Hosted checkout widget.
pub trait CheckoutWidget: Send + Sync {
    /// Point the widget at a basket.
    ///
    /// # Errors
    ///
    /// Returns an error if the widget is unavailable.
    fn init(&self, ident: &str) -> Result<(), TebexError>;

    /// Subscribe to an event.
    fn on(&self, event: CheckoutEvent, callback: CheckoutCallback) -> ListenerId;

    /// Unsubscribe a listener.
    fn off(&self, listener: ListenerId);

    /// Open the widget.
    ///
    /// # Errors
    ///
    /// Returns an error if the widget cannot be opened.
    fn launch(&self) -> Result<(), TebexError>;
}

fn outcome_for(event: CheckoutEvent, payload: Option<String>) -> CheckoutOutcome {
    match event {
        CheckoutEvent::PaymentComplete => CheckoutOutcome::Completed,
        CheckoutEvent::PaymentError => {
            CheckoutOutcome::Failed(payload.unwrap_or_else(|| "payment failed".to_string()))
        }
        CheckoutEvent::Close => CheckoutOutcome::Closed,
    }
}

/// Open the checkout for basket `ident` and wait for it to settle.
///
/// # Errors
///
/// Returns an error if the widget fails to initialise or launch, or drops its
/// listeners without firing any of them.
pub async fn launch(
    widget: &dyn CheckoutWidget,
    ident: &str,
) -> Result<CheckoutOutcome, TebexError> {
    widget.init(ident)?;

    let (sender, receiver) = oneshot::channel();
    let sender = Arc::new(Mutex::new(Some(sender)));

    let listeners: Vec<ListenerId> = CheckoutEvent::ALL
        .into_iter()
        .map(|event| {
            let sender = Arc::clone(&sender);

            widget.on(
                event,
                Box::new(move |payload| {
                    let Some(sender) = sender
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take()
                    else {
                        debug!(event = event.as_str(), "checkout already settled");
                        return;
                    };

                    if sender.send(outcome_for(event, payload)).is_err() {
                        debug!(event = event.as_str(), "checkout launcher went away");
                    }
                }),
            )
        })
        .collect();

    let outcome = match widget.launch() {
        Ok(()) => receiver.await.map_err(|error| {
            TebexError::new(
                ErrorCode::Unknown,
                format!("checkout widget released its listeners without settling: {error}"),
            )
        }),
        Err(error) => Err(error),
    };

    for listener in listeners {
        widget.off(listener);
    }

    if let Ok(outcome) = &outcome {
        info!(basket = ident, ?outcome, "checkout settled");
    }

    outcome
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    };

    use super::*;

    /// Widget that records listeners and fires events on demand.
    #[derive(Default)]
    pub(crate) struct FakeWidget {
        next_id: AtomicU64,
        listeners: Mutex<Vec<(ListenerId, CheckoutEvent, CheckoutCallback)>>,
        pub(crate) initialised_with: Mutex<Option<String>>,
        pub(crate) fire_on_launch: Mutex<Vec<(CheckoutEvent, Option<String>)>>,
    }

    impl FakeWidget {
        pub(crate) fn firing(events: Vec<(CheckoutEvent, Option<String>)>) -> Self {
            Self {
                fire_on_launch: Mutex::new(events),
                ..Self::default()
            }
        }

        pub(crate) fn emit(&self, event: CheckoutEvent, payload: Option<String>) {
            let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);

            for (_, listened, callback) in listeners.iter() {
                if *listened == event {
                    callback(payload.clone());
                }
            }
        }

        pub(crate) fn listener_count(&self) -> usize {
            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl CheckoutWidget for FakeWidget {
        fn init(&self, ident: &str) -> Result<(), TebexError> {
            *self
                .initialised_with
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(ident.to_string());

            Ok(())
        }

        fn on(&self, event: CheckoutEvent, callback: CheckoutCallback) -> ListenerId {
            let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));

            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, event, callback));

            id
        }

        fn off(&self, listener: ListenerId) {
            self.listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _, _)| *id != listener);
        }

        fn launch(&self) -> Result<(), TebexError> {
            let events = std::mem::take(
                &mut *self
                    .fire_on_launch
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );

            for (event, payload) in events {
                self.emit(event, payload);
            }

            Ok(())
        }
    }
}
