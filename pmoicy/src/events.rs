//! Événements publiés par une session ICY
//!
//! Les blocs de métadonnées et les changements d'état de la session sont
//! diffusés aux abonnés via des channels bornés. Un abonné lent perd des
//! événements mais ne bloque jamais le flux audio.

use crate::error::ErrorKind;
use crate::headers::IcyHeaders;
use crate::metadata::MetadataBlock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Trait de base pour tous les événements d'une session
pub trait IcyEvent: Send + Sync + Clone + 'static {}

/// Événement : nouveau bloc de métadonnées
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEvent {
    /// URL de la session
    pub url: String,
    pub block: MetadataBlock,
    /// Le titre diffère de celui du bloc précédent
    pub title_changed: bool,
}

impl MetadataEvent {
    pub fn stream_title(&self) -> Option<&str> {
        self.block.stream_title()
    }
}

impl IcyEvent for MetadataEvent {}

/// Raison de la fermeture d'une session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Fermeture demandée par l'hôte
    Disconnected,
    /// Fin de flux propre, sans reconnexion
    EndOfStream,
    /// Le consommateur audio a disparu
    ConsumerGone,
}

/// Événement : changement d'état de la session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        url: String,
        headers: IcyHeaders,
    },
    Reconnecting {
        attempt: u32,
        max_retries: u32,
    },
    Reconnected {
        attempt: u32,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
    Closed {
        reason: CloseReason,
    },
}

impl SessionEvent {
    /// `Failed` et `Closed` sont les derniers événements d'une session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Failed { .. } | SessionEvent::Closed { .. })
    }
}

impl IcyEvent for SessionEvent {}

/// Gestionnaire d'abonnements pour un type d'événement
#[derive(Clone)]
pub struct EventPublisher<E: IcyEvent> {
    subscribers: Vec<mpsc::Sender<E>>,
}

impl<E: IcyEvent> EventPublisher<E> {
    /// Crée un nouveau publisher vide
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Ajoute un subscriber via un channel
    pub fn subscribe(&mut self, tx: mpsc::Sender<E>) {
        self.subscribers.push(tx);
    }

    /// Publie un événement sans attendre les subscribers lents
    pub fn publish(&mut self, event: E) {
        // Les subscribers fermés sont retirés
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Publie un événement en attendant que chaque subscriber le reçoive
    ///
    /// L'attente s'arrête à l'annulation de `stop` : les subscribers encore
    /// pleins reçoivent alors l'événement seulement s'il reste de la place.
    pub async fn publish_until(&mut self, event: E, stop: &CancellationToken) {
        let mut alive = Vec::with_capacity(self.subscribers.len());
        for tx in self.subscribers.drain(..) {
            let open = tokio::select! {
                biased;
                result = tx.send(event.clone()) => result.is_ok(),
                _ = stop.cancelled() => !matches!(
                    tx.try_send(event.clone()),
                    Err(mpsc::error::TrySendError::Closed(_))
                ),
            };
            if open {
                alive.push(tx);
            }
        }
        self.subscribers = alive;
    }

    /// Retourne le nombre de subscribers actifs
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: IcyEvent> Default for EventPublisher<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver helper pour consommer des événements depuis un channel
pub struct EventReceiver<E: IcyEvent> {
    rx: mpsc::Receiver<E>,
}

impl<E: IcyEvent> EventReceiver<E> {
    /// Crée un nouveau receiver
    pub fn new(rx: mpsc::Receiver<E>) -> Self {
        Self { rx }
    }

    /// Attend le prochain événement
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Tente de recevoir un événement sans bloquer
    pub fn try_recv(&mut self) -> Result<E, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(title: &str) -> MetadataBlock {
        MetadataBlock::new(vec![("StreamTitle".into(), title.into())], 0)
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let mut publisher = EventPublisher::<MetadataEvent>::new();
        let (tx1, rx1) = mpsc::channel(10);
        let (tx2, rx2) = mpsc::channel(10);
        publisher.subscribe(tx1);
        publisher.subscribe(tx2);

        publisher.publish(MetadataEvent {
            url: "http://radio/live".into(),
            block: block("Song"),
            title_changed: true,
        });

        let mut rx1 = EventReceiver::new(rx1);
        let mut rx2 = EventReceiver::new(rx2);
        assert_eq!(rx1.recv().await.unwrap().stream_title(), Some("Song"));
        assert_eq!(rx2.recv().await.unwrap().stream_title(), Some("Song"));
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_events() {
        let mut publisher = EventPublisher::<SessionEvent>::new();
        let (tx, rx) = mpsc::channel(1);
        publisher.subscribe(tx);

        publisher.publish(SessionEvent::Reconnected { attempt: 1 });
        publisher.publish(SessionEvent::Reconnected { attempt: 2 });

        let mut rx = EventReceiver::new(rx);
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Reconnected { attempt: 1 })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_removed() {
        let mut publisher = EventPublisher::<SessionEvent>::new();
        let (tx, rx) = mpsc::channel(4);
        publisher.subscribe(tx);
        drop(rx);

        publisher
            .publish_until(
                SessionEvent::Closed {
                    reason: CloseReason::Disconnected,
                },
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_until_gives_up_on_full_subscriber() {
        let mut publisher = EventPublisher::<SessionEvent>::new();
        let (tx, rx) = mpsc::channel(1);
        publisher.subscribe(tx);
        let stop = CancellationToken::new();

        publisher
            .publish_until(SessionEvent::Reconnected { attempt: 1 }, &stop)
            .await;
        stop.cancel();
        // Le channel est plein : la publication ne doit pas attendre
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            publisher.publish_until(
                SessionEvent::Closed {
                    reason: CloseReason::Disconnected,
                },
                &stop,
            ),
        )
        .await
        .expect("publication bounded by the stop token");

        let mut rx = EventReceiver::new(rx);
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Reconnected { attempt: 1 })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::Closed {
            reason: CloseReason::EndOfStream
        }
        .is_terminal());
        assert!(!SessionEvent::Reconnecting {
            attempt: 1,
            max_retries: 3
        }
        .is_terminal());
    }
}
