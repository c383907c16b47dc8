//! Session notifications for the UI collaborator.
//!
//! The read callback runs on a thread the capture source owns, so
//! notices travel over an unbounded channel instead of calling into UI
//! code directly.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// An event the session surfaces to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// An asynchronous failure, with the stable error code from
    /// [`crate::errors::CaptureError::code`].
    Error { message: String, code: i32 },
    /// The negotiated format, as a "WxH @ Nfps" display string.
    FormatAnnounced(String),
}

/// Sending half handed to the session.
#[derive(Clone)]
pub struct NoticeSender {
    tx: Sender<SessionNotice>,
}

impl NoticeSender {
    pub fn error(&self, message: impl Into<String>, code: i32) {
        let message = message.into();
        log::error!("session error ({code}): {message}");
        let _ = self.tx.send(SessionNotice::Error { message, code });
    }

    pub fn format_announced(&self, announcement: impl Into<String>) {
        let _ = self
            .tx
            .send(SessionNotice::FormatAnnounced(announcement.into()));
    }
}

/// Receiving half kept by the host; also the factory for senders.
pub struct NotificationHub {
    tx: Sender<SessionNotice>,
    rx: Receiver<SessionNotice>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> NoticeSender {
        NoticeSender {
            tx: self.tx.clone(),
        }
    }

    /// Non-blocking poll for the next notice.
    pub fn try_next(&self) -> Option<SessionNotice> {
        match self.rx.try_recv() {
            Ok(notice) => Some(notice),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Some(notice) = self.try_next() {
            notices.push(notice);
        }
        notices
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
