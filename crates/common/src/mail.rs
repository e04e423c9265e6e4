//! Outbound email
//!
//! Message type, sender trait, and the builders for the four lifecycle
//! notices a capsule can produce. Builders are pure; personalization falls
//! back to "there"/"Someone" when a display name is missing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;

/// A fully-rendered email, ready for whatever transport is wired in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("mail transport error: {0}")]
pub struct MailError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl MailError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError>;
}

/// "2033-05-18 03:33 UTC"
fn stamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02} UTC",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

/// "2033-05-18 at 03:33 UTC", for running text.
fn prose_stamp(at: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} at {:02}:{:02} UTC",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

fn greeting(name: Option<&str>) -> String {
    format!("Hi {},", name.unwrap_or("there"))
}

/// Notice to a registered recipient that a capsule now exists for them.
pub fn capsule_created_registered(
    to: &str,
    recipient_name: Option<&str>,
    sender_name: Option<&str>,
    unlock_at: OffsetDateTime,
) -> OutboundEmail {
    let body = format!(
        "{greeting}\n\n\
         {sender} has created a time capsule for you. It will unlock on {date}.\n\n\
         You will be notified the moment it opens.\n\n\
         The Heirloom team",
        greeting = greeting(recipient_name),
        sender = sender_name.unwrap_or("Someone"),
        date = stamp(unlock_at),
    );

    OutboundEmail {
        to: to.to_string(),
        subject: "A time capsule has been created for you".to_string(),
        body,
    }
}

/// Notice to an address with no account, with a sign-up call to action.
pub fn capsule_created_external(
    to: &str,
    sender_name: Option<&str>,
    unlock_at: OffsetDateTime,
    portal_url: &str,
) -> OutboundEmail {
    let body = format!(
        "{greeting}\n\n\
         {sender} has created a time capsule for you on Heirloom. It will unlock on {date}.\n\n\
         Create an account to view it when it opens: {portal_url}\n\n\
         The Heirloom team",
        greeting = greeting(None),
        sender = sender_name.unwrap_or("Someone"),
        date = stamp(unlock_at),
    );

    OutboundEmail {
        to: to.to_string(),
        subject: "A time capsule has been created for you".to_string(),
        body,
    }
}

/// Notice that a capsule has been released.
pub fn capsule_unlocked(
    to: &str,
    recipient_name: Option<&str>,
    sender_name: Option<&str>,
) -> OutboundEmail {
    let body = format!(
        "{greeting}\n\n\
         A time capsule from {sender} has just unlocked. Sign in to view its contents.\n\n\
         The Heirloom team",
        greeting = greeting(recipient_name),
        sender = sender_name.unwrap_or("someone"),
    );

    OutboundEmail {
        to: to.to_string(),
        subject: "Your time capsule has unlocked".to_string(),
        body,
    }
}

/// Notice that the release date of a pending capsule moved.
pub fn unlock_date_changed(
    to: &str,
    recipient_name: Option<&str>,
    sender_name: Option<&str>,
    previous: OffsetDateTime,
    updated: OffsetDateTime,
) -> OutboundEmail {
    let body = format!(
        "{greeting}\n\n\
         {sender} has updated the unlock date of a time capsule addressed to you.\n\n\
         It was set to open on {old}. It will now open on {new}.\n\n\
         The Heirloom team",
        greeting = greeting(recipient_name),
        sender = sender_name.unwrap_or("The sender"),
        old = prose_stamp(previous),
        new = prose_stamp(updated),
    );

    OutboundEmail {
        to: to.to_string(),
        subject: "Your time capsule unlock date has been updated".to_string(),
        body,
    }
}

/// Logs the send instead of delivering it. Stands in for a real transport
/// until one is wired to the daemon.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "outbound email (log transport)"
        );
        Ok(())
    }
}

/// Records sends in memory for test assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<OutboundEmail>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.read().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<OutboundEmail> {
        self.sent
            .read()
            .iter()
            .filter(|e| e.to.eq_ignore_ascii_case(to))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmailSender for MemoryMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        self.sent.write().push(email);
        Ok(())
    }
}
