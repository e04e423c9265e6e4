use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::capsule::Capsule;
use crate::directory::UserDirectory;
use crate::mail::{self, EmailSender, OutboundEmail};
use crate::notify::Notifier;

/// What actually went out for a lifecycle event. Used for sweep summaries;
/// engine callers are free to ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub notified: bool,
    pub emailed: bool,
}

/// Fan-out of capsule lifecycle events to email and the in-app feed.
///
/// This is the one place side effects leave the transactional path. Every
/// directory, mailer, and notifier failure is caught and logged here;
/// nothing downstream of the outbox can fail a create, update, or unlock.
pub struct Outbox {
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn EmailSender>,
    portal_url: String,
}

impl Outbox {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        mailer: Arc<dyn EmailSender>,
        portal_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            notifier,
            mailer,
            portal_url: portal_url.into(),
        }
    }

    /// A capsule was just created: email its recipient.
    ///
    /// Registered recipients get the dashboard notice; bare addresses get
    /// the sign-up variant with the portal link.
    pub async fn capsule_created(&self, capsule: &Capsule) -> DispatchReceipt {
        let mut receipt = DispatchReceipt::default();
        let Some(to) = capsule.recipient_email.as_deref() else {
            tracing::warn!(capsule_id = %capsule.id, "capsule has no notification address");
            return receipt;
        };

        let sender = self.display_name(capsule.owner_id).await;
        let email = match capsule.recipient_id {
            Some(recipient_id) => {
                let recipient = self.display_name(recipient_id).await;
                mail::capsule_created_registered(
                    to,
                    recipient.as_deref(),
                    sender.as_deref(),
                    capsule.unlock_at,
                )
            }
            None => mail::capsule_created_external(
                to,
                sender.as_deref(),
                capsule.unlock_at,
                &self.portal_url,
            ),
        };
        receipt.emailed = self.send_email(capsule.id, email).await;

        receipt
    }

    /// A capsule was just released: email the recipient and post an in-app
    /// notice.
    ///
    /// The registered recipient hears about their capsule directly; for an
    /// external recipient the owner is told their capsule went out instead.
    pub async fn capsule_unlocked(&self, capsule: &Capsule) -> DispatchReceipt {
        let mut receipt = DispatchReceipt::default();
        let sender = self.display_name(capsule.owner_id).await;

        if let Some(to) = capsule.recipient_email.as_deref() {
            let recipient = match capsule.recipient_id {
                Some(id) => self.display_name(id).await,
                None => None,
            };
            let email = mail::capsule_unlocked(to, recipient.as_deref(), sender.as_deref());
            receipt.emailed = self.send_email(capsule.id, email).await;
        }

        match capsule.recipient_id {
            Some(recipient_id) => {
                let message = match sender.as_deref() {
                    Some(name) => format!("A time capsule from {name} has unlocked"),
                    None => "A time capsule addressed to you has unlocked".to_string(),
                };
                receipt.notified = self
                    .push_notice(recipient_id, &message, capsule.id)
                    .await;
            }
            None => {
                let to = capsule.recipient_email.as_deref().unwrap_or("its recipient");
                let message = format!("Your time capsule to {to} has unlocked");
                receipt.notified = self
                    .push_notice(capsule.owner_id, &message, capsule.id)
                    .await;
            }
        }

        receipt
    }

    /// The release date of a pending capsule moved: email the recipient.
    pub async fn unlock_date_changed(
        &self,
        capsule: &Capsule,
        previous: OffsetDateTime,
    ) -> DispatchReceipt {
        let mut receipt = DispatchReceipt::default();
        let Some(to) = capsule.recipient_email.as_deref() else {
            return receipt;
        };

        let sender = self.display_name(capsule.owner_id).await;
        let recipient = match capsule.recipient_id {
            Some(id) => self.display_name(id).await,
            None => None,
        };
        let email = mail::unlock_date_changed(
            to,
            recipient.as_deref(),
            sender.as_deref(),
            previous,
            capsule.unlock_at,
        );
        receipt.emailed = self.send_email(capsule.id, email).await;

        receipt
    }

    async fn display_name(&self, id: Uuid) -> Option<String> {
        match self.directory.lookup(id).await {
            Ok(record) => record.map(|r| r.display_name),
            Err(err) => {
                tracing::warn!(user_id = %id, "directory lookup failed: {err}");
                None
            }
        }
    }

    async fn send_email(&self, capsule_id: Uuid, email: OutboundEmail) -> bool {
        let subject = email.subject.clone();
        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    capsule_id = %capsule_id,
                    subject = %subject,
                    "failed to send email: {err}"
                );
                false
            }
        }
    }

    async fn push_notice(&self, user_id: Uuid, message: &str, capsule_id: Uuid) -> bool {
        match self.notifier.notify(user_id, message, Some(capsule_id)).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    capsule_id = %capsule_id,
                    "failed to post notification: {err}"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capsule::{Capsule, CapsuleState, ContentKind, DESCRIPTION_FILENAME};
    use crate::directory::MemoryDirectory;
    use crate::mail::{MailError, MemoryMailer};
    use crate::notify::MemoryNotifier;
    use async_trait::async_trait;
    use blob_store::BlobLocator;
    use time::Duration;

    struct Fixture {
        directory: MemoryDirectory,
        notifier: MemoryNotifier,
        mailer: MemoryMailer,
        outbox: Outbox,
    }

    fn fixture() -> Fixture {
        let directory = MemoryDirectory::new();
        let notifier = MemoryNotifier::new();
        let mailer = MemoryMailer::new();
        let outbox = Outbox::new(
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
            Arc::new(mailer.clone()),
            "https://heirloom.example.com",
        );
        Fixture {
            directory,
            notifier,
            mailer,
            outbox,
        }
    }

    fn capsule(owner_id: Uuid, recipient_id: Option<Uuid>, recipient_email: &str) -> Capsule {
        let now = OffsetDateTime::now_utc();
        Capsule {
            id: Uuid::new_v4(),
            owner_id,
            recipient_id,
            recipient_email: Some(recipient_email.to_string()),
            description: Some("teaser".to_string()),
            filename: DESCRIPTION_FILENAME.to_string(),
            content_kind: ContentKind::Text,
            payload_size: 6,
            locator: BlobLocator::primary("capsules/fixture"),
            iv: vec![0; 12],
            state: CapsuleState::Locked,
            unlock_at: now + Duration::days(30),
            unlocked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_created_registered_uses_directory_names() {
        let f = fixture();
        let owner = f.directory.register("bruno@example.com", "bruno");
        let recipient = f.directory.register("ana@example.com", "ana");
        let c = capsule(owner.id, Some(recipient.id), &recipient.email);

        let receipt = f.outbox.capsule_created(&c).await;

        assert!(receipt.emailed);
        assert!(!receipt.notified);
        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ana@example.com");
        assert!(sent[0].body.contains("Hi ana,"));
        assert!(sent[0].body.contains("bruno has created"));
    }

    #[tokio::test]
    async fn test_created_external_gets_portal_link() {
        let f = fixture();
        let owner = f.directory.register("bruno@example.com", "bruno");
        let c = capsule(owner.id, None, "stranger@example.com");

        let receipt = f.outbox.capsule_created(&c).await;

        assert!(receipt.emailed);
        let sent = f.mailer.sent();
        assert!(sent[0].body.contains("https://heirloom.example.com"));
    }

    #[tokio::test]
    async fn test_unlocked_notifies_registered_recipient() {
        let f = fixture();
        let owner = f.directory.register("bruno@example.com", "bruno");
        let recipient = f.directory.register("ana@example.com", "ana");
        let c = capsule(owner.id, Some(recipient.id), &recipient.email);

        let receipt = f.outbox.capsule_unlocked(&c).await;

        assert!(receipt.emailed);
        assert!(receipt.notified);
        let notices = f.notifier.for_user(recipient.id);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("from bruno"));
        assert_eq!(notices[0].capsule_id, Some(c.id));
        assert!(f.notifier.for_user(owner.id).is_empty());
    }

    #[tokio::test]
    async fn test_unlocked_external_capsule_notifies_owner_instead() {
        let f = fixture();
        let owner = f.directory.register("bruno@example.com", "bruno");
        let c = capsule(owner.id, None, "stranger@example.com");

        let receipt = f.outbox.capsule_unlocked(&c).await;

        assert!(receipt.emailed);
        assert!(receipt.notified);
        let notices = f.notifier.for_user(owner.id);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("stranger@example.com"));
    }

    #[tokio::test]
    async fn test_date_changed_emails_both_dates() {
        let f = fixture();
        let owner = f.directory.register("bruno@example.com", "bruno");
        let recipient = f.directory.register("ana@example.com", "ana");
        let mut c = capsule(owner.id, Some(recipient.id), &recipient.email);

        let previous = c.unlock_at;
        c.unlock_at = previous + Duration::days(365);
        let receipt = f.outbox.unlock_date_changed(&c, previous).await;

        assert!(receipt.emailed);
        let sent = f.mailer.sent();
        assert_eq!(sent[0].subject, "Your time capsule unlock date has been updated");
        assert!(sent[0].body.contains("bruno has updated"));
    }

    struct BrokenMailer;

    #[async_trait]
    impl EmailSender for BrokenMailer {
        async fn send(&self, _email: OutboundEmail) -> Result<(), MailError> {
            Err(MailError::new("smtp relay on fire"))
        }
    }

    #[tokio::test]
    async fn test_mailer_failure_is_swallowed() {
        let directory = MemoryDirectory::new();
        let notifier = MemoryNotifier::new();
        let outbox = Outbox::new(
            Arc::new(directory.clone()),
            Arc::new(notifier.clone()),
            Arc::new(BrokenMailer),
            "https://heirloom.example.com",
        );
        let owner = directory.register("bruno@example.com", "bruno");
        let recipient = directory.register("ana@example.com", "ana");
        let c = capsule(owner.id, Some(recipient.id), &recipient.email);

        let receipt = outbox.capsule_unlocked(&c).await;

        // Email failed quietly; the in-app notice still landed.
        assert!(!receipt.emailed);
        assert!(receipt.notified);
        assert_eq!(notifier.for_user(recipient.id).len(), 1);
    }
}
