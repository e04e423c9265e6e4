/**
 * Capsule domain model and lifecycle.
 *  - Capsule record, content kinds, state machine
 *  - Storage trait + in-memory implementation
 *  - Engine driving create / unlock / update / delete
 *  - Background unlock scheduler
 */
pub mod capsule;
/**
 * Payload encryption.
 *  AES-256-GCM with a per-capsule random nonce.
 */
pub mod crypto;
/**
 * User lookup for resolving capsule recipients.
 */
pub mod directory;
/**
 * Authenticated caller identity.
 */
pub mod identity;
/**
 * Outbound email: message type, sender trait,
 *  and the lifecycle notice templates.
 */
pub mod mail;
/**
 * In-app notification feed.
 */
pub mod notify;
/**
 * Fan-out of lifecycle events to email and the
 *  notification feed. Failures are logged, never
 *  surfaced to the triggering request.
 */
pub mod outbox;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::capsule::{
        Capsule, CapsuleEngine, CapsuleError, CapsuleState, CapsuleStore, ContentKind,
    };
    pub use crate::crypto::{Cipher, CipherError, Sealed};
    pub use crate::directory::{UserDirectory, UserRecord};
    pub use crate::identity::Principal;
    pub use crate::version::build_info;
}
