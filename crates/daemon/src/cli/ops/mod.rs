pub mod daemon;
pub mod health;
pub mod init;
pub mod status;
pub mod sweep;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use init::Init;
pub use status::Status;
pub use sweep::Sweep;
pub use version::Version;
