//! CLI command implementations

pub mod drafts;
pub mod gc;
pub mod init;
pub mod log;
pub mod recovery;
pub mod restore;
pub mod save;
pub mod stats;
pub mod verify;
pub mod watch;
