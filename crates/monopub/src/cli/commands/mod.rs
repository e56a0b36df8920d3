//! CLI commands

mod init;
mod list;
mod publish;
mod sync;

pub use init::InitCommand;
pub use list::ListCommand;
pub use publish::PublishCommand;
pub use sync::SyncCommand;
