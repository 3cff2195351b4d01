pub mod init;
pub mod notifications;
