pub mod context;
pub mod edit;
pub mod history;
pub mod init;
pub mod show;
pub mod system;
