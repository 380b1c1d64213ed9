pub mod init;
pub mod ping;
pub mod run;
