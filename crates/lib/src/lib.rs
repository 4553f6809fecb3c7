//! Warden core library: command policy and validation, synchronous execution, the
//! background process supervisor, and the HTTP gateway that exposes them.

pub mod config;
pub mod exec;
pub mod gateway;
pub mod init;
pub mod supervisor;
