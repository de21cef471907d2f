//! TCP-Interface fuer den Portier Commander

pub mod commands;
pub mod server;
pub mod session;

pub use server::{TcpServer, TcpServerKonfig};
