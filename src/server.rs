pub mod acceptor;
pub mod connection;
