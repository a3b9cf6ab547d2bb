//! Socket abstractions the connection and worker types are generic over.
//!
//! Kept as traits (rather than hard-coding `mio::net::TcpStream`) so unit
//! tests can drive a `Connection`/`Worker` over a real loopback socket
//! without requiring a privileged bind, and so the production binary and
//! tests share exactly one state-machine implementation.

pub mod tcp_listener;
pub mod tcp_stream;
