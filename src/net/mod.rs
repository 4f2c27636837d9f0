//! Networking primitives
//!
//! The types provided in this module are non-blocking by default and are
//! designed to be portable across all supported Mio platforms. As long as the
//! [portability guidelines] are followed, the behavior should be identical no
//! matter the target platform.
//!
//! [portability guidelines]: ../struct.Poll.html#portability

#[cfg(feature = "net")]
mod tcp;
#[cfg(feature = "net")]
pub use self::tcp::{TcpListener, TcpStream};

#[cfg(feature = "net")]
mod udp;
#[cfg(feature = "net")]
pub use self::udp::UdpSocket;

#[cfg(all(unix, feature = "net"))]
mod uds;
#[cfg(all(unix, feature = "net"))]
pub use self::uds::{UnixDatagram, UnixListener, UnixStream};
