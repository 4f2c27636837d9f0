mod datagram;
pub(crate) use self::datagram::UnixDatagram;

mod listener;
pub(crate) use self::listener::UnixListener;

mod stream;
pub(crate) use self::stream::UnixStream;
