use crate::sys::Socket;

use std::io;
use std::mem::size_of;
use std::net::{self, SocketAddr};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};

pub fn bind(addr: SocketAddr) -> io::Result<net::UdpSocket> {
    let socket = Socket::from_addr(addr, libc::SOCK_DGRAM, 0)?;

    // Set SO_NOSIGPIPE on iOS and macOS (mirrors what libstd does).
    #[cfg(any(target_os = "ios", target_os = "macos"))]
    socket.set_no_sigpipe()?;

    socket.bind(addr)?;
    unsafe { Ok(net::UdpSocket::from_raw_fd(socket.into_raw_fd())) }
}

pub(crate) fn only_v6(socket: &net::UdpSocket) -> io::Result<bool> {
    let mut optval: libc::c_int = 0;
    let mut optlen = size_of::<libc::c_int>() as libc::socklen_t;
    syscall!(getsockopt(
        socket.as_raw_fd(),
        libc::IPPROTO_IPV6,
        libc::IPV6_V6ONLY,
        &mut optval as *mut _ as *mut libc::c_void,
        &mut optlen,
    ))?;
    Ok(optval != 0)
}
