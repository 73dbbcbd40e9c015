mod listener;
mod tcp;

use std::time::Duration;

use socket2::TcpKeepalive;

pub use listener::RelayListener;
pub use tcp::dial_stream;

const SOCKET_KEEPALIVE: &'static TcpKeepalive =
    &TcpKeepalive::new().with_time(Duration::from_secs(600));
// Back-off after an accept error that is not tied to a single connection,
// e.g. running out of file descriptors.
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);
