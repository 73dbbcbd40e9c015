use std::fmt::{Display, Formatter};

/// Which way bytes travel through a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Inbound peer to remote target.
    Upload,
    /// Remote target to inbound peer.
    Download,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Direction::Upload => "Upstream",
            Direction::Download => "Downstream",
        })
    }
}
