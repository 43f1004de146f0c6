use std::fmt;
use std::io;


/// Something that can go wrong driving a packet socket.
#[derive(Debug)]
pub enum Error {

    /// A system call failed. The name of the call is kept alongside the
    /// OS error so a failure deep in a worker still reads usefully.
    Syscall {

        /// The call that failed.
        call: &'static str,

        /// The error the OS gave back.
        source: io::Error,
    },

    /// An interface name that the OS does not know about, or that could
    /// not even be passed to it.
    UnknownInterface(String),
}

impl Error {

    /// Wraps the current `errno` value with the name of the call that
    /// produced it.
    pub(crate) fn syscall(call: &'static str) -> Self {
        Self::Syscall { call, source: io::Error::last_os_error() }
    }

    /// Whether this error is the kernel politely asking us to try again.
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::Syscall { source, .. } => source.kind() == io::ErrorKind::WouldBlock,
            Self::UnknownInterface(_)    => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall { call, source }  => write!(f, "{}: {}", call, source),
            Self::UnknownInterface(name)    => write!(f, "no such interface {:?}", name),
        }
    }
}
