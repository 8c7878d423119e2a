//! One-shot event registration
//!
//! The watcher talks to the kernel's event facility through [`Notifier`]:
//! - `register` arms a descriptor for a single delivery and returns the
//!   facility's receipt, which the caller must [`Receipt::confirm`]
//! - `wait` blocks for exactly one delivery, retrying on `EINTR`
//!
//! A delivered registration is consumed. Nothing more is reported for that
//! descriptor until it is registered again.
//!
//! One backend is compiled per target: kqueue on macOS and the BSDs, inotify
//! on Linux.

use std::ffi::OsString;
use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};

use bitflags::bitflags;

use crate::error::{RerunError, RerunResult};

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(target_os = "linux")]
mod inotify;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub use kqueue::KqueueNotifier as SystemNotifier;

#[cfg(target_os = "linux")]
pub use inotify::InotifyNotifier as SystemNotifier;

bitflags! {
    /// Vnode changes a registration asks to hear about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u8 {
        /// The file was unlinked (or, for inotify, renamed away)
        const DELETE = 1;
        /// The file grew
        const EXTEND = 1 << 1;
        /// The file, or the directory's entry list, was written
        const WRITE = 1 << 2;

        /// Everything the watcher registers for.
        const CHANGES = Self::DELETE.bits() | Self::EXTEND.bits() | Self::WRITE.bits();
    }
}

/// Event class reported by the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Filesystem node event (`EVFILT_VNODE` or an inotify watch event)
    Vnode,
    /// Anything else, which the watcher never asks for
    Other,
}

/// Acknowledgement returned by [`Notifier::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Descriptor the facility says it registered
    pub ident: RawFd,
    /// Event class the facility says it registered
    pub class: EventClass,
    /// Error code reported by the facility, zero on success
    pub errno: i32,
}

impl Receipt {
    /// Checks that the facility acknowledged exactly `requested` for vnode events.
    ///
    /// An unconfirmed registration means the descriptor may never fire again,
    /// so every mismatch is an error the watcher cannot recover from.
    pub fn confirm(&self, requested: RawFd) -> RerunResult<()> {
        if self.ident != requested {
            return Err(RerunError::Phase("receipt names another descriptor"));
        }
        if self.class != EventClass::Vnode {
            return Err(RerunError::Phase("receipt names another event class"));
        }
        if self.errno != 0 {
            return Err(RerunError::register(
                requested,
                nix::errno::Errno::from_raw(self.errno),
            ));
        }
        Ok(())
    }
}

/// A single event taken off the facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Descriptor whose registration fired
    pub ident: RawFd,
    pub class: EventClass,
    /// Directory entry the event was about, when the facility reports one
    pub entry: Option<OsString>,
}

#[cfg(test)]
impl Delivery {
    pub(crate) fn vnode(ident: RawFd) -> Self {
        Self {
            ident,
            class: EventClass::Vnode,
            entry: None,
        }
    }
}

/// Kernel event facility with one-shot registrations.
pub trait Notifier {
    /// Arms `file` for a single delivery of `interest`.
    ///
    /// Returns the facility's receipt. A failure of the call itself is an
    /// `Err`; an error the facility reports about the registration is carried
    /// in [`Receipt::errno`].
    fn register(&mut self, file: &File, interest: Interest) -> RerunResult<Receipt>;

    /// Blocks until one registered event fires.
    fn wait(&mut self) -> RerunResult<Delivery>;
}

/// Registers `file` and confirms the receipt.
pub fn arm<N: Notifier + ?Sized>(notifier: &mut N, file: &File) -> RerunResult<()> {
    notifier
        .register(file, Interest::CHANGES)?
        .confirm(file.as_raw_fd())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    fn receipt(ident: RawFd) -> Receipt {
        Receipt {
            ident,
            class: EventClass::Vnode,
            errno: 0,
        }
    }

    #[test]
    fn test_interest_changes_contains_each_flag() {
        assert!(Interest::CHANGES.contains(Interest::DELETE));
        assert!(Interest::CHANGES.contains(Interest::EXTEND));
        assert!(Interest::CHANGES.contains(Interest::WRITE));
        assert_eq!(
            Interest::DELETE | Interest::EXTEND | Interest::WRITE,
            Interest::CHANGES
        );
        assert!(!Interest::WRITE.contains(Interest::DELETE));
    }

    #[test]
    fn test_interest_rejects_unknown_bits() {
        assert_eq!(Interest::all(), Interest::CHANGES);
        assert_eq!(Interest::from_bits(1 << 3), None);
        assert_eq!(Interest::from_bits(0b101), Some(Interest::DELETE | Interest::WRITE));
    }

    #[test]
    fn test_confirm_accepts_matching_receipt() {
        assert!(receipt(5).confirm(5).is_ok());
    }

    #[test]
    fn test_confirm_rejects_other_descriptor() {
        let err = receipt(6).confirm(5).unwrap_err();
        assert!(matches!(err, RerunError::Phase(_)));
    }

    #[test]
    fn test_confirm_rejects_other_class() {
        let r = Receipt {
            class: EventClass::Other,
            ..receipt(5)
        };
        assert!(matches!(r.confirm(5), Err(RerunError::Phase(_))));
    }

    #[test]
    fn test_confirm_surfaces_facility_error() {
        let r = Receipt {
            errno: Errno::EBADF as i32,
            ..receipt(5)
        };
        match r.confirm(5) {
            Err(RerunError::Register { ident, source }) => {
                assert_eq!(ident, 5);
                assert_eq!(source.raw_os_error(), Some(Errno::EBADF as i32));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
