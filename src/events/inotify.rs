//! inotify backend
//!
//! inotify watches paths, not descriptors, so a registration goes through the
//! `/proc/self/fd/N` magic link. That resolves to the inode behind the open
//! descriptor even after the file has been unlinked. Watches are added with
//! `IN_ONESHOT`, and the returned watch descriptor is mapped back to the file
//! descriptors the caller registered, so deliveries name the same identifier
//! kqueue would.
//!
//! inotify keeps one watch per inode. Two descriptors for the same inode (the
//! watched directory and a `here -> .` symlink in it) share a watch
//! descriptor, and each event is delivered once per registered descriptor.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent, WatchDescriptor};
use tracing::trace;

use super::{Delivery, EventClass, Interest, Notifier, Receipt};
use crate::error::{RerunError, RerunResult};

pub struct InotifyNotifier {
    inotify: Inotify,
    watches: HashMap<WatchDescriptor, BTreeSet<RawFd>>,
    pending: VecDeque<Delivery>,
}

impl InotifyNotifier {
    pub fn new() -> RerunResult<Self> {
        let inotify = Inotify::init(InitFlags::IN_CLOEXEC)
            .map_err(|errno| RerunError::Notifier(io::Error::from(errno)))?;
        Ok(Self {
            inotify,
            watches: HashMap::new(),
            pending: VecDeque::new(),
        })
    }

    fn translate(&mut self, event: InotifyEvent) -> RerunResult<()> {
        if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
            return Err(RerunError::Phase("inotify queue overflow"));
        }
        // A one-shot watch is dropped right after it fires.
        if event.mask.contains(AddWatchFlags::IN_IGNORED) {
            self.watches.remove(&event.wd);
            return Ok(());
        }
        let idents = self
            .watches
            .get(&event.wd)
            .ok_or(RerunError::Phase("event for an unregistered inotify watch"))?;
        trace!(?idents, mask = ?event.mask, name = ?event.name, "inotify event");
        for &ident in idents {
            self.pending.push_back(Delivery {
                ident,
                class: EventClass::Vnode,
                entry: event.name.clone(),
            });
        }
        Ok(())
    }

    /// Moves `ident` onto `wd`, leaving any watch it was registered under before.
    fn bind(&mut self, wd: WatchDescriptor, ident: RawFd) {
        for idents in self.watches.values_mut() {
            idents.remove(&ident);
        }
        self.watches.retain(|_, idents| !idents.is_empty());
        self.watches.entry(wd).or_default().insert(ident);
    }
}

/// Maps the vnode interest onto inotify flags.
///
/// For a directory, "write" means its entry list changed. `IN_MODIFY` is left
/// out there, since on a directory watch it reports writes to the children.
fn watch_mask(interest: Interest, is_dir: bool) -> AddWatchFlags {
    let mut mask = AddWatchFlags::IN_ONESHOT;
    if interest.contains(Interest::DELETE) {
        mask |= AddWatchFlags::IN_DELETE_SELF | AddWatchFlags::IN_MOVE_SELF;
        if !is_dir {
            // unlink only drops the link count while we hold the file open
            mask |= AddWatchFlags::IN_ATTRIB;
        }
    }
    if interest.contains(Interest::WRITE) {
        if is_dir {
            mask |= AddWatchFlags::IN_CREATE
                | AddWatchFlags::IN_DELETE
                | AddWatchFlags::IN_MOVED_FROM
                | AddWatchFlags::IN_MOVED_TO;
        } else {
            mask |= AddWatchFlags::IN_MODIFY;
        }
    }
    if interest.contains(Interest::EXTEND) {
        mask |= if is_dir {
            AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO
        } else {
            AddWatchFlags::IN_MODIFY
        };
    }
    mask
}

impl Notifier for InotifyNotifier {
    fn register(&mut self, file: &File, interest: Interest) -> RerunResult<Receipt> {
        let ident = file.as_raw_fd();
        let is_dir = file
            .metadata()
            .map_err(|source| RerunError::Register { ident, source })?
            .is_dir();
        let link = format!("/proc/self/fd/{ident}");

        let errno = match self.inotify.add_watch(link.as_str(), watch_mask(interest, is_dir)) {
            Ok(wd) => {
                self.bind(wd, ident);
                0
            }
            Err(errno) => errno as i32,
        };

        Ok(Receipt {
            ident,
            class: EventClass::Vnode,
            errno,
        })
    }

    fn wait(&mut self) -> RerunResult<Delivery> {
        loop {
            if let Some(delivery) = self.pending.pop_front() {
                return Ok(delivery);
            }

            let events = match self.inotify.read_events() {
                Ok(events) => events,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(RerunError::Wait(io::Error::from(errno))),
            };
            for event in events {
                self.translate(event)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::arm;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_watch_mask_for_file() {
        let mask = watch_mask(Interest::CHANGES, false);
        assert!(mask.contains(AddWatchFlags::IN_ONESHOT));
        assert!(mask.contains(AddWatchFlags::IN_MODIFY));
        assert!(mask.contains(AddWatchFlags::IN_ATTRIB));
        assert!(!mask.contains(AddWatchFlags::IN_CREATE));
    }

    #[test]
    fn test_watch_mask_for_directory_skips_child_writes() {
        let mask = watch_mask(Interest::CHANGES, true);
        assert!(mask.contains(AddWatchFlags::IN_ONESHOT));
        assert!(mask.contains(AddWatchFlags::IN_CREATE));
        assert!(mask.contains(AddWatchFlags::IN_MOVED_TO));
        assert!(!mask.contains(AddWatchFlags::IN_MODIFY));
        assert!(!mask.contains(AddWatchFlags::IN_ATTRIB));
    }

    #[test]
    fn test_write_to_registered_file_is_delivered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.rs");
        fs::write(&path, "fn main() {}\n").unwrap();
        let file = File::open(&path).unwrap();

        let mut notifier = InotifyNotifier::new().unwrap();
        let receipt = notifier.register(&file, Interest::CHANGES).unwrap();
        receipt.confirm(file.as_raw_fd()).unwrap();

        fs::write(&path, "fn main() { println!(); }\n").unwrap();

        let delivery = notifier.wait().unwrap();
        assert_eq!(delivery.ident, file.as_raw_fd());
        assert_eq!(delivery.class, EventClass::Vnode);
        assert_eq!(delivery.entry, None);
    }

    #[test]
    fn test_rearmed_file_is_delivered_again() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        fs::write(&path, "a").unwrap();
        let file = File::open(&path).unwrap();

        let mut notifier = InotifyNotifier::new().unwrap();
        notifier.register(&file, Interest::CHANGES).unwrap();
        fs::write(&path, "b").unwrap();
        assert_eq!(notifier.wait().unwrap().ident, file.as_raw_fd());

        notifier.register(&file, Interest::CHANGES).unwrap();
        fs::write(&path, "c").unwrap();
        assert_eq!(notifier.wait().unwrap().ident, file.as_raw_fd());
    }

    #[test]
    fn test_directory_event_names_the_entry() {
        let dir = tempdir().unwrap();
        let handle = File::open(dir.path()).unwrap();

        let mut notifier = InotifyNotifier::new().unwrap();
        notifier
            .register(&handle, Interest::CHANGES)
            .unwrap()
            .confirm(handle.as_raw_fd())
            .unwrap();

        fs::write(dir.path().join("new.txt"), "x").unwrap();

        let delivery = notifier.wait().unwrap();
        assert_eq!(delivery.ident, handle.as_raw_fd());
        assert_eq!(delivery.entry.as_deref(), Some(std::ffi::OsStr::new("new.txt")));
    }

    #[test]
    fn test_shared_inode_delivers_to_every_descriptor() {
        let dir = tempdir().unwrap();
        let handle = File::open(dir.path()).unwrap();
        let alias = File::open(dir.path().join(".")).unwrap();

        let mut notifier = InotifyNotifier::new().unwrap();
        arm(&mut notifier, &handle).unwrap();
        arm(&mut notifier, &alias).unwrap();

        fs::write(dir.path().join("new.txt"), "x").unwrap();

        let mut idents = vec![notifier.wait().unwrap().ident, notifier.wait().unwrap().ident];
        idents.sort_unstable();
        let mut expected = vec![handle.as_raw_fd(), alias.as_raw_fd()];
        expected.sort_unstable();
        assert_eq!(idents, expected);
    }

    #[test]
    fn test_rearming_one_alias_keeps_the_other() {
        let dir = tempdir().unwrap();
        let handle = File::open(dir.path()).unwrap();
        let alias = File::open(dir.path().join(".")).unwrap();

        let mut notifier = InotifyNotifier::new().unwrap();
        arm(&mut notifier, &handle).unwrap();
        arm(&mut notifier, &alias).unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        notifier.wait().unwrap();
        notifier.wait().unwrap();

        // Both re-armed: the second registration joins the first one's watch.
        arm(&mut notifier, &handle).unwrap();
        arm(&mut notifier, &alias).unwrap();
        fs::write(dir.path().join("b.txt"), "x").unwrap();

        let first = notifier.wait().unwrap();
        let second = notifier.wait().unwrap();
        assert_ne!(first.ident, second.ident);
        assert_eq!(first.entry.as_deref(), Some(std::ffi::OsStr::new("b.txt")));
    }
}
