//! kqueue backend
//!
//! Registrations are `EVFILT_VNODE` with `EV_ADD | EV_RECEIPT | EV_ONESHOT`.
//! `EV_RECEIPT` makes the registration call return a receipt (flagged
//! `EV_ERROR`, with the error code in `data`) instead of pending events.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use nix::errno::Errno;
use nix::sys::event::{EventFilter, EventFlag, FilterFlag, KEvent, Kqueue};
use tracing::trace;

use super::{Delivery, EventClass, Interest, Notifier, Receipt};
use crate::error::{RerunError, RerunResult};

pub struct KqueueNotifier {
    kq: Kqueue,
}

impl KqueueNotifier {
    pub fn new() -> RerunResult<Self> {
        let kq = Kqueue::new().map_err(|errno| RerunError::Notifier(io::Error::from(errno)))?;
        Ok(Self { kq })
    }
}

fn filter_flags(interest: Interest) -> FilterFlag {
    let mut fflags = FilterFlag::empty();
    if interest.contains(Interest::DELETE) {
        fflags |= FilterFlag::NOTE_DELETE;
    }
    if interest.contains(Interest::EXTEND) {
        fflags |= FilterFlag::NOTE_EXTEND;
    }
    if interest.contains(Interest::WRITE) {
        fflags |= FilterFlag::NOTE_WRITE;
    }
    fflags
}

fn class_of(event: &KEvent) -> EventClass {
    match event.filter() {
        Ok(EventFilter::EVFILT_VNODE) => EventClass::Vnode,
        _ => EventClass::Other,
    }
}

fn empty_event() -> KEvent {
    KEvent::new(
        0,
        EventFilter::EVFILT_VNODE,
        EventFlag::empty(),
        FilterFlag::empty(),
        0,
        0,
    )
}

impl Notifier for KqueueNotifier {
    fn register(&mut self, file: &File, interest: Interest) -> RerunResult<Receipt> {
        let ident = file.as_raw_fd();
        let change = KEvent::new(
            ident as usize,
            EventFilter::EVFILT_VNODE,
            EventFlag::EV_ADD | EventFlag::EV_RECEIPT | EventFlag::EV_ONESHOT,
            filter_flags(interest),
            0,
            0,
        );
        let mut receipt = [empty_event()];

        let n = self
            .kq
            .kevent(&[change], &mut receipt, None)
            .map_err(|errno| RerunError::register(ident, errno))?;

        let ev = &receipt[0];
        if n != 1 || !ev.flags().contains(EventFlag::EV_ERROR) {
            return Err(RerunError::Phase("registration was not acknowledged"));
        }

        Ok(Receipt {
            ident: ev.ident() as RawFd,
            class: class_of(ev),
            errno: ev.data() as i32,
        })
    }

    fn wait(&mut self) -> RerunResult<Delivery> {
        let mut events = [empty_event()];
        let n = loop {
            match self.kq.kevent(&[], &mut events, None) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(RerunError::Wait(io::Error::from(errno))),
            }
        };
        if n != 1 {
            return Err(RerunError::Phase("wait returned no event"));
        }

        let ev = &events[0];
        trace!(ident = ev.ident(), fflags = ?ev.fflags(), "kqueue event");
        Ok(Delivery {
            ident: ev.ident() as RawFd,
            class: class_of(ev),
            entry: None,
        })
    }
}
