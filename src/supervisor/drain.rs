//! Per-run output draining

use std::io::{self, PipeReader, Read, Write};
use std::sync::Arc;

use tracing::debug;

use super::fence::{Fence, Generation};
use super::process::LiveProcess;
use crate::error::RerunError;
use crate::signal::SignalSender;

const CHUNK: usize = 4096;

/// Copies one run's output to the fenced writer, then reaps the child and
/// raises the teardown signal.
///
/// `id` is captured when the run starts and never re-read; the live
/// generation is consulted on every write.
pub(crate) struct Drain<W> {
    pub(crate) id: Generation,
    pub(crate) reader: PipeReader,
    pub(crate) process: LiveProcess,
    pub(crate) fence: Arc<Fence<W>>,
    pub(crate) teardown: SignalSender,
    pub(crate) label: String,
}

impl<W: Write> Drain<W> {
    pub(crate) fn run(mut self) {
        let mut buf = [0u8; CHUNK];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    self.fence.if_current(self.id, |out| {
                        out.write_all(&buf[..n]).and_then(|()| out.flush())
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(generation = %self.id, error = %err, "output read failed");
                    break;
                }
            }
        }
        drop(self.reader);

        let failure = match self.process.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(RerunError::Exit(status)),
            Err(err) => Some(RerunError::Io(err)),
        };
        debug!(generation = %self.id, failed = failure.is_some(), "run finished");

        if let Some(err) = failure {
            self.fence.if_current(self.id, |out| {
                writeln!(out, "{}: {}", self.label, err).and_then(|()| out.flush())
            });
        }
        let _ = self
            .fence
            .with_output(|out| writeln!(out, "$").and_then(|()| out.flush()));
        self.teardown.notify();
    }
}
