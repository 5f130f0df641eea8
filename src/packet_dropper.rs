use std::fs::File;
use std::io::{self, ErrorKind, Read as _};
use std::net::Shutdown;
use std::os::fd::{AsFd as _, OwnedFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Reads and discards everything arriving on a placeholder interface, so nothing queues up in front of it.
pub struct PacketDropper {
    thread: Option<JoinHandle<()>>,
    waker: UnixStream,
    monitor: DropperMonitor,
}

#[derive(Clone, Debug, Default)]
pub struct DropperMonitor {
    bytes_dropped: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl DropperMonitor {
    pub fn bytes_dropped(&self) -> u64 {
        self.bytes_dropped.load(Ordering::Acquire)
    }

    /// Turns false only after the descriptor has been closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl PacketDropper {
    pub fn start(fd: OwnedFd, mtu: u16) -> io::Result<Self> {
        let (waker, wake_receiver) = UnixStream::pair()?;
        let monitor = DropperMonitor { bytes_dropped: Default::default(), alive: Arc::new(AtomicBool::new(true)) };
        let thread_monitor = monitor.clone();
        let device = File::from(fd);
        let thread = thread::Builder::new().name("packet-dropper".into()).spawn(move || {
            drop_packets(device, wake_receiver, usize::from(mtu).max(1), &thread_monitor.bytes_dropped);
            thread_monitor.alive.store(false, Ordering::Release);
        });
        let thread = match thread {
            Ok(thread) => thread,
            Err(error) => {
                monitor.alive.store(false, Ordering::Release);
                return Err(error);
            }
        };
        tracing::info!(message_id = "Hc4pZr1w", "packet dropper started");
        Ok(Self { thread: Some(thread), waker, monitor })
    }

    pub fn monitor(&self) -> DropperMonitor {
        self.monitor.clone()
    }

    /// Returns once the reader thread has exited and the descriptor is closed.
    pub fn stop(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // The reader may have exited on its own already, in which case this fails harmlessly.
        if let Err(error) = self.waker.shutdown(Shutdown::Both) {
            tracing::debug!(message_id = "b0TqJvkS", ?error, "failed to signal packet dropper");
        }
        if thread.join().is_err() {
            tracing::error!(message_id = "Ws7uXo2e", "packet dropper thread panicked");
        }
        tracing::info!(
            message_id = "rE9kYm3d",
            bytes_dropped = self.monitor.bytes_dropped(),
            "packet dropper stopped"
        );
    }
}

impl Drop for PacketDropper {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn drop_packets(device: File, wake: UnixStream, buffer_len: usize, bytes_dropped: &AtomicU64) {
    let mut buf = vec![0u8; buffer_len];
    loop {
        let mut fds = [PollFd::new(device.as_fd(), PollFlags::POLLIN), PollFd::new(wake.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(error) => {
                tracing::error!(message_id = "kD2xq8Lm", ?error, "failed to poll placeholder interface");
                return;
            }
        }
        if fds[1].revents().is_some_and(|revents| !revents.is_empty()) {
            return;
        }
        let Some(revents) = fds[0].revents() else {
            continue;
        };
        if revents.contains(PollFlags::POLLIN) {
            match (&device).read(&mut buf) {
                Ok(0) => {
                    tracing::info!(message_id = "Zf5nRw0a", "placeholder interface reached end of stream");
                    return;
                }
                Ok(n) => {
                    bytes_dropped.fetch_add(n as u64, Ordering::AcqRel);
                }
                Err(error) if matches!(error.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
                Err(error) => {
                    tracing::error!(message_id = "pX7cV1gT", ?error, "failed to read from placeholder interface");
                    return;
                }
            }
        } else if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            return;
        }
    }
}
