use crate::errors::*;
use nix::fcntl::OFlag;
use nix::unistd::{close, pipe2, read, write};
use std::cell::Cell;
use std::os::unix::io::RawFd;

const CLOSED: RawFd = -1;
const READY: u8 = b'1';

/// One-shot barrier between the orchestrator and its freshly cloned child.
///
/// The child blocks in [`Sync::wait_for_parent`] until the parent has
/// finished installing its id maps and calls [`Sync::release_child`]. If the
/// parent closes its end without releasing, the child reads EOF and gives up.
///
/// Both ends are `O_CLOEXEC`, so nothing leaks into the re-exec'd spawner.
pub struct Sync {
    read_fd: Cell<RawFd>,
    write_fd: Cell<RawFd>,
}

impl Sync {
    pub fn new() -> Result<Self> {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).context("create sync pipe")?;
        Ok(Sync {
            read_fd: Cell::new(read_fd),
            write_fd: Cell::new(write_fd),
        })
    }

    /// Child side: drop our copy of the write end and block for the go-ahead.
    pub fn wait_for_parent(&self) -> Result<()> {
        self.close_write_end()?;
        let mut buf = [0u8; 1];
        loop {
            match read(self.read_fd.get(), &mut buf) {
                Ok(0) => crate::bail!("parent closed the sync pipe before releasing the child"),
                Ok(_) if buf[0] == READY => return Ok(()),
                Ok(_) => crate::bail!("unexpected byte on sync pipe: {:#x}", buf[0]),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e).context("read sync pipe"),
            }
        }
    }

    /// Parent side: let the child continue, then close our write end.
    pub fn release_child(&self) -> Result<()> {
        write(self.write_fd.get(), &[READY]).context("write sync pipe")?;
        self.close_write_end()
    }

    pub fn close_read_end(&self) -> Result<()> {
        close_fd(&self.read_fd)
    }

    pub fn close_write_end(&self) -> Result<()> {
        close_fd(&self.write_fd)
    }
}

fn close_fd(fd: &Cell<RawFd>) -> Result<()> {
    let raw = fd.replace(CLOSED);
    if raw != CLOSED {
        close(raw).context("close sync pipe")?;
    }
    Ok(())
}

impl Drop for Sync {
    fn drop(&mut self) {
        let _ = close_fd(&self.read_fd);
        let _ = close_fd(&self.write_fd);
    }
}
