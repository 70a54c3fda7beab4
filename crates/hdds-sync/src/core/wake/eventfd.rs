// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! eventfd wake backend (Linux).
//!
//! The eventfd counter is the pending-notification state: `notify` writes 1,
//! a successful poll followed by a drain consumes it.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

const EVENTFD_FLAGS: libc::c_int = libc::EFD_NONBLOCK | libc::EFD_CLOEXEC;

#[derive(Debug)]
pub(super) struct EventFdWake {
    fd: RawFd,
}

impl EventFdWake {
    pub(super) fn new() -> io::Result<Self> {
        // SAFETY: eventfd is invoked with valid flags and no shared state.
        let fd = unsafe { libc::eventfd(0, EVENTFD_FLAGS) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    pub(super) fn notify(&self) {
        let payload = 1u64.to_ne_bytes();
        loop {
            // SAFETY: payload references a stack buffer with the 8-byte eventfd payload.
            let ret = unsafe { libc::write(self.fd, payload.as_ptr().cast(), payload.len()) };
            if ret >= 0 {
                break;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                // Counter saturated: a wake is already pending.
                io::ErrorKind::WouldBlock => break,
                _ => {
                    log::debug!("[wake] eventfd write failed: {}", err);
                    break;
                }
            }
        }
    }

    /// Drain the counter; true if it was non-zero.
    pub(super) fn check_and_clear(&self) -> bool {
        let mut payload = [0u8; 8];
        loop {
            // SAFETY: payload is a stack buffer sized to the eventfd read requirements (8 bytes).
            let ret = unsafe { libc::read(self.fd, payload.as_mut_ptr().cast(), payload.len()) };
            if ret >= 0 {
                return u64::from_ne_bytes(payload) > 0;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return false,
                _ => {
                    log::debug!("[wake] eventfd read failed: {}", err);
                    return false;
                }
            }
        }
    }

    pub(super) fn wait_timeout(&self, timeout: Option<Duration>) -> bool {
        let timeout_ms: libc::c_int = timeout
            .map(|d| {
                // Round up so short waits do not degrade into busy polls.
                let ms = d.as_nanos().div_ceil(1_000_000);
                libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
            })
            .unwrap_or(-1);

        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: poll_target points to our stack-allocated pollfd structure.
            let poll_target = std::ptr::addr_of_mut!(pollfd);
            let res = unsafe { libc::poll(poll_target, 1, timeout_ms) };
            if res == 0 {
                return false;
            }
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::debug!("[wake] eventfd poll failed: {}", err);
                return false;
            }
            break;
        }
        self.check_and_clear()
    }
}

impl Drop for EventFdWake {
    fn drop(&mut self) {
        // SAFETY: fd was obtained via libc::eventfd and is closed once here.
        unsafe {
            libc::close(self.fd);
        }
    }
}
