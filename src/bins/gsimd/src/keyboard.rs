//! Keyboard commands
//!
//! Single-key commands read from a raw, non-blocking stdin and handed to
//! the main loop as edge events on the scheduler thread. The saved
//! terminal state is restored on drop and on signal-driven exit.

use std::io;
use std::os::unix::io::RawFd;

const STDIN_FD: RawFd = 0;

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    RateUp,
    RateDown,
    RateDouble,
    RateHalve,
    PauseTraffic,
    ResumeTraffic,
    Quit,
}

/// Map a key octet to its command
pub fn parse_key(byte: u8) -> Option<KeyCommand> {
    match byte {
        b'+' => Some(KeyCommand::RateUp),
        b'-' => Some(KeyCommand::RateDown),
        b'*' => Some(KeyCommand::RateDouble),
        b'/' => Some(KeyCommand::RateHalve),
        b'p' => Some(KeyCommand::PauseTraffic),
        b'c' => Some(KeyCommand::ResumeTraffic),
        b'q' => Some(KeyCommand::Quit),
        _ => None,
    }
}

/// Raw-mode non-blocking keyboard reader. Disabled (always empty) when
/// stdin is not a terminal.
pub struct Keyboard {
    saved: Option<libc::termios>,
}

impl Keyboard {
    /// Put the terminal in raw no-echo mode with non-blocking reads
    pub fn init() -> io::Result<Self> {
        // not a tty: run headless, no keys
        if unsafe { libc::isatty(STDIN_FD) } == 0 {
            return Ok(Self { saved: None });
        }

        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(STDIN_FD, &mut termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let saved = termios;

        termios.c_lflag &= !(libc::ICANON | libc::ECHO);
        termios.c_cc[libc::VMIN] = 0;
        termios.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(STDIN_FD, libc::TCSANOW, &termios) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let flags = unsafe { libc::fcntl(STDIN_FD, libc::F_GETFL) };
        if flags >= 0 {
            unsafe { libc::fcntl(STDIN_FD, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        }

        Ok(Self { saved: Some(saved) })
    }

    /// Drain pending key commands
    pub fn poll(&mut self) -> Vec<KeyCommand> {
        if self.saved.is_none() {
            return Vec::new();
        }

        let mut commands = Vec::new();
        let mut byte = 0u8;
        loop {
            let n = unsafe { libc::read(STDIN_FD, &mut byte as *mut u8 as *mut libc::c_void, 1) };
            if n != 1 {
                break;
            }
            if let Some(command) = parse_key(byte) {
                commands.push(command);
            }
        }
        commands
    }

    /// Restore the saved terminal state
    pub fn restore(&mut self) {
        if let Some(saved) = self.saved.take() {
            unsafe { libc::tcsetattr(STDIN_FD, libc::TCSANOW, &saved) };
        }
    }
}

impl Drop for Keyboard {
    fn drop(&mut self) {
        self.restore();
    }
}
