//! Console capture ring and the web console session over it.
//!
//! Anything the system prints while recording is enabled lands in a
//! bounded ring; the web console polls it, clears it, and appends to it
//! when running commands, so the captured transcript reads like an
//! interactive session.

/// Default ring capacity.
pub const DEFAULT_RING_CAPACITY: usize = 32 * 1024;

/// Bounded FIFO byte ring.
///
/// Writes never fail: when full, the oldest bytes are discarded.
#[derive(Debug)]
pub struct ConsoleRing {
    buf: std::collections::VecDeque<u8>,
    capacity: usize,
}

impl ConsoleRing {
    /// Ring with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { buf: std::collections::VecDeque::with_capacity(capacity), capacity }
    }

    /// Append bytes, discarding the oldest on overflow.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() == self.capacity {
                self.buf.pop_front();
            }
            self.buf.push_back(b);
        }
    }

    /// Take up to `n` of the oldest bytes.
    pub fn read_up_to(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buf.len());
        self.buf.drain(..n).collect()
    }

    /// Bytes currently buffered. Never exceeds the capacity.
    #[must_use]
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

/// The opaque command execution service behind `/console/exec`.
///
/// Implementations print command output into the ring and return the
/// command's exit status.
pub trait CommandInterpreter: Send {
    /// Run `cmd`, printing its output to `console`.
    fn run(&mut self, cmd: &str, console: &mut ConsoleRing) -> i32;
}

/// The web console: a lazily allocated ring plus the exec/poll protocol.
pub struct WebConsole {
    ring: Option<ConsoleRing>,
    capacity: usize,
}

impl WebConsole {
    /// Console whose ring will hold `capacity` bytes once recording
    /// starts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { ring: None, capacity }
    }

    /// Start recording. Idempotent; the ring is allocated on first use.
    pub fn ensure_recording(&mut self) {
        if self.ring.is_none() {
            self.ring = Some(ConsoleRing::new(self.capacity));
        }
    }

    /// Whether recording has been enabled.
    #[must_use]
    pub fn recording(&self) -> bool {
        self.ring.is_some()
    }

    /// Append to the transcript. Dropped silently when not recording.
    pub fn write(&mut self, bytes: &[u8]) {
        if let Some(ring) = &mut self.ring {
            ring.write(bytes);
        }
    }

    /// Take up to `max` captured bytes; returns them plus the count still
    /// buffered.
    pub fn poll(&mut self, max: usize) -> (Vec<u8>, usize) {
        match &mut self.ring {
            Some(ring) => {
                let data = ring.read_up_to(max);
                (data, ring.available())
            },
            None => (Vec::new(), 0),
        }
    }

    /// Reset the ring.
    pub fn clear(&mut self) {
        if let Some(ring) = &mut self.ring {
            ring.reset();
        }
    }

    /// Run a command through `interp`, framing it in the transcript the
    /// way an interactive session would: `<prompt> <cmd>\n`, the command
    /// output, then a newline and a fresh prompt.
    ///
    /// A blank is inserted after the prompt only when the prompt does not
    /// already end in whitespace.
    pub fn exec(
        &mut self,
        prompt: &str,
        cmd: &str,
        interp: &mut dyn CommandInterpreter,
    ) -> i32 {
        self.ensure_recording();
        // ensure_recording above guarantees the ring exists.
        let Some(ring) = &mut self.ring else {
            return -1;
        };

        ring.write(prompt.as_bytes());
        if !prompt.is_empty() && !prompt.ends_with([' ', '\t']) {
            ring.write(b" ");
        }
        ring.write(cmd.as_bytes());
        ring.write(b"\n");

        let ret = interp.run(cmd, ring);

        ring.write(b"\n");
        ring.write(prompt.as_bytes());
        ret
    }
}

impl std::fmt::Debug for WebConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebConsole")
            .field("recording", &self.recording())
            .field("available", &self.ring.as_ref().map_or(0, ConsoleRing::available))
            .finish()
    }
}
