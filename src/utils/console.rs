//! Text sinks for user-visible status and subprocess output.
//!
//! Anything that wants to show text to the user receives a [`ConsoleSink`]
//! explicitly. Producers on other threads hold a [`ConsoleHandle`], which only
//! sends messages; the thread that owns the [`Console`] is the only one that
//! touches the display.

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::io::Write;

/// Receives text and appends it, verbatim, to the end of a display.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, text: &str);

    /// Convenience for callers that emit whole lines.
    fn write_line(&self, text: &str) {
        self.write(&format!("{}\n", text));
    }
}

/// Writes straight to the process' standard output.
/// Used by the non-interactive commands, where the caller's thread owns the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        // a closed stdout (e.g. `| head`) is not worth failing a run over
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// A display that text can be appended to.
pub trait TextDisplay {
    fn append(&mut self, text: &str);
    fn scroll_to_end(&mut self);
}

/// The terminal as a display; it follows its own end.
#[derive(Debug, Default)]
pub struct TerminalDisplay;

impl TextDisplay for TerminalDisplay {
    fn append(&mut self, text: &str) {
        StdoutSink.write(text);
    }

    fn scroll_to_end(&mut self) {}
}

/// In-memory display that records its contents and the visible end.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct BufferDisplay {
    content: String,
    visible_end: usize,
}

#[cfg(test)]
impl BufferDisplay {
    pub(crate) fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn end_is_visible(&self) -> bool {
        self.visible_end == self.content.len()
    }
}

#[cfg(test)]
impl TextDisplay for BufferDisplay {
    fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }

    fn scroll_to_end(&mut self) {
        self.visible_end = self.content.len();
    }
}

/// Cloneable, thread-safe sink that marshals text to the owning [`Console`].
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    tx: Sender<String>,
}

impl ConsoleSink for ConsoleHandle {
    fn write(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        // the console may already be gone while a worker drains its last lines
        let _ = self.tx.send(text.to_owned());
    }
}

/// Owner of a display. Lives on the interactive thread and is the only place
/// the display is mutated.
pub struct Console<D: TextDisplay> {
    display: D,
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl<D: TextDisplay> Console<D> {
    pub fn new(display: D) -> Self {
        let (tx, rx) = unbounded();
        Self { display, tx, rx }
    }

    pub fn handle(&self) -> ConsoleHandle {
        ConsoleHandle {
            tx: self.tx.clone(),
        }
    }

    /// Receiver side of the marshalling channel, for use in a `select!` loop.
    /// Text received from it must be handed back through [`Console::show`].
    pub fn messages(&self) -> &Receiver<String> {
        &self.rx
    }

    pub fn show(&mut self, text: &str) {
        self.display.append(text);
        self.display.scroll_to_end();
    }

    /// Apply every message that has arrived so far; returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(text) = self.rx.try_recv() {
            self.show(&text);
            n += 1;
        }
        n
    }

    #[cfg(test)]
    pub(crate) fn display(&self) -> &D {
        &self.display
    }
}

/// Shared in-memory sink for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink(std::sync::Mutex<String>);

#[cfg(test)]
impl MemorySink {
    pub(crate) fn contents(&self) -> String {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ConsoleSink for MemorySink {
    fn write(&self, text: &str) {
        self.0.lock().unwrap().push_str(text);
    }
}
