use std::io::Write;
use std::sync::{Arc, Mutex};

use super::io_pump::{LineStream, LineTap};

/// Rewrites one output line of a package before it is written.
pub type LinePrefixer = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Destination for package output lines.
pub trait LineSink: Send + Sync {
    fn write_line(&self, stream: LineStream, line: &str);

    /// Write several lines without letting other writers interleave.
    fn write_block(&self, lines: &[(LineStream, String)]) {
        for (stream, line) in lines {
            self.write_line(*stream, line);
        }
    }
}

/// Writes to the parent's stdout/stderr.
#[derive(Debug, Default)]
pub struct StdioSink {
    // Serializes blocks across both streams.
    lock: Mutex<()>,
}

impl StdioSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(stream: LineStream, line: &str) {
        // A closed stdout must not take the scheduler down.
        let _ = match stream {
            LineStream::Stdout => writeln!(std::io::stdout().lock(), "{line}"),
            LineStream::Stderr => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

impl LineSink for StdioSink {
    fn write_line(&self, stream: LineStream, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Self::emit(stream, line);
    }

    fn write_block(&self, lines: &[(LineStream, String)]) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        for (stream, line) in lines {
            Self::emit(*stream, line);
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LineStream, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(LineStream, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn text(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, l)| l).collect()
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, stream: LineStream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((stream, line.to_string()));
    }

    fn write_block(&self, lines: &[(LineStream, String)]) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(lines.iter().cloned());
    }
}

/// Prefixer that names the package once per contiguous run of its lines.
///
/// The first line after a switch of package becomes `"<name>\n | <line>"`,
/// later lines of the same run are `" | <line>"`.
pub fn package_prefixer() -> LinePrefixer {
    let last: Mutex<Option<String>> = Mutex::new(None);
    Arc::new(move |package: &str, line: &str| {
        let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(package) {
            format!(" | {line}")
        } else {
            *last = Some(package.to_string());
            format!("{package}\n | {line}")
        }
    })
}

/// Applies the optional prefixer and either writes immediately or buffers
/// until [`PackageOutput::flush`].
pub(crate) struct PackageOutput {
    package: String,
    sink: Arc<dyn LineSink>,
    prefixer: Option<LinePrefixer>,
    collected: Option<Vec<LineTap>>,
}

impl PackageOutput {
    pub(crate) fn new(
        package: &str,
        sink: Arc<dyn LineSink>,
        prefixer: Option<LinePrefixer>,
        collect: bool,
    ) -> Self {
        Self {
            package: package.to_string(),
            sink,
            prefixer,
            collected: collect.then(Vec::new),
        }
    }

    fn render(&self, line: &str) -> String {
        match &self.prefixer {
            Some(prefix) => prefix(&self.package, line),
            None => line.to_string(),
        }
    }

    pub(crate) fn push(&mut self, tap: LineTap) {
        match self.collected.as_mut() {
            Some(buf) => buf.push(tap),
            None => {
                let text = self.render(&tap.line);
                self.sink.write_line(tap.stream, &text);
            }
        }
    }

    pub(crate) fn flush(&mut self) {
        let Some(buf) = self.collected.take() else {
            return;
        };
        if buf.is_empty() {
            return;
        }
        let block: Vec<(LineStream, String)> = buf
            .into_iter()
            .map(|tap| (tap.stream, self.render(&tap.line)))
            .collect();
        self.sink.write_block(&block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tap(line: &str) -> LineTap {
        LineTap {
            line: line.to_string(),
            stream: LineStream::Stdout,
        }
    }

    #[test]
    fn prefixer_names_package_once_per_run() {
        let prefix = package_prefixer();
        assert_eq!(prefix("a", "one"), "a\n | one");
        assert_eq!(prefix("a", "two"), " | two");
        assert_eq!(prefix("b", "three"), "b\n | three");
        assert_eq!(prefix("a", "four"), "a\n | four");
    }

    #[test]
    fn collected_output_is_held_until_flush() {
        let sink = MemorySink::new();
        let mut out = PackageOutput::new("pkg", sink.clone(), None, true);
        out.push(tap("x"));
        out.push(tap("y"));
        assert!(sink.lines().is_empty());

        out.flush();
        assert_eq!(sink.text(), vec!["x", "y"]);

        out.flush();
        assert_eq!(sink.text().len(), 2);
    }

    #[test]
    fn streamed_output_goes_straight_through() {
        let sink = MemorySink::new();
        let mut out = PackageOutput::new("pkg", sink.clone(), Some(package_prefixer()), false);
        out.push(tap("hello"));
        assert_eq!(sink.text(), vec!["pkg\n | hello"]);
    }
}
