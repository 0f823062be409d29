use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct LineTap {
    pub line: String,
    pub stream: LineStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

impl LineStream {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Forward every line of `rd` to `line_tx`, tagged with `stream`.
///
/// The trailing line is delivered even without a final newline. Resolves to
/// the number of bytes read, or early if the receiver goes away.
pub fn pump_lines<R>(
    rd: R,
    stream: LineStream,
    line_tx: mpsc::Sender<LineTap>,
) -> JoinHandle<std::io::Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(rd);
        let mut raw = Vec::with_capacity(256);
        let mut total = 0u64;

        loop {
            raw.clear();
            let n = reader.read_until(b'\n', &mut raw).await?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;

            let line = decode_line(&raw);
            if line_tx.send(LineTap { line, stream }).await.is_err() {
                return Ok(total);
            }
        }
    })
}

/// Lossy UTF-8 without the `\n` / `\r\n` terminator.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn flushes_last_line_without_newline_on_eof() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);

        let task = pump_lines(rd, LineStream::Stdout, tx);

        wr.write_all(b"hello").await.unwrap();
        drop(wr);

        let tap = rx.recv().await.expect("expected one line");
        assert_eq!(tap.line, "hello");
        assert_eq!(tap.stream, LineStream::Stdout);

        assert_eq!(task.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn splits_chunks_across_line_boundaries() {
        let (mut wr, rd) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel::<LineTap>(8);

        let task = pump_lines(rd, LineStream::Stderr, tx);

        wr.write_all(b"first\r\nsec").await.unwrap();
        wr.write_all(b"ond\n\nthird\n").await.unwrap();
        drop(wr);

        let mut lines = Vec::new();
        while let Some(tap) = rx.recv().await {
            lines.push(tap.line);
        }
        assert_eq!(lines, vec!["first", "second", "", "third"]);
        task.await.unwrap().unwrap();
    }
}
