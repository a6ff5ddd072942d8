//! A thin client over the same wire protocol the server speaks: encode a
//! command line, send it, decode the single resulting frame.

use std::io::{BufRead, Write};
use std::net::TcpStream;

use ember_core::{Frame, FrameCodec};

/// A connected client session.
pub struct Client {
    stream: TcpStream,
    codec: FrameCodec,
}

impl Client {
    /// Connects to `host:port`.
    pub fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        Ok(Self { stream, codec: FrameCodec::new() })
    }

    /// Tokenizes `line` the way a shell would (whitespace-separated, with
    /// `"..."` quoting for embedded spaces), sends it as an array of bulk
    /// strings, and returns the single decoded reply frame.
    pub fn send_line(&mut self, line: &str) -> anyhow::Result<Frame> {
        let args = tokenize(line);
        let frame = Frame::Array(args.into_iter().map(|a| Frame::bulk(a.into_bytes())).collect());
        self.stream.write_all(&frame.to_bytes())?;
        self.read_reply()
    }

    fn read_reply(&mut self) -> anyhow::Result<Frame> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.codec.try_decode()? {
                return Ok(frame);
            }
            let n = std::io::Read::read(&mut self.stream, &mut buf)?;
            if n == 0 {
                anyhow::bail!("server closed the connection");
            }
            self.codec.feed(&buf[..n]);
        }
    }
}

/// Splits a command line on whitespace, honoring `"..."` quoted segments so
/// values containing spaces can be passed as one argument.
fn tokenize(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Reads one line from `input`, returning `None` at EOF (e.g. Ctrl-D).
pub fn read_line(input: &mut impl BufRead) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    let n = input.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("SET foo bar"), vec!["SET", "foo", "bar"]);
    }

    #[test]
    fn tokenize_honors_quoted_segments() {
        assert_eq!(
            tokenize(r#"SET foo "hello world""#),
            vec!["SET", "foo", "hello world"]
        );
    }

    #[test]
    fn tokenize_ignores_repeated_whitespace() {
        assert_eq!(tokenize("PING   "), vec!["PING"]);
    }
}
