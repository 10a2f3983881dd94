// Sequential on-disk token streams.
//
// A tape is written front to back and read front to back, never both within
// the same phase. Switching from writing to reading happens through
// `Tape::rewind`, and throwing the content away to write afresh happens
// through `Tape::clear`.
//
// Reads keep a one-token lookahead so the merge can see where a run ends
// without consuming the token that starts the next one. A tape whose
// lookahead is empty is at end of stream.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CascadeError, Result};
use crate::util::Token;

/// Splits a byte stream into whitespace-separated tokens.
struct TokenReader<R> {
    inner: R,
    token: Vec<u8>,
}

impl<R: BufRead> TokenReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, token: Vec::with_capacity(24) }
    }

    /// Reads the next token into `self.token`, returning false at end of input.
    fn advance(&mut self) -> std::io::Result<bool> {
        self.token.clear();
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(!self.token.is_empty());
            }

            let mut used = 0;
            let mut complete = false;
            for &byte in available {
                used += 1;
                if byte.is_ascii_whitespace() {
                    if !self.token.is_empty() {
                        complete = true;
                        break;
                    }
                } else {
                    self.token.push(byte);
                }
            }
            self.inner.consume(used);

            if complete {
                return Ok(true);
            }
        }
    }
}

/// A persistent stream of tokens with a one-token lookahead.
pub(crate) struct Tape {
    path: PathBuf,
    reader: Option<TokenReader<BufReader<File>>>,
    writer: Option<BufWriter<File>>,
    lookahead: Option<Token>,
}

impl Tape {
    /// Creates an empty, writable tape, truncating whatever was at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| CascadeError::io(&path, e))?;
        Ok(Self { path, reader: None, writer: Some(BufWriter::new(file)), lookahead: None })
    }

    /// Opens an existing tape for reading with the lookahead primed.
    ///
    /// The file is opened for writing as well, so a file that can be read
    /// but not rewritten is refused before anything is read from it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| CascadeError::Open { path: path.clone(), source })?;

        let mut tape = Self {
            path,
            reader: Some(TokenReader::new(BufReader::new(file))),
            writer: None,
            lookahead: None,
        };
        tape.prime()?;
        Ok(tape)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The next unread token, without consuming it.
    #[inline]
    pub fn peek(&self) -> Option<Token> {
        self.lookahead
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.lookahead.is_none()
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> Result<Option<Token>> {
        let Some(token) = self.lookahead else {
            return Ok(None);
        };
        self.prime()?;
        Ok(Some(token))
    }

    /// Appends a token. The read position is left where it was.
    pub fn put(&mut self, token: Token) -> Result<()> {
        let path = &self.path;
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CascadeError::io(path, e))?;
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{token}").map_err(|e| CascadeError::io(path, e))?;
        }
        Ok(())
    }

    /// Starts a fresh read pass over everything written so far.
    pub fn rewind(&mut self) -> Result<()> {
        self.flush()?;
        let file = File::open(&self.path).map_err(|e| CascadeError::io(&self.path, e))?;
        self.reader = Some(TokenReader::new(BufReader::new(file)));
        self.prime()
    }

    /// Discards all content and leaves the tape empty and writable.
    pub fn clear(&mut self) -> Result<()> {
        self.reader = None;
        self.writer = None;
        self.lookahead = None;
        let file = File::create(&self.path).map_err(|e| CascadeError::io(&self.path, e))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// Pushes buffered writes to disk.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|e| CascadeError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn prime(&mut self) -> Result<()> {
        self.lookahead = None;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        if !reader.advance().map_err(|e| CascadeError::io(&self.path, e))? {
            return Ok(());
        }

        let token = std::str::from_utf8(&reader.token)
            .ok()
            .and_then(|text| text.parse::<Token>().ok())
            .ok_or_else(|| CascadeError::MalformedToken {
                path: self.path.clone(),
                token: String::from_utf8_lossy(&reader.token).into_owned(),
            })?;
        self.lookahead = Some(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn drain(tape: &mut Tape) -> Vec<Token> {
        let mut out = Vec::new();
        while let Some(token) = tape.next().unwrap() {
            out.push(token);
        }
        out
    }

    #[test]
    fn test_open_primes_lookahead() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");
        fs::write(&path, "  5 3\n\t8  -1 ").unwrap();

        let mut tape = Tape::open(&path).unwrap();
        assert_eq!(tape.peek(), Some(5));
        assert_eq!(tape.peek(), Some(5));
        assert_eq!(drain(&mut tape), vec![5, 3, 8, -1]);
        assert!(tape.is_exhausted());
        assert_eq!(tape.next().unwrap(), None);
    }

    #[test]
    fn test_open_empty_is_exhausted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, " \n \n").unwrap();

        let tape = Tape::open(&path).unwrap();
        assert!(tape.is_exhausted());
        assert_eq!(tape.peek(), None);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = Tape::open(dir.path().join("missing.txt"));
        assert!(matches!(result, Err(CascadeError::Open { .. })));
    }

    #[test]
    fn test_malformed_token() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "1 two 3").unwrap();

        let mut tape = Tape::open(&path).unwrap();
        match tape.next() {
            Err(CascadeError::MalformedToken { token, .. }) => assert_eq!(token, "two"),
            other => panic!("expected malformed token, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_put_then_rewind() {
        let dir = tempdir().unwrap();
        let mut tape = Tape::create(dir.path().join("tape0")).unwrap();
        assert!(tape.is_exhausted());

        for token in [9, 7, 7, 2] {
            tape.put(token).unwrap();
        }
        tape.rewind().unwrap();
        assert_eq!(tape.peek(), Some(9));
        assert_eq!(drain(&mut tape), vec![9, 7, 7, 2]);

        // A second pass sees the same data.
        tape.rewind().unwrap();
        assert_eq!(drain(&mut tape), vec![9, 7, 7, 2]);
    }

    #[test]
    fn test_put_does_not_move_read_cursor() {
        let dir = tempdir().unwrap();
        let mut tape = Tape::create(dir.path().join("tape0")).unwrap();
        tape.put(1).unwrap();
        tape.put(2).unwrap();
        tape.rewind().unwrap();

        assert_eq!(tape.next().unwrap(), Some(1));
        tape.put(3).unwrap();
        assert_eq!(tape.peek(), Some(2));

        tape.rewind().unwrap();
        assert_eq!(drain(&mut tape), vec![1, 2, 3]);
    }

    #[test]
    fn test_clear_discards_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tape0");
        let mut tape = Tape::create(&path).unwrap();
        tape.put(4).unwrap();
        tape.rewind().unwrap();

        tape.clear().unwrap();
        assert!(tape.is_exhausted());
        tape.put(10).unwrap();
        tape.rewind().unwrap();
        assert_eq!(drain(&mut tape), vec![10]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "10\n");
    }

    #[test]
    fn test_token_reader_crosses_buffer_boundaries() {
        let text = "123 -45\n6789";
        let reader = BufReader::with_capacity(2, text.as_bytes());
        let mut tokens = TokenReader::new(reader);
        let mut seen = Vec::new();
        while tokens.advance().unwrap() {
            seen.push(String::from_utf8(tokens.token.clone()).unwrap());
        }
        assert_eq!(seen, vec!["123", "-45", "6789"]);
    }
}
