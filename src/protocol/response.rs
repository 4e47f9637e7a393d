//! Response builder

use crate::CacheError;
use crate::scheduler::Reply;
use bytes::BytesMut;
use itoa::Buffer;

/// Response writer for the text protocol
pub struct ResponseWriter {
    buf: BytesMut,
}

impl ResponseWriter {
    /// Create a new response writer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the internal buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer, leaving an empty buffer in its place
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Returns true if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write the response for a finished job
    pub fn reply(&mut self, key: &[u8], reply: &Reply, with_cas: bool) {
        match reply {
            Reply::Stored => self.stored(),
            Reply::Deleted => self.deleted(),
            Reply::Value(fetched) => {
                let cas = with_cas.then_some(fetched.cas);
                self.value(key, fetched.flags, &fetched.value, cas);
            }
            Reply::Number(n) => self.number(*n),
            Reply::Message(message) => self.line(message.as_bytes()),
        }
    }

    /// Write a VALUE line followed by the data block
    /// Format: VALUE <key> <flags> <bytes> [<cas>]\r\n<data>\r\n
    pub fn value(&mut self, key: &[u8], flags: u32, data: &[u8], cas: Option<u64>) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(b"VALUE ");
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(flags).as_bytes());
        self.buf.extend_from_slice(b" ");
        self.buf
            .extend_from_slice(itoa_buf.format(data.len()).as_bytes());
        if let Some(cas) = cas {
            self.buf.extend_from_slice(b" ");
            self.buf.extend_from_slice(itoa_buf.format(cas).as_bytes());
        }
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Write STORED response
    pub fn stored(&mut self) {
        self.buf.extend_from_slice(b"STORED\r\n");
    }

    /// Write DELETED response
    pub fn deleted(&mut self) {
        self.buf.extend_from_slice(b"DELETED\r\n");
    }

    /// Write the result of incr/decr
    pub fn number(&mut self, n: u64) {
        let mut itoa_buf = Buffer::new();
        self.line(itoa_buf.format(n).as_bytes());
    }

    /// Write an error token
    pub fn error(&mut self, err: &CacheError) {
        self.line(err.to_string().as_bytes());
    }

    /// Write one line with its terminator
    pub fn line(&mut self, text: &[u8]) {
        self.buf.extend_from_slice(text);
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Fetched;
    use bytes::Bytes;

    #[test]
    fn test_value() {
        let mut writer = ResponseWriter::new(256);
        writer.value(b"mykey", 42, b"hello", None);
        assert_eq!(writer.buffer(), b"VALUE mykey 42 5\r\nhello\r\n");
    }

    #[test]
    fn test_value_with_cas() {
        let mut writer = ResponseWriter::new(256);
        let fetched = Fetched {
            value: Bytes::from_static(b"v"),
            flags: 1,
            cas: 99,
        };
        writer.reply(b"k", &Reply::Value(fetched), true);
        assert_eq!(writer.buffer(), b"VALUE k 1 1 99\r\nv\r\n");
    }

    #[test]
    fn test_simple_responses() {
        let mut writer = ResponseWriter::new(256);

        writer.stored();
        assert_eq!(writer.take().as_ref(), b"STORED\r\n");

        writer.deleted();
        assert_eq!(writer.take().as_ref(), b"DELETED\r\n");

        writer.number(42);
        assert_eq!(writer.take().as_ref(), b"42\r\n");

        writer.reply(b"", &Reply::Message("jeapcached 0.1.0".to_string()), false);
        assert_eq!(writer.take().as_ref(), b"jeapcached 0.1.0\r\n");
    }

    #[test]
    fn test_errors() {
        let mut writer = ResponseWriter::new(256);

        writer.error(&CacheError::NotFound);
        assert_eq!(writer.take().as_ref(), b"NOT_FOUND\r\n");

        writer.error(&CacheError::Malformed);
        assert_eq!(writer.take().as_ref(), b"ERROR\r\n");
    }
}
