use super::{Bucket, CacheError, CacheNode};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

const MAX_KEY_LEN: usize = 250;
// memcached's default item size limit
const MAX_VALUE_LEN: usize = 1024 * 1024;
// Longest response line accepted, terminator included
const MAX_LINE_LEN: u64 = 4096;

/// A single memcached server spoken to over the text protocol.
///
/// Every operation opens its own connection and the whole exchange,
/// connecting included, is bounded by the configured timeout.
pub struct MemcachedNode {
    addr: String,
    timeout: Duration,
}

impl MemcachedNode {
    pub fn new<A: Into<String>>(addr: A, timeout: Duration) -> Self {
        MemcachedNode {
            addr: addr.into(),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl CacheNode for MemcachedNode {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, CacheError> {
        self.bounded(async {
            let mut conn = Connection::open(&self.addr).await?;
            conn.send("stats items").await?;

            let mut buckets = Vec::new();
            loop {
                let line = conn.read_line().await?;
                if line == "END" {
                    break;
                }
                if let Some(bucket) = parse_bucket_line(&line) {
                    buckets.push(bucket);
                }
            }
            Ok(buckets)
        })
        .await
    }

    async fn list_keys(&self, bucket: u32) -> Result<Vec<String>, CacheError> {
        self.bounded(async {
            let mut conn = Connection::open(&self.addr).await?;
            conn.send(&format!("stats cachedump {bucket} 0")).await?;

            let mut keys = Vec::new();
            loop {
                let line = conn.read_raw_line().await?;
                if line == b"END" {
                    break;
                }
                match parse_item_line(&line) {
                    Some(Ok(key)) => keys.push(key),
                    Some(Err(raw)) => {
                        // Cannot be an incident key, the rest of the bucket is still usable
                        tracing::warn!(
                            node = %self.addr,
                            key = %String::from_utf8_lossy(&raw),
                            "Skipping key that is not valid UTF-8"
                        );
                    }
                    None => return Err(CacheError::Protocol(lossy(&line))),
                }
            }
            Ok(keys)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        validate_key(key)?;
        self.bounded(async {
            let mut conn = Connection::open(&self.addr).await?;
            conn.send(&format!("get {key}")).await?;

            let header = conn.read_line().await?;
            if header == "END" {
                return Err(CacheError::NotFound);
            }
            let len = parse_value_header(&header, key)?;

            // Data block is followed by \r\n
            let mut data = vec![0u8; len + 2];
            conn.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(CacheError::Protocol("data block not terminated".into()));
            }
            data.truncate(len);

            let trailer = conn.read_line().await?;
            if trailer != "END" {
                return Err(CacheError::Protocol(trailer));
            }
            Ok(data)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        validate_key(key)?;
        self.bounded(async {
            let mut conn = Connection::open(&self.addr).await?;
            conn.send(&format!("delete {key}")).await?;

            let line = conn.read_line().await?;
            match line.as_str() {
                "DELETED" => Ok(()),
                "NOT_FOUND" => Err(CacheError::NotFound),
                _ => Err(CacheError::Protocol(line)),
            }
        })
        .await
    }
}

struct Connection {
    stream: BufStream<TcpStream>,
}

impl Connection {
    async fn open(addr: &str) -> Result<Self, CacheError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Connection {
            stream: BufStream::new(stream),
        })
    }

    async fn send(&mut self, command: &str) -> Result<(), CacheError> {
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads one response line as bytes, without its terminator. Error
    /// replies are turned into `CacheError::Server`.
    async fn read_raw_line(&mut self) -> Result<Vec<u8>, CacheError> {
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Err(CacheError::Protocol("connection closed by server".into()));
        }
        if !line.ends_with(b"\n") {
            return Err(CacheError::Protocol(format!(
                "response line longer than {MAX_LINE_LEN} bytes"
            )));
        }
        while matches!(line.last(), Some(b'\r' | b'\n')) {
            line.pop();
        }

        if line == b"ERROR" || line.starts_with(b"CLIENT_ERROR") || line.starts_with(b"SERVER_ERROR")
        {
            return Err(CacheError::Server(lossy(&line)));
        }
        Ok(line)
    }

    /// Like `read_raw_line`, for lines that must be text.
    async fn read_line(&mut self) -> Result<String, CacheError> {
        let line = self.read_raw_line().await?;
        String::from_utf8(line).map_err(|e| CacheError::Protocol(lossy(e.as_bytes())))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CacheError> {
        self.stream.read_exact(buf).await?;
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ITEM <key> [<bytes> b; <expiry> s]
// None when the line is not an item, Err with the raw key when the key is
// not UTF-8.
fn parse_item_line(line: &[u8]) -> Option<Result<String, Vec<u8>>> {
    let rest = line.strip_prefix(b"ITEM ")?;
    let raw = rest.split(|b| *b == b' ').find(|part| !part.is_empty())?;
    Some(String::from_utf8(raw.to_vec()).map_err(|e| e.into_bytes()))
}

// STAT items:<slab>:number <count>
fn parse_bucket_line(line: &str) -> Option<Bucket> {
    let rest = line.strip_prefix("STAT items:")?;
    let (field, value) = rest.split_once(' ')?;
    let (id, stat) = field.split_once(':')?;
    if stat != "number" {
        return None;
    }
    Some(Bucket {
        id: id.parse().ok()?,
        items: value.trim().parse().ok()?,
    })
}

// VALUE <key> <flags> <bytes> [<cas unique>]
fn parse_value_header(line: &str, expected_key: &str) -> Result<usize, CacheError> {
    let mut parts = line.split_whitespace();
    let (Some("VALUE"), Some(key), Some(_flags), Some(len)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CacheError::Protocol(line.to_string()));
    };
    if key != expected_key {
        return Err(CacheError::Protocol(line.to_string()));
    }
    match len.parse() {
        Ok(len) if len <= MAX_VALUE_LEN => Ok(len),
        _ => Err(CacheError::Protocol(line.to_string())),
    }
}
