//! Memcached Client Module
//!
//! Minimal memcached text-protocol client over a single tokio TCP
//! connection. Requests are serialised behind a mutex; the connection is
//! opened lazily and only returned to its slot after a complete, successful
//! reply. A failed, timed out or cancelled request drops it, so the next
//! request reconnects instead of reading a stale reply.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::{validate_key, CacheItem, KvCache};
use crate::error::{CacheError, CacheResult};

type Connection = BufStream<TcpStream>;

// == Wire Types ==
#[derive(Debug)]
enum Command<'a> {
    Get(&'a str),
    Store {
        verb: &'static str,
        key: &'a str,
        value: &'a [u8],
        flags: u32,
        ttl: u32,
    },
    Delete(&'a str),
    Version,
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Stored,
    NotStored,
    Value(CacheItem),
    End,
    Deleted,
    NotFound,
    Version(String),
}

impl Command<'_> {
    fn encode(&self) -> Vec<u8> {
        match self {
            Command::Get(key) => format!("get {}\r\n", key).into_bytes(),
            Command::Store {
                verb,
                key,
                value,
                flags,
                ttl,
            } => {
                let mut buf =
                    format!("{} {} {} {} {}\r\n", verb, key, flags, ttl, value.len()).into_bytes();
                buf.extend_from_slice(value);
                buf.extend_from_slice(b"\r\n");
                buf
            }
            Command::Delete(key) => format!("delete {}\r\n", key).into_bytes(),
            Command::Version => b"version\r\n".to_vec(),
        }
    }
}

// == Memcache Client ==
#[derive(Debug)]
pub struct MemcacheClient {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl MemcacheClient {
    /// Creates a client for `addr` (`host:port`). No connection is made
    /// until the first request.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> CacheResult<Connection> {
        debug!("Connecting to memcached at {}", self.addr);
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(BufStream::new(stream))
    }

    async fn exchange(&self, command: Command<'_>) -> CacheResult<Reply> {
        let mut guard = self.conn.lock().await;
        // Out of the slot while a request is in flight: if this future is
        // dropped mid-exchange, the half-read connection goes with it.
        let idle = guard.take();

        let outcome = tokio::time::timeout(self.timeout, async {
            let mut conn = match idle {
                Some(conn) => conn,
                None => self.connect().await?,
            };
            let reply = round_trip(&mut conn, &command).await;
            Ok::<_, CacheError>((conn, reply))
        })
        .await;

        match outcome {
            Ok(Ok((conn, Ok(reply)))) => {
                *guard = Some(conn);
                Ok(reply)
            }
            Ok(Ok((_, Err(err)))) => {
                warn!("Dropping memcached connection to {}: {}", self.addr, err);
                Err(err)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!("Memcached request to {} timed out", self.addr);
                Err(CacheError::Timeout(self.timeout))
            }
        }
    }

    async fn store(
        &self,
        verb: &'static str,
        key: &str,
        value: &[u8],
        flags: u32,
        ttl: u32,
    ) -> CacheResult<()> {
        validate_key(key)?;
        let reply = self
            .exchange(Command::Store {
                verb,
                key,
                value,
                flags,
                ttl,
            })
            .await?;

        match reply {
            Reply::Stored => Ok(()),
            Reply::NotStored => Err(CacheError::NotStored(key.to_string())),
            other => Err(unexpected(verb, &other)),
        }
    }
}

impl KvCache for MemcacheClient {
    async fn get(&self, key: &str) -> CacheResult<CacheItem> {
        validate_key(key)?;
        match self.exchange(Command::Get(key)).await? {
            Reply::Value(item) => Ok(item),
            Reply::End => Err(CacheError::NotFound(key.to_string())),
            other => Err(unexpected("get", &other)),
        }
    }

    async fn set(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        self.store("set", key, value, flags, ttl).await
    }

    async fn add(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        self.store("add", key, value, flags, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        validate_key(key)?;
        match self.exchange(Command::Delete(key)).await? {
            Reply::Deleted => Ok(()),
            Reply::NotFound => Err(CacheError::NotFound(key.to_string())),
            other => Err(unexpected("delete", &other)),
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        match self.exchange(Command::Version).await? {
            Reply::Version(version) => {
                debug!("memcached {} is up (version {})", self.addr, version);
                Ok(())
            }
            other => Err(unexpected("version", &other)),
        }
    }
}

// == Protocol ==
async fn round_trip(conn: &mut Connection, command: &Command<'_>) -> CacheResult<Reply> {
    conn.write_all(&command.encode()).await?;
    conn.flush().await?;

    let line = read_line(conn).await?;
    let reply = parse_reply_line(&line)?;

    match reply {
        ReplyLine::Value { key, flags, len } => {
            if let Command::Get(requested) = command {
                if key != *requested {
                    return Err(CacheError::Protocol(format!(
                        "asked for {:?}, server answered {:?}",
                        requested, key
                    )));
                }
            }

            let mut data = vec![0u8; len + 2];
            conn.read_exact(&mut data).await?;
            if !data.ends_with(b"\r\n") {
                return Err(CacheError::Protocol(
                    "value block not terminated by CRLF".to_string(),
                ));
            }
            data.truncate(len);

            let end = read_line(conn).await?;
            if end != "END" {
                return Err(CacheError::Protocol(format!(
                    "expected END after value, got {:?}",
                    end
                )));
            }
            Ok(Reply::Value(CacheItem { value: data, flags }))
        }
        ReplyLine::Simple(reply) => Ok(reply),
    }
}

async fn read_line(conn: &mut Connection) -> CacheResult<String> {
    let mut line = String::new();
    let n = conn.read_line(&mut line).await?;
    if n == 0 {
        return Err(CacheError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "memcached closed the connection",
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[derive(Debug, PartialEq, Eq)]
enum ReplyLine {
    Value { key: String, flags: u32, len: usize },
    Simple(Reply),
}

fn parse_reply_line(line: &str) -> CacheResult<ReplyLine> {
    let simple = |reply| Ok(ReplyLine::Simple(reply));
    match line {
        "STORED" => simple(Reply::Stored),
        "NOT_STORED" | "EXISTS" => simple(Reply::NotStored),
        "END" => simple(Reply::End),
        "DELETED" => simple(Reply::Deleted),
        "NOT_FOUND" => simple(Reply::NotFound),
        "ERROR" => Err(CacheError::Server("unknown command".to_string())),
        _ => {
            if let Some(msg) = line.strip_prefix("SERVER_ERROR ") {
                return Err(CacheError::Server(msg.to_string()));
            }
            if let Some(msg) = line.strip_prefix("CLIENT_ERROR ") {
                return Err(CacheError::Server(format!("client error: {}", msg)));
            }
            if let Some(version) = line.strip_prefix("VERSION ") {
                return simple(Reply::Version(version.to_string()));
            }
            if let Some(rest) = line.strip_prefix("VALUE ") {
                return parse_value_header(rest);
            }
            Err(CacheError::Protocol(format!("unexpected reply {:?}", line)))
        }
    }
}

/// Parses `<key> <flags> <bytes> [<cas>]` after the `VALUE ` prefix.
fn parse_value_header(rest: &str) -> CacheResult<ReplyLine> {
    let malformed = || CacheError::Protocol(format!("malformed VALUE line {:?}", rest));
    let mut parts = rest.split(' ');

    let key = parts.next().filter(|k| !k.is_empty()).ok_or_else(malformed)?;
    let flags = parts
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or_else(malformed)?;
    let len = parts
        .next()
        .and_then(|l| l.parse().ok())
        .ok_or_else(malformed)?;

    Ok(ReplyLine::Value {
        key: key.to_string(),
        flags,
        len,
    })
}

fn unexpected(op: &str, reply: &Reply) -> CacheError {
    CacheError::Protocol(format!("unexpected reply to {}: {:?}", op, reply))
}
