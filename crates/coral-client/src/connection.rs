//! One buffered RESP connection to a node.
//!
//! Commands are serialized into a write buffer and either flushed
//! immediately (`call`) or left queued (`enqueue`) so several commands
//! can go out in one write. The connection counts queued-but-unflushed
//! commands: when a `call` finally flushes, the replies owed to earlier
//! queued commands are drained in order before the caller's own reply is
//! returned.

use bytes::{Bytes, BytesMut};
use coral_protocol::{parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::PoolConfig;
use crate::error::HandleError;

pub(crate) struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Commands written into `write_buf` whose replies have not been read.
    queued: usize,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Dials a node and runs the configured session setup: `AUTH` when a
    /// password is set, `SELECT` when a non-zero database is configured.
    pub(crate) async fn dial(addr: &str, config: &PoolConfig) -> Result<Self, HandleError> {
        let stream = TcpStream::connect(addr).await?;
        let mut conn = Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            queued: 0,
        };

        if let Some(password) = &config.password {
            conn.call("AUTH", &[Bytes::copy_from_slice(password.as_bytes())])
                .await?;
        }
        if config.database > 0 {
            conn.call("SELECT", &[Bytes::from(config.database.to_string())])
                .await?;
        }
        Ok(conn)
    }

    /// Serializes a command into the write buffer without flushing.
    /// The node will not see it until the next flush; its reply is owed
    /// on this connection.
    pub(crate) fn enqueue(&mut self, cmd: &str, args: &[Bytes]) {
        Frame::command(cmd, args).serialize(&mut self.write_buf);
        self.queued += 1;
    }

    /// Sends a command and reads its reply.
    ///
    /// Everything queued ahead of it is flushed in the same write; owed
    /// replies are read in order and discarded, and the reply to `cmd`
    /// itself is returned. Error replies surface as
    /// [`HandleError::Server`] with the message verbatim.
    pub(crate) async fn call(&mut self, cmd: &str, args: &[Bytes]) -> Result<Frame, HandleError> {
        self.enqueue(cmd, args);
        let owed = self.queued;
        self.flush().await?;

        let mut reply = self.read_frame().await?;
        for _ in 1..owed {
            reply = self.read_frame().await?;
        }
        self.queued = 0;

        match reply {
            Frame::Error(msg) => Err(HandleError::Server(msg)),
            frame => Ok(frame),
        }
    }

    async fn flush(&mut self) -> Result<(), HandleError> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Frame, HandleError> {
        loop {
            if !self.read_buf.is_empty() {
                if let Some((frame, consumed)) = parse_frame(&self.read_buf)? {
                    let _ = self.read_buf.split_to(consumed);
                    return Ok(frame);
                }
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(HandleError::Disconnected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot server: accepts a single connection and writes `replies`
    /// as each complete command frame arrives.
    async fn scripted_node(replies: Vec<&'static [u8]>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let mut replies = replies.into_iter();
            loop {
                match parse_frame(&buf) {
                    Ok(Some((_, consumed))) => {
                        let _ = buf.split_to(consumed);
                        match replies.next() {
                            Some(reply) => stream.write_all(reply).await.unwrap(),
                            None => return,
                        }
                    }
                    _ => {
                        if stream.read_buf(&mut buf).await.unwrap_or(0) == 0 {
                            return;
                        }
                    }
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn call_round_trip() {
        let addr = scripted_node(vec![b"+PONG\r\n"]).await;
        let mut conn = Connection::dial(&addr, &PoolConfig::default()).await.unwrap();
        let reply = conn.call("PING", &[]).await.unwrap();
        assert_eq!(reply, Frame::Simple("PONG".into()));
    }

    #[tokio::test]
    async fn server_error_surfaces_verbatim() {
        let addr = scripted_node(vec![b"-MOVED 12182 10.0.0.9:6379\r\n"]).await;
        let mut conn = Connection::dial(&addr, &PoolConfig::default()).await.unwrap();
        let err = conn
            .call("GET", &[Bytes::from_static(b"foo")])
            .await
            .unwrap_err();
        // Display is the raw message, so the first token is the redirect verb
        assert_eq!(err.to_string(), "MOVED 12182 10.0.0.9:6379");
        assert_eq!(err.to_string().split_whitespace().next(), Some("MOVED"));
        assert!(matches!(err, HandleError::Server(_)));
    }

    #[tokio::test]
    async fn queued_replies_drain_before_call_reply() {
        let addr = scripted_node(vec![b"+OK\r\n", b"$5\r\nvalue\r\n"]).await;
        let mut conn = Connection::dial(&addr, &PoolConfig::default()).await.unwrap();

        conn.enqueue("ASKING", &[]);
        let reply = conn.call("GET", &[Bytes::from_static(b"k")]).await.unwrap();
        assert_eq!(reply, Frame::Bulk(Bytes::from_static(b"value")));
    }

    #[tokio::test]
    async fn auth_runs_at_dial() {
        let addr = scripted_node(vec![b"+OK\r\n", b"+PONG\r\n"]).await;
        let config = PoolConfig {
            password: Some("hunter2".into()),
            ..PoolConfig::default()
        };
        let mut conn = Connection::dial(&addr, &config).await.unwrap();
        let reply = conn.call("PING", &[]).await.unwrap();
        assert_eq!(reply, Frame::Simple("PONG".into()));
    }

    #[tokio::test]
    async fn auth_failure_fails_dial() {
        let addr = scripted_node(vec![b"-ERR invalid password\r\n"]).await;
        let config = PoolConfig {
            password: Some("wrong".into()),
            ..PoolConfig::default()
        };
        let err = Connection::dial(&addr, &config).await.unwrap_err();
        assert!(matches!(err, HandleError::Server(msg) if msg == "ERR invalid password"));
    }

    #[tokio::test]
    async fn disconnect_mid_reply() {
        // server sends nothing and closes after the first command
        let addr = scripted_node(vec![]).await;
        let mut conn = Connection::dial(&addr, &PoolConfig::default()).await.unwrap();
        let err = conn.call("PING", &[]).await.unwrap_err();
        assert!(matches!(err, HandleError::Disconnected));
    }
}
