//! Test support: an in-process scripted RESP node.
//!
//! `MockNode` accepts connections, parses command frames, records every
//! command it sees (with the id of the connection that carried it), and
//! answers via a responder closure supplied by the test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use coral_protocol::{parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Log = Arc<Mutex<Vec<(usize, Vec<String>)>>>;
type Responder = Arc<dyn Fn(&[String]) -> Frame + Send + Sync>;

pub struct MockNode {
    addr: String,
    log: Log,
}

impl MockNode {
    /// Binds a listener up front so the node's address is known before
    /// the responder closure (which often wants to embed it) is built.
    pub async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Starts serving on a pre-bound listener.
    pub fn serve<F>(listener: TcpListener, respond: F) -> MockNode
    where
        F: Fn(&[String]) -> Frame + Send + Sync + 'static,
    {
        let addr = listener.local_addr().unwrap().to_string();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let conn_log = log.clone();
        let respond: Responder = Arc::new(respond);

        tokio::spawn(async move {
            let next_conn = AtomicUsize::new(0);
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let conn_id = next_conn.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(
                    stream,
                    conn_id,
                    conn_log.clone(),
                    respond.clone(),
                ));
            }
        });

        MockNode { addr, log }
    }

    /// Binds and serves in one step, for tests that don't need the
    /// address inside the responder.
    pub async fn start<F>(respond: F) -> MockNode
    where
        F: Fn(&[String]) -> Frame + Send + Sync + 'static,
    {
        let (listener, _) = Self::bind().await;
        Self::serve(listener, respond)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Every command with the id of the connection it arrived on.
    pub fn commands_with_conn(&self) -> Vec<(usize, Vec<String>)> {
        self.log.lock().unwrap().clone()
    }

    /// How many times a command with this name arrived.
    pub fn count_of(&self, name: &str) -> usize {
        self.commands()
            .iter()
            .filter(|cmd| cmd.first().is_some_and(|c| c.eq_ignore_ascii_case(name)))
            .count()
    }

    /// How many times `name sub ...` arrived (e.g. `CLUSTER NODES`).
    pub fn count_of_sub(&self, name: &str, sub: &str) -> usize {
        self.commands()
            .iter()
            .filter(|cmd| {
                cmd.first().is_some_and(|c| c.eq_ignore_ascii_case(name))
                    && cmd.get(1).is_some_and(|c| c.eq_ignore_ascii_case(sub))
            })
            .count()
    }
}

async fn serve_connection(mut stream: TcpStream, conn_id: usize, log: Log, respond: Responder) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        while let Ok(Some((frame, consumed))) = parse_frame(&buf) {
            let _ = buf.split_to(consumed);
            let tokens = tokens_of(&frame);
            log.lock().unwrap().push((conn_id, tokens.clone()));
            let reply = respond(&tokens);
            let mut out = BytesMut::new();
            reply.serialize(&mut out);
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
        match stream.read_buf(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Flattens a command frame (array of bulk strings) into string tokens.
fn tokens_of(frame: &Frame) -> Vec<String> {
    match frame {
        Frame::Array(items) => items
            .iter()
            .map(|item| match item {
                Frame::Bulk(data) => String::from_utf8_lossy(data).into_owned(),
                Frame::Simple(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect(),
        other => vec![format!("{other:?}")],
    }
}
