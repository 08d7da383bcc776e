//! Per-connection session handling.
//!
//! A session owns one accepted connection end-to-end: it writes the
//! banner, runs the login preamble, then starts two concurrent duties.
//! The reader pulls raw bytes through the line framer and feeds logical
//! lines into a capacity-1 queue; the router consumes lines and executes
//! commands. Whichever duty finishes first ends the session; the other
//! is stopped through a per-session token and both completions are
//! always observed before the socket is released.

use crate::command::{self, Command, INVALID, PROMPT};
use crate::framer::LineFramer;
use crate::storage::MessageStore;
use crate::users::UserStore;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Read buffer size per connection
const READ_BUFFER_SIZE: usize = 512;

/// Notice written to the client on coordinated shutdown.
const SHUTDOWN_NOTICE: &[u8] = b"Shutdown\n";

/// State shared by every session: pre-rendered banner, limits and the
/// injected store collaborators.
pub struct SessionContext {
    /// Banner with all placeholders already substituted.
    pub banner: String,
    /// Maximum messages returned by the read command.
    pub max_read_messages: usize,
    /// Shared message board.
    pub messages: MessageStore,
    /// Shared credential store.
    pub users: UserStore,
}

/// One accepted connection and its lifecycle.
pub struct Session {
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    peer: SocketAddr,
}

impl Session {
    /// Bind a session to an accepted connection's peer address.
    pub fn new(ctx: Arc<SessionContext>, shutdown: CancellationToken, peer: SocketAddr) -> Self {
        Session {
            ctx,
            shutdown,
            peer,
        }
    }

    /// Drive the session to completion. All errors are session-local:
    /// they are logged here and never propagate to other sessions.
    pub async fn run(self, stream: TcpStream) {
        debug!(peer = %self.peer, "Session started");
        if let Err(e) = self.handle(stream).await {
            warn!(peer = %self.peer, error = %e, "Session ended with error");
        }
        debug!(peer = %self.peer, "Session closed");
    }

    async fn handle(&self, stream: TcpStream) -> std::io::Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = LineReader::new(read_half);

        write_half.write_all(self.ctx.banner.as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        let Some(user) = self.login(&mut lines, &mut write_half).await? else {
            return Ok(());
        };

        write_half.write_all(PROMPT.as_bytes()).await?;

        // Both duties write to the client: the router writes responses,
        // the reader writes shutdown/timeout notices.
        let writer = Arc::new(Mutex::new(write_half));

        // Capacity 1: the reader stalls until the router has consumed
        // the previous line, which is the backpressure point.
        let (line_tx, line_rx) = mpsc::channel::<String>(1);

        // Each duty sends its exit reason exactly once on its own sender
        // clone, so the channel is never signaled twice by one writer.
        let (exit_tx, mut exit_rx) = mpsc::channel::<std::io::Result<()>>(2);

        let stop = self.shutdown.child_token();

        let reader_exit = exit_tx.clone();
        let reader_handle = {
            let writer = Arc::clone(&writer);
            let stop = stop.clone();
            let shutdown = self.shutdown.clone();
            let peer = self.peer;
            tokio::spawn(async move {
                let result = reader_duty(&mut lines, &writer, &line_tx, &stop, &shutdown).await;
                debug!(peer = %peer, "Reader duty closed");
                let _ = reader_exit.send(result).await;
            })
        };

        let router_handle = {
            let ctx = Arc::clone(&self.ctx);
            let writer = Arc::clone(&writer);
            let stop = stop.clone();
            let shutdown = self.shutdown.clone();
            let peer = self.peer;
            let user = user.clone();
            tokio::spawn(async move {
                let result =
                    router_duty(&ctx, &user, line_rx, &writer, &stop, &shutdown).await;
                debug!(peer = %peer, "Router duty closed");
                let _ = exit_tx.send(result).await;
            })
        };

        // Whichever duty finishes first ends the session.
        if let Some(Err(e)) = exit_rx.recv().await {
            warn!(peer = %self.peer, user = %user, error = %e, "Connection duty failed");
        }
        stop.cancel();

        // Join the second duty and drain its completion so neither task
        // is left stuck on the exit channel.
        let _ = reader_handle.await;
        let _ = router_handle.await;
        while let Ok(result) = exit_rx.try_recv() {
            if let Err(e) = result {
                warn!(peer = %self.peer, user = %user, error = %e, "Connection duty failed");
            }
        }

        let _ = writer.lock().await.shutdown().await;
        Ok(())
    }

    /// Login/register preamble. Returns the authenticated username, or
    /// `None` when the client left, failed the login or shutdown began.
    async fn login(
        &self,
        lines: &mut LineReader,
        writer: &mut OwnedWriteHalf,
    ) -> std::io::Result<Option<String>> {
        writer
            .write_all(b"Enter username (or type 'register'): ")
            .await?;
        let Some(username) = self.login_line(lines, writer).await? else {
            return Ok(None);
        };

        if username.eq_ignore_ascii_case("register") {
            writer.write_all(b"Choose a username: ").await?;
            let Some(username) = self.login_line(lines, writer).await? else {
                return Ok(None);
            };
            writer.write_all(b"Choose a password: ").await?;
            let Some(password) = self.login_line(lines, writer).await? else {
                return Ok(None);
            };

            match self.ctx.users.register(&username, &password) {
                Ok(()) => {
                    writer.write_all(b"Registration successful.\n").await?;
                    Ok(Some(username))
                }
                Err(e) => {
                    let notice = format!("Registration failed: {}. Goodbye.\n", e);
                    writer.write_all(notice.as_bytes()).await?;
                    Ok(None)
                }
            }
        } else {
            writer.write_all(b"Enter password: ").await?;
            let Some(password) = self.login_line(lines, writer).await? else {
                return Ok(None);
            };

            if self.ctx.users.authenticate(&username, &password) {
                let greeting = format!("Welcome back, {}!\n", username);
                writer.write_all(greeting.as_bytes()).await?;
                Ok(Some(username))
            } else {
                writer.write_all(b"Login failed. Goodbye.\n").await?;
                Ok(None)
            }
        }
    }

    /// Next non-empty line during the preamble, racing the shutdown
    /// signal. `None` on EOF, failed login or shutdown.
    async fn login_line(
        &self,
        lines: &mut LineReader,
        writer: &mut OwnedWriteHalf,
    ) -> std::io::Result<Option<String>> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = writer.write_all(SHUTDOWN_NOTICE).await;
                    return Ok(None);
                }
                line = lines.next_line() => match line? {
                    None => return Ok(None),
                    Some(line) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            return Ok(Some(line.to_string()));
                        }
                    }
                }
            }
        }
    }
}

/// Read half plus framing state. Raw chunks go through the framer as
/// they arrive; decoded lines queue up until consumed.
struct LineReader {
    read_half: OwnedReadHalf,
    framer: LineFramer,
    buf: BytesMut,
    pending: VecDeque<String>,
}

impl LineReader {
    fn new(read_half: OwnedReadHalf) -> Self {
        LineReader {
            read_half,
            framer: LineFramer::new(),
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            pending: VecDeque::new(),
        }
    }

    /// Next logical line, possibly empty. `None` means end of stream;
    /// unterminated trailing bytes are dropped with it.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Ok(Some(line));
            }
            let n = self.read_half.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            let chunk = self.buf.split();
            self.pending.extend(self.framer.push(&chunk));
        }
    }
}

/// Reader duty: pull bytes off the socket, frame them, hand non-empty
/// lines to the router. Observes the stop token at every read.
async fn reader_duty(
    lines: &mut LineReader,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    line_tx: &mpsc::Sender<String>,
    stop: &CancellationToken,
    shutdown: &CancellationToken,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                if shutdown.is_cancelled() {
                    let _ = writer.lock().await.write_all(SHUTDOWN_NOTICE).await;
                }
                return Ok(());
            }
            line = lines.next_line() => match line {
                Ok(None) => return Ok(()),
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    // Blocks until the router takes the line; a closed
                    // queue means the router is gone.
                    if line_tx.send(line).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    let _ = writer
                        .lock()
                        .await
                        .write_all(b"Too slow, closing connection.\n")
                        .await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Router duty: wait for either shutdown or the next queued line, then
/// dispatch it against the command table.
async fn router_duty(
    ctx: &SessionContext,
    user: &str,
    mut line_rx: mpsc::Receiver<String>,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    stop: &CancellationToken,
    shutdown: &CancellationToken,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                if shutdown.is_cancelled() {
                    let _ = writer.lock().await.write_all(SHUTDOWN_NOTICE).await;
                }
                return Ok(());
            }
            line = line_rx.recv() => {
                let Some(line) = line else {
                    // Reader gone, queue drained.
                    return Ok(());
                };
                // Lines come terminator-free from the framer, but split
                // defensively in case malformed input embedded one.
                for piece in line.split('\n') {
                    let piece = piece.trim();
                    if piece.is_empty() {
                        continue;
                    }

                    match Command::parse(piece) {
                        Some(Command::Exit) => {
                            writer.lock().await.write_all(b"Bye!\n").await?;
                            return Ok(());
                        }
                        Some(cmd) => {
                            let response =
                                command::execute(&cmd, user, &ctx.messages, ctx.max_read_messages);
                            let mut w = writer.lock().await;
                            w.write_all(response.as_bytes()).await?;
                            w.write_all(PROMPT.as_bytes()).await?;
                        }
                        None => {
                            let mut w = writer.lock().await;
                            w.write_all(INVALID.as_bytes()).await?;
                            w.write_all(PROMPT.as_bytes()).await?;
                        }
                    }
                }
            }
        }
    }
}
