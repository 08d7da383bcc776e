//! TCP server for the bulletin board.
//!
//! Accepts connections and spawns one session per client. Sessions are
//! tracked in a join set; shutdown cancels the shared token once and
//! waits for every live session to finish before returning.

use crate::config::Config;
use crate::motd;
use crate::session::{Session, SessionContext};
use crate::storage::MessageStore;
use crate::users::UserStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Server instance
pub struct Server {
    config: Config,
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a new server instance, loading the banner and both stores.
    pub fn new(config: Config) -> Self {
        let banner = motd::load(config.motd_file.as_deref(), &config.host, config.port);
        let ctx = Arc::new(SessionContext {
            banner,
            max_read_messages: config.max_read_messages,
            messages: MessageStore::new(config.max_messages, config.messages_file.clone()),
            users: UserStore::new(config.users_file.clone()),
        });

        Server {
            config,
            ctx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token observed by every session; handed out so the process can
    /// hook it to an external signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger graceful shutdown. Idempotent; triggering twice is a
    /// no-op. `run`/`serve` return once every session has finished.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        info!(address = %self.config.listen_addr(), "Server listening");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener. Accept errors are
    /// logged and never stop the supervisor.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "Incoming connection");
                        let session =
                            Session::new(Arc::clone(&self.ctx), self.shutdown.clone(), peer);
                        sessions.spawn(session.run(stream));
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        info!(active = sessions.len(), "Shutting down, draining sessions");
        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                debug!(error = %e, "Session task panicked");
            }
        }
        info!("All sessions closed");
        Ok(())
    }

    /// Shared session state, exposed for tests.
    #[cfg(test)]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_server() -> Arc<Server> {
        let config = Config::default();
        let server = Arc::new(Server::new(config));
        server.context().users.register("alice", "pw").unwrap();
        server
    }

    async fn spawn_server(server: &Arc<Server>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::clone(server);
        tokio::spawn(async move { server.serve(listener).await });
        addr
    }

    async fn read_until(client: &mut TcpStream, needle: &str) -> String {
        let mut data = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            let mut chunk = [0u8; 256];
            while !String::from_utf8_lossy(&data).contains(needle) {
                let n = client.read(&mut chunk).await.unwrap();
                assert!(n > 0, "EOF before finding {:?}", needle);
                data.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", needle));
        String::from_utf8_lossy(&data).into_owned()
    }

    async fn connect_and_login(addr: std::net::SocketAddr) -> TcpStream {
        let mut client = TcpStream::connect(addr).await.unwrap();
        read_until(&mut client, "Enter username").await;
        client.write_all(b"alice\n").await.unwrap();
        read_until(&mut client, "Enter password").await;
        client.write_all(b"pw\n").await.unwrap();
        read_until(&mut client, "> ").await;
        client
    }

    #[tokio::test]
    async fn test_banner_on_connect() {
        let server = test_server();
        let addr = spawn_server(&server).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let output = read_until(&mut client, "Enter username").await;
        // Default banner carries the configured host and port.
        assert!(output.contains("0.0.0.0:2323"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let server = test_server();
        let addr = spawn_server(&server).await;

        let mut first = connect_and_login(addr).await;
        let mut second = connect_and_login(addr).await;

        // First session leaves; the second must keep working.
        first.write_all(b"exit\n").await.unwrap();
        read_until(&mut first, "Bye!").await;

        second.write_all(b"post still here\n").await.unwrap();
        read_until(&mut second, "Message posted.").await;
    }

    #[tokio::test]
    async fn test_posts_visible_across_sessions() {
        let server = test_server();
        let addr = spawn_server(&server).await;

        let mut poster = connect_and_login(addr).await;
        poster.write_all(b"post hello from one\n").await.unwrap();
        read_until(&mut poster, "Message posted.").await;

        let mut reader = connect_and_login(addr).await;
        reader.write_all(b"read\n").await.unwrap();
        read_until(&mut reader, "alice: hello from one").await;
    }

    #[tokio::test]
    async fn test_concurrent_posts_from_many_sessions() {
        let server = test_server();
        let addr = spawn_server(&server).await;

        let mut tasks = Vec::new();
        for i in 0..5 {
            tasks.push(tokio::spawn(async move {
                let mut client = connect_and_login(addr).await;
                client
                    .write_all(format!("post message {}\n", i).as_bytes())
                    .await
                    .unwrap();
                read_until(&mut client, "Message posted.").await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(server.context().messages.len(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_drains_idle_sessions() {
        let server = Arc::new(Server::new(Config::default()));
        server.context().users.register("alice", "pw").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let serve_handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(connect_and_login(addr).await);
        }

        server.shutdown();
        // Triggering again must be a harmless no-op.
        server.shutdown();

        for client in &mut clients {
            read_until(client, "Shutdown").await;
            let mut rest = Vec::new();
            client.read_to_end(&mut rest).await.unwrap();
        }

        // The supervisor returns only after every session completed.
        tokio::time::timeout(Duration::from_secs(5), serve_handle)
            .await
            .expect("supervisor did not drain sessions")
            .unwrap()
            .unwrap();
    }
}
