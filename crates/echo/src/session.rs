//! Session — the line-based echo handler run for every client.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use acceptor::{ConnContext, Connection};

use crate::conf::SessionConfig;

/// Echoes every line back to the client until it quits, disconnects, or
/// the server shuts down.
#[derive(Debug, Clone)]
pub struct Session {
    greeting: Option<String>,
    quit_command: String,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            greeting: config.greeting.clone().filter(|g| !g.is_empty()),
            quit_command: config.quit_command.clone(),
        }
    }

    pub async fn run(&self, ctx: ConnContext, conn: Connection) -> io::Result<()> {
        let tls = conn.is_tls();
        let mut stream = BufReader::new(conn);
        debug!(parent: ctx.span(), tls, "session started");

        if let Some(greeting) = &self.greeting {
            stream.write_all(greeting.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await?;
        }

        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = ctx.cancelled() => {
                    debug!(parent: ctx.span(), "session ended by shutdown");
                    return Ok(());
                }
                read = stream.read_line(&mut line) => read?,
            };
            if read == 0 {
                debug!(parent: ctx.span(), "client hung up");
                return Ok(());
            }

            let request = line.trim_end_matches(&['\r', '\n'][..]);
            if self.is_quit(request) {
                debug!(parent: ctx.span(), "client quit");
                return Ok(());
            }

            debug!(parent: ctx.span(), request, "echo request");
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await?;
        }
    }

    fn is_quit(&self, request: &str) -> bool {
        !self.quit_command.is_empty() && request.starts_with(&self.quit_command)
    }
}
