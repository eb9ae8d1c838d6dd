//! Terminal client for the game server.

use crate::protocol::ServerMessage;
use crate::tls::ClientTls;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

/// Plays one connection: prints server messages to `output` and forwards
/// lines typed on `input` to the server.
///
/// When `nickname` is given it answers the nickname prompt automatically;
/// otherwise the prompt is shown and the first typed line is the nickname.
/// Typed lines are held back until the nickname has been sent. Returns when
/// the server closes the connection.
///
/// # Errors
///
/// Returns any I/O error from the connection or the terminal.
#[instrument(skip(stream, input, output))]
pub async fn run_client<S, I, O>(
    stream: S,
    nickname: Option<String>,
    input: I,
    mut output: O,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let nickname_prompt = ServerMessage::NicknamePrompt.to_string();
    let (read, mut write) = tokio::io::split(stream);
    let mut server_lines = BufReader::new(read).lines();
    let mut input_lines = input.lines();
    let mut input_open = true;
    let mut named = nickname.is_none();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Server closed connection");
                    break;
                };
                match (&nickname, named) {
                    (Some(name), false) if line == nickname_prompt => {
                        write.write_all(format!("{}\n", name).as_bytes()).await?;
                        write.flush().await?;
                        named = true;
                    }
                    _ => {
                        output.write_all(line.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                        output.flush().await?;
                    }
                }
            }
            typed = input_lines.next_line(), if input_open && named => {
                match typed? {
                    Some(typed) => {
                        write.write_all(format!("{}\n", typed.trim()).as_bytes()).await?;
                        write.flush().await?;
                    }
                    None => input_open = false,
                }
            }
        }
    }
    Ok(())
}

/// Connects to `addr` and plays on the process terminal, over TLS when
/// `tls` is given.
pub async fn play(
    addr: SocketAddr,
    nickname: Option<String>,
    tls: Option<ClientTls>,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();
    match tls {
        Some(tls) => {
            let stream = tls.connect(stream).await?;
            info!(%addr, "Connected to game server over TLS");
            run_client(stream, nickname, input, output).await
        }
        None => {
            info!(%addr, "Connected to game server");
            run_client(stream, nickname, input, output).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_client_answers_prompt_and_forwards_moves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"Enter your nickname:\n").await.unwrap();
            let nickname = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"Your move (X). Enter a position (1-9):\n")
                .await
                .unwrap();
            let reply = lines.next_line().await.unwrap().unwrap();
            (nickname, reply)
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut output = Vec::new();
        run_client(stream, Some("alice".to_string()), &b"5\n"[..], &mut output)
            .await
            .unwrap();

        let (nickname, reply) = server.await.unwrap();
        assert_eq!(nickname, "alice");
        assert_eq!(reply, "5");
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Your move (X)"));
        assert!(!printed.contains("Enter your nickname"));
    }
}
