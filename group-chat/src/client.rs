use std::borrow::Cow;

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    command::Command,
    protocol::{read_line, write_line},
};

const HELP: &str = "commands: JOIN <name>, MSG <text> (or plain text), PRIVATE_MSG <id> <text>, \
                    SET_COORDINATOR <id>, REQUEST_MEMBERS, LEAVE";

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut reader, mut writer) = establish_connection(&args).await?;
    write_stdout(&format!("*** connected to {}; {HELP}", args.server)).await?;

    if let Some(username) = &args.username {
        write_line(&mut writer, &format!("JOIN {username}")).await?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut input).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

async fn run_client_loop<R, W, S>(
    reader: &mut R,
    writer: &mut W,
    stdin: &mut S,
    input: &mut String,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: AsyncBufRead + Unpin,
{
    loop {
        // `input` is only cleared after a completed read; a read cancelled by another branch
        // leaves its partial bytes in place and the next read_line appends to them.
        select! {
            server_line = read_line(reader) => {
                if !handle_server_line(server_line).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                let keep_going = handle_stdin_input(bytes_read, input, writer).await?;
                input.clear();
                if !keep_going {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                leave(writer).await?;
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(line: io::Result<Option<String>>) -> Result<bool> {
    match line? {
        Some(line) => {
            write_stdout(&render_server_line(&line)).await?;
            Ok(true)
        }
        None => {
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input<W>(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut W,
) -> Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        leave(writer).await?;
        return Ok(false);
    }

    // Trailing spaces are kept so `JOIN ` still reaches the server as a join.
    let text = input.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return Ok(true);
    }

    if Command::parse(text) == Command::Leave {
        leave(writer).await?;
        return Ok(false);
    }

    write_line(writer, text).await?;
    Ok(true)
}

fn render_server_line(line: &str) -> Cow<'_, str> {
    if line.starts_with("Private from") {
        Cow::Owned(format!("[Private] {line}"))
    } else {
        Cow::Borrowed(line)
    }
}

async fn leave<W>(writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_line(writer, "LEAVE").await?;
    write_stdout("*** leaving chat").await?;
    Ok(())
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
