use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use group_chat::protocol;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("group_chat");

    let (mut server_child, mut server_stdout) = spawn_server(&binary).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Drain additional server logs in the background so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    // Alice connects first and is promoted before her JOIN is processed.
    let mut alice = spawn_client(&binary, "alice", &addr).await?;
    let alice_promoted = read_line_expect(&mut alice.stdout, "waiting for alice promotion").await?;
    assert_eq!(alice_promoted, "You are now the coordinator");
    let alice_welcome = read_line_expect(&mut alice.stdout, "waiting for alice welcome").await?;
    assert_eq!(alice_welcome, "Welcome, alice");

    let mut bob = spawn_client(&binary, "bob", &addr).await?;
    let bob_welcome = read_line_expect(&mut bob.stdout, "waiting for bob welcome").await?;
    assert_eq!(bob_welcome, "Welcome, bob");

    // Plain text is a broadcast and reaches the sender as well.
    alice
        .send_line("Hello from Alice")
        .await
        .context("alice send line")?;
    let bob_hears_alice =
        read_line_expect(&mut bob.stdout, "waiting for bob to hear alice").await?;
    assert!(bob_hears_alice.ends_with(" alice: Hello from Alice"));
    let alice_echo = read_line_expect(&mut alice.stdout, "waiting for alice echo").await?;
    assert!(alice_echo.ends_with(" alice: Hello from Alice"));

    // Bob whispers to Alice (session 1); nothing is echoed to Bob.
    bob.send_line("PRIVATE_MSG 1 just you")
        .await
        .context("bob send private")?;
    let alice_whisper =
        read_line_expect(&mut alice.stdout, "waiting for alice to get private").await?;
    assert_eq!(alice_whisper, "[Private] Private from bob: just you");

    bob.send_line("REQUEST_MEMBERS").await.context("bob members")?;
    let members = read_line_expect(&mut bob.stdout, "waiting for member list").await?;
    assert_eq!(members, "Active Members: alice (ID: 1), bob (ID: 2)");

    alice.send_line("LEAVE").await.context("alice send leave")?;
    let alice_quit =
        read_line_expect(&mut alice.stdout, "waiting for alice leave confirmation").await?;
    assert_eq!(alice_quit, "*** leaving chat");

    bob.send_line("leave").await.context("bob send leave")?;
    let bob_quit = read_line_expect(&mut bob.stdout, "waiting for bob leave confirmation").await?;
    assert_eq!(bob_quit, "*** leaving chat");

    ensure_success(&mut alice.child, "alice client").await?;
    ensure_success(&mut bob.child, "bob client").await?;

    // The server stays up after clients disconnect; terminate it manually.
    let _ = server_child.kill().await;
    let _ = server_child.wait().await;
    let _ = server_log_task.await;

    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG_STYLE", "never")
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stdout = child
        .stdout
        .take()
        .context("server stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("server did not emit listening address")?;
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected server banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("server banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn spawn_client(binary: &Path, username: &str, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("client")
        .arg("--username")
        .arg(username)
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn client {username}"))?;

    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    let mut process = ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    };

    let banner = read_line_expect(&mut process.stdout, "waiting for connect banner").await?;
    if !banner.starts_with(&format!("*** connected to {addr}")) {
        return Err(anyhow!("expected connect banner for {username}, got '{banner}'"));
    }

    Ok(process)
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    match timeout(READ_TIMEOUT, protocol::read_line(reader)).await {
        Ok(line) => Ok(line?),
        Err(_) => Err(anyhow!("timed out waiting for line")),
    }
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    while let Ok(Some(_)) = protocol::read_line(&mut reader).await {}
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
