//! Integration tests for CLI commands.
//!
//! Spawns the real binary on a free loopback port and talks to it over TCP.

#![allow(deprecated)] // cargo::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Kills the child process when dropped, even if the test panics.
struct Running(Child);

impl Drop for Running {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn command(project: &TempDir, args: &[&str]) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("actorflow"));
    cmd.arg("--project")
        .arg(project.path())
        .args(args)
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

fn spawn(project: &TempDir, args: &[&str]) -> Running {
    Running(command(project, args).spawn().expect("spawn actorflow"))
}

fn connect(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(Duration::from_secs(10)))
                    .unwrap();
                return stream;
            }
            Err(_) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(error) => panic!("server never came up: {error}"),
        }
    }
}

#[test]
fn reply_answers_bookmarks() {
    let temp = TempDir::new().unwrap();
    let port = free_port();
    let address = format!("127.0.0.1:{port}");
    let _server = spawn(&temp, &["reply", "--address", &address]);

    let stream = connect(port);
    (&stream)
        .write_all(b"# comment\n\n{\"FirstUrl\":\"http://x\",\"Text\":\"y\"}\n[1, 2\n")
        .unwrap();

    let mut reader = BufReader::new(&stream);
    let mut first = String::new();
    reader.read_line(&mut first).unwrap();
    let mut second = String::new();
    reader.read_line(&mut second).unwrap();

    assert_eq!(first, "Bookmark[url: http://x, text: y]\n");
    assert_eq!(second, "Error processing bookmark\n");
}

#[test]
fn reply_uses_configured_error_reply() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("actorflow.toml"),
        "[pipelines]\nerror_reply = \"nope\"\n",
    )
    .unwrap();
    let port = free_port();
    let address = format!("127.0.0.1:{port}");
    let _server = spawn(&temp, &["reply", "--address", &address]);

    let stream = connect(port);
    (&stream).write_all(b"{\"Text\":\"y\"}\n").unwrap();

    let mut reply = String::new();
    BufReader::new(&stream).read_line(&mut reply).unwrap();

    assert_eq!(reply, "nope\n");
}

#[test]
fn sessions_are_independent() {
    let temp = TempDir::new().unwrap();
    let port = free_port();
    let address = format!("127.0.0.1:{port}");
    let _server = spawn(&temp, &["reply", "--address", &address]);

    let a = connect(port);
    let b = connect(port);
    (&b).write_all(b"{\"FirstUrl\":\"b\",\"Text\":\"2\"}\n").unwrap();
    (&a).write_all(b"{\"FirstUrl\":\"a\",\"Text\":\"1\"}\n").unwrap();

    let mut reply_a = String::new();
    BufReader::new(&a).read_line(&mut reply_a).unwrap();
    let mut reply_b = String::new();
    BufReader::new(&b).read_line(&mut reply_b).unwrap();

    assert_eq!(reply_a, "Bookmark[url: a, text: 1]\n");
    assert_eq!(reply_b, "Bookmark[url: b, text: 2]\n");
}

#[test]
fn sink_prints_only_decoded_bookmarks() {
    let temp = TempDir::new().unwrap();
    let port = free_port();
    let address = format!("127.0.0.1:{port}");
    let mut child = command(&temp, &["sink", "--bookmarks", "--address", &address])
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn actorflow");
    let stdout = child.stdout.take().expect("piped stdout");
    let _server = Running(child);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if line.starts_with("Bookmark[") && tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stream = connect(port);
    stream
        .write_all(b"not json\n{\"FirstUrl\":\"http://x\"}\n{\"FirstUrl\":\"http://x\",\"Text\":\"y\"}\n")
        .unwrap();

    let printed = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("bookmark printed");
    assert_eq!(printed, "Bookmark[url: http://x, text: y]");
}
