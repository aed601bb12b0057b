//! lanchat - Terminal chat client
//!
//! Connects to a lanchat server, sends every line typed on stdin and prints
//! the broadcast stream, polling for new events every 500 ms. With
//! `--serve` it first starts a server in the same process, so one machine
//! can host the room and chat in it.
//!
//! # Usage
//!
//! ```text
//! lanchat --host 192.168.1.20 --username alice
//! lanchat --serve --port 9000 --username host
//! LANCHAT_HOST=chat.lan LANCHAT_USERNAME=bob lanchat
//! ```
//!
//! Lines starting with `/` are commands: `/who` lists the clients of the
//! local server, `/quit` leaves.

use anyhow::{bail, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lanchat_control::{ChatControl, EventView, POLL_INTERVAL};
use lanchat_client::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USERNAME};
use lanchat_core::EventKind;

// ============================================================================
// CLI Arguments
// ============================================================================

/// lanchat - chat with everyone on the local network
#[derive(Parser, Debug)]
#[command(name = "lanchat", version, about)]
struct Args {
    /// Server host to connect to
    #[arg(long, env = "LANCHAT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, env = "LANCHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name shown next to your messages
    #[arg(short, long, env = "LANCHAT_USERNAME", default_value = DEFAULT_USERNAME)]
    username: String,

    /// Start a server on --port before connecting
    #[arg(long)]
    serve: bool,

    /// Print events as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

/// What the user typed.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Message(&'a str),
    Who,
    Quit,
    Unknown(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.trim() {
        "" => Input::Empty,
        "/quit" | "/exit" => Input::Quit,
        "/who" => Input::Who,
        command if command.starts_with('/') => Input::Unknown(command),
        _ => Input::Message(line),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_chat(args)
}

#[tokio::main]
async fn run_chat(args: Args) -> Result<()> {
    // stdout carries the chat; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lanchat=warn".parse()?)
                .add_directive("lanchat_control=warn".parse()?)
                .add_directive("lanchat_client=warn".parse()?)
                .add_directive("lanchatd=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let control = ChatControl::new();

    if args.serve {
        let reply = control.start_server(args.port).await;
        if !reply.ok {
            bail!(reply.message);
        }
        println!("* {}", reply.message);
    }

    let reply = control
        .connect_client(&args.host, args.port, &args.username)
        .await;
    if !reply.ok {
        control.shutdown().await;
        bail!(reply.message);
    }
    println!("* {} as {}", reply.message, args.username);
    info!(host = %args.host, port = args.port, "Chat session started");

    let result = chat_loop(&control, args.json).await;
    control.shutdown().await;
    result
}

/// Reads stdin and polls for events until the user quits or the
/// connection ends.
async fn chat_loop(control: &ChatControl, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cursor = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let drain = control.drain_messages(cursor).await;
                cursor = drain.cursor;
                for event in &drain.events {
                    print_event(event, json)?;
                }
                if drain.events.iter().any(|e| e.kind == EventKind::Error)
                    && !control.is_client_connected().await
                {
                    debug!("Connection lost, leaving chat loop");
                    return Ok(());
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    return Ok(());
                };

                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => return Ok(()),
                    Input::Who => {
                        let reply = control.list_clients().await;
                        if !reply.ok {
                            println!("* no local server (start with --serve)");
                        }
                        for client in reply.clients {
                            let name = client.username.as_deref().unwrap_or("-");
                            println!("* {} {} since {}", client.addr, name, client.connected_at);
                        }
                    }
                    Input::Unknown(command) => println!("* unknown command: {command}"),
                    Input::Message(text) => {
                        let reply = control.send_message(text).await;
                        if !reply.ok {
                            println!("* {}", reply.message);
                        }
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                return Ok(());
            }
        }
    }
}

fn print_event(event: &EventView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event.kind {
        EventKind::Message => println!("{}", event.content),
        EventKind::System => println!("* {}", event.content),
        EventKind::Error => println!("! {}", event.content),
    }
    Ok(())
}
