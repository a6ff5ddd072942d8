//! `ember-cli`: an interactive REPL client for Ember, speaking the same
//! wire protocol as `ember-server`.

mod client;

use clap::Parser;
use colored::Colorize;
use comfy_table::Table;
use ember_core::Frame;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use client::Client;

/// Connects to an Ember server and drops into an interactive prompt.
#[derive(Parser, Debug)]
#[command(name = "ember-cli", version, about)]
struct Args {
    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to connect to.
    #[arg(long, default_value_t = 6379)]
    port: u16,
}

fn render(frame: &Frame) -> String {
    match frame {
        Frame::Simple(s) => s.green().to_string(),
        Frame::Error(e) => e.red().to_string(),
        Frame::Integer(n) => n.to_string().cyan().to_string(),
        Frame::Null => "(nil)".dimmed().to_string(),
        Frame::Bulk(b) => String::from_utf8_lossy(b).to_string(),
        Frame::Array(items) => {
            if items.is_empty() {
                return "(empty array)".dimmed().to_string();
            }
            let mut table = Table::new();
            table.set_header(vec!["#", "value"]);
            for (i, item) in items.iter().enumerate() {
                table.add_row(vec![(i + 1).to_string(), render(item)]);
            }
            table.to_string()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut client = Client::connect(&args.host, args.port)?;
    println!("Connected to {}:{}", args.host, args.port);

    let mut editor = DefaultEditor::new()?;
    loop {
        let prompt = format!("{}:{}> ", args.host, args.port);
        match editor.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);
                if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
                    let _ = client.send_line(trimmed);
                    break;
                }
                match client.send_line(trimmed) {
                    Ok(reply) => println!("{}", render(&reply)),
                    Err(e) => eprintln!("{}", format!("error: {e}").red()),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}", format!("readline error: {e}").red());
                break;
            }
        }
    }

    Ok(())
}
