//! Command-line chat against a running relay
//!
//! Usage: chatrelay-chat <tenant_id> <user_id> <conversation_id|new> [prompt]
//!
//! The prompt is read from stdin when omitted. Tokens are printed as they
//! arrive; status updates go to stderr. `CHATRELAY_WIRE_FORMAT=sse` requests
//! SSE framing instead of NDJSON.

use std::env;
use std::io::{self, Read, Write};

use anyhow::{bail, Context};
use chatrelay_client::{ChatClient, ChatSession, StreamSink};
use chatrelay_shared::{Source, WireFormat};
use tracing_subscriber::EnvFilter;

struct Terminal;

impl StreamSink for Terminal {
    fn on_status_update(&mut self, status: &str) {
        eprintln!("[{}]", status);
    }

    fn on_token(&mut self, token: &str) {
        print!("{}", token);
        let _ = io::stdout().flush();
    }

    fn on_documents(&mut self, sources: &[Source]) {
        eprintln!("[{} source(s) attached]", sources.len());
    }

    fn on_error_frame(&mut self, message: &str) {
        eprintln!("[{}]", message);
    }
}

fn read_prompt(arg: Option<String>) -> anyhow::Result<String> {
    if let Some(prompt) = arg {
        return Ok(prompt);
    }
    let mut prompt = String::new();
    io::stdin()
        .read_to_string(&mut prompt)
        .context("Failed to read prompt from stdin")?;
    Ok(prompt)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(tenant_id), Some(user_id), Some(conversation)) = (args.next(), args.next(), args.next())
    else {
        eprintln!("Usage: chatrelay-chat <tenant_id> <user_id> <conversation_id|new> [prompt]");
        std::process::exit(1);
    };
    let prompt = read_prompt(args.next())?;
    if prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }

    let format: WireFormat = match env::var("CHATRELAY_WIRE_FORMAT") {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("CHATRELAY_WIRE_FORMAT must be ndjson or sse"))?,
        Err(_) => WireFormat::Ndjson,
    };
    let client = ChatClient::from_env(&tenant_id, &user_id)
        .context("Failed to build HTTP client")?
        .with_format(format);
    let mut session = ChatSession::new(client);

    let conversation_id = if conversation == "new" {
        let created = session.new_conversation(None).await?;
        eprintln!("[conversation {}]", created.id);
        created.id
    } else {
        session
            .open(&conversation)
            .await
            .with_context(|| format!("Failed to load conversation {}", conversation))?;
        conversation
    };

    let message = session
        .send(&conversation_id, &prompt, true, &mut Terminal)
        .await
        .context("Chat failed")?;
    println!();

    if let Some(sources) = &message.sources {
        for source in sources {
            eprintln!("  - {} ({})", source.name, source.id);
        }
    }
    Ok(())
}
