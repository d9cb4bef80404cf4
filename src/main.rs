use clap::{Parser, Subcommand};
use docstream::client::DEFAULT_STREAM_PATH;
use docstream::credentials::{resolve_credentials, store_token};
use docstream::{
    ClientConfig, CredentialPlacement, QueryOutcome, QueryRequest, StreamError, StreamingSession,
};
use std::io::{self, Write};
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "docstream", version, about = "Ask questions against your document spaces")]
struct Cli {
    /// Base URL of the query API
    #[arg(long, env = "DOCSTREAM_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// Bearer token; falls back to the token saved by `docstream login`
    #[arg(long, env = "DOCSTREAM_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, env = "DOCSTREAM_USER_ID")]
    user_id: Option<String>,

    #[arg(long, default_value = DEFAULT_STREAM_PATH)]
    stream_path: String,

    /// Send the token as an Authorization header instead of a URL parameter
    #[arg(long)]
    header_auth: bool,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream an answer to a question
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,

        /// Restrict retrieval to one space
        #[arg(long)]
        space: Option<String>,

        /// Ask the server to keep the exchange in the space's query history
        #[arg(long)]
        save: bool,

        /// Print the final outcome as JSON instead of streaming text
        #[arg(long)]
        json: bool,
    },
    /// Save a bearer token for later queries
    Login { token: String },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    docstream::logging::init(cli.verbose);

    match &cli.command {
        Command::Login { token } => {
            let path = store_token(token)?;
            println!("token saved to {}", path.display());
            Ok(())
        }
        Command::Ask {
            question,
            space,
            save,
            json,
        } => {
            let mut request = QueryRequest::new(question.join(" ")).persisted(*save);
            if let Some(space) = space {
                request = request.in_space(space.clone());
            }
            ask(&cli, request, *json).await
        }
    }
}

async fn ask(cli: &Cli, request: QueryRequest, json: bool) -> CliResult<()> {
    let mut config = ClientConfig::new(&cli.base_url);
    config.stream_path = cli.stream_path.clone();
    if cli.header_auth {
        config.credential_placement = CredentialPlacement::BearerHeader;
    }

    let credentials = resolve_credentials(cli.token.clone(), cli.user_id.clone());
    let session = StreamingSession::http(config, Arc::from(credentials)).with_invalidator(
        Arc::new(|space_id: Option<&str>| {
            tracing::info!(space_id = space_id.unwrap_or("-"), "query saved to history");
        }),
    );

    let mut updates = session.subscribe();
    let mut pending = session.start(request);
    let mut stdout = io::stdout();
    let mut printed = 0usize;

    let result = loop {
        tokio::select! {
            result = &mut pending => break result,
            changed = updates.changed() => {
                if changed.is_ok() && !json {
                    let text = updates.borrow_and_update().text.clone();
                    print_delta(&mut stdout, &text, &mut printed)?;
                }
            }
            _ = tokio::signal::ctrl_c() => session.stop(),
        }
    };

    if !json {
        print_delta(&mut stdout, &session.state().text, &mut printed)?;
        if printed > 0 {
            writeln!(stdout)?;
        }
    }

    match result {
        Ok(outcome) if json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Ok(outcome) => {
            print_sources(&mut stdout, &outcome)?;
            Ok(())
        }
        Err(StreamError::Cancelled) => {
            eprintln!("query cancelled");
            Ok(())
        }
        Err(StreamError::AuthenticationRequired) => Err(
            "No auth token found; pass --token, set DOCSTREAM_TOKEN, or run `docstream login`."
                .into(),
        ),
        Err(err) => Err(err.into()),
    }
}

fn print_delta(out: &mut impl Write, text: &str, printed: &mut usize) -> io::Result<()> {
    if let Some(delta) = text.get(*printed..) {
        if !delta.is_empty() {
            out.write_all(delta.as_bytes())?;
            out.flush()?;
            *printed = text.len();
        }
    }
    Ok(())
}

fn print_sources(out: &mut impl Write, outcome: &QueryOutcome) -> io::Result<()> {
    if !outcome.citations.is_empty() {
        writeln!(out, "\nSources:")?;
        for (position, citation) in outcome.citations.iter().enumerate() {
            let index = citation.index().unwrap_or(position as u64 + 1);
            let title = citation
                .document_title()
                .or_else(|| citation.document_id())
                .unwrap_or("untitled");
            match citation.page_number() {
                Some(page) => writeln!(out, "  [{}] {} (p. {})", index, title, page)?,
                None => writeln!(out, "  [{}] {}", index, title)?,
            }
        }
    }
    if let Some(score) = outcome.confidence_score {
        writeln!(out, "Confidence: {:.0}%", score * 100.0)?;
    }
    if let Some(result_id) = &outcome.result_id {
        writeln!(out, "Saved as {}", result_id)?;
    }
    Ok(())
}
