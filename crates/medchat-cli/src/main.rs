//! Terminal client for the MedChat service.
//!
//! Asks one question given on the command line, or reads questions from stdin
//! line by line. Answers stream to stdout; advisories and errors go to stderr.

mod transcript;

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use medchat_client::{
    AbortHandle, AnswerPath, ChatClient, ChatId, ClientConfig, RequestError, StaticToken,
    StreamObserver, StreamRequest,
};
use tokio::io::AsyncBufReadExt as _;
use tracing::debug;

use crate::transcript::{Role, Transcript};

#[derive(Parser, Debug)]
#[command(name = "medchat", version, about = "Ask the MedChat service health questions")]
struct Cli {
    /// Base URL of the chat service (overrides MEDCHAT_BASE_URL).
    #[arg(long)]
    base_url: Option<String>,
    /// Bearer token for authenticated requests.
    #[arg(long, env = "MEDCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Continue an existing chat.
    #[arg(long)]
    chat_id: Option<String>,
    /// Use the single-shot endpoint instead of streaming.
    #[arg(long)]
    no_stream: bool,
    /// Question to ask; omit to read questions from stdin.
    #[arg(trailing_var_arg = true)]
    question: Vec<String>,
}

/// Prints tokens as they arrive.
///
/// A fallback answer arrives whole through `on_done`; if it differs from what
/// was already printed, it is printed again in full.
#[derive(Default)]
struct TerminalPrinter {
    printed: String,
}

impl StreamObserver for TerminalPrinter {
    fn on_token(&mut self, delta: &str, _accumulated: &str) {
        self.printed.push_str(delta);
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(delta.as_bytes());
        let _ = out.flush();
    }

    fn on_done(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        if self.printed != text {
            if !self.printed.is_empty() {
                let _ = writeln!(out);
                eprintln!("(stream interrupted; full answer follows)");
            }
            let _ = out.write_all(text.as_bytes());
        }
        let _ = writeln!(out);
        let _ = out.flush();
    }

    fn on_error(&mut self, _error: &RequestError) {
        if !self.printed.is_empty() {
            println!();
        }
    }
}

struct Session {
    client: ChatClient,
    chat_id: Option<ChatId>,
    no_stream: bool,
    transcript: Transcript,
}

impl Session {
    /// Runs one question to completion, updating the transcript.
    async fn ask(&mut self, question: &str) -> Result<(), RequestError> {
        let request = match StreamRequest::new(question, self.chat_id.clone()) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "skipping invalid question");
                return Ok(());
            }
        };
        self.transcript.begin(request.question());

        let handle = AbortHandle::new();
        let interrupt = {
            let handle = handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.abort();
                }
            })
        };
        let result = if self.no_stream {
            let mut signal = handle.signal();
            tokio::select! {
                _ = signal.aborted() => Err(RequestError::Cancelled),
                result = self.client.ask(&request) => result.inspect(|answer| println!("{}", answer.text)),
            }
        } else {
            let mut printer = TerminalPrinter::default();
            self.client
                .ask_with_fallback(&request, &mut printer, handle.signal())
                .await
                .map(|outcome| {
                    if let AnswerPath::Fallback { stream_error } = &outcome.path {
                        debug!(error = %stream_error, "answer delivered by fallback");
                    }
                    outcome.answer
                })
        };
        interrupt.abort();

        match result {
            Ok(answer) => {
                self.transcript.commit(&answer.text);
                if let Some(chat_id) = answer.chat_id.clone() {
                    self.chat_id = Some(chat_id);
                }
                if let Some(advisory) = answer.advisory() {
                    eprintln!("note: {advisory}");
                }
                Ok(())
            }
            Err(error) => {
                self.transcript.rollback();
                if error == RequestError::Cancelled {
                    eprintln!("(cancelled)");
                } else {
                    eprintln!("error: {}", error.user_message());
                }
                Err(error)
            }
        }
    }

    fn print_history(&self) {
        for turn in self.transcript.turns() {
            let who = match turn.role {
                Role::User => "you",
                Role::Assistant => "medchat",
            };
            println!("{who}: {}", turn.text);
        }
        eprintln!("({} answered)", self.transcript.exchanges());
    }
}

async fn repl(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => session.print_history(),
            question => {
                let _ = session.ask(question).await;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    medchat_client::init_observability("warn");

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config = config.base_url(base_url);
    }
    let mut builder = ChatClient::builder().config(config);
    if let Some(token) = cli.token {
        builder = builder.credentials(Arc::new(StaticToken::new(token)));
    }
    let mut session = Session {
        client: builder.build()?,
        chat_id: cli.chat_id.map(ChatId::new),
        no_stream: cli.no_stream,
        transcript: Transcript::default(),
    };

    let question = cli.question.join(" ");
    if question.trim().is_empty() {
        return repl(&mut session).await;
    }
    session
        .ask(&question)
        .await
        .context("question was not answered")
}
