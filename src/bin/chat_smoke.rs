//! Manual smoke test against the configured Azure OpenAI deployment.
//!
//! Runs a single-turn completion, a two-turn conversation, and a streaming
//! completion, printing what comes back.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use futures::StreamExt;

use inkr_func_api::config::{UpstreamArgs, UpstreamConfig};
use inkr_func_api::upstream::{AzureOpenAiClient, ChatMessage, ChatParams, Completion};

#[derive(Parser, Debug)]
#[command(name = "chat-smoke", about = "Exercise the Azure OpenAI deployment directly")]
struct Cli {
    /// Enable debug logging from the client.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    upstream: UpstreamArgs,
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const OPENER: &str = "I am going to Paris, what should I see?";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("inkr_func_api=debug")
            .init();
    }

    let config = match cli.upstream.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}. Please set AZURE_OPENAI_API_KEY in your environment.");
            return ExitCode::FAILURE;
        }
    };

    println!("=== Azure OpenAI Test Suite ===\n");

    match run(config).await {
        Ok(()) => {
            println!("All tests completed successfully!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!(
                "Make sure AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT and \
                 AZURE_OPENAI_DEPLOYMENT point at a valid deployment."
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(config: UpstreamConfig) -> anyhow::Result<()> {
    let client = AzureOpenAiClient::new(config)?;

    basic_completion(&client).await?;
    multi_turn_conversation(&client).await?;
    streaming(&client).await?;

    Ok(())
}

fn first_content(completion: &Completion) -> &str {
    completion
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .unwrap_or_default()
}

async fn basic_completion(client: &AzureOpenAiClient) -> anyhow::Result<()> {
    println!("Testing basic chat completion...");

    let params = ChatParams::new(
        client.deployment(),
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(OPENER)],
    );
    let completion = client.complete(params).await?;

    println!("Response: {}\n", first_content(&completion));
    Ok(())
}

async fn multi_turn_conversation(client: &AzureOpenAiClient) -> anyhow::Result<()> {
    println!("Testing multi-turn conversation...");

    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(OPENER)];

    let first = client
        .complete(ChatParams::new(client.deployment(), messages.clone()).with_max_completion_tokens(400))
        .await?;
    let first_reply = first_content(&first).to_string();

    messages.push(ChatMessage::assistant(first_reply.clone()));
    messages.push(ChatMessage::user("What is so great about #1?"));

    let second = client
        .complete(ChatParams::new(client.deployment(), messages).with_max_completion_tokens(400))
        .await?;

    println!("First response: {first_reply}");
    println!("Follow-up response: {}\n", first_content(&second));
    Ok(())
}

async fn streaming(client: &AzureOpenAiClient) -> anyhow::Result<()> {
    println!("Testing streaming response...");

    let params = ChatParams::new(
        client.deployment(),
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user("Tell me a short story about AI."),
        ],
    )
    .with_max_completion_tokens(400);

    let mut chunks = client.stream(params).await?;

    print!("Streaming response: ");
    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if let Some(choice) = chunk.choices.first() {
            print!("{}", choice.delta.content.as_deref().unwrap_or_default());
            stdout.flush()?;
        }
    }

    println!("\n");
    Ok(())
}
