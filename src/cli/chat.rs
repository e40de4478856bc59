use std::io::{self, Write};

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::{ChatSession, DisplaySink, MessageSink, SqliteSink, StreamEvent, TurnOutcome};
use crate::core::db::async_db;
use crate::core::{AppConfig, SinkKind};
use crate::openai::OpenAiProvider;

const HELP: &str = "Share an idea. Type /save to save the conversation or /quit to exit.";

pub async fn run(config: AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let provider = OpenAiProvider::new(
        &config.openai_api_hostname,
        &config.openai_api_key,
        config.completion_timeout(),
    );
    let sink: Box<dyn MessageSink> = match config.sink {
        SinkKind::Display => Box::new(DisplaySink::stdout()),
        SinkKind::Sqlite => Box::new(SqliteSink::new(async_db(&config.db_path).await?)),
    };
    let mut session = ChatSession::new(&Uuid::new_v4().to_string(), &config.session_settings());
    let mut save_hint_shown = false;

    println!("{}", HELP);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => match line.trim() {
                "/quit" => break,
                "/save" => match session.save(sink.as_ref()).await {
                    Ok(Some(receipt)) => println!(
                        "Saved {} messages as {}",
                        receipt.messages.len(),
                        receipt.id
                    ),
                    Ok(None) => println!("Nothing to save yet, keep going!"),
                    Err(e) => eprintln!("Saving failed: {}", e),
                },
                _ => {
                    rl.add_history_entry(line.as_str())?;
                    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

                    // Print only the newly received part of the reply
                    let printer = tokio::spawn(async move {
                        let mut printed = 0;
                        while let Some(event) = rx.recv().await {
                            if let StreamEvent::Partial { content } = event {
                                print!("{}", &content[printed..]);
                                let _ = io::stdout().flush();
                                printed = content.len();
                            }
                        }
                    });

                    let outcome = session
                        .interact(
                            Some(line.as_str()),
                            &provider,
                            &config.openai_model,
                            Some(&tx),
                            config.completion_timeout(),
                        )
                        .await;
                    drop(tx);
                    printer.await?;

                    match outcome {
                        TurnOutcome::Replied(_) => println!(),
                        TurnOutcome::NoInput => {}
                        TurnOutcome::Failed { reason, .. } => {
                            eprintln!("\nSomething went wrong: {}. Please try again.", reason)
                        }
                    }

                    if session.save_available() && !save_hint_shown {
                        println!("\n--- Type /save when you're happy with your idea ---");
                        save_hint_shown = true;
                    }
                }
            },
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
