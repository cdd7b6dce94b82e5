//! Interactive conversation CLI.
//!
//! Reads one user utterance at a time, generates a reply through the
//! incremental decoder, and maintains a rolling window of the most recent
//! turns as generation context. Finished exchanges are also appended to a
//! SQLite transcript for the `!stats` command.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use dialogen::context::TranscriptStore;
use dialogen::decoder::{DecodeParams, Decoder};
use dialogen::history::{cut_to_eos, History};
use dialogen::model::{ModelArgs, Transformer};
use dialogen::tokenizer::{Tokenizer, WordTokenizer, PAD_ID};

#[derive(Parser)]
#[command(name = "chat", about = "Interactive dialogue with the demo model")]
struct Args {
    /// Seed for the sampler; omit for entropy seeding.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of tokens to generate per reply.
    #[arg(long, default_value_t = 20)]
    generation_length: usize,
    /// Number of past exchanges kept as context (window = 2 * n + 1 turns).
    #[arg(long, default_value_t = 3)]
    max_history: usize,
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,
    #[arg(long, default_value_t = 0)]
    top_k: usize,
    #[arg(long, default_value_t = 0.9)]
    top_p: f32,
    /// Transcript database path.
    #[arg(long, default_value = "conversation_history.db")]
    db: PathBuf,
}

struct ChatApp {
    model: Transformer,
    tokenizer: WordTokenizer,
    decoder: Decoder<rand::rngs::StdRng>,
    history: History,
    transcript: TranscriptStore,
    params: DecodeParams,
}

impl ChatApp {
    fn new(args: &Args) -> anyhow::Result<Self> {
        let tokenizer = WordTokenizer::new();
        let model_args = ModelArgs {
            vocab_size: tokenizer.vocab_size(),
            ..ModelArgs::default()
        };
        tracing::info!(
            vocab = model_args.vocab_size,
            layers = model_args.n_layers,
            dim = model_args.dim,
            "initializing model"
        );
        let model = Transformer::new(model_args);

        let decoder = match args.seed {
            Some(seed) => Decoder::from_seed(seed),
            None => Decoder::from_entropy(),
        };

        let transcript = TranscriptStore::open(&args.db)?;

        Ok(Self {
            model,
            tokenizer,
            decoder,
            history: History::new(args.max_history),
            transcript,
            params: DecodeParams {
                length: args.generation_length,
                temperature: args.temperature,
                top_k: args.top_k,
                top_p: args.top_p,
            },
        })
    }

    /// Run one exchange: encode the window, decode a reply, truncate at the
    /// end-of-turn sentinel, and fold the reply back into the window.
    fn respond(&mut self, user_input: &str) -> anyhow::Result<String> {
        self.history.push(user_input);

        let mut context_tokens = self.history.context_tokens(&self.tokenizer);
        // Leave room for the reply inside the model's sequence budget.
        let budget = self.model.args.max_seq_len.saturating_sub(self.params.length);
        if context_tokens.len() > budget {
            context_tokens.drain(..context_tokens.len() - budget);
        }
        let positions: Vec<usize> = (0..context_tokens.len()).collect();

        let out = self.decoder.generate(
            &self.model,
            &context_tokens,
            Some(&positions),
            None,
            &self.params,
        )?;

        let reply_tokens = cut_to_eos(&out, self.tokenizer.eos_id(), &[PAD_ID]);
        let reply: String = self
            .tokenizer
            .decode(&reply_tokens)
            .chars()
            .filter(char::is_ascii)
            .collect();

        self.history.push(reply.clone());
        self.history.truncate();

        let token_count = (context_tokens.len() + out.len()) as i32;
        if let Err(e) = self.transcript.record(user_input, &reply, token_count) {
            tracing::warn!("failed to record exchange: {e}");
        }

        Ok(reply)
    }

    fn show_stats(&self) {
        match self.transcript.stats() {
            Ok(stats) => {
                println!(
                    "{} exchanges recorded, {} tokens processed",
                    stats.total_exchanges, stats.total_tokens
                );
            }
            Err(e) => eprintln!("error reading transcript: {e}"),
        }
    }

    fn run(&mut self) -> anyhow::Result<()> {
        println!("Commands: 'quit' to exit, '!stats' for statistics, '!clear' to reset history");

        let stdin = io::stdin();
        loop {
            print!("USR >>> ");
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let input = line.trim();

            if input.is_empty() {
                println!("Prompt should not be empty!");
                continue;
            }
            match input {
                "quit" => break,
                "!stats" => {
                    self.show_stats();
                    continue;
                }
                "!clear" => {
                    self.history.clear();
                    if let Err(e) = self.transcript.clear() {
                        eprintln!("error clearing transcript: {e}");
                    } else {
                        println!("History cleared.");
                    }
                    continue;
                }
                _ => {}
            }

            let reply = self.respond(input)?;
            println!("SYS >>> {reply}");
        }

        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut app = ChatApp::new(&args)?;
    app.run()
}
