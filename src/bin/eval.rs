//! Batch evaluation over a script file.
//!
//! Reads utterances one record per line, generates a reply for each, and
//! writes the replies to a timestamped output file. With `--multi-turn` a
//! record holds a whole dialogue delimited by `</s>` and the history resets
//! after every record; otherwise replies accumulate into the rolling window
//! like an ongoing conversation.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

use dialogen::decoder::{DecodeParams, Decoder};
use dialogen::history::{cut_to_eos, History};
use dialogen::model::{ModelArgs, Transformer};
use dialogen::tokenizer::{Tokenizer, WordTokenizer, PAD_ID};

/// Separator between turns of a multi-turn record.
const TURN_SEPARATOR: &str = "</s>";

#[derive(Parser)]
#[command(name = "eval", about = "Generate replies for a file of utterances")]
struct Args {
    /// Input file, one record per line.
    #[arg(long)]
    input: PathBuf,
    /// Directory the reply file is written into.
    #[arg(long)]
    output: PathBuf,
    /// Treat each record as a full dialogue split on `</s>` and reset
    /// history between records.
    #[arg(long)]
    multi_turn: bool,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 20)]
    generation_length: usize,
    #[arg(long, default_value_t = 3)]
    max_history: usize,
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,
    #[arg(long, default_value_t = 0)]
    top_k: usize,
    #[arg(long, default_value_t = 0.9)]
    top_p: f32,
}

fn generate_reply(
    model: &Transformer,
    tokenizer: &WordTokenizer,
    decoder: &mut Decoder<rand::rngs::StdRng>,
    history: &History,
    params: &DecodeParams,
) -> dialogen::Result<String> {
    let mut context_tokens = history.context_tokens(tokenizer);
    // Leave room for the reply inside the model's sequence budget.
    let budget = model.args.max_seq_len.saturating_sub(params.length);
    if context_tokens.len() > budget {
        context_tokens.drain(..context_tokens.len() - budget);
    }
    let positions: Vec<usize> = (0..context_tokens.len()).collect();

    let out = decoder.generate(model, &context_tokens, Some(&positions), None, params)?;

    let reply_tokens = cut_to_eos(&out, tokenizer.eos_id(), &[PAD_ID]);
    Ok(tokenizer
        .decode(&reply_tokens)
        .chars()
        .filter(char::is_ascii)
        .collect())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let tokenizer = WordTokenizer::new();
    let model = Transformer::new(ModelArgs {
        vocab_size: tokenizer.vocab_size(),
        ..ModelArgs::default()
    });
    let mut decoder = match args.seed {
        Some(seed) => Decoder::from_seed(seed),
        None => Decoder::from_entropy(),
    };
    let params = DecodeParams {
        length: args.generation_length,
        temperature: args.temperature,
        top_k: args.top_k,
        top_p: args.top_p,
    };

    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "eval".to_string());
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let out_path = args.output.join(format!("{stem}_dialogen_{timestamp}.txt"));

    let reader = BufReader::new(File::open(&args.input)?);
    let mut writer = BufWriter::new(File::create(&out_path)?);

    let mut history = History::new(args.max_history);
    let mut records = 0_usize;

    for line in reader.lines() {
        let line = line?;
        let record = line.replace('\\', "/");
        let record = record.trim();
        if record.is_empty() {
            continue;
        }

        if args.multi_turn {
            for utterance in record.split(TURN_SEPARATOR) {
                let utterance = utterance.trim();
                if !utterance.is_empty() {
                    history.push(utterance);
                }
            }
        } else {
            history.push(record);
        }
        if history.is_empty() {
            continue;
        }

        let reply = generate_reply(&model, &tokenizer, &mut decoder, &history, &params)?;
        writeln!(writer, "[ground]\t{reply}")?;
        writeln!(writer)?;
        records += 1;

        if args.multi_turn {
            history.clear();
        } else {
            history.push(reply);
            history.truncate();
        }
    }

    writer.flush()?;
    tracing::info!(records, output = %out_path.display(), "evaluation complete");
    Ok(())
}
