//! Kifu: Go game records and engine play.
//!
//! ## Usage
//!
//! - `kifu` - Show a demo
//! - `kifu gtp` - Start a GTP server that plays random legal moves
//! - `kifu convert game.sgf game.lrf` - Convert between SGF and LRF
//! - `kifu show game.sgf` - Print a game's final position
//! - `kifu autoplay --engine pachi.toml` - Let an engine play itself

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kifu::board::Color;
use kifu::config::EngineConfig;
use kifu::constants::DEFAULT_KOMI;
use kifu::engine::{EngineBridge, EngineWorker};
use kifu::game::GameTree;
use kifu::gtp::{GtpServer, ServerOptions, format_vertex};
use kifu::lrf;
use kifu::sgf::{self, ParseOptions, WriteStyle};
use kifu::tree::Move;

/// Kifu: Go game records and engine play
#[derive(Parser)]
#[command(name = "kifu")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the GTP (Go Text Protocol) server for use with GUI applications
    Gtp {
        /// Seed of the random move generator
        #[arg(long)]
        seed: Option<u64>,
        /// Append every received command to this file
        #[arg(long, hide = true)]
        transcript: Option<PathBuf>,
        /// Stop without answering when this file exists
        #[arg(long, hide = true)]
        crash_file: Option<PathBuf>,
    },
    /// Run a simple demo of the library
    Demo,
    /// Convert a game between SGF (.sgf) and LRF (.lrf)
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Write SGF without line breaks and header
        #[arg(long)]
        compact: bool,
    },
    /// Print the final position of a game's main line
    Show {
        file: PathBuf,
        /// Read every root variation as a separate problem
        #[arg(long)]
        problems: bool,
    },
    /// Let an engine play both colors
    Autoplay {
        /// Engine configuration (TOML); the built-in random player if omitted
        #[arg(long)]
        engine: Option<PathBuf>,
        #[arg(long, default_value_t = 9)]
        size: usize,
        #[arg(long, default_value_t = DEFAULT_KOMI)]
        komi: f64,
        #[arg(long, default_value_t = 0)]
        handicap: usize,
        /// Stop after this many moves
        #[arg(long, default_value_t = 200)]
        moves: usize,
        /// Save the game as SGF
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Gtp {
            seed,
            transcript,
            crash_file,
        }) => {
            let mut server = GtpServer::with_options(ServerOptions {
                seed,
                transcript,
                crash_file,
            });
            server
                .run(io::stdin().lock(), io::stdout().lock())
                .context("GTP server failed")?;
        }
        Some(Commands::Convert {
            input,
            output,
            compact,
        }) => convert(&input, &output, compact)?,
        Some(Commands::Show { file, problems }) => show(&file, problems)?,
        Some(Commands::Autoplay {
            engine,
            size,
            komi,
            handicap,
            moves,
            output,
        }) => autoplay(engine.as_deref(), size, komi, handicap, moves, output.as_deref())?,
        Some(Commands::Demo) | None => run_demo()?,
    }
    Ok(())
}

fn is_lrf(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("lrf"))
}

fn load_games(path: &Path, options: &ParseOptions) -> Result<Vec<GameTree>> {
    if is_lrf(path) {
        let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let game = lrf::decode(&bytes).with_context(|| format!("invalid LRF file {}", path.display()))?;
        return Ok(vec![game]);
    }
    let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    sgf::parse_with(&text, options).with_context(|| format!("invalid SGF file {}", path.display()))
}

fn convert(input: &Path, output: &Path, compact: bool) -> Result<()> {
    let games = load_games(input, &ParseOptions::default())?;
    let Some(game) = games.first() else {
        bail!("{} contains no game", input.display());
    };
    if games.len() > 1 {
        warn!(input = %input.display(), games = games.len(), "several games in the input, converting the first");
    }

    if is_lrf(output) {
        let bytes = lrf::encode(game).context("game cannot be stored as LRF")?;
        fs::write(output, bytes).with_context(|| format!("cannot write {}", output.display()))?;
    } else {
        let style = if compact { WriteStyle::Compact } else { WriteStyle::Pretty };
        fs::write(output, sgf::to_string(game, style))
            .with_context(|| format!("cannot write {}", output.display()))?;
    }
    Ok(())
}

fn show(file: &Path, problems: bool) -> Result<()> {
    let options = if problems {
        ParseOptions::problems()
    } else {
        ParseOptions::default()
    };
    for (i, mut game) in load_games(file, &options)?.into_iter().enumerate() {
        game.goto_first_move();
        if let Some(&last) = game.tree().main_line().last() {
            game.goto_node(last);
        }
        let info = &game.info;
        println!("=== Game {} ===", i + 1);
        println!("Size: {}  Komi: {}  Handicap: {}", info.board_size, info.komi, info.handicap);
        if let (Some(black), Some(white)) = (&info.black_name, &info.white_name) {
            println!("Black: {black}  White: {white}");
        }
        if let Some(result) = &info.result {
            println!("Result: {result}");
        }
        println!("Moves: {}  Nodes: {}", game.move_number(), game.tree().len());
        println!(
            "Prisoners: black {}  white {}",
            game.black_prisoners(),
            game.white_prisoners()
        );
        println!("{}", game.board());
    }
    Ok(())
}

fn autoplay(
    engine: Option<&Path>,
    size: usize,
    komi: f64,
    handicap: usize,
    max_moves: usize,
    output: Option<&Path>,
) -> Result<()> {
    let config = match engine {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let program = std::env::current_exe().context("cannot locate the kifu executable")?;
            EngineConfig::external(program, vec!["gtp".to_string()])
        }
    };

    let mut bridge = EngineBridge::with_launcher(config.launcher());
    bridge
        .new_game(size, Color::White, komi, handicap)
        .context("cannot start the game")?;
    if !bridge.is_bot_turn() {
        bridge.switch_colors();
    }
    let worker = EngineWorker::start(bridge).context("cannot start the engine worker")?;

    let mut passes = 0;
    for _ in 0..max_moves {
        let mv = worker.gen_move().wait()?;
        println!("{}", format_vertex(mv, size));
        passes = if mv == Move::Pass { passes + 1 } else { 0 };
        if mv == Move::Resign || passes == 2 {
            break;
        }
        worker.switch_colors().wait()?;
    }
    let score = worker.final_score().wait();

    let Some(bridge) = worker.shutdown() else {
        bail!("engine worker panicked");
    };
    let game = bridge.into_game();
    match score {
        Ok(result) => println!("Result: {result}"),
        Err(e) => warn!(error = %e, "engine gave no score"),
    }
    println!("{}", game.board());

    if let Some(path) = output {
        fs::write(path, sgf::to_string(&game, WriteStyle::Pretty))
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(())
}

fn run_demo() -> Result<()> {
    println!("Kifu: Go game records and engine play\n");

    println!("=== Capture Demo ===");
    let mut game = GameTree::new(9, DEFAULT_KOMI, 0, "Japanese");
    for (x, y) in [(4, 3), (4, 4), (3, 4), (6, 6), (5, 4), (6, 2), (4, 5)] {
        game.play(x, y);
    }
    println!("Black prisoners: {}", game.black_prisoners());
    println!("{}", game.board());

    println!("=== Variations ===");
    game.undo(false);
    game.play(2, 6);
    game.goto_previous_variation();
    println!("Main line restored, prisoners: {}", game.black_prisoners());

    println!("\n=== SGF ===");
    println!("{}", sgf::to_string(&game, WriteStyle::Compact));

    println!("\n=== LRF ===");
    let bytes = lrf::encode(&game).context("demo game cannot be stored as LRF")?;
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    println!("{} bytes: {}", bytes.len(), hex.join(" "));
    let decoded = lrf::decode(&bytes).context("demo game did not decode")?;
    println!("Decoded nodes: {}", decoded.tree().len());

    println!("\n=== Score ===");
    let score = game.compute_territory();
    println!(
        "Black {} + {}, White {} + {} + komi {}",
        score.black_territory, score.black_prisoners, score.white_territory, score.white_prisoners, score.komi
    );
    println!("Result: {}", score.result());
    Ok(())
}
