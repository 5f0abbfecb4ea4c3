mod render;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::util::SubscriberInitExt;

use pvm_core::cartridges::{self, LoadedCart};
use pvm_core::ram::{self, Ram};
use pvm_core::synth::SFX_COUNT;
use pvm_core::Fix32;

/// Scripts larger than this are rejected when extracting.
const SCRIPT_CAPACITY: usize = 256 * 1024;

#[derive(Parser)]
#[command(name = "p8cart")]
#[command(version, about = "picovm cart inspection tool", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print what the loader finds in a cart
    Info {
        cart: PathBuf,
    },

    /// Write the decompressed script
    Script {
        cart: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render the sprite sheet to a PNG
    Sheet {
        cart: PathBuf,

        #[arg(short, long, default_value = "sheet.png")]
        output: PathBuf,

        /// Integer upscale factor
        #[arg(short, long, default_value_t = 1)]
        scale: u32,
    },

    /// Render the whole tile map to a PNG
    Map {
        cart: PathBuf,

        #[arg(short, long, default_value = "map.png")]
        output: PathBuf,

        /// Only draw sprites sharing at least one flag bit with this mask (0 draws all)
        #[arg(short, long, default_value_t = 0)]
        layer: u8,
    },

    /// Render one sound effect as raw signed 16-bit little-endian mono PCM
    Sfx {
        cart: PathBuf,

        /// Sound effect number (0-63)
        index: u8,

        #[arg(short, long, default_value = "sfx.raw")]
        output: PathBuf,

        /// Stop looping effects after this many seconds
        #[arg(long, default_value_t = 4.0)]
        seconds: f32,
    },

    /// Print the persistent slots stored in a cart's save file
    Save {
        cart: PathBuf,
    },
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .init();
}

fn load(path: &Path) -> Result<(Ram, LoadedCart)> {
    let mut ram = Ram::default();
    let cart = cartridges::load_path(path, &mut ram, SCRIPT_CAPACITY)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!("loaded {}", path.display());
    Ok((ram, cart))
}

fn print_info(path: &Path) -> Result<()> {
    let (ram, cart) = load(path)?;
    let info = &cart.info;
    println!("file:        {}", path.display());
    println!("format:      {:?}", info.format.context("loader returned no format")?);
    if let Some(code) = info.code_format {
        println!("code:        {:?}, {} bytes", code, info.script_len);
    }
    if info.version != 0 {
        println!("version:     {}", info.version);
    }
    println!("title:       {}", info.title.as_deref().unwrap_or("-"));
    println!("author:      {}", info.author.as_deref().unwrap_or("-"));

    let used_sfx = (0..SFX_COUNT)
        .filter(|&n| {
            let at = n * pvm_core::synth::SFX_SIZE;
            ram.sfx_table()[at..at + 64].iter().any(|&b| b != 0)
        })
        .count();
    let used_patterns = (0..64).filter_map(|n| ram.song(n)).filter(|s| (0..4).any(|c| s.sfx(c) < 64)).count();
    let used_tiles = ram.region(ram::MAP, ram::MAP_SIZE).iter().filter(|&&t| t != 0).count();
    println!("sfx:         {} of {}", used_sfx, SFX_COUNT);
    println!("patterns:    {}", used_patterns);
    println!("map tiles:   {}", used_tiles);
    println!("save file:   {}", if cartridges::save_path(path).exists() { "yes" } else { "no" });
    Ok(())
}

fn write_script(path: &Path, output: Option<&Path>) -> Result<()> {
    let (_, cart) = load(path)?;
    match output {
        Some(out) => fs::write(out, &cart.script).with_context(|| format!("writing {}", out.display()))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&cart.script)?;
        }
    }
    Ok(())
}

fn print_save(path: &Path) -> Result<()> {
    let sav = cartridges::save_path(path);
    let data = fs::read(&sav).with_context(|| format!("no save data at {}", sav.display()))?;
    if data.len() < ram::PERSIST_SIZE {
        bail!("{} is {} bytes, expected {}", sav.display(), data.len(), ram::PERSIST_SIZE);
    }

    for (i, slot) in data[..ram::PERSIST_SIZE].chunks_exact(4).enumerate() {
        let bits = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
        if bits != 0 {
            println!("dget({:2}) = {}", i, Fix32::from_bits(bits));
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Info { cart } => print_info(&cart),
        Commands::Script { cart, output } => write_script(&cart, output.as_deref()),
        Commands::Sheet { cart, output, scale } => {
            let (mut ram, _) = load(&cart)?;
            render::sprite_sheet(&mut ram, scale)?
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}", output.display());
            Ok(())
        }
        Commands::Map { cart, output, layer } => {
            let (mut ram, _) = load(&cart)?;
            render::tile_map(&mut ram, layer)?
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("wrote {}", output.display());
            Ok(())
        }
        Commands::Sfx { cart, index, output, seconds } => {
            let (ram, _) = load(&cart)?;
            let pcm = render::sfx_pcm(&ram, index, seconds)?;
            fs::write(&output, bytemuck::cast_slice::<i16, u8>(&pcm))
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "wrote {} samples ({:.2}s at {} Hz) to {}",
                pcm.len(),
                pcm.len() as f32 / pvm_core::synth::SAMPLE_RATE as f32,
                pvm_core::synth::SAMPLE_RATE,
                output.display()
            );
            Ok(())
        }
        Commands::Save { cart } => print_save(&cart),
    }
}
