use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bmpfix::{
    parse, repair, Axis, Confidence, HeaderReport, RepairOptions, RepairedImage,
    DEFAULT_SEARCH_RADIUS, MAX_SEARCH_RADIUS,
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Repair malformed BMP files used in CTF challenges")]
struct Args {
    /// Path to the BMP file
    bmp: PathBuf,

    /// Generate width/height variants next to the repaired file
    #[arg(long)]
    brute: bool,

    /// Print the header only, do not modify
    #[arg(long)]
    info: bool,

    /// How far from the declared width and height `--brute` searches
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_SEARCH_RADIUS,
        value_parser = clap::value_parser!(u32).range(..=MAX_SEARCH_RADIUS as i64),
    )]
    radius: u32,

    /// Bit depth to trust instead of the declared one
    #[arg(long, value_name = "BITS")]
    bpp: Option<u16>,

    /// Directory the repaired files are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Save any bytes found after the pixel data to <stem>_trailing.bin
    #[arg(long)]
    keep_trailing: bool,
}

impl Args {
    fn options(&self) -> RepairOptions {
        RepairOptions {
            brute: self.brute,
            search_radius: self.radius,
            bit_depth: self.bpp,
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bmpfix=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn variant_name(stem: &str, image: &RepairedImage<'_>) -> String {
    let dimensions = image.dimensions();
    match image.varied {
        Some(Axis::Height) => format!("{stem}_fix_h{}.bmp", dimensions.height),
        Some(Axis::Width) | None => format!("{stem}_fix_w{}.bmp", dimensions.width),
    }
}

fn write_image(path: &Path, image: &RepairedImage<'_>) -> Result<()> {
    fs::write(path, image.to_bytes()).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!("wrote {} bytes to {}", image.file_len(), path.display());
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let buf = fs::read(&args.bmp).with_context(|| format!("reading {}", args.bmp.display()))?;
    let layout = parse(&buf).with_context(|| format!("parsing {}", args.bmp.display()))?;
    println!("\n{}", HeaderReport::new("BMP header", &layout.header));

    if args.info {
        println!("  palette bytes   : {:?}", layout.palette);
        println!("  pixel bytes     : {:?}", layout.pixels);
        return Ok(());
    }

    let result = repair(&buf, &args.options())
        .with_context(|| format!("repairing {}", args.bmp.display()))?;

    let stem = args
        .bmp
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let fixed_path = args.out_dir.join(format!("{stem}_fix.bmp"));
    write_image(&fixed_path, &result.primary)?;

    println!("{}", HeaderReport::new("Original header", &result.original));
    println!("{}", HeaderReport::new("Fixed header", &result.primary.header));
    if result.confidence == Confidence::Low {
        println!(
            "Warning: no width/height uses the pixel data exactly, {} is a best guess",
            result.primary.dimensions()
        );
    }
    println!("Repaired file: {}\n", fixed_path.display());

    if args.keep_trailing && !result.trailing.is_empty() {
        let path = args.out_dir.join(format!("{stem}_trailing.bin"));
        fs::write(&path, result.trailing)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Trailing bytes ({}): {}", result.trailing.len(), path.display());
    }

    if args.brute {
        if result.alternates.is_empty() {
            println!("No variants generated");
            return Ok(());
        }

        let variants_dir = args.out_dir.join("variants");
        fs::create_dir_all(&variants_dir)
            .with_context(|| format!("creating {}", variants_dir.display()))?;

        println!("Variants saved:");
        for image in &result.alternates {
            let path = variants_dir.join(variant_name(&stem, image));
            write_image(&path, image)?;
            println!("  {}", path.display());
        }
    }

    Ok(())
}
