use clap::{Parser, ValueEnum};
use rust_barcode::{BarcodeType, BarcodeTypes, Code39Checksum, ScanOptions, TextEncoding, scan_luma};
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, ValueEnum)]
enum Symbology {
    Qr,
    MicroQr,
    Pdf417,
    Databar,
    DatabarExpanded,
    Code39,
    Code39Extended,
    Pzn,
}

impl From<Symbology> for BarcodeType {
    fn from(s: Symbology) -> Self {
        match s {
            Symbology::Qr => BarcodeType::QrCode,
            Symbology::MicroQr => BarcodeType::MicroQr,
            Symbology::Pdf417 => BarcodeType::Pdf417,
            Symbology::Databar => BarcodeType::DataBar,
            Symbology::DatabarExpanded => BarcodeType::DataBarExpanded,
            Symbology::Code39 => BarcodeType::Code39,
            Symbology::Code39Extended => BarcodeType::Code39Extended,
            Symbology::Pzn => BarcodeType::Pzn,
        }
    }
}

/// Scan image files for barcodes
#[derive(Parser)]
#[command(name = "barscan", version, about = "Scan and decode barcodes in image files")]
struct Args {
    /// Only print decoded text
    #[arg(short, long)]
    quiet: bool,

    /// Symbologies to look for (default: all)
    #[arg(short, long, value_enum)]
    only: Vec<Symbology>,

    /// Stop after this many symbols
    #[arg(long)]
    count: Option<usize>,

    /// Give up after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Fixed binarization threshold (default: Otsu)
    #[arg(long)]
    threshold: Option<u8>,

    /// Read byte payloads as ISO-8859-1 instead of UTF-8
    #[arg(long)]
    latin1: bool,

    /// Do not retry the mirrored image
    #[arg(long)]
    no_mirror: bool,

    /// Require a mod-43 check character on Code39
    #[arg(long)]
    code39_check: bool,

    /// Image files to scan
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Args {
    fn options(&self) -> ScanOptions {
        let mut builder = ScanOptions::builder()
            .allow_mirror(!self.no_mirror)
            .encoding(if self.latin1 { TextEncoding::Latin1 } else { TextEncoding::Utf8 })
            .code39_checksum(if self.code39_check {
                Code39Checksum::Mod43
            } else {
                Code39Checksum::None
            });
        if !self.only.is_empty() {
            builder = builder.symbologies(self.only.iter().map(|&s| BarcodeType::from(s)).collect::<BarcodeTypes>());
        }
        if let Some(count) = self.count {
            builder = builder.expected_count(count);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(t) = self.threshold {
            builder = builder.threshold(t);
        }
        builder.build()
    }
}

fn main() {
    let args = Args::parse();
    let options = args.options();
    let mut total = 0usize;
    let mut failed = false;

    for path in &args.files {
        let gray = match image::open(path) {
            Ok(img) => img.to_luma8(),
            Err(err) => {
                eprintln!("Failed to load image {}: {}", path.display(), err);
                failed = true;
                continue;
            }
        };
        let start = Instant::now();
        let results = match scan_luma(&gray, &options) {
            Ok(results) => results,
            Err(err) => {
                eprintln!("{}: {}", path.display(), err);
                failed = true;
                continue;
            }
        };
        total += results.len();
        if args.quiet {
            for found in &results {
                println!("{}", found.text);
            }
            continue;
        }
        println!(
            "{} ({}x{}): {} symbol(s) in {:.1?}",
            path.display(),
            gray.width(),
            gray.height(),
            results.len(),
            start.elapsed()
        );
        for found in &results {
            let b = found.bounds;
            print!(
                "  {} [{},{} {}x{}] confidence={:.2}",
                found.symbology,
                b.left,
                b.top,
                b.width(),
                b.height(),
                found.confidence
            );
            if let Some(sa) = &found.structured_append {
                match sa.count {
                    Some(count) => print!(" part={}/{} id={}", sa.index + 1, count, sa.id),
                    None => print!(" part={} id={}", sa.index + 1, sa.id),
                }
            }
            println!(": {}", found.text);
        }
    }

    if failed {
        process::exit(2);
    }
    if total == 0 {
        process::exit(1);
    }
}
