use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;

use goodbooks_merge::io::{CsvLoader, OutputFormat, Source, SourceFiles};
use goodbooks_merge::pipeline::{run, PipelineOptions};
use goodbooks_merge::progress::{format_duration, set_log_only};
use goodbooks_merge::safety::{validate_output_path, OUTPUT_PATTERN};
use goodbooks_merge::tags::{TagWeighting, DEFAULT_TAG_LIMIT};

#[derive(Parser)]
#[command(name = "merge-books")]
#[command(about = "Merge goodbooks tables into one catalog with to-read counts and top tags")]
struct Args {
    /// Directory holding books.csv, to_read.csv, book_tags.csv and tags.csv
    #[arg(default_value = "data/goodbooks-10k-master")]
    data_dir: PathBuf,

    /// Output path (defaults to <DATA_DIR>/merged_books.csv)
    output: Option<PathBuf>,

    #[arg(long, default_value = "books.csv")]
    books: String,

    #[arg(long, default_value = "to_read.csv")]
    to_read: String,

    #[arg(long, default_value = "book_tags.csv")]
    book_tags: String,

    #[arg(long, default_value = "tags.csv")]
    tags: String,

    /// Output format (inferred from the output extension when omitted)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Tag names kept per book
    #[arg(
        long,
        default_value_t = DEFAULT_TAG_LIMIT,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    top_tags: usize,

    #[arg(long, value_enum, default_value_t = TagWeighting::Count)]
    tag_weighting: TagWeighting,

    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and print plain phase lines
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this path
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    force: bool,
}

fn prepare_output(output: &Path, loader: &CsvLoader, force: bool) -> Result<()> {
    let sources: Vec<PathBuf> = Source::ALL.iter().map(|&s| loader.path(s)).collect();
    let source_refs: Vec<&Path> = sources.iter().map(PathBuf::as_path).collect();
    validate_output_path(output, OUTPUT_PATTERN, &source_refs)?;

    if output.exists() {
        if !force {
            bail!(
                "Output '{}' already exists (pass --force to replace it)",
                output.display()
            );
        }
        std::fs::remove_file(output).context("Failed to remove existing output file")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();

    let files = SourceFiles {
        books: args.books,
        to_read: args.to_read,
        book_tags: args.book_tags,
        tags: args.tags,
    };
    let loader = CsvLoader::with_files(&args.data_dir, files);

    let output = args
        .output
        .unwrap_or_else(|| args.data_dir.join("merged_books.csv"));
    prepare_output(&output, &loader, args.force)?;

    let format = args.format.unwrap_or_else(|| OutputFormat::from_path(&output));
    println!("Reading sources from {:?}", args.data_dir);
    println!("Writing {:?} output to {:?}", format, output);

    let options = PipelineOptions {
        tag_limit: args.top_tags,
        weighting: args.tag_weighting,
    };
    let mut writer = format.writer(output.clone());
    let stats = run(&loader, writer.as_mut(), options)?;

    if args.log_only {
        stats.log_phase("final");
    }
    if let Some(path) = &args.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    let file_size = std::fs::metadata(&output)?.len();

    println!("\n{:=<60}", "");
    println!("Merge complete!");
    println!("  Books: {}", stats.output_rows);
    println!("  With to-read counts: {}", stats.merged_with_to_read);
    println!(
        "  With tags: {} ({:.1}%)",
        stats.merged_with_tags,
        stats.tag_coverage()
    );
    println!("  Dangling tag assignments: {}", stats.dangling_tag_assignments);
    println!("  Output size: {:.2} MB", file_size as f64 / 1_048_576.0);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
