use clap::{Parser, ValueEnum};
use compatscan_lib::dom::NodeShape;
use compatscan_lib::style::stylesheet::{parse_stylesheet, StylesheetLoader};
use compatscan_lib::{Finding, RuleSet, ScanError, ScanOptions, Scanner};
use log::error;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "compatscan")]
#[command(about = "Report missing vendor prefixes and known CSS rendering bugs in a page")]
struct Args {
    /// HTML file to analyse, or a JSON node tree with `--shape`.
    input: PathBuf,

    /// Treat the input as a JSON node tree produced by an external DOM extractor.
    #[arg(long)]
    shape: bool,

    /// Extra stylesheet applied after the page's own. May be repeated.
    #[arg(long = "css", value_name = "FILE")]
    css: Vec<PathBuf>,

    /// Browserslist query for the target browsers. May be repeated.
    #[arg(long = "browsers", value_name = "QUERY", default_value = "defaults")]
    browsers: Vec<String>,

    /// Maximum preview length, in characters.
    #[arg(long, default_value_t = compatscan_lib::pipeline::DEFAULT_PREVIEW_LENGTH)]
    preview_length: usize,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // parse the args given in terminal
    let args: Args = Args::parse();

    match run(&args) {
        Ok(findings) => print_findings(&findings, args.format),
        Err(e) => {
            error!("scan failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<Vec<Finding>, ScanError> {
    let options = ScanOptions {
        browserslist: args.browsers.clone(),
        preview_length: args.preview_length,
    };
    let scanner = Scanner::new(&options)?;

    let mut extra_rules = RuleSet::new();
    for path in &args.css {
        extra_rules.extend(parse_stylesheet(&fs::read_to_string(path)?)?);
    }

    let content = fs::read_to_string(&args.input)?;
    if args.shape {
        let root: NodeShape = serde_json::from_str(&content)?;
        return Ok(scanner.scan_shapes(&root, &extra_rules));
    }

    let base_dir = args
        .input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    scanner.scan_html(&content, &StylesheetLoader::new(base_dir), extra_rules)
}

fn print_findings(findings: &[Finding], format: Format) {
    match format {
        Format::Json => match serde_json::to_string_pretty(findings) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Format::Text => {
            if findings.is_empty() {
                println!("No compatibility issues found.");
                return;
            }
            for finding in findings {
                println!("error: {}", finding.message);
                if let Some(reference) = &finding.reference {
                    println!("  see: {}", reference);
                }
                for preview in &finding.previews {
                    println!("  at: {}", preview.replace('\n', " "));
                }
                println!();
            }
            println!("{} issue(s) found.", findings.len());
        }
    }
}
