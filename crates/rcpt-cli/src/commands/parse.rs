//! Parse command - extract items and special fields from one OCR response.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use rcpt_core::models::config::{OutputFormat as ConfigFormat, RcptConfig};
use rcpt_core::models::receipt::{Diagnostic, ReceiptParseResult};
use rcpt_core::ocr::{OcrDocument, textract};
use rcpt_core::receipt::ReceiptParser;
use rcpt_core::storage::records_for;

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Input file (Textract JSON response or plain text, one line per OCR line)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (default: from config)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Receipt identifier used in storage keys (default: input file name)
    #[arg(long)]
    receipt_id: Option<String>,

    /// Print the keyed storage records instead of the parse result
    #[arg(long)]
    records: bool,

    /// Show diagnostics and subtotal reconciliation
    #[arg(long)]
    show_diagnostics: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV of the item records
    Csv,
    /// Plain text summary
    Text,
}

impl From<ConfigFormat> for OutputFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Json => OutputFormat::Json,
            ConfigFormat::Csv => OutputFormat::Csv,
            ConfigFormat::Text => OutputFormat::Text,
        }
    }
}

pub async fn run(args: ParseArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::config::load(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Parsing file: {}", args.input.display());

    let receipt_id = args
        .receipt_id
        .clone()
        .unwrap_or_else(|| default_receipt_id(&args.input));
    let document = load_document(&args.input)?.with_receipt_id(&receipt_id);

    let parser = ReceiptParser::with_config(config.parser.clone());
    let result = parser.parse(&document)?;

    let output = if args.records {
        let records = records_for(&receipt_id, &result)?;
        serde_json::to_string_pretty(&records)?
    } else {
        let format = args
            .format
            .unwrap_or_else(|| config.output.default_format.into());
        format_result(&result, format, &config)?
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_diagnostics {
        print_diagnostics(&result);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Load an OCR document; `.json` files are Textract responses.
pub fn load_document(path: &Path) -> anyhow::Result<OcrDocument> {
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let document = match extension.as_str() {
        "json" => textract::from_json(&content)?,
        _ => OcrDocument::from_text(&content),
    };

    debug!("Loaded {} OCR lines from {}", document.lines.len(), path.display());
    Ok(document)
}

pub fn default_receipt_id(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("receipt")
        .to_string()
}

pub fn format_result(
    result: &ReceiptParseResult,
    format: OutputFormat,
    config: &RcptConfig,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json if config.output.pretty => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Json => Ok(serde_json::to_string(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &ReceiptParseResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "sequence",
        "item_code",
        "name",
        "price",
        "discount",
        "net_price",
        "tax_flag",
        "source_lines",
    ])?;

    for item in &result.items {
        let source_lines = item
            .source_lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(";");

        wtr.write_record([
            &item.sequence.to_string(),
            &item.item_code.clone().unwrap_or_default(),
            &item.name,
            &item.price.to_string(),
            &item.discount.map(|d| d.to_string()).unwrap_or_default(),
            &item.net_price().to_string(),
            &item.tax_flag.to_string(),
            &source_lines,
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ReceiptParseResult) -> String {
    let mut output = String::new();

    output.push_str("Items:\n");
    for item in &result.items {
        let flag = if item.tax_flag { "E" } else { " " };
        output.push_str(&format!(
            "  {} {:30} {:>8}\n",
            flag,
            item.name,
            item.price.round_dp(2).to_string()
        ));
        if let Some(discount) = item.discount {
            output.push_str(&format!(
                "    {:30} {:>8}\n",
                "Discount",
                discount.round_dp(2).to_string()
            ));
        }
    }
    output.push('\n');

    let reconciliation = result.reconcile();
    output.push_str(&format!(
        "  {:32} {:>8}\n",
        "Computed subtotal",
        reconciliation.computed.round_dp(2).to_string()
    ));

    for (name, records) in &result.fields {
        let value = records
            .amount()
            .map(|a| a.round_dp(2).to_string())
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!("  {:32} {:>8}\n", name.as_str().to_uppercase(), value));
    }

    output
}

fn print_diagnostics(result: &ReceiptParseResult) {
    println!();
    if result.diagnostics.is_empty() {
        println!("{} No diagnostics", style("ℹ").blue());
    }
    for diagnostic in &result.diagnostics {
        println!("{} {}", style("!").yellow(), describe(diagnostic));
    }

    if !result.unmatched_lines.is_empty() {
        println!(
            "{} Unmatched lines: {:?}",
            style("ℹ").blue(),
            result.unmatched_lines
        );
    }

    let reconciliation = result.reconcile();
    match reconciliation.difference {
        Some(_) if reconciliation.matches() => println!(
            "{} Items add up to the printed subtotal ({})",
            style("✓").green(),
            reconciliation.computed
        ),
        Some(diff) => println!(
            "{} Items add up to {}, printed subtotal differs by {}",
            style("!").yellow(),
            reconciliation.computed,
            diff
        ),
        None => println!("{} No subtotal found to reconcile against", style("ℹ").blue()),
    }
}

pub fn describe(diagnostic: &Diagnostic) -> String {
    match diagnostic {
        Diagnostic::UnresolvedItem { line, name, .. } => {
            format!("line {}: item '{}' has no price", line, name)
        }
        Diagnostic::ConflictingPrices { line, price_lines } => {
            format!("line {}: item has conflicting prices on lines {:?}", line, price_lines)
        }
        Diagnostic::PriceOverwritten {
            line,
            previous,
            price,
            price_line,
        } => format!(
            "line {}: price {} replaced by {} from line {}",
            line, previous, price, price_line
        ),
        Diagnostic::OrphanDiscount { line, amount } => {
            format!("line {}: discount {} has no item", line, amount)
        }
        Diagnostic::PartialField { field, label_line } => {
            format!("line {}: {} label has no value", label_line, field)
        }
        Diagnostic::DuplicateLabel { field, line } => {
            format!("line {}: later {} label ignored", line, field)
        }
    }
}
