//! Writes a computed word list to disk as txt, csv, tsv or json.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::WriterBuilder;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::weight::WordInfo;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

/// Neutralizes cells a spreadsheet would read as a formula by prefixing a
/// single quote. Cells that already start with a quote are left alone.
///
/// # Example
/// ```
/// use semantic_summary::csv_safe_cell;
/// assert_eq!(csv_safe_cell("=SUM(A1)".to_string()), "'=SUM(A1)");
/// assert_eq!(csv_safe_cell("kinase".to_string()), "kinase");
/// ```
pub fn csv_safe_cell(cell: String) -> String {
    if cell.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{cell}")
    } else {
        cell
    }
}

/// Plain-text listing, one word per line in display order.
pub fn render_txt(words: &[WordInfo]) -> String {
    let mut out = String::new();
    for w in words {
        let cluster = w.cluster.map_or_else(|| "-".to_string(), |c| c.to_string());
        out.push_str(&format!(
            "{}: weight={:.4}, selected={}, network={}, size={}, cluster={}\n",
            w.word, w.weight, w.selected_count, w.network_count, w.font_size, cluster
        ));
    }
    out
}

fn write_delimited<W: Write>(words: &[WordInfo], out: W, delimiter: u8) -> Result<()> {
    let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(out);
    wtr.write_record([
        "word",
        "selected_count",
        "network_count",
        "weight",
        "font_size",
        "cluster",
    ])?;
    for w in words {
        wtr.write_record([
            csv_safe_cell(w.word.clone()),
            w.selected_count.to_string(),
            w.network_count.to_string(),
            w.weight.to_string(),
            w.font_size.to_string(),
            w.cluster.map(|c| c.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `words` to `<dir>/<stem>_<YYYYmmdd_HHMMSS>_words.<ext>` and returns
/// the path.
pub fn export_words(
    words: &[WordInfo],
    dir: &Path,
    stem: &str,
    format: ExportFormat,
) -> Result<PathBuf> {
    let stem: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{stem}_{timestamp}_words.{}", format.extension()));

    let mut out = BufWriter::new(File::create(&path)?);
    match format {
        ExportFormat::Txt => out.write_all(render_txt(words).as_bytes())?,
        ExportFormat::Csv => write_delimited(words, &mut out, b',')?,
        ExportFormat::Tsv => write_delimited(words, &mut out, b'\t')?,
        ExportFormat::Json => serde_json::to_writer_pretty(&mut out, words)?,
    }
    out.flush()?;
    debug!("Exported {} words to {}", words.len(), path.display());
    Ok(path)
}
