use std::io::Write;

use clap::ValueEnum;

use crate::crawler::CrawlResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

pub fn write_result<W: Write>(out: W, result: &CrawlResult, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => write_json(out, result),
        Format::Csv => write_csv(out, result),
    }
}

fn write_json<W: Write>(mut out: W, result: &CrawlResult) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, result)?;
    writeln!(out)?;
    Ok(())
}

fn write_csv<W: Write>(out: W, result: &CrawlResult) -> anyhow::Result<()> {
    let mut w = csv::WriterBuilder::new().from_writer(out);
    w.write_record(["id", "slug", "name", "phone", "whatsappLink", "page"])?;

    for entry in &result.entries {
        let page = entry.page_number.to_string();
        w.write_record([
            entry.id.as_str(),
            entry.slug.as_str(),
            entry.name.as_str(),
            entry.phone.as_deref().unwrap_or_default(),
            entry.whatsapp_link.as_str(),
            page.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
