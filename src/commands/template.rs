use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::cli::TemplateArgs;
use crate::codec::CodecRegistry;
use crate::schema::CanonicalSchema;

pub fn run(args: TemplateArgs) -> Result<()> {
    let registry = CodecRegistry::with_defaults(&args.toon_command)?;
    let codec = registry.get_available(args.format)?;
    let template = CanonicalSchema::clinical_summary().template();
    let rendered = codec
        .encode(&template)
        .with_context(|| format!("failed to render {} template", args.format))?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", rendered.trim_end()).context("failed to write template")?;
    Ok(())
}
