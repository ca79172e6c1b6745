use std::path::PathBuf;

use anyhow::Context;

use colonyzer::{
    Config, DiagnosticsSink, FileDiagnostics, FileImageSource, MarkerFileClaim, NoDiagnostics,
    Pipeline,
};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Config::from_yaml_file(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let level = if config.quiet { "warn" } else { "info" };
    common::log_setup::setup_logging(level, Some(&config.log_directory()), "colonyzer");

    let run = config.validate().context("invalid configuration")?;
    run.log_summary();

    let diagnostics: &dyn DiagnosticsSink = if run.diagnostics {
        &FileDiagnostics
    } else {
        &NoDiagnostics
    };
    let summary = Pipeline::new(&run, &MarkerFileClaim, &FileImageSource, diagnostics).run()?;

    println!(
        "Processed {} barcode(s), {} image(s); {} failed, {} skipped",
        summary.processed.len(),
        summary.images,
        summary.failed.len(),
        summary.skipped.len()
    );
    Ok(())
}
