//! Flatten a template and its fragments into one artifact.
//!
//! ```bash
//! weave render contract.py -o build/contract.py -I shared/features
//! weave render contract.py --no-git --namespace qualified > contract.py
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::common::{CommandContext, CommandExecutor, write_output};
use crate::fragment::ModuleLocator;
use crate::git::GitRepo;
use crate::provenance::ChecksumAlgorithm;
use crate::renderer::{Composer, HeaderPathStyle, NamespaceStrategy, collect_origins};
use crate::resolver::FragmentResolver;
use crate::syntax::{FrontEnd, PythonFrontEnd};

/// Render a template with every imported fragment inlined
#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Template file
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Output file; the artifact is printed to stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Additional directory to look up fragments in (repeatable)
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Do not record fragment commits in the headers
    #[arg(long)]
    pub no_git: bool,

    /// Overwrite an existing output file
    #[arg(short, long)]
    pub force: bool,

    /// Drop fragment definitions nothing uses
    #[arg(long)]
    pub prune_unused: bool,

    /// Fail on names that resolve to nothing instead of warning
    #[arg(long)]
    pub strict_symbols: bool,

    /// How fragment definitions are prefixed
    #[arg(long, value_enum)]
    pub namespace: Option<NamespaceStrategy>,

    /// How fragment paths are written into headers
    #[arg(long, value_enum)]
    pub header_paths: Option<HeaderPathStyle>,

    /// Checksum algorithm for provenance headers
    #[arg(long)]
    pub algorithm: Option<ChecksumAlgorithm>,

    /// Omit the auto-generated banner line
    #[arg(long)]
    pub no_banner: bool,
}

impl CommandExecutor for RenderCommand {
    async fn execute_with_context(self, ctx: CommandContext) -> Result<()> {
        let template = ctx.absolute(&self.template);

        let mut options = ctx.config.compose_options();
        if let Some(namespace) = self.namespace {
            options.namespace = namespace;
        }
        if let Some(style) = self.header_paths {
            options.header_paths = style;
        }
        if let Some(algorithm) = self.algorithm {
            options.algorithm = algorithm;
        }
        options.prune_unused |= self.prune_unused;
        options.strict_symbols |= self.strict_symbols;
        options.banner &= !self.no_banner;

        let front_end = PythonFrontEnd::new();
        let mut roots: Vec<PathBuf> = self.include.iter().map(|dir| ctx.absolute(dir)).collect();
        roots.extend(ctx.config.search_paths(&ctx.cwd)?);
        let locator = ModuleLocator::new(roots, front_end.extension());

        let graph =
            FragmentResolver::new(&front_end, locator, ctx.config.import_policy()).resolve(&template)?;
        tracing::info!(
            target: "render",
            "Rendering {} with {} fragment(s)",
            template.display(),
            graph.fragments.len().saturating_sub(1)
        );

        let origins = if self.no_git || !ctx.config.render.use_git {
            HashMap::new()
        } else {
            let start = template.parent().unwrap_or(ctx.cwd.as_path());
            match GitRepo::discover(start).await {
                Ok(repo) => collect_origins(&repo, &graph.fragments, options.algorithm).await?,
                Err(e) => {
                    tracing::warn!(target: "render", "Not recording commits: {}", e);
                    HashMap::new()
                }
            }
        };

        let artifact = Composer::new(&front_end, options).compose(&graph, &origins)?;
        let source = artifact.to_source()?;

        match &self.output {
            Some(output) => {
                let output = ctx.absolute(output);
                write_output(&output, source.as_bytes(), self.force)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                eprintln!(
                    "{} {} ({} fragment(s))",
                    "Rendered".green().bold(),
                    output.display(),
                    artifact.sections.len()
                );
            }
            None => print!("{source}"),
        }
        Ok(())
    }
}
