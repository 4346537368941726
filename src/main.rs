use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use layertree::render::{self, IconStyle, RenderOptions};
use layertree::theme::Theme;
use layertree::{archive, ImageReference, LayerFileIndex, ManifestTree};

#[derive(Parser)]
#[command(name = "layertree")]
#[command(about = "Resolve image references and explore manifest and layer file trees")]
#[command(version)]
struct Cli {
    /// When to colorize output: auto, always, never
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    /// Icon style: none, emoji, nerd
    #[arg(long, default_value = "none", global = true)]
    icons: String,

    /// Custom theme as JSON string (e.g., '{"directory":"#7daea3"}')
    #[arg(long, env = "LAYERTREE_THEME", global = true)]
    theme: Option<String>,

    /// Log more (repeat for trace output); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve an image reference into owner, repo, tag and digest
    Resolve {
        /// Image reference, e.g. user/repo:tag or repo@sha256:...
        reference: String,
    },

    /// Show the platforms and layers of a manifest JSON document
    Manifest {
        /// Manifest JSON file, or - for stdin
        input: PathBuf,

        /// Show only this backend method of a multi-method document
        #[arg(long)]
        method: Option<String>,

        /// Show a single layer by digest
        #[arg(long)]
        layer: Option<String>,

        /// Show media types
        #[arg(short, long)]
        long: bool,
    },

    /// Navigate a layer listing (plain lines or {"files": [...]} JSON)
    Ls {
        /// Listing file, or - for stdin
        input: PathBuf,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// List a local layer blob (.tar or .tar.gz)
    Peek {
        /// Layer blob to list
        layer: PathBuf,

        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(Args)]
struct ViewArgs {
    /// Directory to show, relative to the layer root
    #[arg(default_value = "")]
    path: String,

    /// Show the whole hierarchy below the directory
    #[arg(short, long)]
    tree: bool,

    /// Show permissions, ownership, size and modification time
    #[arg(short, long)]
    long: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine if we should use color
    let use_color = match cli.color.as_str() {
        "always" => true,
        "never" => false,
        _ => atty::is(atty::Stream::Stdout),
    };

    // Load theme
    let theme = match cli.theme.as_deref() {
        Some(theme_json) => Theme::from_json(theme_json).context("Failed to parse theme JSON")?,
        None => Theme::default(),
    };

    let mut options = RenderOptions {
        show_long: false,
        use_color,
        icon_style: IconStyle::from_str(&cli.icons),
        theme,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Resolve { reference } => {
            let reference = ImageReference::resolve(&reference)?;
            render::render_reference(&mut out, &reference, &options)?;
        }
        Command::Manifest { input, method, layer, long } => {
            options.show_long = long;
            let json: serde_json::Value = serde_json::from_slice(&read_input(&input)?)
                .with_context(|| format!("Failed to parse manifest JSON: {}", input.display()))?;
            show_manifest(&mut out, json, method.as_deref(), layer.as_deref(), &options)?;
        }
        Command::Ls { input, view } => {
            options.show_long = view.long;
            let bytes = read_input(&input)?;
            let index = index_from_bytes(&bytes)
                .with_context(|| format!("Failed to read listing: {}", input.display()))?;
            show_index(&mut out, index, &view, &options)?;
        }
        Command::Peek { layer, view } => {
            options.show_long = view.long;
            let lines = archive::list_layer(&layer)
                .with_context(|| format!("Failed to list layer: {}", layer.display()))?;
            show_index(&mut out, LayerFileIndex::from_listing(&lines), &view, &options)?;
        }
    }

    out.flush()?;
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf).context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// A listing is either the JSON endpoint body or plain lines
fn index_from_bytes(bytes: &[u8]) -> Result<LayerFileIndex> {
    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with('{') {
        return Ok(LayerFileIndex::from_response_json(bytes)?);
    }
    Ok(LayerFileIndex::from_listing(text.lines()))
}

fn show_manifest<W: Write>(
    out: &mut W,
    json: serde_json::Value,
    method: Option<&str>,
    layer: Option<&str>,
    options: &RenderOptions,
) -> Result<()> {
    let mut trees = ManifestTree::per_method(json)?;
    let multi = trees.len() > 1 || trees.iter().any(|(m, _)| m != layertree::manifest::DEFAULT_METHOD);

    if let Some(wanted) = method {
        trees.retain(|(m, _)| m == wanted);
        if trees.is_empty() {
            bail!("method {} not present in manifest", wanted);
        }
    }

    if let Some(digest) = layer {
        let found = trees
            .iter()
            .filter_map(|(_, tree)| tree.as_ref().ok())
            .find_map(|tree| tree.layer_by_digest(digest));
        match found {
            Some(found) => render::render_layer(out, found, options)?,
            None => bail!("layer {} not found", digest),
        }
        return Ok(());
    }

    for (name, tree) in trees {
        match tree {
            Ok(tree) => render::render_manifest(out, &tree, multi.then_some(name.as_str()), options)?,
            Err(err) if !multi => return Err(err.into()),
            Err(err) => {
                tracing::warn!(method = %name, %err, "skipping method result");
            }
        }
    }
    Ok(())
}

fn show_index<W: Write>(
    out: &mut W,
    mut index: LayerFileIndex,
    view: &ViewArgs,
    options: &RenderOptions,
) -> Result<()> {
    if index.skipped() > 0 {
        tracing::info!(skipped = index.skipped(), kept = index.len(), "dropped unparsable listing lines");
    }

    index.cd(&view.path);
    if view.tree {
        render::render_breadcrumbs(out, &index, index.current_path(), options)?;
        render::render_tree(out, &index, index.current_path(), options)?;
    } else {
        render::render_listing(out, &index, index.current_path(), options)?;
    }
    Ok(())
}
