use crate::listing::{FileEntry, LayerFileIndex};
use crate::manifest::{Layer, ManifestTree};
use crate::reference::ImageReference;
use crate::theme::Theme;
use crate::utils::human_readable_size;
use crate::whiteout::Whiteout;
use owo_colors::OwoColorize;
use std::io::{self, Write};

const COLOR_RESET: &str = "\x1b[0m";

pub struct RenderOptions {
    pub show_long: bool,
    pub use_color: bool,
    pub icon_style: IconStyle,
    pub theme: Theme,
}

#[derive(Clone, Copy)]
pub enum IconStyle {
    None,
    Emoji,
    Nerd,
}

impl IconStyle {
    pub fn from_str(s: &str) -> Self {
        match s {
            "emoji" => IconStyle::Emoji,
            "nerd" => IconStyle::Nerd,
            _ => IconStyle::None,
        }
    }

    fn file_icon(&self) -> &'static str {
        match self {
            IconStyle::None => "",
            IconStyle::Emoji => "📄 ",
            IconStyle::Nerd => "\u{f15b} ", // nf-fa-file_o
        }
    }

    fn dir_icon(&self) -> &'static str {
        match self {
            IconStyle::None => "",
            IconStyle::Emoji => "📁 ",
            IconStyle::Nerd => "\u{f115} ", // nf-fa-folder
        }
    }

    fn layer_icon(&self) -> &'static str {
        match self {
            IconStyle::None => "",
            IconStyle::Emoji => "📦 ",
            IconStyle::Nerd => "\u{f1b2} ", // nf-fa-cube
        }
    }
}

impl RenderOptions {
    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color && !color.is_empty() {
            format!("{}{}{}", color, text, COLOR_RESET)
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        if self.use_color {
            format!("{}{}{}", self.theme.platform, text.bold(), COLOR_RESET)
        } else {
            text.to_string()
        }
    }
}

pub fn render_reference<W: Write>(
    writer: &mut W,
    reference: &ImageReference,
    options: &RenderOptions,
) -> io::Result<()> {
    writeln!(writer, "{}", options.heading(&reference.to_string()))?;
    writeln!(writer, "owner:  {}", reference.owner)?;
    writeln!(writer, "repo:   {}", reference.repo)?;
    writeln!(writer, "tag:    {}", reference.tag.as_deref().unwrap_or("-"))?;
    writeln!(
        writer,
        "digest: {}",
        options.paint(&options.theme.digest, reference.digest.as_deref().unwrap_or("-"))
    )?;
    Ok(())
}

/// Print every platform of a manifest with its layers in manifest order
pub fn render_manifest<W: Write>(
    writer: &mut W,
    tree: &ManifestTree,
    method: Option<&str>,
    options: &RenderOptions,
) -> io::Result<()> {
    if let Some(method) = method {
        writeln!(writer, "{}", options.heading(&format!("[{}]", method)))?;
    }
    if !tree.manifest_digest.is_empty() {
        writeln!(
            writer,
            "manifest {}",
            options.paint(&options.theme.digest, &tree.manifest_digest)
        )?;
    }

    let size_width = tree
        .platforms
        .iter()
        .flat_map(|p| p.layers.iter())
        .map(|l| human_readable_size(l.size_bytes).len())
        .max()
        .unwrap_or(0);

    for platform in &tree.platforms {
        writeln!(writer)?;
        let mut title = format!(
            "{} ({} layers, {})",
            platform.label(),
            platform.layers.len(),
            human_readable_size(platform.total_size())
        );
        if let Some(digest) = &platform.manifest_digest {
            title.push_str(&format!(" {}", digest));
        }
        writeln!(writer, "{}", options.heading(&title))?;

        for layer in &platform.layers {
            write_layer_row(writer, layer, size_width, options)?;
        }
    }

    Ok(())
}

fn write_layer_row<W: Write>(
    writer: &mut W,
    layer: &Layer,
    size_width: usize,
    options: &RenderOptions,
) -> io::Result<()> {
    let size = format!("{:>width$}", human_readable_size(layer.size_bytes), width = size_width);
    write!(
        writer,
        "  {}{} {}",
        options.icon_style.layer_icon(),
        options.paint(&options.theme.digest, &layer.digest),
        options.paint(&options.theme.size, &size)
    )?;
    if options.show_long && !layer.media_type.is_empty() {
        write!(writer, " {}", layer.media_type)?;
    }
    if !layer.files.is_empty() {
        write!(writer, " [{} files]", layer.files.len())?;
    }
    writeln!(writer)
}

/// Print a single layer, and its embedded files as a tree when present
pub fn render_layer<W: Write>(
    writer: &mut W,
    layer: &Layer,
    options: &RenderOptions,
) -> io::Result<()> {
    write_layer_row(writer, layer, 0, options)?;
    if !layer.files.is_empty() {
        render_tree(writer, &layer.file_index(), "", options)?;
    }
    Ok(())
}

/// Print the breadcrumb trail, e.g. `Home / usr / local`
pub fn render_breadcrumbs<W: Write>(
    writer: &mut W,
    index: &LayerFileIndex,
    path: &str,
    options: &RenderOptions,
) -> io::Result<()> {
    let labels: Vec<String> = index
        .breadcrumbs(path)
        .into_iter()
        .map(|crumb| if crumb.label.is_empty() { "Home".to_string() } else { crumb.label })
        .collect();
    writeln!(writer, "{}", options.heading(&labels.join(" / ")))
}

/// Print the direct children of one directory, `ls` style
pub fn render_listing<W: Write>(
    writer: &mut W,
    index: &LayerFileIndex,
    path: &str,
    options: &RenderOptions,
) -> io::Result<()> {
    render_breadcrumbs(writer, index, path, options)?;

    let children = collect_children(index, path);
    let owner_width = owner_width(&children);
    for child in &children {
        if options.show_long {
            write_long_columns(writer, child, owner_width, options)?;
        }
        write_name(writer, child, options)?;
        writeln!(writer)?;
    }
    Ok(())
}

/// Print the whole hierarchy below `path` with tree-drawing characters
pub fn render_tree<W: Write>(
    writer: &mut W,
    index: &LayerFileIndex,
    path: &str,
    options: &RenderOptions,
) -> io::Result<()> {
    // Calculate max ownership width if showing long format
    let max_owner_width = if options.show_long {
        index.entries().iter().map(|e| e.owner.len()).max().unwrap_or(0)
    } else {
        0
    };

    render_node(writer, index, path, "", options, max_owner_width)?;
    writer.flush()
}

/// A row in a directory view: a listed entry, or a directory that only
/// exists because deeper entries mention it.
enum Child<'a> {
    Entry(&'a FileEntry),
    Implicit { name: String, dir: String },
}

impl Child<'_> {
    fn name(&self) -> &str {
        match self {
            Child::Entry(entry) => &entry.name,
            Child::Implicit { name, .. } => name,
        }
    }

    fn is_directory(&self) -> bool {
        match self {
            Child::Entry(entry) => entry.is_directory,
            Child::Implicit { .. } => true,
        }
    }

    fn child_dir(&self) -> String {
        match self {
            Child::Entry(entry) => entry.child_dir(),
            Child::Implicit { dir, name } => format!("{}{}/", dir, name),
        }
    }
}

fn collect_children<'a>(index: &'a LayerFileIndex, path: &str) -> Vec<Child<'a>> {
    let dir = crate::utils::normalize_dir(path);
    let mut children: Vec<Child<'a>> = index
        .sorted_children_of(&dir)
        .into_iter()
        .map(Child::Entry)
        .collect();
    children.extend(index.implicit_dirs_of(&dir).into_iter().map(|name| Child::Implicit {
        name,
        dir: dir.clone(),
    }));
    children.sort_by_cached_key(|c| c.name().to_lowercase());
    children
}

fn owner_width(children: &[Child<'_>]) -> usize {
    children
        .iter()
        .filter_map(|c| match c {
            Child::Entry(entry) => Some(entry.owner.len()),
            Child::Implicit { .. } => None,
        })
        .max()
        .unwrap_or(0)
}

fn write_long_columns<W: Write>(
    writer: &mut W,
    child: &Child<'_>,
    owner_width: usize,
    options: &RenderOptions,
) -> io::Result<()> {
    let (perms, owner, size, modified) = match child {
        Child::Entry(entry) => (
            entry.permissions.clone(),
            entry.owner.clone(),
            entry.size_bytes.to_string(),
            entry.modified_at.clone(),
        ),
        Child::Implicit { .. } => ("d?????????".to_string(), "?".to_string(), "-".to_string(), "-".repeat(16)),
    };

    write!(
        writer,
        "{} {} {} {} ",
        options.paint(&options.theme.permissions, &perms),
        options.paint(&options.theme.ownership, &format!("{:>width$}", owner, width = owner_width)),
        options.paint(&options.theme.size, &format!("{:>10}", size)),
        modified
    )
}

fn write_name<W: Write>(writer: &mut W, child: &Child<'_>, options: &RenderOptions) -> io::Result<()> {
    let whiteout = match child {
        Child::Entry(entry) => entry.whiteout(),
        Child::Implicit { .. } => None,
    };

    // Determine color based on file type
    let color = match child {
        _ if whiteout.is_some() => options.theme.whiteout.as_str(),
        Child::Entry(entry) if entry.is_symlink() => options.theme.symlink.as_str(),
        c if c.is_directory() => options.theme.directory.as_str(),
        Child::Entry(entry) if entry.is_executable() => options.theme.executable.as_str(),
        _ => "",
    };

    let icon = if child.is_directory() {
        options.icon_style.dir_icon()
    } else {
        options.icon_style.file_icon()
    };

    write!(writer, "{}", options.paint(color, &format!("{}{}", icon, child.name())))?;

    match whiteout {
        Some(Whiteout::File) => write!(writer, " (deleted)")?,
        Some(Whiteout::Opaque) => write!(writer, " (opaque)")?,
        None => {}
    }

    Ok(())
}

fn render_node<W: Write>(
    writer: &mut W,
    index: &LayerFileIndex,
    path: &str,
    prefix: &str,
    options: &RenderOptions,
    max_owner_width: usize,
) -> io::Result<()> {
    let dir = crate::utils::normalize_dir(path);
    let children = collect_children(index, &dir);

    for (idx, child) in children.iter().enumerate() {
        let is_last = idx + 1 == children.len();

        // Show permissions and ownership first if requested
        if options.show_long {
            write_long_columns(writer, child, max_owner_width, options)?;
        }

        // Draw tree structure
        let branch = if is_last { "└── " } else { "├── " };
        write!(writer, "{}", options.paint(&options.theme.tree_chars, &format!("{}{}", prefix, branch)))?;

        write_name(writer, child, options)?;
        writeln!(writer)?;

        // Recurse into directories; a child must sit strictly below `dir`
        let child_dir = child.child_dir();
        if child.is_directory() && child_dir.len() > dir.len() {
            let new_prefix = if is_last {
                format!("{}    ", prefix)
            } else {
                format!("{}│   ", prefix)
            };
            render_node(writer, index, &child_dir, &new_prefix, options, max_owner_width)?;
        }
    }

    Ok(())
}
