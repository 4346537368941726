/// Docker whiteout markers found in layer listings

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// What a whiteout marker deletes from the layers below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whiteout {
    /// `.wh.<name>` removes `<name>` from lower layers
    File,
    /// `.wh..wh..opq` hides every lower-layer entry of its directory
    Opaque,
}

/// Classify an entry name (final path component)
pub fn classify(name: &str) -> Option<Whiteout> {
    if name == OPAQUE_WHITEOUT {
        Some(Whiteout::Opaque)
    } else if name.starts_with(WHITEOUT_PREFIX) {
        Some(Whiteout::File)
    } else {
        None
    }
}

/// Name of the entry a file whiteout deletes
/// Example: ".wh.passwd" -> Some("passwd")
pub fn target_name(name: &str) -> Option<&str> {
    match classify(name)? {
        Whiteout::File => name.strip_prefix(WHITEOUT_PREFIX),
        Whiteout::Opaque => None,
    }
}
