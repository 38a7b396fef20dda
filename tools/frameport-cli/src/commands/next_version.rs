//! Print the next versioned output path.

use std::path::PathBuf;

use frameport_render_engine::paths::{next_incremented_path, next_version_for_output};
use frameport_render_model::RenderMode;

pub fn run(path: PathBuf, mode: RenderMode) -> anyhow::Result<()> {
    let next = match next_version_for_output(mode, &path) {
        Some(next) => next,
        // Unversioned video names get their first version token.
        None if mode == RenderMode::Video => next_incremented_path(&path),
        None => anyhow::bail!(
            "No version token in the folder of {}; expected something like render/v01/",
            path.display()
        ),
    };
    println!("{}", next.display());
    Ok(())
}
