//! GraphicsMagick still-derivative execution.
//!
//! Full-size derivatives keep the source density (600x600); thumbnails are
//! produced at reduced density and a fixed 180-pixel height. Oversized
//! still-image sources additionally get a percentage resize chosen by the
//! size-band table in the stills module. Density and resize values are
//! constants, so repeating a derivation yields an identical invocation.

use std::path::Path;
use std::process::Command;

use crate::error::{command_failed_error, command_start_error, CoreResult};
use crate::stills::DerivativeSpec;

const FULL_DENSITY: &str = "600x600";
const THUMB_DENSITY: &str = "300x300";
const THUMB_RESIZE: &str = "x180";

/// Builds the `gm` argument vector for one derivation.
fn convert_args(source: &Path, dest: &Path, spec: &DerivativeSpec) -> Vec<String> {
    let source = source.to_string_lossy().into_owned();
    let dest = dest.to_string_lossy().into_owned();
    let mut args = vec!["convert".to_string()];
    match spec {
        DerivativeSpec::FullSize => {
            args.extend(["-density".to_string(), FULL_DENSITY.to_string(), source]);
            args.push("-strip".to_string());
        }
        DerivativeSpec::Thumbnail => {
            args.extend(["-density".to_string(), THUMB_DENSITY.to_string(), source]);
            args.push("-strip".to_string());
            args.extend(["-resize".to_string(), THUMB_RESIZE.to_string()]);
        }
        DerivativeSpec::Oversize { percent } => {
            args.extend(["-density".to_string(), FULL_DENSITY.to_string(), source]);
            args.push("-strip".to_string());
            args.extend(["-resize".to_string(), format!("{percent}%x{percent}%")]);
        }
    }
    args.push(dest);
    args
}

/// Runs one `gm convert` derivation.
pub fn derive(source: &Path, dest: &Path, spec: &DerivativeSpec) -> CoreResult<()> {
    log::debug!(
        "Deriving {:?} from {} to {}",
        spec,
        source.display(),
        dest.display()
    );

    let output = Command::new("gm")
        .args(convert_args(source, dest, spec))
        .output()
        .map_err(|e| command_start_error("gm convert", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(command_failed_error("gm convert", output.status, stderr));
    }
    Ok(())
}
