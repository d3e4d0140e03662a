//! `natjar probe`

use anyhow::{bail, Context};
use natjar_runtime::NativeLoader;

use crate::cli::ProbeArgs;

pub fn execute(args: ProbeArgs) -> anyhow::Result<()> {
    let loader = NativeLoader::for_jar(&args.jar, &args.natives_path);
    let platform = loader.platform();
    println!("Host: {} ({})", platform.os_name, platform.arch);

    let loaded = loader
        .ensure_loaded()
        .with_context(|| format!("Failed to load the native library of {}", args.jar.display()))?;
    println!("Loaded {} for {} from {}", loaded.artifact, loaded.os, loaded.path().display());

    for symbol in &args.symbol {
        if !loaded.has_symbol(symbol) {
            bail!("Symbol {} is not exported by {}", symbol, loaded.artifact);
        }
        println!("Found {}", symbol);
    }
    Ok(())
}
