//! The decompile command: walk the input directory, fan modules out one
//! worker each, and write a `.s` listing plus a `.py` reconstruction per
//! module. Per-module failures degrade to an `ERROR`-sentinel output and
//! the walk continues; only setup errors are fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use rayon::prelude::*;
use tracing::{error, info};

use unmpy::error::Result;
use unmpy::{cfg, diagnostic, emit, lift, parse, unparse, vm};

pub struct DecompileOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub vm: PathBuf,
    pub sequential: bool,
}

pub fn cmd_decompile(opts: DecompileOptions) {
    if !opts.vm.is_file() {
        eprintln!("error: VM binary '{}' not found", opts.vm.display());
        process::exit(1);
    }
    let entries = match fs::read_dir(&opts.input_dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", opts.input_dir.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = fs::create_dir_all(&opts.output_dir) {
        eprintln!("error: cannot create '{}': {}", opts.output_dir.display(), e);
        process::exit(1);
    }

    let mut modules: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "mpy"))
        .collect();
    modules.sort();

    let version = vm::tool_version();
    info!("unmpy {}: {} module(s)", version, modules.len());

    if opts.sequential {
        modules.iter().for_each(|p| process_module(&opts, &version, p));
    } else {
        modules
            .par_iter()
            .for_each(|p| process_module(&opts, &version, p));
    }
    info!("done");
}

fn process_module(opts: &DecompileOptions, version: &str, path: &Path) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let asm_path = opts.output_dir.join(format!("{}.s", stem));
    let py_path = opts.output_dir.join(format!("{}.py", stem));

    info!("decompiling {}", path.display());
    if let Err(err) = decompile_one(opts, version, path, &asm_path, &py_path) {
        error!("{}: {}", path.display(), err);
        let sentinel = emit::error_sentinel(version, &err);
        if let Err(e) = fs::write(&py_path, sentinel) {
            error!("cannot write '{}': {}", py_path.display(), e);
        }
    }
}

fn decompile_one(
    opts: &DecompileOptions,
    version: &str,
    path: &Path,
    asm_path: &Path,
    py_path: &Path,
) -> Result<()> {
    let dis = vm::disassemble(&opts.vm, path)?;
    let mut module = parse::parse_disassembly(&dis).inspect_err(|err| {
        diagnostic::render_parse_error(err, &path.to_string_lossy(), &dis);
    })?;
    for block in module.blocks.iter_mut() {
        cfg::build_basic_blocks(block);
    }

    let listing =
        emit::render_with_banner("Disassembled", version, &emit::disassembly_listing(&module));
    fs::write(asm_path, listing)?;

    let ast = lift::lift_module(&module)?;
    let source = emit::render_with_banner("Decompiled", version, &unparse::unparse_module(&ast));
    fs::write(py_path, source)?;
    Ok(())
}
