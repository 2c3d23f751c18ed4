use anyhow::{bail, Result};
use hitmap::{host_parallelism, Hitmap, JsonRegistry, RunError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const SHM_DIR: &str = "/dev/shm";

fn usage() -> &'static str {
    "usage: hitmap <input.csv> <output.json> [--registry <records.json>] [--dynamic <ranges-per-worker>] [--spill]"
}

struct Args {
    input: PathBuf,
    output: PathBuf,
    registry: Option<PathBuf>,
    dynamic: Option<usize>,
    spill: bool,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut registry = None;
    let mut dynamic = None;
    let mut spill = false;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--registry" => match it.next() {
                Some(v) => registry = Some(PathBuf::from(v)),
                None => bail!("--registry needs a file\n{}", usage()),
            },
            "--dynamic" => match it.next().map(|v| v.parse::<usize>()) {
                Some(Ok(n)) => dynamic = Some(n),
                _ => bail!("--dynamic needs a number\n{}", usage()),
            },
            "--spill" => spill = true,
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    if positional.len() != 2 {
        bail!("{}", usage());
    }
    let output = positional.pop().unwrap_or_default();
    let input = positional.pop().unwrap_or_default();
    Ok(Args { input, output, registry, dynamic, spill })
}

fn run(args: Args) -> Result<()> {
    let mut job = Hitmap::new().workers(host_parallelism().max(2));
    if let Some(path) = &args.registry {
        job = job.registry(JsonRegistry::new(path));
    }
    if let Some(n) = args.dynamic {
        job = job.dynamic(n);
    }
    if args.spill {
        let dir = if Path::new(SHM_DIR).is_dir() { PathBuf::from(SHM_DIR) } else { std::env::temp_dir() };
        job = job.spill_dir(dir);
    }

    let summary = job.run(&args.input, &args.output)?;
    println!(
        "{} lines, {} paths, {} ranges on {} workers -> {}",
        summary.lines,
        summary.written_paths,
        summary.ranges,
        summary.workers,
        args.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let result = parse_args().and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let phase = e.downcast_ref::<RunError>().map(RunError::phase).unwrap_or("io");
            eprintln!("hitmap: {phase} failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
