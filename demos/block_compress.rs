//! Block-parallel gzip compression.
//!
//! Splits an input file into fixed-size blocks and compresses each block as
//! an independent gzip member (concatenated members form a valid gzip file),
//! once sequentially and once through `parallel_for`, reporting throughput
//! and speedup. The per-index callback records each block's outcome into the
//! block's own slot; the scheduler never sees those outcomes, so the demo
//! scans them after each pass.
//!
//! Usage:
//!   block_compress <input_file> [threads=0] [chunk=4] [block_kib=256] [level=6] [pin=1]

use std::env;
use std::fs;
use std::io::Write as _;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;

use flate2::write::GzEncoder;
use flate2::Compression;
use presto::prelude::*;

/// One input block and its compression outcome. Each index is touched by
/// exactly one worker per pass, so the lock is uncontended.
struct Block<'a> {
    input: &'a [u8],
    out: Mutex<BlockOut>,
}

#[derive(Default)]
struct BlockOut {
    data: Vec<u8>,
    ok: bool,
}

fn compress_block(blocks: &[Block<'_>], index: i64, level: u32) {
    let block = &blocks[index as usize];
    let mut out = block.out.lock().unwrap();
    out.data.clear();
    out.ok = false;

    let buffer = Vec::with_capacity(block.input.len() / 2 + 64);
    let mut encoder = GzEncoder::new(buffer, Compression::new(level));
    if encoder.write_all(block.input).is_err() {
        return;
    }
    if let Ok(data) = encoder.finish() {
        out.data = data;
        out.ok = true;
    }
}

/// Index of the first block whose last pass failed, if any.
fn first_failure(blocks: &[Block<'_>]) -> Option<usize> {
    blocks.iter().position(|block| !block.out.lock().unwrap().ok)
}

fn write_concat(path: &str, blocks: &[Block<'_>]) -> std::io::Result<()> {
    let mut out = std::io::BufWriter::new(fs::File::create(path)?);
    for block in blocks {
        out.write_all(&block.out.lock().unwrap().data)?;
    }
    out.flush()
}

fn arg<T: FromStr + Copy>(args: &[String], index: usize, default: T) -> T {
    args.get(index)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn mib_per_s(bytes: usize, seconds: f64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0) / seconds
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(input_path) = args.get(1) else {
        eprintln!(
            "usage: {} <input_file> [threads=0] [chunk=4] [block_kib=256] [level=6] [pin=1]",
            args.first().map(String::as_str).unwrap_or("block_compress")
        );
        return ExitCode::FAILURE;
    };
    let threads: usize = arg(&args, 2, 0);
    let chunk: i64 = arg(&args, 3, 4);
    let block_kib: usize = arg(&args, 4, 256).max(4);
    let level: u32 = arg(&args, 5, 6).min(9);
    let pin: u32 = arg(&args, 6, 1);

    let input = match fs::read(input_path) {
        Ok(data) if !data.is_empty() => data,
        Ok(_) => {
            eprintln!("{input_path} is empty, nothing to compress");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("failed to read {input_path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "input: {input_path} ({:.2} MiB)",
        input.len() as f64 / (1024.0 * 1024.0)
    );

    let blocks: Vec<Block<'_>> = input
        .chunks(block_kib * 1024)
        .map(|slice| Block {
            input: slice,
            out: Mutex::new(BlockOut::default()),
        })
        .collect();
    let block_count = blocks.len() as i64;

    // Single-thread reference pass.
    let start = Instant::now();
    for index in 0..block_count {
        compress_block(&blocks, index, level);
    }
    let single = start.elapsed().as_secs_f64();
    if let Some(index) = first_failure(&blocks) {
        eprintln!("single-thread compression failed at block {index}");
        return ExitCode::FAILURE;
    }
    println!(
        "single-thread: {single:.3}s ({:.2} MiB/s)",
        mib_per_s(input.len(), single)
    );
    if let Err(err) = write_concat("out_single_concat.gz", &blocks) {
        eprintln!("failed to write out_single_concat.gz: {err}");
        return ExitCode::FAILURE;
    }

    // Parallel pass over the same blocks.
    let mut options = Options::empty();
    if pin != 0 {
        options |= Options::PIN_CORE;
    }
    let start = Instant::now();
    let result = parallel_for(0, block_count, chunk, threads, options, |index| {
        compress_block(&blocks, index, level);
    });
    let parallel = start.elapsed().as_secs_f64();
    if let Err(err) = result {
        eprintln!("parallel_for failed: {err}");
        return ExitCode::FAILURE;
    }
    if let Some(index) = first_failure(&blocks) {
        eprintln!("parallel compression failed at block {index}");
        return ExitCode::FAILURE;
    }
    println!(
        "parallel ({block_count} blocks, chunk {chunk}, pin {pin}): {parallel:.3}s ({:.2} MiB/s)",
        mib_per_s(input.len(), parallel)
    );
    println!("speedup: {:.2}x", single / parallel);

    if let Err(err) = write_concat("out_parallel_concat.gz", &blocks) {
        eprintln!("failed to write out_parallel_concat.gz: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
