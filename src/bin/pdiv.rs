//! Command-line driver: generate a block-tridiagonal matrix, invert it
//! with PDIV, and check the result against a dense reference inverse.

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use log::info;
use num_complex::Complex64;

use pdiv::{
    PdivContext, PdivOptions, Scalar, Tolerance, compare_block_tridiagonal, random_block_tridiagonal,
    reference_inverse,
};

#[derive(Parser, Debug)]
#[command(name = "pdiv", version, about = "Distributed inversion of block-tridiagonal matrices")]
struct Args {
    /// Matrix dimension; must be a multiple of the blocksize
    #[arg(short = 'n', long, default_value_t = 256)]
    size: usize,

    /// Edge length of a block
    #[arg(short, long, default_value_t = 16)]
    blocksize: usize,

    /// Number of workers (power of two)
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Seed of the random matrix
    #[arg(long, default_value_t = 63)]
    seed: u64,

    /// Use complex entries
    #[arg(long)]
    complex: bool,

    /// Receive timeout in seconds; 0 waits forever
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Skip the dense reference inverse
    #[arg(long)]
    no_check: bool,

    /// Relative tolerance of the check
    #[arg(long, default_value_t = 1e-9)]
    rtol: f64,

    /// Absolute tolerance of the check
    #[arg(long, default_value_t = 1e-12)]
    atol: f64,
}

fn run<T: Scalar>(args: &Args) -> anyhow::Result<()> {
    if args.blocksize == 0 || args.size % args.blocksize != 0 {
        bail!("size {} is not a multiple of blocksize {}", args.size, args.blocksize);
    }
    let nblocks = args.size / args.blocksize;
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let options = PdivOptions::new(args.blocksize, args.workers).with_recv_timeout(timeout);
    let ctx = PdivContext::new(options).context("invalid options")?;

    let a = random_block_tridiagonal::<T>(nblocks, args.blocksize, args.seed);
    info!("generated {nblocks} blocks of size {} (seed {})", args.blocksize, args.seed);

    let out = ctx.invert(&a).context("PDIV inversion failed")?;
    println!("pdiv:      {:>10.3} ms on {} workers", out.elapsed.as_secs_f64() * 1e3, args.workers);
    let inverse = out.to_block_tridiagonal()?;

    if args.no_check {
        return Ok(());
    }
    let reference = reference_inverse(&a.to_dense()).context("reference inversion failed")?;
    println!("reference: {:>10.3} ms", reference.elapsed.as_secs_f64() * 1e3);

    let tol = Tolerance { rtol: args.rtol, atol: args.atol };
    let report = compare_block_tridiagonal(&inverse, &reference.inverse, tol)?;
    println!(
        "compared {} blocks: max abs error {:.3e}, max rel error {:.3e}",
        report.blocks_compared, report.max_abs_error, report.max_rel_error
    );
    if !report.passed() {
        bail!("{} blocks differ from the reference, first at {:?}", report.mismatched.len(), report.mismatched[0]);
    }
    println!("OK");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.complex { run::<Complex64>(&args) } else { run::<f64>(&args) }
}
