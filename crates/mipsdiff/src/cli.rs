//! CLI definitions and argument types.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mipsdiff::engine::{DEFAULT_BUBBLE_CEILING, DEFAULT_RESET_CYCLES};
use mipsdiff::supervisor::{DEFAULT_MACHINE, DEFAULT_PORT, DEFAULT_QEMU};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "mipsdiff")]
#[command(about = "Lockstep differential testing of a MIPS core against QEMU")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the DUT and the reference model in lockstep
    Run(RunArgs),

    /// Launcher role, started by `run`
    #[command(hide = true)]
    Launch(LaunchArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// DUT simulation shared library
    #[arg(long, value_name = "LIB")]
    pub dut: PathBuf,

    /// Program image for both models
    #[arg(long, value_name = "ELF")]
    pub symbol_file: PathBuf,

    /// Entry address (default: ELF entry point)
    #[arg(long, value_parser = parse_addr)]
    pub entry: Option<u32>,

    /// Loopback port of the reference GDB stub
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connect to an already running reference instead of launching one
    #[arg(long)]
    pub attach: bool,

    /// Reference emulator binary
    #[arg(long, default_value = DEFAULT_QEMU)]
    pub qemu: String,

    /// Emulated machine
    #[arg(long, default_value = DEFAULT_MACHINE)]
    pub machine: String,

    /// Extra emulator argument (repeatable)
    #[arg(long = "qemu-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub qemu_args: Vec<String>,

    /// DUT PC at which register divergence is reconciled (repeatable)
    #[arg(
        long = "sync-pc",
        value_name = "ADDR",
        value_parser = parse_addr,
        value_delimiter = ',',
        default_values = ["0x800058ec", "0x80024b7c"]
    )]
    pub sync_pcs: Vec<u32>,

    /// Reset or exception vector address (repeatable)
    #[arg(
        long = "boot-vector",
        value_name = "ADDR",
        value_parser = parse_addr,
        value_delimiter = ',',
        default_values = [
            "0xbfc00200", "0xbfc00380", "0xbfc00400",
            "0x80000000", "0x80000180", "0x80000200",
        ]
    )]
    pub boot_vectors: Vec<u32>,

    /// Consecutive bubble cycles before the DUT counts as stalled
    #[arg(long, default_value_t = DEFAULT_BUBBLE_CEILING)]
    pub bubble_ceiling: u32,

    /// Cycles passed to the DUT reset routine
    #[arg(long, default_value_t = DEFAULT_RESET_CYCLES)]
    pub reset_cycles: u64,

    /// Timeout for one reference request in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub ref_timeout_ms: u64,

    /// How long to wait for the reference to accept in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub startup_timeout_ms: u64,

    /// Pause before the divergence dump in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,

    /// Stop after this many committed instructions
    #[arg(long)]
    pub max_commits: Option<u64>,
}

#[derive(Args)]
pub struct LaunchArgs {
    #[arg(long)]
    pub port: u16,

    #[arg(long)]
    pub parent_pid: i32,

    #[arg(long)]
    pub startup_timeout_ms: u64,

    /// Reference command line
    #[arg(last = true, required = true)]
    pub command: Vec<OsString>,
}

/// Parse an address given as `0x` hex or decimal. `_` separators allowed.
pub fn parse_addr(s: &str) -> Result<u32, String> {
    let digits = s.trim().replace('_', "");
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_addr() {
        assert_eq!(parse_addr("0x800058ec"), Ok(0x8000_58ec));
        assert_eq!(parse_addr("0XBFC0_0380"), Ok(0xbfc0_0380));
        assert_eq!(parse_addr("4096"), Ok(4096));
        assert!(parse_addr("0x1_0000_0000").is_err());
        assert!(parse_addr("pc").is_err());
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from([
            "mipsdiff",
            "run",
            "--dut",
            "libcore.so",
            "--symbol-file",
            "kernel.elf",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.sync_pcs, vec![0x8000_58ec, 0x8002_4b7c]);
        assert_eq!(args.boot_vectors.len(), 6);
        assert_eq!(args.port, 1234);
        assert_eq!(args.bubble_ceiling, 16384);
        assert!(args.entry.is_none());
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "mipsdiff",
            "-v",
            "run",
            "--dut",
            "d.so",
            "--symbol-file",
            "k.elf",
            "--sync-pc",
            "0x80001000,0x80002000",
            "--qemu-arg",
            "-d",
            "--qemu-arg",
            "in_asm",
            "--entry",
            "0x80000400",
        ]);
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.sync_pcs, vec![0x8000_1000, 0x8000_2000]);
        assert_eq!(args.qemu_args, vec!["-d", "in_asm"]);
        assert_eq!(args.entry, Some(0x8000_0400));
    }

    #[test]
    fn test_launch_takes_trailing_command() {
        let cli = Cli::parse_from([
            "mipsdiff",
            "launch",
            "--port",
            "1234",
            "--parent-pid",
            "77",
            "--startup-timeout-ms",
            "500",
            "--",
            "qemu-system-mipsel",
            "-S",
        ]);
        let Commands::Launch(args) = cli.command else {
            panic!("expected launch");
        };
        assert_eq!(args.parent_pid, 77);
        assert_eq!(args.command, vec!["qemu-system-mipsel", "-S"]);
    }
}
